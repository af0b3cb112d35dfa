//! Writes an edited ledger sheet back into its xlsx package

use super::sheet_xml::render_sheet_xml;
use crate::error::LedgerError;
use crate::reader::styles::StyleTable;
use crate::reader::workbook::Workbook;
use crate::reader::xlsx_parser::get_xlsx_sheet_path;
use anyhow::{Context, Result, anyhow};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PATH: &str = "xl/styles.xml";
const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";
const CALC_CHAIN_PATH: &str = "xl/calcChain.xml";

/// Workbook children that follow `calcPr`
const AFTER_CALC_PR: [&[u8]; 9] = [
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Write `sheet_name` of `workbook` into a copy of the package at `input`
///
/// Every other part is copied unchanged except for what a formula edit
/// invalidates: the calculation chain is dropped and the workbook is flagged
/// for a full recalculation on open. The output is written to a temporary
/// file next to `output` and renamed into place, so `input` and `output`
/// may be the same path.
pub fn write_ledger_sheet(
    input: &Path,
    output: &Path,
    workbook: &Workbook,
    sheet_name: &str,
) -> Result<()> {
    let sheet = workbook
        .get_sheet(sheet_name)
        .ok_or_else(|| LedgerError::SheetNotFound(sheet_name.to_string()))?;

    let file =
        File::open(input).with_context(|| format!("Failed to open file: {}", input.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).context("Failed to open zip archive")?;

    let sheet_path = match &sheet.sheet_path {
        Some(path) => path.clone(),
        None => get_xlsx_sheet_path(&mut archive, sheet_name)?,
    };

    let mut styles = workbook.styles.clone();
    let original = read_file_from_zip(&mut archive, &sheet_path)?;
    let sheet_xml = render_sheet_xml(&original, sheet, &mut styles)
        .with_context(|| format!("Failed to render sheet '{}'", sheet_name))?;

    let styles_xml = if styles.has_additions() {
        let original = read_file_from_zip(&mut archive, STYLES_PATH)
            .context("New cell styles are needed but the workbook has no xl/styles.xml")?;
        Some(append_styles(&original, &styles)?)
    } else {
        None
    };

    let temp = temp_path(output);
    let parts = Parts {
        sheet_path: &sheet_path,
        sheet_xml: &sheet_xml,
        styles_xml: styles_xml.as_deref(),
    };
    if let Err(err) = copy_package(&mut archive, &temp, &parts) {
        // Nothing useful is left in a half-written package
        let _ = fs::remove_file(&temp);
        return Err(err);
    }
    drop(archive);
    fs::rename(&temp, output)
        .with_context(|| format!("Failed to move output into place: {}", output.display()))?;

    info!(
        sheet = sheet_name,
        output = %output.display(),
        styles_added = styles_xml.is_some(),
        "workbook written"
    );
    Ok(())
}

/// Replacement content for the parts that change
struct Parts<'a> {
    sheet_path: &'a str,
    sheet_xml: &'a str,
    styles_xml: Option<&'a str>,
}

fn copy_package(
    archive: &mut ZipArchive<BufReader<File>>,
    output: &Path,
    parts: &Parts<'_>,
) -> Result<()> {
    let output_file = File::create(output)
        .with_context(|| format!("Failed to create file: {}", output.display()))?;
    let mut zip_writer = ZipWriter::new(output_file);

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        let options = SimpleFileOptions::default().compression_method(file.compression());

        if name == CALC_CHAIN_PATH {
            debug!("dropping calculation chain");
            continue;
        }
        if file.is_dir() {
            zip_writer.add_directory(name.as_str(), options)?;
            continue;
        }

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let content = if name == parts.sheet_path {
            parts.sheet_xml.as_bytes().to_vec()
        } else {
            match (name.as_str(), parts.styles_xml) {
                (STYLES_PATH, Some(styles)) => styles.as_bytes().to_vec(),
                (WORKBOOK_PATH, _) => force_full_calc(&String::from_utf8(buffer)?)?.into_bytes(),
                (CONTENT_TYPES_PATH, _) => {
                    drop_elements(&String::from_utf8(buffer)?, b"Override", b"PartName")?
                        .into_bytes()
                }
                (WORKBOOK_RELS_PATH, _) => {
                    drop_elements(&String::from_utf8(buffer)?, b"Relationship", b"Target")?
                        .into_bytes()
                }
                _ => buffer,
            }
        };

        zip_writer.start_file(name.as_str(), options)?;
        zip_writer.write_all(&content)?;
    }

    zip_writer.finish()?;
    Ok(())
}

fn read_file_from_zip(archive: &mut ZipArchive<BufReader<File>>, filename: &str) -> Result<String> {
    let mut file = archive
        .by_name(filename)
        .with_context(|| format!("Failed to find {} in archive", filename))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

fn temp_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());
    output.with_file_name(format!(".{}.tmp", name))
}

/// Copy of `e` with `key` set to `value`
fn with_attribute(e: &BytesStart, key: &str, value: &str) -> BytesStart<'static> {
    let mut elem = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() != key.as_bytes() {
            elem.push_attribute(attr);
        }
    }
    elem.push_attribute((key, value));
    elem
}

/// Set `fullCalcOnLoad` so spreadsheet applications recompute cached values
fn force_full_calc(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut done = false;

    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Empty(with_attribute(&e, "fullCalcOnLoad", "1")))?;
                done = true;
            }
            Event::Start(e) if e.name().as_ref() == b"calcPr" => {
                writer.write_event(Event::Start(with_attribute(&e, "fullCalcOnLoad", "1")))?;
                done = true;
            }
            Event::Start(e) if !done && AFTER_CALC_PR.contains(&e.name().as_ref()) => {
                write_calc_pr(&mut writer)?;
                done = true;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) if !done && AFTER_CALC_PR.contains(&e.name().as_ref()) => {
                write_calc_pr(&mut writer)?;
                done = true;
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) if !done && e.name().as_ref() == b"workbook" => {
                write_calc_pr(&mut writer)?;
                done = true;
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_calc_pr(writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
    let mut calc_pr = BytesStart::new("calcPr");
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    writer.write_event(Event::Empty(calc_pr))?;
    Ok(())
}

/// Remove `element`s whose `attribute` points at the calculation chain
fn drop_elements(xml: &str, element: &[u8], attribute: &[u8]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) if e.name().as_ref() == element => {
                let mut target = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == attribute {
                        target = attr.unescape_value()?.into_owned();
                        break;
                    }
                }

                if !target.ends_with("calcChain.xml") {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(e) => writer.write_event(e)?,
            Err(e) => return Err(anyhow!("Error parsing XML: {}", e)),
        }
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

/// Append the styles added while rendering and fix up the section counts
fn append_styles(xml: &str, styles: &StyleTable) -> Result<String> {
    let sections: [(&[u8], usize, String); 4] = [
        (&b"numFmts"[..], styles.num_fmt_count(), styles.added_num_fmts_xml()),
        (&b"fonts"[..], styles.fonts.len(), styles.added_fonts_xml()),
        (&b"fills"[..], styles.fills.len(), styles.added_fills_xml()),
        (&b"cellXfs"[..], styles.cell_xfs.len(), styles.added_xfs_xml()),
    ];
    let section = |name: &[u8]| sections.iter().position(|(n, _, _)| *n == name);
    let has_num_fmts = xml.contains("<numFmts");

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"styleSheet" => {
                writer.write_event(Event::Start(e))?;
                let (_, count, added) = &sections[0];
                if !has_num_fmts && !added.is_empty() {
                    write!(writer.get_mut(), r#"<numFmts count="{count}">{added}</numFmts>"#)?;
                }
            }
            Event::Start(e) => match section(e.name().as_ref()) {
                Some(i) => {
                    let count = sections[i].1.to_string();
                    writer.write_event(Event::Start(with_attribute(&e, "count", &count)))?;
                }
                None => writer.write_event(Event::Start(e))?,
            },
            Event::Empty(e) => match section(e.name().as_ref()) {
                Some(i) => {
                    let (name, count, added) = &sections[i];
                    let start = with_attribute(&e, "count", &count.to_string());
                    writer.write_event(Event::Start(start))?;
                    writer.get_mut().write_all(added.as_bytes())?;
                    let end = String::from_utf8_lossy(name).into_owned();
                    writer.write_event(Event::End(BytesEnd::new(end)))?;
                }
                None => writer.write_event(Event::Empty(e))?,
            },
            Event::End(e) => {
                if let Some(i) = section(e.name().as_ref()) {
                    writer.get_mut().write_all(sections[i].2.as_bytes())?;
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}
