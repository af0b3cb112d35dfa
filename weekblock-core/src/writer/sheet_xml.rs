//! Worksheet XML regeneration
//!
//! The parts of a worksheet that the ledger models (dimension, column widths,
//! cell data, merges, data validations) are rendered from the [`Sheet`]; every
//! other element of the original part is streamed through unchanged.

use crate::formula::{Value, column_letters, evaluate_cell};
use crate::grid::CellRange;
use crate::reader::styles::StyleTable;
use crate::reader::workbook::{Cell, CellValue, Formula, Sheet, date_to_serial, is_date_format};
use crate::reader::xlsx_parser::{CHECKBOX_LIST, attr_value, is_checkbox_validation};
use anyhow::Result;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use tracing::warn;

/// Number format given to dates written into cells without one
pub const DATE_NUM_FMT: &str = "m/d/yyyy";

/// Children of `<worksheet>` in schema order
const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Elements replaced by rendered content
const RENDERED: [&str; 5] = ["dimension", "cols", "sheetData", "mergeCells", "dataValidations"];

fn rank(name: &[u8]) -> Option<usize> {
    WORKSHEET_ORDER.iter().position(|n| n.as_bytes() == name)
}

fn is_rendered(name: &[u8]) -> bool {
    RENDERED.iter().any(|n| n.as_bytes() == name)
}

/// Rebuild a worksheet part from `sheet`, keeping what the sheet does not model
///
/// New styles needed by the cells are interned into `styles`.
pub fn render_sheet_xml(original: &str, sheet: &Sheet, styles: &mut StyleTable) -> Result<String> {
    let foreign = foreign_validations(original)?;
    let mut pending: Vec<(usize, String)> = [
        ("dimension", Some(dimension_xml(sheet))),
        ("cols", cols_xml(sheet)),
        ("sheetData", Some(sheet_data_xml(sheet, styles)?)),
        ("mergeCells", merges_xml(sheet)),
        ("dataValidations", validations_xml(sheet, &foreign)),
    ]
    .into_iter()
    .filter_map(|(name, xml)| Some((rank(name.as_bytes())?, xml?)))
    .collect();

    let mut reader = Reader::from_str(original);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 1 {
                    flush_before(&mut writer, &mut pending, e.local_name().as_ref())?;
                    if is_rendered(e.local_name().as_ref()) {
                        reader.read_to_end(e.name())?;
                        continue;
                    }
                }
                depth += 1;
                writer.write_event(Event::Start(e))?;
            }
            Event::Empty(e) => {
                if depth == 1 {
                    flush_before(&mut writer, &mut pending, e.local_name().as_ref())?;
                    if is_rendered(e.local_name().as_ref()) {
                        continue;
                    }
                }
                writer.write_event(Event::Empty(e))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    for (_, xml) in pending.drain(..) {
                        writer.get_mut().write_all(xml.as_bytes())?;
                    }
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Write the rendered sections that belong before (or in place of) `name`
fn flush_before(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    pending: &mut Vec<(usize, String)>,
    name: &[u8],
) -> Result<()> {
    let Some(limit) = rank(name) else {
        return Ok(());
    };
    let due = pending.iter().take_while(|(r, _)| *r <= limit).count();
    for (_, xml) in pending.drain(..due) {
        writer.get_mut().write_all(xml.as_bytes())?;
    }
    Ok(())
}

/// Data validations of the original part that are not checkboxes, as raw XML
fn foreign_validations(original: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(original);
    let mut kept = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.name().as_ref() == b"dataValidation" => {
                let mut writer = Writer::new(Vec::new());
                writer.write_event(Event::Empty(e))?;
                kept.push(String::from_utf8(writer.into_inner())?);
            }
            Event::Start(e) if e.name().as_ref() == b"dataValidation" => {
                let kind = attr_value(&e, b"type")?;
                let mut writer = Writer::new(Vec::new());
                writer.write_event(Event::Start(e))?;
                let mut formula1 = String::new();
                let mut in_formula1 = false;
                loop {
                    let event = reader.read_event()?;
                    match &event {
                        Event::Start(inner) if inner.name().as_ref() == b"formula1" => {
                            in_formula1 = true;
                        }
                        Event::End(inner) if inner.name().as_ref() == b"formula1" => {
                            in_formula1 = false;
                        }
                        Event::Text(text) if in_formula1 => formula1.push_str(&text.unescape()?),
                        _ => {}
                    }
                    let done = matches!(&event, Event::End(end) if end.name().as_ref() == b"dataValidation")
                        || matches!(event, Event::Eof);
                    writer.write_event(event)?;
                    if done {
                        break;
                    }
                }
                if !is_checkbox_validation(kind.as_deref(), &formula1) {
                    kept.push(String::from_utf8(writer.into_inner())?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(kept)
}

fn dimension_xml(sheet: &Sheet) -> String {
    let extent = match sheet.last_data_cell() {
        Some((row, col)) => CellRange::spanning(1, row, 1, col).to_string(),
        None => "A1".to_string(),
    };
    format!(r#"<dimension ref="{extent}"/>"#)
}

fn cols_xml(sheet: &Sheet) -> Option<String> {
    let mut runs: Vec<(u32, u32, f64)> = Vec::new();
    for (&col, &width) in &sheet.column_widths {
        match runs.last_mut() {
            Some((_, end, w)) if *end + 1 == col && *w == width => *end = col,
            _ => runs.push((col, col, width)),
        }
    }
    if runs.is_empty() {
        return None;
    }
    let mut out = String::from("<cols>");
    for (min, max, width) in runs {
        out.push_str(&format!(
            r#"<col min="{min}" max="{max}" width="{width}" customWidth="1"/>"#
        ));
    }
    out.push_str("</cols>");
    Some(out)
}

fn sheet_data_xml(sheet: &Sheet, styles: &mut StyleTable) -> Result<String> {
    let mut rows: BTreeMap<u32, Vec<&Cell>> = BTreeMap::new();
    for cell in sheet.all_cells() {
        if cell.value.is_empty() && cell.format.is_default() {
            continue;
        }
        rows.entry(cell.row).or_default().push(cell);
    }

    let mut out = String::from("<sheetData>");
    for (row, mut cells) in rows {
        cells.sort_by_key(|c| c.col);
        write!(out, r#"<row r="{row}">"#)?;
        for cell in cells {
            write_cell(&mut out, sheet, cell, styles)?;
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData>");
    Ok(out)
}

fn write_cell(out: &mut String, sheet: &Sheet, cell: &Cell, styles: &mut StyleTable) -> Result<()> {
    let mut format = cell.format.clone();
    if matches!(cell.value, CellValue::Date(_))
        && !format.num_fmt.as_deref().is_some_and(is_date_format)
    {
        format.num_fmt = Some(DATE_NUM_FMT.to_string());
    }
    let style = match styles.intern(&format) {
        0 => String::new(),
        id => format!(r#" s="{id}""#),
    };
    let r = format!("{}{}", column_letters(cell.col), cell.row);

    match &cell.value {
        CellValue::Empty => write!(out, r#"<c r="{r}"{style}/>"#)?,
        CellValue::Number(n) => write!(out, r#"<c r="{r}"{style}><v>{n}</v></c>"#)?,
        CellValue::Date(d) => write!(out, r#"<c r="{r}"{style}><v>{}</v></c>"#, date_to_serial(*d))?,
        CellValue::Boolean(b) => {
            write!(out, r#"<c r="{r}"{style} t="b"><v>{}</v></c>"#, u8::from(*b))?
        }
        CellValue::Text(s) => write!(
            out,
            r#"<c r="{r}"{style} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            escape(s.as_str())
        )?,
        CellValue::Formula(formula) => {
            let text = match formula {
                Formula::Parsed(expr) => match expr.to_a1(cell.row, cell.col) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(cell = %r, error = %err, "formula cannot be written, storing #REF!");
                        write!(out, r#"<c r="{r}"{style} t="e"><v>#REF!</v></c>"#)?;
                        return Ok(());
                    }
                },
                Formula::Opaque { text, .. } => text.clone(),
            };
            let f = escape(text.as_str());
            match evaluate_cell(sheet, cell.row, cell.col) {
                Value::Number(n) => write!(out, r#"<c r="{r}"{style}><f>{f}</f><v>{n}</v></c>"#)?,
                Value::Bool(b) => write!(
                    out,
                    r#"<c r="{r}"{style} t="b"><f>{f}</f><v>{}</v></c>"#,
                    u8::from(b)
                )?,
                Value::Error(e) => write!(
                    out,
                    r#"<c r="{r}"{style} t="e"><f>{f}</f><v>{}</v></c>"#,
                    escape(e.as_str())
                )?,
                Value::Text(s) => write!(
                    out,
                    r#"<c r="{r}"{style} t="str"><f>{f}</f><v>{}</v></c>"#,
                    escape(s.as_str())
                )?,
                Value::Empty => write!(out, r#"<c r="{r}"{style} t="str"><f>{f}</f><v></v></c>"#)?,
            }
        }
    }
    Ok(())
}

fn merges_xml(sheet: &Sheet) -> Option<String> {
    if sheet.merged_cells.is_empty() {
        return None;
    }
    let mut out = format!(r#"<mergeCells count="{}">"#, sheet.merged_cells.len());
    for range in &sheet.merged_cells {
        out.push_str(&format!(r#"<mergeCell ref="{range}"/>"#));
    }
    out.push_str("</mergeCells>");
    Some(out)
}

fn validations_xml(sheet: &Sheet, foreign: &[String]) -> Option<String> {
    let count = foreign.len() + usize::from(!sheet.checkboxes.is_empty());
    if count == 0 {
        return None;
    }
    let mut out = format!(r#"<dataValidations count="{count}">"#);
    for validation in foreign {
        out.push_str(validation);
    }
    if !sheet.checkboxes.is_empty() {
        let sqref = sheet
            .checkboxes
            .iter()
            .map(|&(row, col)| CellRange::cell(row, col).to_string())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!(
            r#"<dataValidation type="list" allowBlank="1" showErrorMessage="1" sqref="{sqref}"><formula1>{}</formula1></dataValidation>"#,
            escape(CHECKBOX_LIST)
        ));
    }
    out.push_str("</dataValidations>");
    Some(out)
}
