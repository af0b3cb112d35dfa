//! XML parsing of the parts of an XLSX archive the ledger needs

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{BufReader, Read};
use tracing::debug;
use zip::ZipArchive;

use super::parser_utils::{parse_cell_range, parse_cell_ref, parse_sqref, read_text_node};
use super::styles::StyleTable;
use super::workbook::{Cell, CellFormat, CellValue, Formula, Sheet, is_date_format, serial_to_date};
use crate::formula::{Value, column_letters, parse_a1};
use crate::grid::CellRange;

/// Value list a checkbox validation is written with
pub const CHECKBOX_LIST: &str = "\"TRUE,FALSE\"";

/// Get the value of one attribute, unescaped
pub(crate) fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Whether a `dataValidation` describes a checkbox
pub(crate) fn is_checkbox_validation(kind: Option<&str>, formula1: &str) -> bool {
    let values: String = formula1
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect();
    kind == Some("list") && values.eq_ignore_ascii_case("TRUE,FALSE")
}

/// Resolve sheet name to its XML path in the XLSX archive
pub fn get_xlsx_sheet_path(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
    sheet_name: &str,
) -> Result<String> {
    // rId from xl/workbook.xml
    let mut rid = None;
    {
        let workbook_xml = archive
            .by_name("xl/workbook.xml")
            .context("Failed to find xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                    if attr_value(&e, b"name")?.as_deref() == Some(sheet_name) {
                        rid = attr_value(&e, b"r:id")?;
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
    }
    let rid = rid.with_context(|| format!("Sheet '{}' not found in workbook.xml", sheet_name))?;

    // Target of that rId in xl/_rels/workbook.xml.rels
    let mut target = None;
    {
        let rels_xml = archive
            .by_name("xl/_rels/workbook.xml.rels")
            .context("Failed to find xl/_rels/workbook.xml.rels")?;
        let mut reader = Reader::from_reader(BufReader::new(rels_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                    if attr_value(&e, b"Id")?.as_deref() == Some(rid.as_str()) {
                        target = attr_value(&e, b"Target")?;
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
    }
    let target = target.with_context(|| {
        format!("Relationship '{}' not found for sheet '{}'", rid, sheet_name)
    })?;

    // Targets are relative to xl/ unless rooted
    Ok(match target.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => format!("xl/{}", target),
    })
}

/// Shared formula master cell
enum SharedBase {
    Parsed(crate::formula::Expr),
    Opaque { text: String, row: u32, col: u32 },
}

/// Everything read from one worksheet part
#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub cells: HashMap<(u32, u32), Cell>,
    pub merged_cells: Vec<CellRange>,
    pub column_widths: BTreeMap<u32, f64>,
    pub checkboxes: BTreeSet<(u32, u32)>,
}

pub struct XlsxReader<'a, R: std::io::Read + std::io::Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
    styles: StyleTable,
    reference_pattern: Regex,
}

impl<'a, R: std::io::Read + std::io::Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Result<Self> {
        let shared_strings = extract_shared_strings(archive)?;
        let styles = match archive.by_name("xl/styles.xml") {
            Ok(mut file) => {
                let mut xml = String::new();
                file.read_to_string(&mut xml)?;
                StyleTable::from_xml(&xml).context("Failed to parse xl/styles.xml")?
            }
            Err(_) => StyleTable::default(),
        };
        let reference_pattern = Regex::new(
            r"(?P<sheet>(?:'[^']+'|[A-Za-z0-9_\.\-]+)!)?(?P<col_abs>\$?)(?P<col>[A-Z]{1,3})(?P<row_abs>\$?)(?P<row>[0-9]+)",
        )?;
        Ok(Self {
            archive,
            shared_strings,
            styles,
            reference_pattern,
        })
    }

    /// The style table, consumed once the sheets are read
    pub fn into_styles(self) -> StyleTable {
        self.styles
    }

    pub fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let mut sheets = Vec::new();

        for (name, visible) in self.get_sheet_names()? {
            let path = get_xlsx_sheet_path(self.archive, &name)?;
            let parsed = self
                .parse_sheet_xml(&path)
                .with_context(|| format!("Failed to parse sheet '{}'", name))?;
            debug!(
                sheet = %name,
                cells = parsed.cells.len(),
                merges = parsed.merged_cells.len(),
                checkboxes = parsed.checkboxes.len(),
                "read worksheet"
            );

            let mut sheet = Sheet::new(name);
            sheet.sheet_path = Some(path);
            sheet.visible = visible;
            sheet.cells = parsed.cells;
            sheet.merged_cells = parsed.merged_cells;
            sheet.column_widths = parsed.column_widths;
            sheet.checkboxes = parsed.checkboxes;
            sheets.push(sheet);
        }

        Ok(sheets)
    }

    /// Sheet names in workbook order, with their visibility
    fn get_sheet_names(&mut self) -> Result<Vec<(String, bool)>> {
        let mut names = Vec::new();
        let workbook_xml = self.archive.by_name("xl/workbook.xml")?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                    if let Some(name) = attr_value(&e, b"name")? {
                        let state = attr_value(&e, b"state")?;
                        let hidden = matches!(state.as_deref(), Some("hidden" | "veryHidden"));
                        names.push((name, !hidden));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(names)
    }

    fn parse_sheet_xml(&mut self, path: &str) -> Result<ParsedSheet> {
        let mut parsed = ParsedSheet::default();
        let mut shared_formulas: HashMap<u32, SharedBase> = HashMap::new();

        let sheet_xml = self.archive.by_name(path)?;
        let mut reader = Reader::from_reader(BufReader::new(sheet_xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut current_row = 0u32;
        let mut current_col = 0u32;
        let mut validation: Option<(Option<String>, String)> = None;

        loop {
            let event = reader.read_event_into(&mut buf)?;
            let is_empty = matches!(event, Event::Empty(_));
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                    b"col" => {
                        let min = attr_value(e, b"min")?.and_then(|v| v.parse::<u32>().ok());
                        let max = attr_value(e, b"max")?.and_then(|v| v.parse::<u32>().ok());
                        let width = attr_value(e, b"width")?.and_then(|v| v.parse::<f64>().ok());
                        if let (Some(min), Some(max), Some(width)) = (min, max, width) {
                            for col in min..=max.min(16_384) {
                                parsed.column_widths.insert(col, width);
                            }
                        }
                    }
                    b"row" => {
                        if let Some(r) = attr_value(e, b"r")? {
                            current_row = r.parse::<u32>()?;
                        } else {
                            current_row += 1;
                        }
                        current_col = 0;
                    }
                    b"c" => {
                        let r_attr = attr_value(e, b"r")?;
                        let s_attr = attr_value(e, b"s")?.and_then(|s| s.parse::<u32>().ok());
                        let t_attr = attr_value(e, b"t")?.unwrap_or_default();

                        let (row, col) = match r_attr.as_deref().and_then(parse_cell_ref) {
                            Some(pos) => pos,
                            None => (current_row, current_col + 1),
                        };
                        current_col = col;

                        let format = s_attr
                            .map(|s| self.styles.format_for(s))
                            .unwrap_or_default();

                        let value = if is_empty {
                            CellValue::Empty
                        } else {
                            let contents =
                                parse_cell_contents(&mut reader, &t_attr, &self.shared_strings)?;
                            resolve_value(
                                contents,
                                (row, col),
                                &format,
                                &mut shared_formulas,
                                &self.reference_pattern,
                            )
                        };

                        parsed.cells.insert(
                            (row, col),
                            Cell {
                                row,
                                col,
                                value,
                                format,
                            },
                        );
                    }
                    b"mergeCell" => {
                        if let Some(range) =
                            attr_value(e, b"ref")?.as_deref().and_then(parse_cell_range)
                        {
                            parsed.merged_cells.push(range);
                        }
                    }
                    b"dataValidation" => {
                        let kind = attr_value(e, b"type")?;
                        let sqref = attr_value(e, b"sqref")?.unwrap_or_default();
                        if !is_empty {
                            validation = Some((kind, sqref));
                        }
                    }
                    b"formula1" if !is_empty => {
                        if let Some((kind, sqref)) = validation.take() {
                            let formula1 = read_text_node(&mut reader)?;
                            if is_checkbox_validation(kind.as_deref(), &formula1) {
                                for range in parse_sqref(&sqref) {
                                    parsed.checkboxes.extend(range.cells());
                                }
                            }
                        }
                    }
                    _ => {}
                },
                Event::End(ref e) => match e.name().as_ref() {
                    b"dataValidation" => validation = None,
                    b"worksheet" => break,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(parsed)
    }
}

fn resolve_value(
    contents: CellContents,
    (row, col): (u32, u32),
    format: &CellFormat,
    shared_formulas: &mut HashMap<u32, SharedBase>,
    reference_pattern: &Regex,
) -> CellValue {
    let CellContents {
        value,
        cached,
        formula,
        shared_index,
    } = contents;

    if let Some(text) = formula {
        let text = text.strip_prefix('=').unwrap_or(&text).to_string();
        let resolved = match parse_a1(&text, row, col) {
            Ok(expr) => {
                if let Some(si) = shared_index {
                    shared_formulas.insert(si, SharedBase::Parsed(expr.clone()));
                }
                Formula::Parsed(expr)
            }
            Err(err) => {
                debug!(row, col, formula = %text, error = %err, "keeping formula verbatim");
                if let Some(si) = shared_index {
                    shared_formulas.insert(
                        si,
                        SharedBase::Opaque {
                            text: text.clone(),
                            row,
                            col,
                        },
                    );
                }
                Formula::Opaque { text, cached }
            }
        };
        return CellValue::Formula(resolved);
    }

    if let Some(si) = shared_index {
        match shared_formulas.get(&si) {
            Some(SharedBase::Parsed(expr)) => {
                return CellValue::Formula(Formula::Parsed(expr.clone()));
            }
            Some(SharedBase::Opaque {
                text,
                row: base_row,
                col: base_col,
            }) => {
                let text = translate_shared_formula(
                    reference_pattern,
                    text,
                    row as i64 - *base_row as i64,
                    col as i64 - *base_col as i64,
                );
                return CellValue::Formula(Formula::Opaque { text, cached });
            }
            None => {}
        }
    }

    match value {
        CellValue::Number(n)
            if format.num_fmt.as_deref().is_some_and(is_date_format) =>
        {
            serial_to_date(n).map_or(CellValue::Number(n), CellValue::Date)
        }
        other => other,
    }
}

/// Shift the relative references of a shared formula to another cell
fn translate_shared_formula(
    reference_pattern: &Regex,
    formula: &str,
    row_shift: i64,
    col_shift: i64,
) -> String {
    reference_pattern
        .replace_all(formula, |caps: &regex::Captures| {
            let sheet = caps.name("sheet").map_or("", |m| m.as_str());
            let col_abs = caps.name("col_abs").is_some_and(|m| !m.as_str().is_empty());
            let row_abs = caps.name("row_abs").is_some_and(|m| !m.as_str().is_empty());
            let col_str = caps.name("col").map_or("", |m| m.as_str());
            let row_str = caps.name("row").map_or("", |m| m.as_str());

            let Some((row, col)) = parse_cell_ref(&format!("{}{}", col_str, row_str)) else {
                return caps[0].to_string();
            };
            let new_row = if row_abs { row as i64 } else { row as i64 + row_shift };
            let new_col = if col_abs { col as i64 } else { col as i64 + col_shift };
            if new_row < 1 || new_col < 1 {
                return "#REF!".to_string();
            }

            format!(
                "{}{}{}{}{}",
                sheet,
                if col_abs { "$" } else { "" },
                column_letters(new_col as u32),
                if row_abs { "$" } else { "" },
                new_row
            )
        })
        .into_owned()
}

/// Raw content of one `<c>` element
struct CellContents {
    value: CellValue,
    cached: Value,
    formula: Option<String>,
    shared_index: Option<u32>,
}

fn parse_cell_contents<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    t_attr: &str,
    shared_strings: &[String],
) -> Result<CellContents> {
    let mut contents = CellContents {
        value: CellValue::Empty,
        cached: Value::Empty,
        formula: None,
        shared_index: None,
    };
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"v" => {
                    let v_text = if let Event::Start(_) = event {
                        read_text_node(reader)?
                    } else {
                        String::new()
                    };
                    (contents.value, contents.cached) = match t_attr {
                        "s" => {
                            let text = v_text
                                .parse::<usize>()
                                .ok()
                                .and_then(|idx| shared_strings.get(idx))
                                .cloned()
                                .unwrap_or_default();
                            (CellValue::Text(text.clone()), Value::Text(text))
                        }
                        "b" => {
                            let b = v_text == "1" || v_text.eq_ignore_ascii_case("true");
                            (CellValue::Boolean(b), Value::Bool(b))
                        }
                        "e" => (CellValue::Text(v_text.clone()), Value::Error(v_text)),
                        "str" => (CellValue::Text(v_text.clone()), Value::Text(v_text)),
                        _ => match v_text.parse::<f64>() {
                            Ok(n) => (CellValue::Number(n), Value::Number(n)),
                            Err(_) if v_text.is_empty() => (CellValue::Empty, Value::Empty),
                            Err(_) => (CellValue::Text(v_text.clone()), Value::Text(v_text)),
                        },
                    };
                }
                b"f" => {
                    let is_shared = attr_value(e, b"t")?.as_deref() == Some("shared");
                    if is_shared {
                        contents.shared_index =
                            attr_value(e, b"si")?.and_then(|si| si.parse::<u32>().ok());
                    }
                    if let Event::Start(_) = event {
                        let f_text = read_text_node(reader)?;
                        if !f_text.is_empty() {
                            contents.formula = Some(f_text);
                        }
                    }
                }
                b"is" => {
                    if let Event::Start(_) = event {
                        let mut is_text = String::new();
                        let mut is_buf = Vec::new();
                        loop {
                            match reader.read_event_into(&mut is_buf)? {
                                Event::Start(ref ee) if ee.name().as_ref() == b"t" => {
                                    is_text.push_str(&read_text_node(reader)?);
                                }
                                Event::End(ref ee) if ee.name().as_ref() == b"is" => break,
                                Event::Eof => break,
                                _ => {}
                            }
                            is_buf.clear();
                        }
                        contents.cached = Value::Text(is_text.clone());
                        contents.value = CellValue::Text(is_text);
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(contents)
}

pub fn extract_shared_strings(
    archive: &mut ZipArchive<impl std::io::Read + std::io::Seek>,
) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    // Leading and trailing spaces of rich text runs are content
    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    let mut buf = Vec::new();
    let mut current_string = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"t" => {
                current_string.push_str(&read_text_node(&mut reader)?);
            }
            // Phonetic runs repeat the text and must not be appended
            Event::Start(e) if e.name().as_ref() == b"rPh" => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current_string));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Expr;
    use chrono::NaiveDate;
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn archive(sheet_xml: &str) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let parts = [
            (
                "xl/workbook.xml",
                r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="MView" sheetId="1" r:id="rId1"/><sheet name="Old" sheetId="2" state="hidden" r:id="rId2"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Target="/xl/worksheets/sheet2.xml"/></Relationships>"#,
            ),
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>ITEM</t></si><si><r><t>ACTUAL</t></r><r><t> COUNT</t></r></si></sst>"#,
            ),
            (
                "xl/styles.xml",
                r#"<styleSheet><numFmts count="1"><numFmt numFmtId="164" formatCode="m/d/yyyy"/></numFmts><fonts count="1"><font/></fonts><fills count="1"><fill/></fills><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#,
            ),
            ("xl/worksheets/sheet1.xml", sheet_xml),
            ("xl/worksheets/sheet2.xml", "<worksheet><sheetData/></worksheet>"),
        ];
        for (name, content) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();
        ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    const SHEET: &str = r#"<worksheet>
<cols><col min="5" max="8" width="12.5" customWidth="1"/></cols>
<sheetData>
<row r="1"><c r="E1" s="1"><v>45292</v></c></row>
<row r="2"><c r="A2" t="s"><v>0</v></c><c r="F2" t="s"><v>1</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>Flour</t></is></c><c r="F3"><v>4</v></c>
<c r="I3"><f t="shared" ref="I3:I4" si="0">IF($A3="","",F3)</f><v>4</v></c>
<c r="J3"><f>SUM(F3:G3)</f><v>4</v></c><c r="L3" t="b"><v>0</v></c></row>
<row r="4"><c r="I4"><f t="shared" si="0"/><v>0</v></c><c r="J4" s="0"/></row>
</sheetData>
<mergeCells count="1"><mergeCell ref="E1:H1"/></mergeCells>
<dataValidations count="2"><dataValidation type="list" allowBlank="1" sqref="L3 L5"><formula1>"TRUE,FALSE"</formula1></dataValidation><dataValidation type="list" sqref="B3"><formula1>"A,B"</formula1></dataValidation></dataValidations>
</worksheet>"#;

    #[test]
    fn test_sheet_path_resolution() {
        let mut archive = archive(SHEET);
        assert_eq!(
            get_xlsx_sheet_path(&mut archive, "MView").unwrap(),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            get_xlsx_sheet_path(&mut archive, "Old").unwrap(),
            "xl/worksheets/sheet2.xml"
        );
        assert!(get_xlsx_sheet_path(&mut archive, "Nope").is_err());
    }

    #[test]
    fn test_read_sheets() {
        let mut archive = archive(SHEET);
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let sheets = reader.read_sheets().unwrap();
        assert_eq!(sheets.len(), 2);
        assert!(!sheets[1].visible);

        let sheet = &sheets[0];
        assert_eq!(
            sheet.get_cell(1, 5).unwrap().value,
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(sheet.get_cell(2, 1).unwrap().value, CellValue::from("ITEM"));
        assert_eq!(sheet.get_cell(2, 6).unwrap().value, CellValue::from("ACTUAL COUNT"));
        assert_eq!(sheet.get_cell(3, 1).unwrap().value, CellValue::from("Flour"));
        assert_eq!(sheet.get_cell(3, 12).unwrap().value, CellValue::Boolean(false));
        assert_eq!(sheet.get_cell(4, 10).unwrap().value, CellValue::Empty);

        assert_eq!(sheet.merged_cells, vec![CellRange::new(1, 5, 1, 4)]);
        assert_eq!(sheet.column_widths.get(&6), Some(&12.5));
        assert_eq!(
            sheet.checkboxes.iter().copied().collect::<Vec<_>>(),
            vec![(3, 12), (5, 12)]
        );
    }

    #[test]
    fn test_formulas_are_position_independent() {
        let mut archive = archive(SHEET);
        let mut reader = XlsxReader::new(&mut archive).unwrap();
        let sheets = reader.read_sheets().unwrap();
        let sheet = &sheets[0];

        let master = sheet.get_cell(3, 9).unwrap().value.as_expr().cloned();
        let child = sheet.get_cell(4, 9).unwrap().value.as_expr().cloned();
        assert!(master.is_some());
        assert_eq!(master, child);
        assert_eq!(
            child.map(|e: Expr| e.to_a1(4, 9).unwrap()),
            Some(r#"IF($A4="","",F4)"#.to_string())
        );

        match &sheet.get_cell(3, 10).unwrap().value {
            CellValue::Formula(Formula::Opaque { text, cached }) => {
                assert_eq!(text, "SUM(F3:G3)");
                assert_eq!(cached, &Value::Number(4.0));
            }
            other => panic!("expected opaque formula, got {:?}", other),
        }
    }

    #[test]
    fn test_translate_shared_formula() {
        let mut archive = archive(SHEET);
        let reader = XlsxReader::new(&mut archive).unwrap();
        let pattern = &reader.reference_pattern;
        assert_eq!(
            translate_shared_formula(pattern, "SUM(F3:G3)+$A$1+Data!B2", 2, 1),
            "SUM(G5:H5)+$A$1+Data!C4"
        );
        assert_eq!(translate_shared_formula(pattern, "A1", 0, -1), "#REF!");
    }

    #[test]
    fn test_checkbox_validation_detection() {
        assert!(is_checkbox_validation(Some("list"), "\"TRUE,FALSE\""));
        assert!(is_checkbox_validation(Some("list"), "\"true, false\""));
        assert!(!is_checkbox_validation(Some("list"), "\"A,B\""));
        assert!(!is_checkbox_validation(Some("whole"), "\"TRUE,FALSE\""));
    }
}
