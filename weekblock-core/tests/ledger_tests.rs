use chrono::NaiveDate;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use weekblock_core::formula::{Value, evaluate_cell};
use weekblock_core::reader::{CellValue, read_workbook};
use weekblock_core::{CellRange, LedgerEditor, LedgerError, LedgerGrid};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="m/d/yyyy"/></numFmts><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="164" fontId="1" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment horizontal="center"/></xf><xf numFmtId="0" fontId="0" fillId="2" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

const SHARED_STRINGS: [&str; 11] = [
    "ITEM",
    "MOQ",
    "OH",
    "UNIT",
    "MBO COUNT",
    "ACTUAL COUNT",
    "+/- (gains or losses)",
    "Updated Actual Count in MBO?",
    "Flour",
    "Sugar",
    "TOTAL",
];

const NOTES_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>untouched</t></is></c></row></sheetData></worksheet>"#;

/// One block dated 2024-01-01 with rows 3 to 5, row 5 being the total row
fn one_block_rows(with_delta: bool) -> String {
    let delta = if with_delta {
        r#"<c r="G3"><f>IF(OR(F3="",E3=""),"",F3-E3)</f><v>1</v></c>"#
    } else {
        ""
    };
    format!(
        concat!(
            r#"<row r="1"><c r="E1" s="1"><v>45292</v></c><c r="F1" s="1"/><c r="G1" s="1"/><c r="H1" s="1"/></row>"#,
            r#"<row r="2"><c r="A2" t="s"><v>0</v></c><c r="B2" t="s"><v>1</v></c><c r="C2" t="s"><v>2</v></c><c r="D2" t="s"><v>3</v></c>"#,
            r#"<c r="E2" t="s"><v>4</v></c><c r="F2" t="s"><v>5</v></c><c r="G2" t="s"><v>6</v></c><c r="H2" t="s"><v>7</v></c></row>"#,
            r#"<row r="3"><c r="A3" t="s"><v>8</v></c><c r="E3"><v>4</v></c><c r="F3"><v>5</v></c>{delta}</row>"#,
            r#"<row r="4"><c r="A4" t="s"><v>9</v></c><c r="E4"><v>2</v></c></row>"#,
            r#"<row r="5"><c r="A5" s="2" t="s"><v>10</v></c><c r="B5"><f>SUM(B3:B4)</f><v>0</v></c><c r="H5" t="b"><v>0</v></c></row>"#,
        ),
        delta = delta
    )
}

const ONE_BLOCK_EXTRA: &str = r#"<mergeCells count="1"><mergeCell ref="E1:H1"/></mergeCells><dataValidations count="1"><dataValidation type="list" allowBlank="1" showErrorMessage="1" sqref="H5"><formula1>"TRUE,FALSE"</formula1></dataValidation></dataValidations><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#;

// Helper to create an xlsx package with a ledger sheet, a second sheet and a calculation chain
fn create_mock_xlsx(path: &Path, sheet_data: &str, extra: &str) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="MView" sheetId="1" r:id="rId1"/><sheet name="Notes" sheetId="2" r:id="rId2"/></sheets><calcPr calcId="191029"/></workbook>"#.as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#.as_bytes())?;

    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES_XML.as_bytes())?;

    zip.start_file("xl/sharedStrings.xml", options)?;
    let mut sst = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
        SHARED_STRINGS.len()
    );
    for s in SHARED_STRINGS {
        sst.push_str(&format!("<si><t>{}</t></si>", s));
    }
    sst.push_str("</sst>");
    zip.write_all(sst.as_bytes())?;

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:H5"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><cols><col min="1" max="1" width="18" customWidth="1"/></cols><sheetData>{}</sheetData>{}</worksheet>"#,
            sheet_data, extra
        )
        .as_bytes(),
    )?;

    zip.start_file("xl/worksheets/sheet2.xml", options)?;
    zip.write_all(NOTES_SHEET.as_bytes())?;

    zip.start_file("xl/calcChain.xml", options)?;
    zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="G3" i="1"/></calcChain>"#.as_bytes())?;

    zip.finish()?;
    Ok(())
}

fn read_entry(path: &Path, name: &str) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut content = String::new();
    archive.by_name(name)?.read_to_string(&mut content)?;
    Ok(content)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2030, 6, 1)
}

#[test]
fn test_add_block_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ledger.xlsx");
    let output = dir.path().join("ledger_next.xlsx");
    create_mock_xlsx(&input, &one_block_rows(true), ONE_BLOCK_EXTRA)?;

    let editor = LedgerEditor::new();
    let mut ledger = editor.open(&input, None)?;
    let report = ledger.add_next_block(today())?;
    assert_eq!((report.plan.start, report.plan.end), (9, 12));
    assert_eq!(report.plan.date, date(2024, 1, 8));
    assert_eq!(
        report.message,
        "New week block added for 1/8/2024!\n\nReady for Monday inventory count."
    );
    ledger.save(&output)?;

    let workbook = read_workbook(&output)?;
    let sheet = workbook.get_sheet("MView").unwrap();
    assert_eq!(sheet.last_column(), 12);
    assert_eq!(sheet.value(1, 9), CellValue::Date(date(2024, 1, 8)));
    assert!(sheet.format(1, 9).bold);
    assert!(sheet.merged_cells.contains(&CellRange::new(1, 9, 1, 4)));
    assert!(sheet.merged_cells.contains(&CellRange::new(1, 5, 1, 4)));
    assert_eq!(sheet.value(2, 10), CellValue::from("ACTUAL COUNT"));

    // Planned count carried from last week's actual count
    assert_eq!(evaluate_cell(sheet, 3, 9), Value::Number(5.0));
    // No actual count yet, so no delta
    assert_eq!(evaluate_cell(sheet, 3, 11), Value::Text(String::new()));
    // Falls back to last week's planned count
    assert_eq!(evaluate_cell(sheet, 4, 9), Value::Number(2.0));

    assert!(sheet.has_checkbox(5, 12));
    assert!(sheet.has_checkbox(5, 8));
    assert!(!sheet.has_checkbox(3, 12));
    assert!(sheet.column_widths.get(&12).is_some_and(|w| *w >= 28.0));
    assert_eq!(sheet.column_widths.get(&1), Some(&18.0));
    Ok(())
}

#[test]
fn test_write_preserves_package() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("ledger.xlsx");
    let output = dir.path().join("out.xlsx");
    create_mock_xlsx(&input, &one_block_rows(true), ONE_BLOCK_EXTRA)?;

    let mut ledger = LedgerEditor::new().open(&input, None)?;
    ledger.add_next_block(today())?;
    ledger.save(&output)?;

    let mut archive = zip::ZipArchive::new(File::open(&output)?)?;
    assert!(archive.by_name("xl/calcChain.xml").is_err());
    drop(archive);

    assert_eq!(read_entry(&output, "xl/worksheets/sheet2.xml")?, NOTES_SHEET);
    assert!(!read_entry(&output, "[Content_Types].xml")?.contains("calcChain"));
    assert!(!read_entry(&output, "xl/_rels/workbook.xml.rels")?.contains("calcChain"));
    assert!(read_entry(&output, "xl/workbook.xml")?.contains(r#"fullCalcOnLoad="1""#));

    let sheet_xml = read_entry(&output, "xl/worksheets/sheet1.xml")?;
    assert!(sheet_xml.contains("<f>SUM(B3:B4)</f>"));
    assert!(sheet_xml.contains(r#"<sheetView workbookViewId="0"/>"#));
    assert!(sheet_xml.contains("<pageMargins"));
    assert!(sheet_xml.contains(r#"sqref="H5 L5""#));
    assert!(sheet_xml.contains(r#"<dimension ref="A1:L5"/>"#));
    Ok(())
}

#[test]
fn test_add_in_place_then_undo() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.xlsx");
    create_mock_xlsx(&path, &one_block_rows(true), ONE_BLOCK_EXTRA)?;
    let editor = LedgerEditor::new();

    let mut ledger = editor.open(&path, None)?;
    ledger.add_next_block(today())?;
    ledger.save(&path)?;

    let mut ledger = editor.open(&path, None)?;
    assert_eq!(ledger.inspect().blocks.len(), 2);
    let removed = ledger.undo_last_block()?;
    assert_eq!((removed.start, removed.end), (9, 12));
    assert_eq!(removed.date, Some(date(2024, 1, 8)));
    ledger.save(&path)?;

    let mut ledger = editor.open(&path, None)?;
    let sheet = ledger.sheet();
    assert_eq!(sheet.last_column(), 8);
    assert_eq!(sheet.merged_cells, vec![CellRange::new(1, 5, 1, 4)]);
    assert!(sheet.has_checkbox(5, 8));
    assert_eq!(sheet.checkboxes.len(), 1);

    let err = ledger.undo_last_block().unwrap_err();
    assert_eq!(
        err.downcast_ref::<LedgerError>(),
        Some(&LedgerError::LastRemainingBlock { start: 5, end: 8 })
    );
    Ok(())
}

#[test]
fn test_repair_restores_missing_formulas() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.xlsx");
    create_mock_xlsx(&path, &one_block_rows(false), ONE_BLOCK_EXTRA)?;
    let editor = LedgerEditor::new();

    let mut ledger = editor.open(&path, None)?;
    assert!(ledger.sheet().value(3, 7).is_empty());
    let report = ledger.repair()?;
    assert_eq!(report.blocks.len(), 1);
    assert!(ledger.sheet().value(3, 5).is_formula());
    assert!(ledger.sheet().value(3, 7).is_formula());
    assert_eq!(evaluate_cell(ledger.sheet(), 4, 7), Value::Text(String::new()));

    let repaired = ledger.sheet().clone();
    ledger.repair()?;
    assert_eq!(ledger.sheet().cells, repaired.cells);
    assert_eq!(ledger.sheet().checkboxes, repaired.checkboxes);
    Ok(())
}

#[test]
fn test_misaligned_ledger_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.xlsx");
    let rows = one_block_rows(true).replace(
        r#"<c r="H2" t="s"><v>7</v></c>"#,
        r#"<c r="H2" t="s"><v>7</v></c><c r="I2" t="inlineStr"><is><t>notes</t></is></c>"#,
    );
    create_mock_xlsx(&path, &rows, ONE_BLOCK_EXTRA)?;

    let mut ledger = LedgerEditor::new().open(&path, None)?;
    let summary = ledger.inspect();
    assert_eq!(summary.trailing_columns, Some((9, 9)));

    let before = ledger.sheet().clone();
    let err = ledger.add_next_block(today()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<LedgerError>(),
        Some(&LedgerError::MisalignedBlocks { first: 9, last: 9 })
    );
    assert_eq!(ledger.sheet().cells, before.cells);
    Ok(())
}

#[test]
fn test_unknown_sheet() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.xlsx");
    create_mock_xlsx(&path, &one_block_rows(true), ONE_BLOCK_EXTRA)?;

    let err = LedgerEditor::new()
        .open(&path, Some("Inventory"))
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<LedgerError>(),
        Some(&LedgerError::SheetNotFound("Inventory".to_string()))
    );
    Ok(())
}

#[test]
fn test_inspect_reports_blocks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.xlsx");
    create_mock_xlsx(&path, &one_block_rows(true), ONE_BLOCK_EXTRA)?;

    let ledger = LedgerEditor::new().open(&path, None)?;
    let summary = ledger.inspect();
    assert_eq!(summary.data_rows, Some((3, 5)));
    assert_eq!(summary.blocks.len(), 1);
    let block = &summary.blocks[0];
    assert_eq!(block.date, Some(date(2024, 1, 1)));
    assert_eq!((block.controls, block.checked, block.counted_rows), (1, 0, 1));

    let plan = ledger.plan_next_block(today())?;
    assert_eq!(plan.date, date(2024, 1, 8));
    Ok(())
}
