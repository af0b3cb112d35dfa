//! Small helpers shared by the workbook reader and writer

use crate::grid::CellRange;
use anyhow::Result;
use quick_xml::Reader;
use quick_xml::events::Event;

/// Parse a cell reference like "A1" or "$B$2" into (row, col), 1-based
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            if !row_str.is_empty() {
                return None;
            }
            col = col
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        } else if ch != '$' {
            return None;
        }
    }

    if row_str.is_empty() || col == 0 {
        return None;
    }

    let row = row_str.parse::<u32>().ok()?;
    (row > 0).then_some((row, col))
}

/// Parse a range like "A1:B2" (or a single "A1") into a [`CellRange`]
pub fn parse_cell_range(range: &str) -> Option<CellRange> {
    let (start, end) = range.split_once(':').unwrap_or((range, range));

    let (start_row, start_col) = parse_cell_ref(start)?;
    let (end_row, end_col) = parse_cell_ref(end)?;

    Some(CellRange::spanning(
        start_row.min(end_row),
        start_row.max(end_row),
        start_col.min(end_col),
        start_col.max(end_col),
    ))
}

/// Parse a space separated list of ranges as used by `sqref`
pub fn parse_sqref(sqref: &str) -> Vec<CellRange> {
    sqref.split_whitespace().filter_map(parse_cell_range).collect()
}

/// Read text content from an XML node
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
