//! XLSX workbook reader built on quick-xml

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::path::Path;
use tracing::info;
use zip::ZipArchive;

pub mod parser_utils;
pub mod styles;
pub mod workbook;
pub mod xlsx_parser;

use self::xlsx_parser::XlsxReader;
pub use styles::StyleTable;
pub use workbook::{Cell, CellFormat, CellValue, Formula, Sheet, Workbook};

/// Whether the path has an extension this reader understands
pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
}

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path_ref = path.as_ref();

    if !is_supported_path(path_ref) {
        bail!(
            "Unsupported file format: {} (expected .xlsx or .xlsm)",
            path_ref.display()
        );
    }

    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open file: {}", path_ref.display()))?;
    let mut archive = ZipArchive::new(file).context("Failed to open zip archive")?;

    let mut reader = XlsxReader::new(&mut archive)?;
    let sheets = reader.read_sheets()?;
    let styles = reader.into_styles();

    info!(path = %path_ref.display(), sheets = sheets.len(), "workbook loaded");

    Ok(Workbook {
        path: path_ref.to_path_buf(),
        sheets,
        styles,
    })
}
