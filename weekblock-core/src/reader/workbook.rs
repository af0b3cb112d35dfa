//! Workbook data structures

use crate::formula::{Expr, Value};
use crate::grid::CellRange;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use super::styles::StyleTable;

/// Represents a complete workbook
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub path: PathBuf,
    pub sheets: Vec<Sheet>,
    /// Parsed `xl/styles.xml`, kept so new cell formats can be appended on write
    pub styles: StyleTable,
}

impl Workbook {
    /// Get a sheet by name
    pub fn get_sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Represents a worksheet
///
/// Rows and columns are 1-indexed, matching how the host addresses cells.
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub cells: HashMap<(u32, u32), Cell>,
    /// Merged cell ranges
    pub merged_cells: Vec<CellRange>,
    /// Column widths in character units, only for columns with an explicit width
    pub column_widths: BTreeMap<u32, f64>,
    /// Cells carrying a checkbox control
    pub checkboxes: BTreeSet<(u32, u32)>,
    /// Internal path to the sheet XML file in the ZIP archive
    pub sheet_path: Option<String>,
    pub visible: bool,
}

impl Sheet {
    pub fn new(name: String) -> Self {
        Self {
            name,
            cells: HashMap::new(),
            merged_cells: Vec::new(),
            column_widths: BTreeMap::new(),
            checkboxes: BTreeSet::new(),
            sheet_path: None,
            visible: true,
        }
    }

    /// Get a cell at the given position
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Get or create the cell at the given position
    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.cells.entry((row, col)).or_insert_with(|| Cell {
            row,
            col,
            ..Default::default()
        })
    }

    /// Store a value, keeping the cell's format
    pub fn put(&mut self, row: u32, col: u32, value: CellValue) {
        self.cell_mut(row, col).value = value;
    }

    /// Get all cells with values
    pub fn all_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Get cells in a specific column
    pub fn cells_in_column(&self, col: u32) -> impl Iterator<Item = &Cell> {
        self.cells.values().filter(move |c| c.col == col)
    }

    /// The last row and last column holding content, evaluated independently
    pub fn last_data_cell(&self) -> Option<(u32, u32)> {
        let occupied: Vec<_> = self
            .cells
            .values()
            .filter(|c| !c.value.is_empty())
            .map(|c| (c.row, c.col))
            .chain(self.checkboxes.iter().copied())
            .collect();

        let max_row = occupied.iter().map(|(r, _)| *r).max()?;
        let max_col = occupied.iter().map(|(_, c)| *c).max()?;

        Some((max_row, max_col))
    }

    /// The merged range covering a cell, if any
    pub fn merge_at(&self, row: u32, col: u32) -> Option<&CellRange> {
        self.merged_cells.iter().find(|m| m.contains(row, col))
    }
}

/// Represents a single cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    pub format: CellFormat,
}

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    Formula(Formula),
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Check if the cell contains a formula
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula(_))
    }

    /// Get the parsed expression if this is a formula this crate understands
    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            CellValue::Formula(Formula::Parsed(expr)) => Some(expr),
            _ => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(d: NaiveDate) -> Self {
        CellValue::Date(d)
    }
}

/// Formula content of a cell
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// Position-independent expression tree
    Parsed(Expr),
    /// Formula text outside the supported grammar, kept verbatim with its last computed value
    Opaque { text: String, cached: Value },
}

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

impl HorizontalAlignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(HorizontalAlignment::Left),
            "center" | "centerContinuous" => Some(HorizontalAlignment::Center),
            "right" => Some(HorizontalAlignment::Right),
            _ => None,
        }
    }
}

/// Font weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

/// Visual format of a cell
///
/// `style_id` remembers the workbook style the format was read from so that
/// attributes this crate does not model (borders, font family, protection)
/// survive a copy. The remaining fields are the attributes the engine reads
/// or changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellFormat {
    pub style_id: Option<u32>,
    pub bold: bool,
    pub horizontal: Option<HorizontalAlignment>,
    /// Solid fill colour as uppercase ARGB hex (`FFFFFF00`)
    pub fill: Option<String>,
    pub num_fmt: Option<String>,
}

impl CellFormat {
    pub fn is_default(&self) -> bool {
        *self == CellFormat::default()
    }
}

/// Day zero of the 1900 date system, after the 1900 leap-year bug
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Convert a date to its spreadsheet serial number
pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - serial_epoch()).num_days() as f64
}

/// Convert a spreadsheet serial number to a date, dropping the time of day
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    serial_epoch().checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Whether a number format code displays a date
pub fn is_date_format(code: &str) -> bool {
    // Strip quoted literals and bracketed sections ([Red], [$-409]) before looking
    let mut plain = String::new();
    let mut in_quote = false;
    let mut in_bracket = false;
    for ch in code.chars() {
        match ch {
            '"' => in_quote = !in_quote,
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            _ if !in_quote && !in_bracket => plain.push(ch.to_ascii_lowercase()),
            _ => {}
        }
    }
    plain != "general" && (plain.contains('d') || plain.contains('y'))
}
