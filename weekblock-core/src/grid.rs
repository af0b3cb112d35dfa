//! Grid capability interface
//!
//! The block engine never touches storage directly. Everything it needs from
//! the host (reading cells, writing values and formulas, merging, copying
//! formats, inserting columns, attaching checkboxes) goes through
//! [`LedgerGrid`]. [`Sheet`] is the in-memory implementation that the xlsx
//! reader fills and the writer serializes.

use crate::error::{LedgerError, Result};
use crate::formula::{Expr, evaluate_cell, format_number};
use crate::reader::workbook::{
    CellFormat, CellValue, FontWeight, Formula, HorizontalAlignment, Sheet,
};
use serde::Serialize;

/// Width used by spreadsheet applications for a column nobody resized
pub const DEFAULT_COLUMN_WIDTH: f64 = 8.43;

/// A rectangle of cells, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellRange {
    pub row: u32,
    pub col: u32,
    pub rows: u32,
    pub cols: u32,
}

impl CellRange {
    pub fn new(row: u32, col: u32, rows: u32, cols: u32) -> Self {
        Self {
            row,
            col,
            rows,
            cols,
        }
    }

    pub fn cell(row: u32, col: u32) -> Self {
        Self::new(row, col, 1, 1)
    }

    /// Range spanning `row_start..=row_end` x `col_start..=col_end`
    pub fn spanning(row_start: u32, row_end: u32, col_start: u32, col_end: u32) -> Self {
        Self::new(
            row_start,
            col_start,
            (row_end + 1).saturating_sub(row_start),
            (col_end + 1).saturating_sub(col_start),
        )
    }

    pub fn end_row(&self) -> u32 {
        (self.row + self.rows).saturating_sub(1)
    }

    pub fn end_col(&self) -> u32 {
        (self.col + self.cols).saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        !self.is_empty()
            && row >= self.row
            && row <= self.end_row()
            && col >= self.col
            && col <= self.end_col()
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.row <= other.end_row()
            && other.row <= self.end_row()
            && self.col <= other.end_col()
            && other.col <= self.end_col()
    }

    /// All `(row, col)` pairs, row by row
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + use<> {
        let range = *self;
        (range.row..range.row + range.rows)
            .flat_map(move |r| (range.col..range.col + range.cols).map(move |c| (r, c)))
    }

    fn check(&self) -> Result<()> {
        if self.row == 0 || self.col == 0 || self.is_empty() {
            return Err(LedgerError::OutOfBounds {
                row: i64::from(self.row),
                col: i64::from(self.col),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for CellRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use crate::formula::column_letters;
        write!(f, "{}{}", column_letters(self.col), self.row)?;
        if self.rows > 1 || self.cols > 1 {
            write!(f, ":{}{}", column_letters(self.end_col()), self.end_row())?;
        }
        Ok(())
    }
}

/// What the engine needs from the spreadsheet that holds the ledger
pub trait LedgerGrid {
    /// Last column holding content
    fn last_column(&self) -> u32;

    /// Last row holding content
    fn last_row(&self) -> u32;

    /// Stored content of a cell (formulas are returned unevaluated)
    fn value(&self, row: u32, col: u32) -> CellValue;

    fn format(&self, row: u32, col: u32) -> CellFormat;

    fn set_value(&mut self, row: u32, col: u32, value: CellValue) -> Result<()>;

    /// Write a matrix of values; the matrix must match the range's shape
    fn set_values(&mut self, range: CellRange, values: Vec<Vec<CellValue>>) -> Result<()> {
        let shape_ok = values.len() == range.rows as usize
            && values.iter().all(|row| row.len() == range.cols as usize);
        if !shape_ok {
            return Err(LedgerError::ShapeMismatch {
                rows: range.rows,
                cols: range.cols,
            });
        }
        for (r, row) in values.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                self.set_value(range.row + r as u32, range.col + c as u32, value)?;
            }
        }
        Ok(())
    }

    /// Assign one relative template to every cell of the range
    fn set_formula_r1c1(&mut self, range: CellRange, template: &Expr) -> Result<()>;

    fn merge(&mut self, range: CellRange) -> Result<()>;

    fn set_horizontal_alignment(
        &mut self,
        range: CellRange,
        alignment: HorizontalAlignment,
    ) -> Result<()>;

    fn set_font_weight(&mut self, range: CellRange, weight: FontWeight) -> Result<()>;

    /// Copy formats (not values) from `source` onto the target rectangle,
    /// tiling the source when the target is larger
    fn copy_format_to_range(
        &mut self,
        source: CellRange,
        col_start: u32,
        col_end: u32,
        row_start: u32,
        row_end: u32,
    ) -> Result<()>;

    fn insert_columns_after(&mut self, col: u32, count: u32) -> Result<()>;

    fn delete_columns(&mut self, col: u32, count: u32) -> Result<()>;

    fn auto_resize_column(&mut self, col: u32) -> Result<()>;

    fn has_checkbox(&self, row: u32, col: u32) -> bool;

    /// Attach an unchecked checkbox; an existing checkbox keeps its state
    fn insert_checkbox(&mut self, row: u32, col: u32) -> Result<()>;

    /// Detach a checkbox and clear the cell's content
    fn remove_checkbox(&mut self, row: u32, col: u32) -> Result<()>;
}

fn check_cell(row: u32, col: u32) -> Result<()> {
    CellRange::cell(row, col).check()
}

/// Shift a column index for an insertion of `count` columns after `after`
fn shifted_right(col: u32, after: u32, count: u32) -> u32 {
    if col > after { col + count } else { col }
}

impl LedgerGrid for Sheet {
    fn last_column(&self) -> u32 {
        self.last_data_cell().map(|(_, c)| c).unwrap_or(0)
    }

    fn last_row(&self) -> u32 {
        self.last_data_cell().map(|(r, _)| r).unwrap_or(0)
    }

    fn value(&self, row: u32, col: u32) -> CellValue {
        self.get_cell(row, col)
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    fn format(&self, row: u32, col: u32) -> CellFormat {
        self.get_cell(row, col)
            .map(|c| c.format.clone())
            .unwrap_or_default()
    }

    fn set_value(&mut self, row: u32, col: u32, value: CellValue) -> Result<()> {
        check_cell(row, col)?;
        self.put(row, col, value);
        Ok(())
    }

    fn set_formula_r1c1(&mut self, range: CellRange, template: &Expr) -> Result<()> {
        range.check()?;
        for (row, col) in range.cells() {
            self.put(row, col, CellValue::Formula(Formula::Parsed(template.clone())));
        }
        Ok(())
    }

    fn merge(&mut self, range: CellRange) -> Result<()> {
        range.check()?;
        self.merged_cells.retain(|m| !m.intersects(&range));
        // Only the anchor keeps its content
        for (row, col) in range.cells().skip(1) {
            if let Some(cell) = self.cells.get_mut(&(row, col)) {
                cell.value = CellValue::Empty;
            }
        }
        if range.rows > 1 || range.cols > 1 {
            self.merged_cells.push(range);
        }
        Ok(())
    }

    fn set_horizontal_alignment(
        &mut self,
        range: CellRange,
        alignment: HorizontalAlignment,
    ) -> Result<()> {
        range.check()?;
        for (row, col) in range.cells() {
            self.cell_mut(row, col).format.horizontal = Some(alignment);
        }
        Ok(())
    }

    fn set_font_weight(&mut self, range: CellRange, weight: FontWeight) -> Result<()> {
        range.check()?;
        for (row, col) in range.cells() {
            self.cell_mut(row, col).format.bold = weight == FontWeight::Bold;
        }
        Ok(())
    }

    fn copy_format_to_range(
        &mut self,
        source: CellRange,
        col_start: u32,
        col_end: u32,
        row_start: u32,
        row_end: u32,
    ) -> Result<()> {
        source.check()?;
        let target = CellRange::spanning(row_start, row_end, col_start, col_end);
        target.check()?;

        // Snapshot first so overlapping source and target behave like a copy
        let formats: Vec<Vec<CellFormat>> = (0..source.rows)
            .map(|r| {
                (0..source.cols)
                    .map(|c| self.format(source.row + r, source.col + c))
                    .collect()
            })
            .collect();

        for (row, col) in target.cells() {
            let r = ((row - target.row) % source.rows) as usize;
            let c = ((col - target.col) % source.cols) as usize;
            let format = formats[r][c].clone();
            if format.is_default() && !self.cells.contains_key(&(row, col)) {
                continue;
            }
            self.cell_mut(row, col).format = format;
        }
        Ok(())
    }

    fn insert_columns_after(&mut self, col: u32, count: u32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.cells = std::mem::take(&mut self.cells)
            .into_values()
            .map(|mut cell| {
                cell.col = shifted_right(cell.col, col, count);
                ((cell.row, cell.col), cell)
            })
            .collect();
        for merge in &mut self.merged_cells {
            if merge.col > col {
                merge.col += count;
            } else if merge.end_col() > col {
                // Inserting inside a merge widens it
                merge.cols += count;
            }
        }
        self.checkboxes = std::mem::take(&mut self.checkboxes)
            .into_iter()
            .map(|(r, c)| (r, shifted_right(c, col, count)))
            .collect();
        self.column_widths = std::mem::take(&mut self.column_widths)
            .into_iter()
            .map(|(c, w)| (shifted_right(c, col, count), w))
            .collect();
        Ok(())
    }

    fn delete_columns(&mut self, col: u32, count: u32) -> Result<()> {
        check_cell(1, col)?;
        if count == 0 {
            return Ok(());
        }
        let end = col + count - 1;
        let shift = |c: u32| if c > end { c - count } else { c };

        self.cells = std::mem::take(&mut self.cells)
            .into_values()
            .filter(|cell| cell.col < col || cell.col > end)
            .map(|mut cell| {
                cell.col = shift(cell.col);
                ((cell.row, cell.col), cell)
            })
            .collect();

        let deleted = CellRange::new(1, col, u32::MAX - 1, count);
        self.merged_cells = std::mem::take(&mut self.merged_cells)
            .into_iter()
            .filter_map(|mut merge| {
                if merge.col > end {
                    merge.col -= count;
                    return Some(merge);
                }
                if !merge.intersects(&deleted) {
                    return Some(merge);
                }
                let overlap_start = merge.col.max(col);
                let overlap_end = merge.end_col().min(end);
                let removed = overlap_end - overlap_start + 1;
                if removed >= merge.cols {
                    return None;
                }
                merge.cols -= removed;
                if merge.col > col {
                    merge.col = col;
                }
                Some(merge).filter(|m| m.rows > 1 || m.cols > 1)
            })
            .collect();

        self.checkboxes = std::mem::take(&mut self.checkboxes)
            .into_iter()
            .filter(|(_, c)| *c < col || *c > end)
            .map(|(r, c)| (r, shift(c)))
            .collect();
        self.column_widths = std::mem::take(&mut self.column_widths)
            .into_iter()
            .filter(|(c, _)| *c < col || *c > end)
            .map(|(c, w)| (shift(c), w))
            .collect();
        Ok(())
    }

    fn auto_resize_column(&mut self, col: u32) -> Result<()> {
        check_cell(1, col)?;
        let mut rows: Vec<u32> = self.cells_in_column(col).map(|c| c.row).collect();
        rows.sort_unstable();

        let widest = rows
            .into_iter()
            .filter(|&row| {
                // Text of a multi-column merge is spread over its columns
                self.merge_at(row, col).is_none_or(|m| m.cols == 1)
            })
            .map(|row| display_text(self, row, col).chars().count())
            .max();

        match widest {
            Some(0) | None => {}
            Some(chars) => {
                let width = (chars as f64 + 2.0).max(DEFAULT_COLUMN_WIDTH);
                self.column_widths.insert(col, width);
            }
        }
        Ok(())
    }

    fn has_checkbox(&self, row: u32, col: u32) -> bool {
        self.checkboxes.contains(&(row, col))
    }

    fn insert_checkbox(&mut self, row: u32, col: u32) -> Result<()> {
        check_cell(row, col)?;
        if self.checkboxes.insert((row, col)) {
            let cell = self.cell_mut(row, col);
            if !matches!(cell.value, CellValue::Boolean(_)) {
                cell.value = CellValue::Boolean(false);
            }
        }
        Ok(())
    }

    fn remove_checkbox(&mut self, row: u32, col: u32) -> Result<()> {
        check_cell(row, col)?;
        if self.checkboxes.remove(&(row, col))
            && let Some(cell) = self.cells.get_mut(&(row, col))
        {
            cell.value = CellValue::Empty;
        }
        Ok(())
    }
}

/// Text a cell shows, used to size columns
fn display_text(sheet: &Sheet, row: u32, col: u32) -> String {
    match sheet.value(row, col) {
        CellValue::Empty => String::new(),
        CellValue::Date(d) => d.format("%-m/%-d/%Y").to_string(),
        CellValue::Number(n) => format_number(n),
        _ => evaluate_cell(sheet, row, col).to_string(),
    }
}
