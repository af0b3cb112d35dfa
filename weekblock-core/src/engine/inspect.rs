//! Read-only view of a ledger's blocks

use super::header_date;
use super::layout::{BLOCK_WIDTH, BlockLayout, SubColumn};
use crate::grid::LedgerGrid;
use crate::reader::workbook::CellValue;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub start: u32,
    pub end: u32,
    pub date: Option<NaiveDate>,
    /// Checkboxes in the confirmation column
    pub controls: usize,
    /// Of those, how many are ticked
    pub checked: usize,
    /// Data rows with an actual count entered
    pub counted_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub last_column: u32,
    pub last_row: u32,
    pub data_rows: Option<(u32, u32)>,
    pub blocks: Vec<BlockSummary>,
    /// Columns past the last complete block, if any
    pub trailing_columns: Option<(u32, u32)>,
}

impl LedgerSummary {
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.blocks.last().and_then(|b| b.date)
    }

    pub fn is_aligned(&self) -> bool {
        self.trailing_columns.is_none()
    }
}

/// Describe every complete block without modifying anything
///
/// Unlike the mutating operations this never fails: a misaligned ledger is
/// reported through `trailing_columns` so it can be diagnosed.
pub fn summarize_ledger(grid: &dyn LedgerGrid, layout: &BlockLayout) -> LedgerSummary {
    let last_column = grid.last_column();
    let last_row = grid.last_row();
    let data_rows = layout.data_rows(last_row);

    let first_start = layout.first_block_start();
    let block_columns = last_column.saturating_sub(layout.meta_columns);
    let complete = block_columns / BLOCK_WIDTH;
    let trailing = block_columns % BLOCK_WIDTH;

    let blocks = (0..complete)
        .map(|i| {
            let start = first_start + i * BLOCK_WIDTH;
            summarize_block(grid, layout, start, data_rows)
        })
        .collect();

    LedgerSummary {
        last_column,
        last_row,
        data_rows,
        blocks,
        trailing_columns: (trailing > 0).then(|| (last_column - trailing + 1, last_column)),
    }
}

fn summarize_block(
    grid: &dyn LedgerGrid,
    layout: &BlockLayout,
    start: u32,
    data_rows: Option<(u32, u32)>,
) -> BlockSummary {
    let mut summary = BlockSummary {
        start,
        end: start + BLOCK_WIDTH - 1,
        date: header_date(grid, layout.header_date_row, start),
        controls: 0,
        checked: 0,
        counted_rows: 0,
    };
    let Some((first, last)) = data_rows else {
        return summary;
    };

    let confirmed = layout.column(start, SubColumn::Confirmed);
    let actual = layout.column(start, SubColumn::Actual);
    for row in first..=last {
        if grid.has_checkbox(row, confirmed) {
            summary.controls += 1;
            if grid.value(row, confirmed) == CellValue::Boolean(true) {
                summary.checked += 1;
            }
        }
        if !grid.value(row, actual).is_empty() {
            summary.counted_rows += 1;
        }
    }
    summary
}
