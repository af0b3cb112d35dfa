//! Removes the most recent block

use super::header_date;
use super::layout::{BLOCK_WIDTH, BlockLayout};
use crate::error::{LedgerError, Result};
use crate::grid::LedgerGrid;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedBlock {
    pub start: u32,
    pub end: u32,
    pub date: Option<NaiveDate>,
}

/// Delete the rightmost block with its merges, checkboxes and widths
///
/// The only block of a ledger is never removed, since the next expansion
/// needs it as a template.
pub fn remove_last_block(grid: &mut dyn LedgerGrid, layout: &BlockLayout) -> Result<RemovedBlock> {
    let start = layout.last_block_start(grid.last_column())?;
    let end = start + BLOCK_WIDTH - 1;
    if start == layout.first_block_start() {
        return Err(LedgerError::LastRemainingBlock { start, end });
    }

    let date = header_date(&*grid, layout.header_date_row, start);
    grid.delete_columns(start, BLOCK_WIDTH)?;

    info!(start, end, date = ?date, "week block removed");
    Ok(RemovedBlock { start, end, date })
}
