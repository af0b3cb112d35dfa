//! Weekly block engine
//!
//! Blocks are located from the grid's geometry alone; nothing outside the
//! ledger records how many blocks exist or which date comes next.

pub mod appender;
pub mod classifier;
pub mod inspect;
pub mod layout;
pub mod repair;
pub mod templates;
pub mod undo;

pub use appender::{BlockPlan, ExpansionReport, append_next_block, apply_block_plan, plan_next_block};
pub use classifier::{ControlReport, MarkerClassifier, RowClassifier, apply_controls};
pub use inspect::{BlockSummary, LedgerSummary, summarize_ledger};
pub use layout::{BLOCK_WIDTH, BlockLayout, CADENCE_DAYS, SubColumn};
pub use repair::{BlockRepair, RepairReport, repair_blocks};
pub use undo::{RemovedBlock, remove_last_block};

use crate::formula::evaluate_cell;
use crate::grid::LedgerGrid;
use crate::reader::workbook::{CellValue, serial_to_date};
use chrono::NaiveDate;

/// Text layouts accepted for a header date typed as text
const TEXT_DATE_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

/// Date in the header of the block starting at `start`, if it holds one
pub(crate) fn header_date(grid: &dyn LedgerGrid, row: u32, start: u32) -> Option<NaiveDate> {
    match grid.value(row, start) {
        CellValue::Date(date) => Some(date),
        CellValue::Text(text) => TEXT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text.trim(), fmt).ok()),
        // A header computed from the previous one (`=E1+7`) evaluates to a serial
        CellValue::Formula(_) => evaluate_cell(grid, row, start)
            .as_number()
            .and_then(serial_to_date),
        _ => None,
    }
}
