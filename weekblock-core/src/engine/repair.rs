//! Rewrites formulas and checkboxes of every block

use super::classifier::{ControlReport, RowClassifier, apply_controls};
use super::layout::{BlockLayout, SubColumn};
use super::templates;
use crate::error::Result;
use crate::grid::{CellRange, LedgerGrid};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRepair {
    pub start: u32,
    pub controls: ControlReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    pub data_rows: Option<(u32, u32)>,
    pub blocks: Vec<BlockRepair>,
}

/// Reapply the planned count, delta and checkbox rules to every block
///
/// Useful after rows were inserted or after hand edits. Each block is
/// rebuilt from its own offsets, so running it repeatedly changes nothing.
pub fn repair_blocks(
    grid: &mut dyn LedgerGrid,
    layout: &BlockLayout,
    classifier: &dyn RowClassifier,
) -> Result<RepairReport> {
    let starts = layout.block_starts(grid.last_column())?;
    let mut report = RepairReport {
        data_rows: layout.data_rows(grid.last_row()),
        blocks: Vec::new(),
    };
    let Some((first, last)) = report.data_rows else {
        info!(blocks = starts.len(), "no data rows to repair");
        return Ok(report);
    };
    let rows = last - first + 1;

    // The first block is included: its planned count reads the metadata
    // columns just like every later block reads its predecessor
    for start in starts {
        grid.set_formula_r1c1(
            CellRange::new(first, layout.column(start, SubColumn::Planned), rows, 1),
            &templates::planned_count(),
        )?;
        grid.set_formula_r1c1(
            CellRange::new(first, layout.column(start, SubColumn::Delta), rows, 1),
            &templates::delta(),
        )?;
        let controls = apply_controls(
            grid,
            classifier,
            layout.column(start, SubColumn::Confirmed),
            first,
            last,
        )?;
        report.blocks.push(BlockRepair { start, controls });
    }

    info!(blocks = report.blocks.len(), first, last, "blocks repaired");
    Ok(report)
}
