//! Total row detection and checkbox placement

use crate::config::{TotalRowConfig, normalize_color};
use crate::error::{LedgerError, Result};
use crate::formula::evaluate_cell;
use crate::grid::LedgerGrid;
use crate::reader::workbook::CellValue;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::debug;

/// Decides whether a row is a total row
pub trait RowClassifier {
    fn is_total_row(&self, grid: &dyn LedgerGrid, row: u32) -> bool;
}

impl<F> RowClassifier for F
where
    F: Fn(&dyn LedgerGrid, u32) -> bool,
{
    fn is_total_row(&self, grid: &dyn LedgerGrid, row: u32) -> bool {
        self(grid, row)
    }
}

/// Recognises total rows by the fill or the text of their label cell
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    label_columns: Vec<u32>,
    pattern: Regex,
    fills: Vec<String>,
}

impl MarkerClassifier {
    pub fn new(config: &TotalRowConfig) -> Result<Self> {
        let pattern = RegexBuilder::new(&config.label_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| LedgerError::InvalidConfig(format!("invalid label_pattern: {}", e)))?;
        let fills = config
            .fills
            .iter()
            .map(|fill| {
                normalize_color(fill)
                    .ok_or_else(|| LedgerError::InvalidConfig(format!("invalid fill colour '{}'", fill)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            label_columns: config.label_columns.clone(),
            pattern,
            fills,
        })
    }

    fn label_text(grid: &dyn LedgerGrid, row: u32, col: u32) -> Option<String> {
        match grid.value(row, col) {
            CellValue::Text(text) => Some(text),
            CellValue::Formula(_) => Some(evaluate_cell(grid, row, col).to_string()),
            _ => None,
        }
    }
}

impl RowClassifier for MarkerClassifier {
    fn is_total_row(&self, grid: &dyn LedgerGrid, row: u32) -> bool {
        self.label_columns.iter().any(|&col| {
            let filled = grid
                .format(row, col)
                .fill
                .is_some_and(|fill| self.fills.contains(&fill));
            filled
                || Self::label_text(grid, row, col).is_some_and(|text| self.pattern.is_match(&text))
        })
    }
}

/// Outcome of a checkbox pass over one column
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlReport {
    pub column: u32,
    /// Rows classified as totals
    pub total_rows: Vec<u32>,
    /// Rows that received a new checkbox
    pub added: Vec<u32>,
    /// Item rows that lost a stray checkbox
    pub removed: Vec<u32>,
}

/// Make checkboxes in `column` match the total rows of `first_row..=last_row`
///
/// Total rows get an unchecked checkbox unless they already carry one, which
/// keeps its state. Other rows lose any checkbox. Running it twice changes
/// nothing the second time.
pub fn apply_controls(
    grid: &mut dyn LedgerGrid,
    classifier: &dyn RowClassifier,
    column: u32,
    first_row: u32,
    last_row: u32,
) -> Result<ControlReport> {
    let mut report = ControlReport {
        column,
        ..Default::default()
    };

    for row in first_row..=last_row {
        let is_total = classifier.is_total_row(&*grid, row);
        let has_checkbox = grid.has_checkbox(row, column);
        if is_total {
            report.total_rows.push(row);
            if !has_checkbox {
                grid.insert_checkbox(row, column)?;
                report.added.push(row);
            }
        } else if has_checkbox {
            grid.remove_checkbox(row, column)?;
            report.removed.push(row);
        }
    }

    debug!(
        column,
        totals = report.total_rows.len(),
        added = report.added.len(),
        removed = report.removed.len(),
        "controls applied"
    );
    Ok(report)
}
