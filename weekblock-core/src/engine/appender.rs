//! Appends the next weekly block to the ledger

use super::classifier::{ControlReport, RowClassifier, apply_controls};
use super::header_date;
use super::layout::{BLOCK_WIDTH, BlockLayout, CADENCE_DAYS, SubColumn};
use super::templates;
use crate::config::SheetSettings;
use crate::error::Result;
use crate::grid::{CellRange, LedgerGrid};
use crate::reader::workbook::{CellValue, FontWeight, HorizontalAlignment};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Where the next block goes and what it is dated
///
/// Built from reads only, so a plan that cannot be made leaves the grid
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockPlan {
    pub previous_start: u32,
    pub start: u32,
    pub end: u32,
    /// Header date of the previous block, when it holds a valid one
    pub previous_date: Option<NaiveDate>,
    pub date: NaiveDate,
    /// The date was derived from today because the previous one was unusable
    pub date_fallback: bool,
    /// Inclusive data row span, `None` for a header-only ledger
    pub data_rows: Option<(u32, u32)>,
}

/// What an expansion did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionReport {
    pub plan: BlockPlan,
    pub controls: Option<ControlReport>,
    /// Confirmation shown to the user
    pub message: String,
}

/// Compute the next block from the grid's current geometry
pub fn plan_next_block(
    grid: &dyn LedgerGrid,
    layout: &BlockLayout,
    today: NaiveDate,
) -> Result<BlockPlan> {
    let last_column = grid.last_column();
    let previous_start = layout.last_block_start(last_column)?;
    let start = previous_start + BLOCK_WIDTH;

    let previous_date = header_date(grid, layout.header_date_row, previous_start);
    let next = previous_date.and_then(|d| d.checked_add_signed(Duration::days(CADENCE_DAYS)));
    let (date, date_fallback) = match next {
        Some(date) => (date, false),
        None => {
            warn!(
                column = previous_start,
                %today,
                "previous block has no usable header date, counting from today"
            );
            (
                today
                    .checked_add_signed(Duration::days(CADENCE_DAYS))
                    .unwrap_or(today),
                true,
            )
        }
    };

    let plan = BlockPlan {
        previous_start,
        start,
        end: start + BLOCK_WIDTH - 1,
        previous_date,
        date,
        date_fallback,
        data_rows: layout.data_rows(grid.last_row()),
    };
    debug!(?plan, "planned next block");
    Ok(plan)
}

/// Write a planned block into the grid
pub fn apply_block_plan(
    grid: &mut dyn LedgerGrid,
    plan: &BlockPlan,
    settings: &SheetSettings,
    classifier: &dyn RowClassifier,
) -> Result<ExpansionReport> {
    let layout = &settings.layout;
    let date_row = layout.header_date_row;
    let label_row = layout.header_label_row;

    grid.insert_columns_after(plan.previous_start + BLOCK_WIDTH - 1, BLOCK_WIDTH)?;

    // Date header: copied formats first so centring and bold survive them
    let header = CellRange::new(date_row, plan.start, 1, BLOCK_WIDTH);
    grid.set_value(date_row, plan.start, CellValue::Date(plan.date))?;
    grid.copy_format_to_range(
        CellRange::new(date_row, plan.previous_start, 1, BLOCK_WIDTH),
        plan.start,
        plan.end,
        date_row,
        date_row,
    )?;
    grid.merge(header)?;
    grid.set_horizontal_alignment(header, HorizontalAlignment::Center)?;
    grid.set_font_weight(header, FontWeight::Bold)?;

    let labels = settings
        .labels
        .iter()
        .map(|label| CellValue::Text(label.clone()))
        .collect();
    grid.set_values(CellRange::new(label_row, plan.start, 1, BLOCK_WIDTH), vec![labels])?;
    grid.copy_format_to_range(
        CellRange::new(label_row, plan.previous_start, 1, BLOCK_WIDTH),
        plan.start,
        plan.end,
        label_row,
        label_row,
    )?;
    debug!(start = plan.start, date = %plan.date, "block header written");

    let controls = match plan.data_rows {
        Some((first, last)) => {
            let rows = last - first + 1;
            grid.copy_format_to_range(
                CellRange::new(first, plan.previous_start, rows, BLOCK_WIDTH),
                plan.start,
                plan.end,
                first,
                last,
            )?;
            grid.set_formula_r1c1(
                CellRange::new(first, layout.column(plan.start, SubColumn::Planned), rows, 1),
                &templates::planned_count(),
            )?;
            grid.set_formula_r1c1(
                CellRange::new(first, layout.column(plan.start, SubColumn::Delta), rows, 1),
                &templates::delta(),
            )?;
            Some(apply_controls(
                grid,
                classifier,
                layout.column(plan.start, SubColumn::Confirmed),
                first,
                last,
            )?)
        }
        None => {
            debug!("no data rows, block is header only");
            None
        }
    };

    for col in plan.start..=plan.end {
        grid.auto_resize_column(col)?;
    }

    let message = format!(
        "New week block added for {}!\n\nReady for Monday inventory count.",
        settings.format_date(plan.date)
    );
    info!(
        start = plan.start,
        end = plan.end,
        date = %plan.date,
        fallback = plan.date_fallback,
        "week block added"
    );

    Ok(ExpansionReport {
        plan: plan.clone(),
        controls,
        message,
    })
}

/// Plan and write the next block in one step
pub fn append_next_block(
    grid: &mut dyn LedgerGrid,
    settings: &SheetSettings,
    classifier: &dyn RowClassifier,
    today: NaiveDate,
) -> Result<ExpansionReport> {
    let plan = plan_next_block(&*grid, &settings.layout, today)?;
    apply_block_plan(grid, &plan, settings, classifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MarkerClassifier;
    use crate::error::LedgerError;
    use crate::formula::{Value, evaluate_cell};
    use crate::reader::workbook::Sheet;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn one_block_ledger() -> Sheet {
        let settings = SheetSettings::default();
        let mut sheet = Sheet::new("MView".into());
        for (i, label) in ["ITEM", "MOQ", "OH", "UNIT"].into_iter().enumerate() {
            sheet.put(2, i as u32 + 1, label.into());
        }
        sheet.put(1, 5, date(2024, 1, 1).into());
        sheet.merged_cells.push(CellRange::new(1, 5, 1, 4));
        for (i, label) in settings.labels.iter().enumerate() {
            sheet.put(2, 5 + i as u32, label.as_str().into());
        }
        sheet.put(3, 1, "Flour".into());
        sheet.put(4, 1, "Sugar".into());
        sheet.put(5, 1, "TOTAL".into());
        sheet.put(3, 5, 4.0.into());
        sheet.put(3, 6, 5.0.into());
        sheet
    }

    fn add(sheet: &mut Sheet) -> ExpansionReport {
        let settings = SheetSettings::default();
        let classifier = MarkerClassifier::new(&settings.total_rows).unwrap();
        append_next_block(sheet, &settings, &classifier, date(2030, 6, 1)).unwrap()
    }

    #[test]
    fn test_plan_is_pure() {
        let sheet = one_block_ledger();
        let before = sheet.clone();
        let plan = plan_next_block(&sheet, &BlockLayout::default(), date(2030, 6, 1)).unwrap();
        assert_eq!(plan.previous_start, 5);
        assert_eq!((plan.start, plan.end), (9, 12));
        assert_eq!(plan.date, date(2024, 1, 8));
        assert!(!plan.date_fallback);
        assert_eq!(plan.data_rows, Some((3, 5)));
        assert_eq!(sheet.cells, before.cells);
    }

    #[test]
    fn test_append_writes_header_and_formulas() {
        let mut sheet = one_block_ledger();
        let report = add(&mut sheet);

        assert_eq!(sheet.last_column(), 12);
        assert_eq!(sheet.value(1, 9), CellValue::Date(date(2024, 1, 8)));
        assert!(sheet.merged_cells.contains(&CellRange::new(1, 9, 1, 4)));
        assert!(sheet.format(1, 9).bold);
        assert_eq!(sheet.format(1, 12).horizontal, Some(HorizontalAlignment::Center));
        assert_eq!(sheet.value(2, 10), CellValue::from("ACTUAL COUNT"));

        assert_eq!(evaluate_cell(&sheet, 3, 9), Value::Number(5.0));
        assert_eq!(evaluate_cell(&sheet, 3, 11), Value::Text(String::new()));
        assert!(sheet.has_checkbox(5, 12));
        assert!(!sheet.has_checkbox(3, 12));
        assert_eq!(
            report.message,
            "New week block added for 1/8/2024!\n\nReady for Monday inventory count."
        );
    }

    #[test]
    fn test_previous_block_is_untouched() {
        let mut sheet = one_block_ledger();
        let before: Vec<_> = sheet
            .all_cells()
            .filter(|c| c.col <= 8)
            .map(|c| ((c.row, c.col), c.clone()))
            .collect();
        add(&mut sheet);
        sheet.put(3, 10, 7.0.into());
        let second_block: Vec<_> = sheet
            .all_cells()
            .filter(|c| (9..=12).contains(&c.col))
            .map(|c| ((c.row, c.col), c.clone()))
            .collect();
        add(&mut sheet);
        sheet.put(3, 14, 9.0.into());
        add(&mut sheet);

        assert_eq!(sheet.last_column(), 20);
        for (pos, cell) in before.into_iter().chain(second_block) {
            assert_eq!(sheet.cells.get(&pos), Some(&cell));
        }
        assert_eq!(
            sheet.checkboxes.iter().copied().collect::<Vec<_>>(),
            vec![(5, 12), (5, 16), (5, 20)]
        );
        assert_eq!(evaluate_cell(&sheet, 3, 17), Value::Number(9.0));
    }

    #[test]
    fn test_bad_previous_date_falls_back_to_today() {
        let mut sheet = one_block_ledger();
        sheet.put(1, 5, "week one".into());
        let report = add(&mut sheet);
        assert!(report.plan.date_fallback);
        assert_eq!(report.plan.previous_date, None);
        assert_eq!(report.plan.date, date(2030, 6, 8));
    }

    #[test]
    fn test_header_only_ledger() {
        let mut sheet = one_block_ledger();
        for row in 3..=5 {
            for col in 1..=6 {
                sheet.cells.remove(&(row, col));
            }
        }
        let report = add(&mut sheet);
        assert_eq!(report.plan.data_rows, None);
        assert!(report.controls.is_none());
        assert_eq!(sheet.value(2, 12), CellValue::from("Updated Actual Count in MBO?"));
        assert!(sheet.value(3, 9).is_empty());
    }

    #[test]
    fn test_misaligned_ledger_is_rejected_before_writing() {
        let mut sheet = one_block_ledger();
        sheet.put(2, 9, "stray".into());
        let before = sheet.clone();
        let settings = SheetSettings::default();
        let classifier = MarkerClassifier::new(&settings.total_rows).unwrap();
        let err = append_next_block(&mut sheet, &settings, &classifier, date(2030, 6, 1));
        assert_eq!(err.unwrap_err(), LedgerError::MisalignedBlocks { first: 9, last: 9 });
        assert_eq!(sheet.cells, before.cells);
    }

    #[test]
    fn test_consecutive_blocks_stay_weekly() {
        let mut sheet = one_block_ledger();
        add(&mut sheet);
        sheet.put(3, 10, 12.0.into());
        let report = add(&mut sheet);
        assert_eq!((report.plan.start, report.plan.end), (13, 16));
        assert_eq!(report.plan.date, date(2024, 1, 15));
        assert_eq!(evaluate_cell(&sheet, 3, 13), Value::Number(12.0));
    }
}
