//! Output formatters for ledger operations

use anyhow::Result;
use colored::*;
use serde::Serialize;
use std::path::Path;
use weekblock_core::engine::BLOCK_WIDTH;
use weekblock_core::formula::column_letters;
use weekblock_core::{
    BlockPlan, ControlReport, ExpansionReport, LedgerSummary, RemovedBlock, RepairReport,
    SheetSettings,
};

fn columns(start: u32, end: u32) -> String {
    format!("{}:{}", column_letters(start), column_letters(end))
}

fn header(file_path: &Path) {
    println!("{}", format!("Ledger: {}", file_path.display()).bold());
    println!();
}

fn print_controls(controls: &ControlReport, indent: usize) {
    let indent_str = "  ".repeat(indent);
    println!(
        "{}{} {} total rows, {} added, {} removed",
        indent_str,
        "Checkboxes:".bold(),
        controls.total_rows.len(),
        controls.added.len().to_string().green(),
        controls.removed.len().to_string().red()
    );
}

/// Print the block a dry run would add
pub fn print_plan(file_path: &Path, settings: &SheetSettings, plan: &BlockPlan) {
    header(file_path);
    println!(
        "{} columns {} dated {}",
        "Would add".cyan().bold(),
        columns(plan.start, plan.end).yellow(),
        settings.format_date(plan.date)
    );
    if plan.date_fallback {
        println!(
            "  {} previous header has no usable date, counting from today",
            "WARN".yellow().bold()
        );
    }
    match plan.data_rows {
        Some((first, last)) => println!("  {} {}..={}", "Data rows:".bold(), first, last),
        None => println!("  {} none, header only", "Data rows:".bold()),
    }
}

/// Print the result of adding a block
pub fn print_expansion(file_path: &Path, settings: &SheetSettings, report: &ExpansionReport) {
    header(file_path);
    println!("{}", report.message.green().bold());
    println!();

    let plan = &report.plan;
    println!(
        "  {} {} in sheet {}",
        "Columns:".bold(),
        columns(plan.start, plan.end).yellow(),
        settings.sheet.cyan()
    );
    if plan.date_fallback {
        println!(
            "  {} {} (previous header had no usable date)",
            "Date:".bold(),
            settings.format_date(plan.date).yellow()
        );
    }
    if let Some(controls) = &report.controls {
        print_controls(controls, 1);
    }
}

/// Print the result of a repair
pub fn print_repair(file_path: &Path, report: &RepairReport) {
    header(file_path);
    if report.blocks.is_empty() {
        println!("{}", "No data rows to repair".yellow());
        return;
    }

    for block in &report.blocks {
        println!(
            "{} {}",
            "Block:".bold(),
            columns(block.start, block.start + BLOCK_WIDTH - 1).yellow()
        );
        print_controls(&block.controls, 1);
    }
    println!();
    println!(
        "{}",
        format!("✓ Repaired {} blocks", report.blocks.len())
            .green()
            .bold()
    );
}

/// Print the block removed by an undo
pub fn print_undo(file_path: &Path, settings: &SheetSettings, removed: &RemovedBlock) {
    header(file_path);
    let date = removed
        .date
        .map(|d| settings.format_date(d))
        .unwrap_or_else(|| "no date".to_string());
    println!(
        "{} block {} ({})",
        "Removed".green().bold(),
        columns(removed.start, removed.end).yellow(),
        date
    );
}

/// Print the blocks of a ledger
pub fn print_summary(file_path: &Path, settings: &SheetSettings, summary: &LedgerSummary) {
    header(file_path);
    println!("{} {}", "Sheet:".bold(), settings.sheet.cyan().bold());

    for block in &summary.blocks {
        let date = match block.date {
            Some(d) => settings.format_date(d).normal(),
            None => "no date".red(),
        };
        println!(
            "  {} {}  checked {}/{}  counted rows {}",
            columns(block.start, block.end).yellow(),
            date,
            block.checked,
            block.controls,
            block.counted_rows
        );
    }
    if let Some((first, last)) = summary.trailing_columns {
        println!(
            "  {} columns {} do not form a complete block",
            "ERROR".red().bold(),
            columns(first, last)
        );
    }

    println!();
    println!("{}", "Summary:".bold().underline());
    println!("  {} {}", "Blocks:".bold(), summary.blocks.len());
    match summary.data_rows {
        Some((first, last)) => println!("  {} {}", "Data rows:".bold(), last - first + 1),
        None => println!("  {} 0", "Data rows:".bold()),
    }
    if let Some(date) = summary.latest_date() {
        println!("  {} {}", "Latest week:".bold(), settings.format_date(date));
    }
}

/// Print any report in JSON format
pub fn print_json<T: Serialize>(
    command: &str,
    file_path: &Path,
    settings: &SheetSettings,
    report: &T,
) -> Result<()> {
    let output = serde_json::json!({
        "command": command,
        "file": file_path.display().to_string(),
        "sheet": settings.sheet,
        "result": report,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
