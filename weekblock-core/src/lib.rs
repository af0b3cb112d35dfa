//! weekblock-core: weekly inventory ledger engine
//!
//! Appends dated four-column blocks to an inventory sheet, carrying last
//! week's counts forward through relative formulas and placing confirmation
//! checkboxes on total rows. Works on `.xlsx` workbooks through an in-memory
//! grid.

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod grid;
pub mod reader;
pub mod writer;

use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;
use tracing::debug;

pub use config::{LedgerConfig, SheetSettings};
pub use engine::{
    BlockPlan, BlockRepair, BlockSummary, ControlReport, ExpansionReport, LedgerSummary,
    MarkerClassifier, RemovedBlock, RepairReport, RowClassifier,
};
pub use error::LedgerError;
pub use grid::{CellRange, LedgerGrid};
pub use reader::{Sheet, Workbook};

/// Entry point: opens ledgers with a validated configuration
pub struct LedgerEditor {
    config: LedgerConfig,
}

impl LedgerEditor {
    /// Create an editor with the default configuration
    pub fn new() -> Self {
        Self {
            config: LedgerConfig::default(),
        }
    }

    /// Create an editor with a custom configuration
    pub fn with_config(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open the ledger sheet of a workbook; `None` selects the configured sheet
    pub fn open<P: AsRef<Path>>(&self, path: P, sheet: Option<&str>) -> Result<Ledger> {
        let settings = self.config.settings_for(sheet)?;
        let workbook = reader::read_workbook(path)?;
        Ledger::new(workbook, settings)
    }
}

impl Default for LedgerEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// One ledger sheet loaded in memory, with the settings that apply to it
pub struct Ledger {
    workbook: Workbook,
    sheet_index: usize,
    settings: SheetSettings,
    classifier: MarkerClassifier,
}

impl Ledger {
    pub fn new(workbook: Workbook, settings: SheetSettings) -> Result<Self> {
        let sheet_index = workbook
            .sheets
            .iter()
            .position(|s| s.name == settings.sheet)
            .ok_or_else(|| LedgerError::SheetNotFound(settings.sheet.clone()))?;
        let classifier = MarkerClassifier::new(&settings.total_rows)?;
        debug!(sheet = %settings.sheet, "ledger opened");
        Ok(Self {
            workbook,
            sheet_index,
            settings,
            classifier,
        })
    }

    pub fn sheet(&self) -> &Sheet {
        &self.workbook.sheets[self.sheet_index]
    }

    pub fn settings(&self) -> &SheetSettings {
        &self.settings
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Where the next block would go, without changing anything
    pub fn plan_next_block(&self, today: NaiveDate) -> Result<BlockPlan> {
        Ok(engine::plan_next_block(
            self.sheet(),
            &self.settings.layout,
            today,
        )?)
    }

    /// Append the next weekly block
    pub fn add_next_block(&mut self, today: NaiveDate) -> Result<ExpansionReport> {
        let sheet = &mut self.workbook.sheets[self.sheet_index];
        Ok(engine::append_next_block(
            sheet,
            &self.settings,
            &self.classifier,
            today,
        )?)
    }

    /// Reapply formulas and checkboxes to every block
    pub fn repair(&mut self) -> Result<RepairReport> {
        let sheet = &mut self.workbook.sheets[self.sheet_index];
        Ok(engine::repair_blocks(
            sheet,
            &self.settings.layout,
            &self.classifier,
        )?)
    }

    /// Remove the most recent block
    pub fn undo_last_block(&mut self) -> Result<RemovedBlock> {
        let sheet = &mut self.workbook.sheets[self.sheet_index];
        Ok(engine::remove_last_block(sheet, &self.settings.layout)?)
    }

    pub fn inspect(&self) -> LedgerSummary {
        engine::summarize_ledger(self.sheet(), &self.settings.layout)
    }

    /// Write the workbook to `output`, which may be the file it was read from
    pub fn save<P: AsRef<Path>>(&self, output: P) -> Result<()> {
        writer::write_ledger_sheet(
            &self.workbook.path,
            output.as_ref(),
            &self.workbook,
            &self.settings.sheet,
        )
    }
}
