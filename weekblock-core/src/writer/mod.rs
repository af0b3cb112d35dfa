//! Writing edited ledgers back into xlsx packages

pub mod sheet_xml;
pub mod xlsx_writer;

pub use sheet_xml::{DATE_NUM_FMT, render_sheet_xml};
pub use xlsx_writer::write_ledger_sheet;
