//! Error types for ledger operations

use thiserror::Error;

/// Errors raised by the grid and the block engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// A range reached outside the addressable grid (row or column 0)
    #[error("range out of bounds at row {row}, column {col}")]
    OutOfBounds { row: i64, col: i64 },

    /// The grid has no complete block after the metadata columns
    #[error(
        "no complete block found: last column is {last_column}, expected at least {required}"
    )]
    NoCompleteBlock { last_column: u32, required: u32 },

    /// Trailing columns do not form a whole block
    #[error(
        "columns {first}..={last} do not form a complete block; remove them or run undo before expanding"
    )]
    MisalignedBlocks { first: u32, last: u32 },

    /// Undo was asked to remove the only block in the ledger
    #[error("refusing to remove the only block (columns {start}..={end})")]
    LastRemainingBlock { start: u32, end: u32 },

    /// A formula could not be parsed
    #[error("formula parse error at {position}: {message}")]
    FormulaParse { message: String, position: usize },

    /// A relative reference resolved before row 1 or column 1
    #[error("reference resolves outside the sheet from row {row}, column {col}")]
    ReferenceOutOfSheet { row: u32, col: u32 },

    /// A set_values matrix did not match the target range
    #[error("expected a {rows}x{cols} matrix of values")]
    ShapeMismatch { rows: u32, cols: u32 },

    /// The configured sheet does not exist
    #[error("sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    /// The configuration is inconsistent
    #[error("configuration error: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
