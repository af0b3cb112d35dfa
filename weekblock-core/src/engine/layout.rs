//! Ledger geometry: where blocks start and what each sub-column holds

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Columns per block
pub const BLOCK_WIDTH: u32 = 4;

/// Days between two consecutive blocks
pub const CADENCE_DAYS: i64 = 7;

/// Role of a column inside a block, by offset from the block start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubColumn {
    /// Planned count carried from the previous block
    Planned,
    Actual,
    /// Actual minus planned
    Delta,
    /// Confirmation checkbox on total rows
    Confirmed,
}

impl SubColumn {
    pub const ALL: [SubColumn; BLOCK_WIDTH as usize] = [
        SubColumn::Planned,
        SubColumn::Actual,
        SubColumn::Delta,
        SubColumn::Confirmed,
    ];

    pub fn offset(self) -> u32 {
        match self {
            SubColumn::Planned => 0,
            SubColumn::Actual => 1,
            SubColumn::Delta => 2,
            SubColumn::Confirmed => 3,
        }
    }
}

/// Rows and columns that frame the blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockLayout {
    pub header_date_row: u32,
    pub header_label_row: u32,
    pub first_data_row: u32,
    /// Leading item columns that never belong to a block
    pub meta_columns: u32,
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self {
            header_date_row: 1,
            header_label_row: 2,
            first_data_row: 3,
            meta_columns: 4,
        }
    }
}

impl BlockLayout {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LedgerError::InvalidConfig(msg));
        if self.header_date_row == 0 || self.header_label_row == 0 {
            return invalid("header rows are 1-based and must be at least 1".to_string());
        }
        if self.header_date_row == self.header_label_row {
            return invalid(format!(
                "header_date_row and header_label_row are both {}",
                self.header_date_row
            ));
        }
        if self.first_data_row <= self.header_date_row.max(self.header_label_row) {
            return invalid(format!(
                "first_data_row ({}) must come after the header rows",
                self.first_data_row
            ));
        }
        if self.meta_columns == 0 {
            return invalid("meta_columns must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn first_block_start(&self) -> u32 {
        self.meta_columns + 1
    }

    /// Start column of the rightmost complete block
    ///
    /// Trailing columns that do not make up a whole block are rejected
    /// instead of being silently folded into the last block.
    pub fn last_block_start(&self, last_column: u32) -> Result<u32> {
        let required = self.meta_columns + BLOCK_WIDTH;
        if last_column < required {
            return Err(LedgerError::NoCompleteBlock {
                last_column,
                required,
            });
        }
        let trailing = (last_column - self.meta_columns) % BLOCK_WIDTH;
        if trailing != 0 {
            return Err(LedgerError::MisalignedBlocks {
                first: last_column - trailing + 1,
                last: last_column,
            });
        }
        Ok(last_column - trailing - (BLOCK_WIDTH - 1))
    }

    /// Start columns of every block, left to right
    pub fn block_starts(&self, last_column: u32) -> Result<Vec<u32>> {
        let last = self.last_block_start(last_column)?;
        Ok((self.first_block_start()..=last)
            .step_by(BLOCK_WIDTH as usize)
            .collect())
    }

    pub fn column(&self, block_start: u32, role: SubColumn) -> u32 {
        block_start + role.offset()
    }

    /// Inclusive data row span, `None` when the ledger has no data rows
    pub fn data_rows(&self, last_row: u32) -> Option<(u32, u32)> {
        (last_row >= self.first_data_row).then_some((self.first_data_row, last_row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_block_start() {
        let layout = BlockLayout::default();
        assert_eq!(layout.last_block_start(8).unwrap(), 5);
        assert_eq!(layout.last_block_start(12).unwrap(), 9);
        assert_eq!(layout.last_block_start(40).unwrap(), 37);
    }

    #[test]
    fn test_incomplete_and_misaligned() {
        let layout = BlockLayout::default();
        assert_eq!(
            layout.last_block_start(6),
            Err(LedgerError::NoCompleteBlock {
                last_column: 6,
                required: 8
            })
        );
        assert_eq!(
            layout.last_block_start(10),
            Err(LedgerError::MisalignedBlocks { first: 9, last: 10 })
        );
    }

    #[test]
    fn test_block_starts_follow_alignment() {
        let layout = BlockLayout {
            meta_columns: 2,
            ..Default::default()
        };
        assert_eq!(layout.block_starts(14).unwrap(), vec![3, 7, 11]);
        for start in layout.block_starts(14).unwrap() {
            assert_eq!((start - layout.meta_columns - 1) % BLOCK_WIDTH, 0);
        }
        assert_eq!(layout.column(7, SubColumn::Delta), 9);
        let columns: Vec<u32> = SubColumn::ALL.iter().map(|r| layout.column(7, *r)).collect();
        assert_eq!(columns, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_data_rows() {
        let layout = BlockLayout::default();
        assert_eq!(layout.data_rows(5), Some((3, 5)));
        assert_eq!(layout.data_rows(2), None);
    }

    #[test]
    fn test_validate() {
        assert!(BlockLayout::default().validate().is_ok());
        let bad = BlockLayout {
            first_data_row: 2,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = BlockLayout {
            header_label_row: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
