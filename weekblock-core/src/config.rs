//! Configuration for the ledger engine
//!
//! Values in `[global]` apply to every sheet; a `[sheets.<name>]` table
//! overrides them field by field for that sheet.

use crate::engine::layout::BlockLayout;
use crate::error::LedgerError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use chrono::format::{Item, StrftimeItems};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "weekblock.toml";

/// Display format of header dates (`1/8/2024`)
pub const DEFAULT_DATE_FORMAT: &str = "%-m/%-d/%Y";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub sheets: HashMap<String, SheetConfig>,
}

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Sheet holding the ledger
    pub sheet: String,
    pub date_format: String,
    /// Sub-column labels written in the label row of each new block
    pub labels: Vec<String>,
    pub layout: BlockLayout,
    pub total_rows: TotalRowConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            sheet: "MView".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            labels: default_labels(),
            layout: BlockLayout::default(),
            total_rows: TotalRowConfig::default(),
        }
    }
}

const DEFAULT_LABELS: [&str; 4] = [
    "MBO COUNT",
    "ACTUAL COUNT",
    "+/- (gains or losses)",
    "Updated Actual Count in MBO?",
];

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.map(String::from).to_vec()
}

/// How total rows are recognised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalRowConfig {
    /// Columns holding the row label
    pub label_columns: Vec<u32>,
    /// Case-insensitive pattern searched in the label text
    pub label_pattern: String,
    /// Label cell fills (`#RRGGBB` or `AARRGGBB`) that mark a total row
    pub fills: Vec<String>,
}

impl Default for TotalRowConfig {
    fn default() -> Self {
        Self {
            label_columns: vec![1],
            label_pattern: "TOTAL".to_string(),
            fills: vec!["#FFFF00".to_string()],
        }
    }
}

/// Sheet-specific overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetConfig {
    pub date_format: Option<String>,
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub layout: LayoutOverride,
    #[serde(default)]
    pub total_rows: TotalRowOverride,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutOverride {
    pub header_date_row: Option<u32>,
    pub header_label_row: Option<u32>,
    pub first_data_row: Option<u32>,
    pub meta_columns: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalRowOverride {
    pub label_columns: Option<Vec<u32>>,
    pub label_pattern: Option<String>,
    pub fills: Option<Vec<String>>,
}

/// Settings in effect for one sheet after applying overrides
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSettings {
    pub sheet: String,
    pub date_format: String,
    pub labels: [String; 4],
    pub layout: BlockLayout,
    pub total_rows: TotalRowConfig,
}

impl SheetSettings {
    /// Format a header date for messages
    pub fn format_date(&self, date: NaiveDate) -> String {
        format_date(date, &self.date_format)
    }
}

impl Default for SheetSettings {
    fn default() -> Self {
        let global = GlobalConfig::default();
        Self {
            sheet: global.sheet,
            date_format: global.date_format,
            labels: DEFAULT_LABELS.map(String::from),
            layout: global.layout,
            total_rows: global.total_rows,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: LedgerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Settings for a sheet; `None` selects the globally configured sheet
    pub fn settings_for(
        &self,
        sheet: Option<&str>,
    ) -> std::result::Result<SheetSettings, LedgerError> {
        let name = sheet.unwrap_or(&self.global.sheet);
        let global = &self.global;
        let overrides = self.sheets.get(name).cloned().unwrap_or_default();

        let layout = BlockLayout {
            header_date_row: overrides
                .layout
                .header_date_row
                .unwrap_or(global.layout.header_date_row),
            header_label_row: overrides
                .layout
                .header_label_row
                .unwrap_or(global.layout.header_label_row),
            first_data_row: overrides
                .layout
                .first_data_row
                .unwrap_or(global.layout.first_data_row),
            meta_columns: overrides
                .layout
                .meta_columns
                .unwrap_or(global.layout.meta_columns),
        };
        let total_rows = TotalRowConfig {
            label_columns: overrides
                .total_rows
                .label_columns
                .unwrap_or_else(|| global.total_rows.label_columns.clone()),
            label_pattern: overrides
                .total_rows
                .label_pattern
                .unwrap_or_else(|| global.total_rows.label_pattern.clone()),
            fills: overrides
                .total_rows
                .fills
                .unwrap_or_else(|| global.total_rows.fills.clone()),
        };
        let labels_vec = overrides.labels.unwrap_or_else(|| global.labels.clone());
        let labels: [String; 4] = labels_vec.try_into().map_err(|v: Vec<String>| {
            LedgerError::InvalidConfig(format!(
                "sheet '{}' needs exactly 4 labels, found {}",
                name,
                v.len()
            ))
        })?;

        Ok(SheetSettings {
            sheet: name.to_string(),
            date_format: overrides
                .date_format
                .unwrap_or_else(|| global.date_format.clone()),
            labels,
            layout,
            total_rows,
        })
    }

    /// Check every sheet's resolved settings
    pub fn validate(&self) -> std::result::Result<(), LedgerError> {
        let mut names: Vec<Option<&str>> = vec![None];
        names.extend(self.sheets.keys().map(|k| Some(k.as_str())));

        for name in names {
            let settings = self.settings_for(name)?;
            let context = |msg: String| {
                LedgerError::InvalidConfig(format!("sheet '{}': {}", settings.sheet, msg))
            };

            settings.layout.validate().map_err(|e| match e {
                LedgerError::InvalidConfig(msg) => context(msg),
                other => other,
            })?;

            if !is_valid_date_format(&settings.date_format) {
                return Err(context(format!(
                    "invalid date_format '{}'",
                    settings.date_format
                )));
            }

            let totals = &settings.total_rows;
            if totals.label_columns.iter().any(|c| *c == 0) {
                return Err(context("label_columns are 1-based".to_string()));
            }
            if let Some(col) = totals
                .label_columns
                .iter()
                .find(|c| **c > settings.layout.meta_columns)
            {
                return Err(context(format!(
                    "label column {} lies outside the {} metadata columns",
                    col, settings.layout.meta_columns
                )));
            }
            RegexBuilder::new(&totals.label_pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| context(format!("invalid label_pattern: {}", e)))?;
            for fill in &totals.fills {
                if normalize_color(fill).is_none() {
                    return Err(context(format!("invalid fill colour '{}'", fill)));
                }
            }
        }
        Ok(())
    }
}

/// Normalise `#RRGGBB`, `RRGGBB` or `AARRGGBB` to uppercase ARGB
pub fn normalize_color(color: &str) -> Option<String> {
    let hex = color.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(format!("FF{}", hex.to_ascii_uppercase())),
        8 => Some(hex.to_ascii_uppercase()),
        _ => None,
    }
}

fn is_valid_date_format(format: &str) -> bool {
    !format.is_empty() && StrftimeItems::new(format).all(|item| !matches!(item, Item::Error))
}

/// Format a date, falling back to the default format on a bad pattern
pub fn format_date(date: NaiveDate, format: &str) -> String {
    let mut out = String::new();
    if is_valid_date_format(format) && write!(out, "{}", date.format(format)).is_ok() {
        return out;
    }
    date.format(DEFAULT_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = LedgerConfig::default().settings_for(None).unwrap();
        assert_eq!(settings.sheet, "MView");
        assert_eq!(settings.layout, BlockLayout::default());
        assert_eq!(settings.labels[0], "MBO COUNT");
        assert_eq!(settings.labels[3], "Updated Actual Count in MBO?");
        assert_eq!(settings, SheetSettings::default());
    }

    #[test]
    fn test_sheet_overrides_fall_back_to_global() {
        let config: LedgerConfig = toml::from_str(
            r##"
            [global]
            sheet = "Ledger"

            [global.layout]
            first_data_row = 4

            [global.total_rows]
            fills = ["#FFFF00", "FFC000"]

            [sheets.Warehouse]
            labels = ["Plan", "Count", "Diff", "Done"]

            [sheets.Warehouse.layout]
            meta_columns = 5

            [sheets.Warehouse.total_rows]
            label_pattern = "^SUM"
            "##,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        let global = config.settings_for(None).unwrap();
        assert_eq!(global.sheet, "Ledger");
        assert_eq!(global.layout.first_data_row, 4);
        assert_eq!(global.layout.meta_columns, 4);

        let warehouse = config.settings_for(Some("Warehouse")).unwrap();
        assert_eq!(warehouse.layout.meta_columns, 5);
        assert_eq!(warehouse.layout.first_data_row, 4);
        assert_eq!(warehouse.labels[2], "Diff");
        assert_eq!(warehouse.total_rows.label_pattern, "^SUM");
        assert_eq!(warehouse.total_rows.fills.len(), 2);
    }

    #[test]
    fn test_validation() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.global.labels.pop();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.global.total_rows.label_pattern = "(".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.global.total_rows.fills = vec!["yellow".to_string()];
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.global.date_format = "%Q".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        let mut sheet = SheetConfig::default();
        sheet.layout.first_data_row = Some(1);
        bad.sheets.insert("Broken".to_string(), sheet);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[global]\nsheet = \"Counts\"").unwrap();

        let config = LedgerConfig::from_file(&path).unwrap();
        assert_eq!(config.global.sheet, "Counts");
        assert_eq!(config.global.labels.len(), 4);
        assert!(LedgerConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_colors_and_dates() {
        assert_eq!(normalize_color("#ffff00").as_deref(), Some("FFFFFF00"));
        assert_eq!(normalize_color("80FF0000").as_deref(), Some("80FF0000"));
        assert_eq!(normalize_color("#fff"), None);

        let date = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        assert_eq!(format_date(date, DEFAULT_DATE_FORMAT), "1/8/2024");
        assert_eq!(format_date(date, "%Y-%m-%d"), "2024-01-08");
        assert_eq!(format_date(date, "%Q"), "1/8/2024");
    }
}
