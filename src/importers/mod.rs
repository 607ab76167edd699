// Import module - trade history spreadsheet readers (Excel and CSV)

pub mod trade_history_csv;
pub mod trade_history_excel;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use itertools::Itertools;
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::error::AuditError;

/// Column names every trade history file must carry (matched after trimming,
/// case-insensitively)
pub const REQUIRED_COLUMNS: [&str; 7] = ["Stock", "Ticker", "Trade", "Date", "Shares", "Price", "Value"];

/// Loosely-typed spreadsheet cell, as read from the source file
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// One uncleaned trade history row
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub stock: Cell,
    pub ticker: Cell,
    pub trade: Cell,
    pub date: Cell,
    pub shares: Cell,
    pub price: Cell,
    pub value: Cell,
}

/// Positions of the required columns inside a header row
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColumnMapping {
    stock: usize,
    ticker: usize,
    trade: usize,
    date: usize,
    shares: usize,
    price: usize,
    value: usize,
}

impl ColumnMapping {
    /// Build the mapping from header labels; errors with every missing column named
    pub(crate) fn from_header<S: AsRef<str>>(header: &[S]) -> Result<Self> {
        let position = |name: &str| {
            header
                .iter()
                .position(|h| h.as_ref().trim().eq_ignore_ascii_case(name))
        };

        let found: Vec<Option<usize>> = REQUIRED_COLUMNS.iter().map(|c| position(*c)).collect();
        let missing = REQUIRED_COLUMNS
            .iter()
            .zip(&found)
            .filter(|(_, idx)| idx.is_none())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(AuditError::MissingColumns(missing.iter().join(", ")).into());
        }

        let idx = |i: usize| found[i].unwrap_or_default();
        Ok(ColumnMapping {
            stock: idx(0),
            ticker: idx(1),
            trade: idx(2),
            date: idx(3),
            shares: idx(4),
            price: idx(5),
            value: idx(6),
        })
    }

    /// Pick the mapped cells out of a row (short rows yield `Cell::Empty`)
    pub(crate) fn extract(&self, row: &[Cell]) -> RawRow {
        let get = |idx: usize| row.get(idx).cloned().unwrap_or(Cell::Empty);
        RawRow {
            stock: get(self.stock),
            ticker: get(self.ticker),
            trade: get(self.trade),
            date: get(self.date),
            shares: get(self.shares),
            price: get(self.price),
            value: get(self.value),
        }
    }
}

/// Import trade history rows (auto-detects Excel vs CSV by extension)
pub fn import_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<RawRow>> {
    let path = file_path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("File has no extension: {}", path.display()))?
        .to_lowercase();

    info!("Importing trade history: {:?} (type: {})", path, extension);

    match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => trade_history_excel::parse_trade_history_excel(path),
        "csv" | "txt" => trade_history_csv::parse_trade_history_csv(path),
        _ => Err(AuditError::UnsupportedFormat(extension).into()),
    }
}
