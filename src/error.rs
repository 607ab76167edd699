//! Error handling for ledger-audit
//!
//! Defines the error kinds the CLI reports distinctly and establishes a
//! unified Result type using anyhow for context chaining.

use thiserror::Error;

/// Errors that callers match on; everything else travels as plain anyhow
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Permission denied. Please CLOSE '{path}' in Excel (or any program holding it) and try again.")]
    OutputLocked { path: String },

    #[error("Missing required column(s): {0}")]
    MissingColumns(String),

    #[error("Unsupported file format: .{0}. Supported formats: .xlsx, .xls, .csv")]
    UnsupportedFormat(String),

    #[error("market data error: {0}")]
    MarketData(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Result type alias for audit operations
pub type Result<T> = anyhow::Result<T>;
