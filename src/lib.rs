//! ledger-audit - trade history reconstruction and per-ticker audit
//!
//! This library cleans a brokerage trade history, resolves ticker symbols,
//! adjusts historical trades for stock splits and derives holding metrics
//! (P/L, CAGR, average buy price, lifecycle flags) for each ticker.

pub mod cli;
pub mod config;
pub mod corporate_actions;
pub mod dispatcher;
pub mod error;
pub mod importers;
pub mod ledger;
pub mod pricing;
pub mod reports;
pub mod tickers;
pub mod utils;
