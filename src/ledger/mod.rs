//! Ledger normalization
//!
//! Turns loosely-typed spreadsheet rows into clean [`Transaction`]s: symbols
//! are resolved, numbers and dates coerced, unusable rows dropped, and the
//! result sorted chronologically and partitioned per ticker.

pub mod models;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};

use crate::importers::trade_history_excel::excel_serial_to_date;
use crate::importers::{Cell, RawRow};
use crate::tickers::TickerResolver;

pub use models::{AuditRecord, SplitEvent, TradeAction, Transaction};

/// Ticker strings that mean "no ticker" in exported spreadsheets
const MISSING_TICKER_MARKERS: [&str; 4] = ["", "NAN", "NONE", "NAT"];

const DATE_FORMATS: [&str; 7] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

/// Timestamps as spreadsheets export them; the time of day is dropped
const DATETIME_FORMATS: [&str; 9] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
];

/// Types that can be coerced out of a spreadsheet cell
pub trait ParseCell: Sized {
    fn parse_cell(cell: &Cell) -> Option<Self>;
}

impl ParseCell for Decimal {
    fn parse_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Number(n) => Decimal::from_f64(*n),
            Cell::Text(s) => parse_decimal_text(s),
            Cell::Empty | Cell::Date(_) => None,
        }
    }
}

impl ParseCell for NaiveDate {
    fn parse_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Date(d) => Some(*d),
            Cell::Number(n) => excel_serial_to_date(*n),
            Cell::Text(s) => parse_date_text(s),
            Cell::Empty => None,
        }
    }
}

/// Coerce a cell, substituting `default` when it can't be parsed
pub fn parse_or<T: ParseCell>(cell: &Cell, default: T) -> T {
    T::parse_cell(cell).unwrap_or(default)
}

/// Parse numeric text such as `1,234.50`, `$ 80`, `(5000)` or `1e3`
fn parse_decimal_text(raw: &str) -> Option<Decimal> {
    let mut text = raw.trim().replace(['$', ',', ' '], "");
    let negative = text.starts_with('(') && text.ends_with(')');
    if negative {
        text = text[1..text.len() - 1].to_string();
    }

    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;

    Some(if negative { -value } else { value })
}

fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

fn clean_text(cell: &Cell) -> String {
    cell.to_string().trim().to_uppercase()
}

/// Row counts gathered while normalizing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub dropped_unresolved_ticker: usize,
    pub dropped_bad_date: usize,
}

impl NormalizeStats {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_unresolved_ticker + self.dropped_bad_date
    }
}

/// Clean ledger, sorted by date
#[derive(Debug, Clone, Default)]
pub struct NormalizedLedger {
    pub transactions: Vec<Transaction>,
    pub stats: NormalizeStats,
}

/// Normalize raw rows into chronologically sorted transactions
///
/// Rows whose ticker can't be resolved or whose date can't be parsed are
/// dropped; numeric fields that can't be parsed become zero. BUY rows are
/// forced to positive shares / negative cash, SELL rows to negative shares /
/// positive cash; other actions keep the signs they were recorded with.
/// Same-date rows keep their source order.
pub fn normalize_rows<R: TickerResolver + ?Sized>(rows: &[RawRow], resolver: &R) -> NormalizedLedger {
    let mut stats = NormalizeStats {
        rows_read: rows.len(),
        ..Default::default()
    };
    let mut transactions = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let name = clean_text(&row.stock);
        let raw_ticker = clean_text(&row.ticker);
        let ticker_opt = if MISSING_TICKER_MARKERS.contains(&raw_ticker.as_str()) {
            None
        } else {
            Some(raw_ticker.as_str())
        };

        let ticker = match resolver.resolve(&name, ticker_opt) {
            Some(t) if !MISSING_TICKER_MARKERS.contains(&t.as_str()) => t,
            _ => {
                debug!("Dropping row {}: no ticker for '{}'", idx + 1, name);
                stats.dropped_unresolved_ticker += 1;
                continue;
            }
        };

        let date = match NaiveDate::parse_cell(&row.date) {
            Some(d) => d,
            None => {
                debug!("Dropping row {}: unparseable date '{}'", idx + 1, row.date);
                stats.dropped_bad_date += 1;
                continue;
            }
        };

        // Infallible: unknown labels become TradeAction::Other
        let trade_action = TradeAction::from_str(&clean_text(&row.trade))
            .unwrap_or_else(|_| TradeAction::Other(String::new()));
        let shares = parse_or(&row.shares, Decimal::ZERO);
        let price = parse_or(&row.price, Decimal::ZERO);
        let value = parse_or(&row.value, Decimal::ZERO);

        let (shares, cash_value) = match trade_action {
            TradeAction::Buy => (shares.abs(), -value.abs()),
            TradeAction::Sell => (-shares.abs(), value.abs()),
            TradeAction::Other(_) => (shares, value),
        };

        transactions.push(Transaction {
            ticker,
            trade_action,
            date,
            shares,
            price: price.abs(),
            cash_value,
        });
    }

    // Stable: same-date rows keep source order
    transactions.sort_by_key(|t| t.date);
    stats.rows_kept = transactions.len();

    info!(
        "Normalized {} rows: {} kept, {} dropped ({} unresolved ticker, {} bad date)",
        stats.rows_read,
        stats.rows_kept,
        stats.rows_dropped(),
        stats.dropped_unresolved_ticker,
        stats.dropped_bad_date
    );

    NormalizedLedger {
        transactions,
        stats,
    }
}

/// Split a sorted ledger into one ordered sequence per ticker (ticker ascending)
pub fn partition_by_ticker(transactions: Vec<Transaction>) -> BTreeMap<String, Vec<Transaction>> {
    let mut groups: BTreeMap<String, Vec<Transaction>> = BTreeMap::new();
    for tx in transactions {
        groups.entry(tx.ticker.clone()).or_default().push(tx);
    }
    groups
}
