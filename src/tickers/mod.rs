//! Ticker resolution
//!
//! Maps a raw security name / symbol from the trade history to the symbol the
//! security trades under today. Resolution is pure table lookup: a rename
//! table for delisted or changed symbols and a name table for rows that were
//! recorded without a symbol at all.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Resolve a (name, ticker) pair from a ledger row into a canonical ticker
pub trait TickerResolver {
    /// `name` and `ticker` are already trimmed and uppercased; `ticker` is
    /// `None` when the row had no usable symbol.
    fn resolve(&self, name: &str, ticker: Option<&str>) -> Option<String>;
}

/// Symbol renames (old -> current) and security-name lookups (name -> symbol)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CorrectionTables {
    #[serde(default)]
    pub renames: HashMap<String, String>,
    #[serde(default)]
    pub names: HashMap<String, String>,
}

static BUILTIN_TABLES: Lazy<CorrectionTables> = Lazy::new(|| {
    let renames = [("FB", "META"), ("ANTM", "ELV")];
    let names = [
        ("EXXON MOBIL", "XOM"),
        ("S&P DEP. RECEIPTS", "SPY"),
        ("VANGUARD INDEX 500", "VOO"),
        ("FRONTIER AIRLINES", "ULCC"),
        ("ISPAT INTERNATIONAL", "MT"),
        ("WORLDCOM", "WCOMQ"),
        ("VISTRA CORP COM", "VST"),
        ("TRANSMEDICS GROUP INC", "TMDX"),
        ("SOFI TECHNOLOGIES INC", "SOFI"),
    ];

    CorrectionTables {
        renames: renames
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        names: names
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
});

impl CorrectionTables {
    /// Tables shipped with the binary
    pub fn builtin() -> Self {
        BUILTIN_TABLES.clone()
    }

    /// Uppercase and trim every key and value so lookups match normalized rows
    pub fn normalized(self) -> Self {
        let norm = |map: HashMap<String, String>| {
            map.into_iter()
                .map(|(k, v)| (normalize_key(&k), normalize_key(&v)))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .collect()
        };
        Self {
            renames: norm(self.renames),
            names: norm(self.names),
        }
    }

    /// Layer `overrides` on top of `self`; entries in `overrides` win
    pub fn merge(mut self, overrides: CorrectionTables) -> Self {
        let overrides = overrides.normalized();
        self.renames.extend(overrides.renames);
        self.names.extend(overrides.names);
        self
    }

    fn rename<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.renames.get(ticker).map(String::as_str).unwrap_or(ticker)
    }
}

impl TickerResolver for CorrectionTables {
    fn resolve(&self, name: &str, ticker: Option<&str>) -> Option<String> {
        let symbol = match ticker {
            Some(t) => t,
            None => {
                let found = self.names.get(name)?;
                debug!("Resolved missing ticker for '{}' -> {}", name, found);
                found.as_str()
            }
        };
        Some(self.rename(symbol).to_string())
    }
}

fn normalize_key(s: &str) -> String {
    s.trim().to_uppercase()
}
