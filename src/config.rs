//! Configuration loading
//!
//! Optional TOML file layered over the built-in ticker tables:
//!
//! ```toml
//! [tickers.renames]
//! FB = "META"
//!
//! [tickers.names]
//! "EXXON MOBIL" = "XOM"
//!
//! [market_data]
//! concurrency = 5
//! user_agent = "Mozilla/5.0 (compatible; LedgerAudit/1.0)"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::pricing::DEFAULT_USER_AGENT;
use crate::tickers::CorrectionTables;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Market data request settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarketDataSettings {
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Root configuration schema
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tickers: CorrectionTables,
    pub market_data: MarketDataSettings,
}

impl Settings {
    /// Parse a TOML document; ticker tables extend the built-in ones
    pub fn from_toml(raw: &str) -> Result<Self> {
        let parsed: Settings = toml::from_str(raw).context("Failed to parse config")?;
        Ok(parsed.with_builtin_tickers())
    }

    /// Built-in ticker tables with defaults for everything else
    pub fn builtin() -> Self {
        Settings::default().with_builtin_tickers()
    }

    fn with_builtin_tickers(mut self) -> Self {
        self.tickers = CorrectionTables::builtin().merge(self.tickers);
        if self.market_data.concurrency == 0 {
            self.market_data.concurrency = 1;
        }
        self
    }
}

/// `<config_home>/ledger-audit/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join("ledger-audit").join("config.toml"))
}

/// Load settings from an explicit file (must exist and parse)
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read config file: {}", path.display()))?;
    let settings = Settings::from_toml(&raw)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    info!("Loaded config from {}", path.display());
    Ok(settings)
}

/// Resolve settings: explicit path, else the user config file when it
/// exists, else built-in defaults
pub fn resolve_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => load_settings(&path),
        _ => {
            debug!("No config file found, using built-in defaults");
            Ok(Settings::builtin())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickers::TickerResolver;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_settings() {
        let settings = Settings::builtin();
        assert_eq!(settings.market_data.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.market_data.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.tickers.resolve("EXXON MOBIL", None), Some("XOM".to_string()));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            [tickers.renames]
            twtr = "x"

            [market_data]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(settings.market_data.concurrency, 2);
        assert_eq!(settings.market_data.user_agent, DEFAULT_USER_AGENT);
        // New entry normalized, builtin still present
        assert_eq!(settings.tickers.resolve("TWITTER", Some("TWTR")), Some("X".to_string()));
        assert_eq!(settings.tickers.resolve("META PLATFORMS", Some("FB")), Some("META".to_string()));
    }

    #[test]
    fn test_config_overrides_builtin_entry() {
        let settings = Settings::from_toml(
            r#"
            [tickers.names]
            "WORLDCOM" = "WCOEQ"
            "#,
        )
        .unwrap();
        assert_eq!(settings.tickers.resolve("WORLDCOM", None), Some("WCOEQ".to_string()));
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let settings = Settings::from_toml("[market_data]\nconcurrency = 0\n").unwrap();
        assert_eq!(settings.market_data.concurrency, 1);
    }

    #[test]
    fn test_load_settings_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[market_data]\nuser_agent = \"test-agent\"").unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.market_data.user_agent, "test-agent");
    }

    #[test]
    fn test_load_settings_errors() {
        assert!(load_settings(Path::new("/nonexistent/ledger-audit.toml")).is_err());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[market_data\nconcurrency = ").unwrap();
        let err = load_settings(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
