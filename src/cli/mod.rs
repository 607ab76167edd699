use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

pub const DEFAULT_INPUT: &str = "HF_Trade_History.xlsx";
pub const DEFAULT_OUTPUT: &str = "HF_Audit_Summary.csv";

#[derive(Parser, Debug)]
#[command(name = "ledger-audit")]
#[command(
    version,
    about = "Reconstruct per-ticker holding metrics from a brokerage trade history"
)]
#[command(
    long_about = "Cleans a trade history spreadsheet, resolves renamed or missing ticker symbols, rewrites historical trades in today's share units using split history, and writes a per-ticker audit summary (P/L, CAGR, average buy price, lifecycle flags) as CSV."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Audit a trade history and write the per-ticker summary CSV
    Audit {
        /// Trade history (.xlsx, .xls or .csv)
        #[arg(default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Destination CSV
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// TOML config with ticker corrections and market data settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip market data: no split adjustment, last trade prices
        #[arg(long)]
        offline: bool,

        /// Measure holding periods up to this date (YYYY-MM-DD, default today)
        #[arg(long, value_parser = parse_date)]
        as_of: Option<NaiveDate>,

        /// Maximum concurrent market data requests
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the report table instead of writing the CSV
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show the split history for a ticker
    Splits {
        /// Ticker symbol (e.g., AAPL)
        ticker: String,

        /// TOML config (market data user agent)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", raw))
}
