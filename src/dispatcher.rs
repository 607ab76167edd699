//! Audit pipeline
//!
//! import -> normalize -> partition -> per-ticker (splits, adjust, price,
//! aggregate) -> assemble -> write. Per-ticker work runs concurrently on a
//! `JoinSet`, bounded by a semaphore on market data requests.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::DEFAULT_CONCURRENCY;
use crate::corporate_actions::apply_splits;
use crate::importers;
use crate::ledger::{normalize_rows, partition_by_ticker, NormalizeStats, SplitEvent, Transaction};
use crate::pricing::MarketData;
use crate::reports::{summarize_position, AuditReport, PositionSummary, PriceSource};
use crate::tickers::CorrectionTables;

/// Inputs for one audit run
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub as_of: NaiveDate,
    pub concurrency: usize,
    pub dry_run: bool,
    pub tickers: CorrectionTables,
}

impl AuditOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, as_of: NaiveDate) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            as_of,
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            tickers: CorrectionTables::builtin(),
        }
    }
}

/// Per-ticker result of the concurrent stage
#[derive(Debug, Clone)]
struct TickerAudit {
    summary: Option<PositionSummary>,
    splits_applied: usize,
    split_fetch_failed: bool,
}

/// Everything a run produced, for presentation
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub report: AuditReport,
    pub summaries: Vec<PositionSummary>,
    pub stats: NormalizeStats,
    pub split_adjusted_transactions: usize,
    pub split_fetch_failures: usize,
    /// Tickers whose task died; they are missing from the report
    pub failed_tickers: Vec<String>,
    /// Destination path when the CSV was written (None on dry runs)
    pub written: Option<PathBuf>,
}

impl AuditOutcome {
    pub fn tickers_processed(&self) -> usize {
        self.summaries.len()
    }

    /// Tickers valued at their last trade price instead of a live quote
    pub fn fallback_prices(&self) -> usize {
        self.summaries
            .iter()
            .filter(|s| s.price_source == PriceSource::LastTrade)
            .count()
    }
}

/// `LEDGER_AUDIT_OFFLINE` forces offline market data
pub fn offline_requested(flag: bool) -> bool {
    flag || std::env::var("LEDGER_AUDIT_OFFLINE")
        .map(|v| v != "0")
        .unwrap_or(false)
}

/// Run the full audit and write the report once at the end
pub async fn run_audit<M>(opts: &AuditOptions, market_data: Arc<M>) -> Result<AuditOutcome>
where
    M: MarketData + 'static,
{
    info!("Auditing {} (as of {})", opts.input.display(), opts.as_of);

    let rows = importers::import_file(&opts.input)
        .with_context(|| format!("Failed to read trade history {}", opts.input.display()))?;
    let normalized = normalize_rows(&rows, &opts.tickers);
    let groups = partition_by_ticker(normalized.transactions);

    let (audits, failed_tickers) =
        audit_tickers(groups, market_data, opts.concurrency, opts.as_of).await?;

    let split_adjusted_transactions = audits.iter().map(|a| a.splits_applied).sum();
    let split_fetch_failures = audits.iter().filter(|a| a.split_fetch_failed).count();
    let summaries: Vec<PositionSummary> = audits.into_iter().filter_map(|a| a.summary).collect();

    let report = AuditReport::from_records(summaries.iter().map(|s| s.to_audit_record()).collect());

    let written = if opts.dry_run {
        info!("Dry run, not writing {}", opts.output.display());
        None
    } else {
        report.write_csv(&opts.output)?;
        Some(opts.output.clone())
    };

    Ok(AuditOutcome {
        report,
        summaries,
        stats: normalized.stats,
        split_adjusted_transactions,
        split_fetch_failures,
        failed_tickers,
        written,
    })
}

/// Fan the ticker groups out over a bounded JoinSet; results come back in
/// ticker order, followed by the tickers whose task panicked
async fn audit_tickers<M>(
    groups: std::collections::BTreeMap<String, Vec<Transaction>>,
    market_data: Arc<M>,
    concurrency: usize,
    as_of: NaiveDate,
) -> Result<(Vec<TickerAudit>, Vec<String>)>
where
    M: MarketData + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();
    let spawned: Vec<String> = groups.keys().cloned().collect();

    for (ticker, ledger) in groups {
        let sem = semaphore.clone();
        let md = market_data.clone();

        join_set.spawn(async move {
            let audit = audit_ticker(md.as_ref(), &sem, &ticker, ledger, as_of).await?;
            Ok::<_, anyhow::Error>((ticker, audit))
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => results.push(result?),
            // One bad ticker must not sink the whole report
            Err(e) => warn!("Ticker task failed, skipping it: {}", e),
        }
    }

    // Completion order is arbitrary
    results.sort_by(|a, b| a.0.cmp(&b.0));
    let failed: Vec<String> = spawned
        .into_iter()
        .filter(|t| results.binary_search_by(|(done, _)| done.cmp(t)).is_err())
        .collect();
    for ticker in &failed {
        warn!("{}: left out of the report", ticker);
    }

    Ok((results.into_iter().map(|(_, audit)| audit).collect(), failed))
}

/// Adjust, price and aggregate one ticker; fetch failures degrade, never abort
async fn audit_ticker<M: MarketData>(
    market_data: &M,
    semaphore: &Semaphore,
    ticker: &str,
    mut ledger: Vec<Transaction>,
    as_of: NaiveDate,
) -> Result<TickerAudit> {
    let (splits, live_price) = {
        // Limit concurrent requests to the provider
        let _permit = semaphore
            .acquire()
            .await
            .context("market data semaphore closed")?;

        let splits = match market_data.split_history(ticker).await {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("{}: split history unavailable, leaving unadjusted: {:#}", ticker, e);
                None
            }
        };

        let live_price = match market_data.current_price(ticker).await {
            Ok(p) => p,
            Err(e) => {
                warn!("{}: live price unavailable, using last trade price: {:#}", ticker, e);
                None
            }
        };

        (splits, live_price)
    };

    let split_fetch_failed = splits.is_none();
    let splits_applied = splits
        .as_deref()
        .map(|s| apply_splits(&mut ledger, s))
        .unwrap_or(0);

    Ok(TickerAudit {
        summary: summarize_position(ticker, &ledger, live_price, as_of),
        splits_applied,
        split_fetch_failed,
    })
}

/// Split schedule for one ticker, oldest first
pub async fn run_splits<M: MarketData>(market_data: &M, ticker: &str) -> Result<Vec<SplitEvent>> {
    let ticker = ticker.trim().to_uppercase();
    let mut splits = market_data
        .split_history(&ticker)
        .await
        .with_context(|| format!("Failed to fetch split history for {}", ticker))?;
    splits.sort_by_key(|s| s.effective_date);
    Ok(splits)
}
