// Pricing module - market data (live prices, split history)

pub mod yahoo;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::AuditError;
use crate::ledger::SplitEvent;
use yahoo::ChartSnapshot;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; LedgerAudit/1.0)";

/// Source of per-ticker market data
///
/// Both calls may fail; callers treat failures as soft and fall back
/// (no split adjustment, last traded price).
pub trait MarketData: Send + Sync {
    /// Historical splits for a ticker, in any order
    fn split_history(&self, ticker: &str) -> impl Future<Output = Result<Vec<SplitEvent>>> + Send;

    /// Latest market price, `None` when the provider has no usable quote
    fn current_price(&self, ticker: &str) -> impl Future<Output = Result<Option<Decimal>>> + Send;
}

/// Cache entry
#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: ChartSnapshot,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// Yahoo Finance market data with caching (24hr TTL)
///
/// Price and splits come from the same chart request, so the second call
/// for a ticker is served from the cache.
pub struct YahooMarketData {
    client: Client,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
    cache_ttl_hours: i64,
}

impl YahooMarketData {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            cache: Arc::new(Mutex::new(HashMap::new())),
            cache_ttl_hours: 24,
        })
    }

    /// Fetch chart snapshot with caching
    async fn snapshot(&self, ticker: &str) -> Result<ChartSnapshot> {
        // Check cache first
        {
            let cache = self
                .cache
                .lock()
                .map_err(|_| anyhow!("market data cache lock poisoned"))?;
            if let Some(entry) = cache.get(ticker) {
                let age = Utc::now().signed_duration_since(entry.timestamp);
                if age < Duration::hours(self.cache_ttl_hours) {
                    debug!("Using cached market data for {} (age: {}h)", ticker, age.num_hours());
                    return Ok(entry.snapshot.clone());
                }
            }
        }

        let snapshot = yahoo::fetch_chart_snapshot(&self.client, ticker)
            .await
            .context("Yahoo Finance chart fetch failed")?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("market data cache lock poisoned"))?;
        cache.insert(
            ticker.to_string(),
            CacheEntry {
                snapshot: snapshot.clone(),
                timestamp: Utc::now(),
            },
        );
        Ok(snapshot)
    }

    /// Get cache size
    #[cfg(test)]
    fn cache_size(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl MarketData for YahooMarketData {
    async fn split_history(&self, ticker: &str) -> Result<Vec<SplitEvent>> {
        Ok(self.snapshot(ticker).await?.splits)
    }

    async fn current_price(&self, ticker: &str) -> Result<Option<Decimal>> {
        Ok(self.snapshot(ticker).await?.price)
    }
}

/// In-memory market data: fixed split schedules and prices
///
/// With nothing registered it behaves as an offline provider (no splits,
/// no live prices). Tickers marked as failing return errors from both calls.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    splits: HashMap<String, Vec<SplitEvent>>,
    prices: HashMap<String, Decimal>,
    failing: HashSet<String>,
}

impl StaticMarketData {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_splits(mut self, ticker: &str, splits: Vec<SplitEvent>) -> Self {
        self.splits.insert(ticker.to_string(), splits);
        self
    }

    pub fn with_price(mut self, ticker: &str, price: Decimal) -> Self {
        self.prices.insert(ticker.to_string(), price);
        self
    }

    pub fn failing_for(mut self, ticker: &str) -> Self {
        self.failing.insert(ticker.to_string());
        self
    }

    fn check(&self, ticker: &str) -> Result<()> {
        if self.failing.contains(ticker) {
            return Err(AuditError::MarketData(format!("unavailable for {}", ticker)).into());
        }
        Ok(())
    }
}

impl MarketData for StaticMarketData {
    async fn split_history(&self, ticker: &str) -> Result<Vec<SplitEvent>> {
        self.check(ticker)?;
        Ok(self.splits.get(ticker).cloned().unwrap_or_default())
    }

    async fn current_price(&self, ticker: &str) -> Result<Option<Decimal>> {
        self.check(ticker)?;
        Ok(self.prices.get(ticker).copied())
    }
}
