use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::AuditError;
use crate::ledger::SplitEvent;

const CHART_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart response
#[derive(Debug, Deserialize)]
pub(crate) struct YahooChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Meta,
    events: Option<Events>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    currency: Option<String>,
    /// Exchange offset from UTC, in seconds
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Events {
    #[serde(default)]
    splits: HashMap<String, SplitEntry>,
}

#[derive(Debug, Deserialize)]
struct SplitEntry {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

/// Everything the audit needs from one chart request
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub ticker: String,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub splits: Vec<SplitEvent>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Yahoo uses dashes for share classes (BRK.B -> BRK-B)
pub fn yahoo_symbol(ticker: &str) -> String {
    ticker.trim().to_uppercase().replace('.', "-")
}

/// Fetch current price and full split history for a ticker in one request
pub async fn fetch_chart_snapshot(client: &Client, ticker: &str) -> Result<ChartSnapshot> {
    let symbol = yahoo_symbol(ticker);
    info!("Fetching price and split history for {} from Yahoo Finance", symbol);

    let url = format!(
        "{}/{}?range=max&interval=1mo&events=split",
        CHART_BASE_URL, symbol
    );

    let response = client
        .get(&url)
        .send()
        .await
        .context("Failed to send request to Yahoo Finance")?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Yahoo Finance returned error status: {}",
            response.status()
        ));
    }

    let data: YahooChartResponse = response
        .json()
        .await
        .context("Failed to parse Yahoo Finance response")?;

    snapshot_from_response(ticker, data)
}

pub(crate) fn snapshot_from_response(ticker: &str, data: YahooChartResponse) -> Result<ChartSnapshot> {
    if let Some(error) = data.chart.error {
        return Err(AuditError::MarketData(format!(
            "Yahoo Finance API error: {} - {}",
            error.code, error.description
        ))
        .into());
    }

    let result = data
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data returned from Yahoo Finance"))?;

    // NaN / infinite prices come back as None here
    let price = result
        .meta
        .regular_market_price
        .and_then(Decimal::from_f64);

    let offset = result.meta.gmtoffset.unwrap_or(0);
    let mut splits: Vec<SplitEvent> = result
        .events
        .map(|e| e.splits.into_values().collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let split = split_from_entry(&entry, offset);
            if split.is_none() {
                warn!(
                    "Skipping malformed split for {}: {}/{} at {}",
                    ticker, entry.numerator, entry.denominator, entry.date
                );
            }
            split
        })
        .collect();
    splits.sort_by_key(|s| s.effective_date);

    debug!("{}: price {:?}, {} splits", ticker, price, splits.len());

    Ok(ChartSnapshot {
        ticker: ticker.to_string(),
        price,
        currency: result.meta.currency,
        splits,
        fetched_at: chrono::Utc::now(),
    })
}

/// Split timestamps are exchange-local session opens; shift by the exchange
/// offset before taking the calendar date.
fn split_from_entry(entry: &SplitEntry, gmtoffset: i64) -> Option<SplitEvent> {
    let numerator = Decimal::from_f64(entry.numerator)?;
    let denominator = Decimal::from_f64(entry.denominator)?;
    if numerator <= Decimal::ZERO || denominator <= Decimal::ZERO {
        return None;
    }

    let effective_date: NaiveDate = chrono::DateTime::from_timestamp(entry.date + gmtoffset, 0)?.date_naive();
    Some(SplitEvent::new(effective_date, numerator / denominator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn should_skip_online_tests() -> bool {
        std::env::var("LEDGER_AUDIT_SKIP_ONLINE_TESTS")
            .map(|v| v != "0")
            .unwrap_or(false)
    }

    const AAPL_FIXTURE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"currency": "USD", "symbol": "AAPL", "regularMarketPrice": 227.5, "gmtoffset": -14400},
                "timestamp": [1,2],
                "events": {
                    "splits": {
                        "1598880600": {"date": 1598880600, "numerator": 4.0, "denominator": 1.0, "splitRatio": "4:1"},
                        "1402321800": {"date": 1402321800, "numerator": 7.0, "denominator": 1.0, "splitRatio": "7:1"},
                        "1000000000": {"date": 1000000000, "numerator": 0.0, "denominator": 1.0, "splitRatio": "0:1"}
                    }
                },
                "indicators": {"quote": [{}]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_snapshot_parses_price_and_splits() {
        let data: YahooChartResponse = serde_json::from_str(AAPL_FIXTURE).unwrap();
        let snapshot = snapshot_from_response("AAPL", data).unwrap();

        assert_eq!(snapshot.price, Some(dec!(227.5)));
        assert_eq!(snapshot.currency.as_deref(), Some("USD"));
        // Malformed 0:1 split dropped, remaining sorted by date
        assert_eq!(snapshot.splits.len(), 2);
        assert_eq!(
            snapshot.splits[0],
            SplitEvent::new(NaiveDate::from_ymd_opt(2014, 6, 9).unwrap(), dec!(7))
        );
        assert_eq!(
            snapshot.splits[1],
            SplitEvent::new(NaiveDate::from_ymd_opt(2020, 8, 31).unwrap(), dec!(4))
        );
    }

    #[test]
    fn test_snapshot_without_events_or_price() {
        let json = r#"{"chart": {"result": [{"meta": {"symbol": "XOM"}}], "error": null}}"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        let snapshot = snapshot_from_response("XOM", data).unwrap();
        assert!(snapshot.splits.is_empty());
        assert_eq!(snapshot.price, None);
    }

    #[test]
    fn test_snapshot_api_error() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let data: YahooChartResponse = serde_json::from_str(json).unwrap();
        let err = snapshot_from_response("WCOMQ", data).unwrap_err().to_string();
        assert!(err.contains("Not Found"));
    }

    #[test]
    fn test_reverse_split_ratio() {
        let entry = SplitEntry {
            date: 1_700_000_000,
            numerator: 1.0,
            denominator: 20.0,
        };
        let split = split_from_entry(&entry, 0).unwrap();
        assert_eq!(split.ratio, dec!(0.05));
    }

    #[test]
    fn test_yahoo_symbol() {
        assert_eq!(yahoo_symbol("brk.b"), "BRK-B");
        assert_eq!(yahoo_symbol("XOM"), "XOM");
    }

    #[tokio::test]
    async fn test_fetch_chart_snapshot() {
        if should_skip_online_tests() {
            return;
        }

        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; LedgerAudit/1.0)")
            .build()
            .unwrap();
        let result = fetch_chart_snapshot(&client, "AAPL").await;
        if let Err(e) = &result {
            eprintln!("Skipping Yahoo chart test: {}", e);
            return;
        }
        let snapshot = result.unwrap();
        assert!(!snapshot.splits.is_empty());
        println!("AAPL: {:?}, {} splits", snapshot.price, snapshot.splits.len());
    }
}
