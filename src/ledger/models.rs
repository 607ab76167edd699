use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Trade action label on a ledger row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
    Other(String), // dividends, transfers, fees... kept as supplied
}

impl TradeAction {
    pub fn as_str(&self) -> &str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Other(label) => label.as_str(),
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, TradeAction::Buy)
    }
}

impl FromStr for TradeAction {
    type Err = ();

    /// Never fails: anything that isn't BUY/SELL becomes `Other`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_uppercase();
        match label.as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            _ => Ok(TradeAction::Other(label)),
        }
    }
}

/// Cleaned ledger transaction
///
/// Sign convention: `shares` is positive when acquired and negative when
/// disposed; `cash_value` is negative for cash leaving the account (buys)
/// and positive for cash coming in (sells).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub ticker: String,
    pub trade_action: TradeAction,
    pub date: NaiveDate,
    pub shares: Decimal,
    pub price: Decimal,
    pub cash_value: Decimal,
}

/// Historical stock split (2 = 2-for-1, 0.1 = 1-for-10 reverse split)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitEvent {
    pub effective_date: NaiveDate,
    pub ratio: Decimal,
}

impl SplitEvent {
    pub fn new(effective_date: NaiveDate, ratio: Decimal) -> Self {
        Self {
            effective_date,
            ratio,
        }
    }
}

/// Per-ticker audit output. Values are kept at full precision; rounding
/// happens when the record is rendered.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditRecord {
    pub ticker: String,
    pub initial_year: i32,
    pub avg_price_paid: Decimal,
    pub current_price: Decimal,
    pub current_shares: Decimal,
    pub position_size_usd: Decimal,
    pub total_pl_usd: Decimal,
    pub cagr_pct: Decimal,
    pub exited: bool,
    pub re_entered: bool,
    pub bi_annual_periods: Decimal,
    pub years_held: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_action_parsing() {
        assert_eq!(TradeAction::from_str(" buy ").unwrap(), TradeAction::Buy);
        assert_eq!(TradeAction::from_str("SELL").unwrap(), TradeAction::Sell);
        assert_eq!(
            TradeAction::from_str("dividend").unwrap(),
            TradeAction::Other("DIVIDEND".to_string())
        );
    }

    #[test]
    fn test_trade_action_as_str() {
        assert_eq!(TradeAction::Buy.as_str(), "BUY");
        assert_eq!(TradeAction::Other("SPLIT".into()).as_str(), "SPLIT");
        assert!(TradeAction::Buy.is_buy());
        assert!(!TradeAction::Sell.is_buy());
    }
}
