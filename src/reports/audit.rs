//! Position aggregation
//!
//! Derives holding metrics for one ticker from its split-adjusted ledger:
//! net shares, market value, realized + unrealized P/L, lifetime average
//! buy price, CAGR and open/close lifecycle flags.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ledger::{AuditRecord, Transaction};

/// Net share balances at or below this are treated as closed (float residue)
pub fn closed_epsilon() -> Decimal {
    Decimal::new(1, 3)
}

/// Days per year used for holding periods
fn days_per_year() -> Decimal {
    Decimal::new(36525, 2)
}

/// Floor for the CAGR exponent denominator so same-day positions don't explode
fn min_cagr_years() -> Decimal {
    Decimal::new(1, 2)
}

/// Where the valuation price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceSource {
    Live,
    LastTrade,
}

/// Full-precision metrics for one ticker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub ticker: String,
    pub first_date: NaiveDate,
    pub net_shares: Decimal,
    pub current_price: Decimal,
    pub price_source: PriceSource,
    pub market_value: Decimal,
    pub total_pl: Decimal,
    pub invested_capital: Decimal,
    pub total_bought_shares: Decimal,
    pub avg_buy_price: Decimal,
    pub exited: bool,
    pub re_entered: bool,
    pub years_held: Decimal,
    pub bi_annual_periods: Decimal,
    pub cagr_pct: Decimal,
}

impl PositionSummary {
    pub fn to_audit_record(&self) -> AuditRecord {
        AuditRecord {
            ticker: self.ticker.clone(),
            initial_year: self.first_date.year(),
            avg_price_paid: self.avg_buy_price,
            current_price: self.current_price,
            current_shares: self.net_shares,
            position_size_usd: self.market_value,
            total_pl_usd: self.total_pl,
            cagr_pct: self.cagr_pct,
            exited: self.exited,
            re_entered: self.re_entered,
            bi_annual_periods: self.bi_annual_periods,
            years_held: self.years_held,
        }
    }
}

/// Aggregate one ticker's chronologically sorted, split-adjusted ledger
///
/// `live_price` is used when it is a positive quote; otherwise the position
/// is marked at the price of the last transaction. `as_of` is the reference
/// date for the holding period. Returns `None` for an empty ledger.
///
/// `avg_buy_price` averages every BUY across the whole history, including
/// buys from earlier open/close cycles of the same ticker.
pub fn summarize_position(
    ticker: &str,
    ledger: &[Transaction],
    live_price: Option<Decimal>,
    as_of: NaiveDate,
) -> Option<PositionSummary> {
    let first = ledger.first()?;
    let last = ledger.last()?;

    let net_shares = or_zero(ticker, "net shares", checked_sum(ledger.iter().map(|t| t.shares)));
    let total_cash = or_zero(ticker, "total cash", checked_sum(ledger.iter().map(|t| t.cash_value)));

    let (current_price, price_source) = match live_price {
        Some(p) if p > Decimal::ZERO => (p, PriceSource::Live),
        _ => {
            debug!("{}: no live price, using last trade price {}", ticker, last.price);
            (last.price, PriceSource::LastTrade)
        }
    };

    let market_value = or_zero(ticker, "market value", net_shares.checked_mul(current_price));
    let total_pl = or_zero(ticker, "total P/L", market_value.checked_add(total_cash));

    let buys: Vec<&Transaction> = ledger.iter().filter(|t| t.trade_action.is_buy()).collect();
    let invested_capital =
        or_zero(ticker, "invested capital", checked_sum(buys.iter().map(|t| t.cash_value))).abs();
    let total_bought_shares =
        or_zero(ticker, "bought shares", checked_sum(buys.iter().map(|t| t.shares)));
    let avg_buy_price = if total_bought_shares > Decimal::ZERO {
        or_zero(ticker, "average buy price", invested_capital.checked_div(total_bought_shares))
    } else {
        Decimal::ZERO
    };

    let epsilon = closed_epsilon();
    let exited = net_shares <= epsilon;
    let was_ever_flat = ledger
        .iter()
        .scan(Decimal::ZERO, |running, t| {
            *running = running.saturating_add(t.shares);
            Some(*running)
        })
        .any(|balance| balance.abs() < epsilon);
    let re_entered = was_ever_flat && net_shares > epsilon;

    let first_date = ledger.iter().map(|t| t.date).min().unwrap_or(first.date);
    let days = (as_of - first_date).num_days();
    let years_held = Decimal::from(days) / days_per_year();
    let bi_annual_periods = (years_held * Decimal::TWO).round_dp(2);

    let cagr_pct = compute_cagr(invested_capital, total_pl, years_held);

    Some(PositionSummary {
        ticker: ticker.to_string(),
        first_date,
        net_shares,
        current_price,
        price_source,
        market_value,
        total_pl,
        invested_capital,
        total_bought_shares,
        avg_buy_price,
        exited,
        re_entered,
        years_held,
        bi_annual_periods,
        cagr_pct,
    })
}

fn checked_sum(mut values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    values.try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Values past the Decimal range are reported as 0
fn or_zero(ticker: &str, metric: &str, value: Option<Decimal>) -> Decimal {
    value.unwrap_or_else(|| {
        warn!("{}: {} out of range, reporting 0", ticker, metric);
        Decimal::ZERO
    })
}

/// Compound annual growth rate in percent
///
/// Zero when nothing was invested or when the position lost everything
/// (a non-positive final value has no real growth rate).
pub fn compute_cagr(invested_capital: Decimal, total_pl: Decimal, years_held: Decimal) -> Decimal {
    if invested_capital <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let final_value = match invested_capital.checked_add(total_pl) {
        Some(v) if v > Decimal::ZERO => v,
        Some(_) => return Decimal::ZERO,
        None => {
            warn!("CAGR final value out of range ({} + {}), reporting 0", invested_capital, total_pl);
            return Decimal::ZERO;
        }
    };

    let growth = final_value.checked_div(invested_capital).and_then(|g| g.to_f64());
    let years = years_held.max(min_cagr_years()).to_f64();

    match (growth, years) {
        (Some(g), Some(y)) => {
            let cagr = (g.powf(1.0 / y) - 1.0) * 100.0;
            Decimal::from_f64(cagr).unwrap_or_else(|| {
                warn!("CAGR out of range (growth {}, years {}), reporting 0", g, y);
                Decimal::ZERO
            })
        }
        _ => Decimal::ZERO,
    }
}
