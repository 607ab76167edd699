//! Output formatting module for CLI display
//!
//! Keeps terminal presentation (tables, colors, status lines) apart from the
//! audit computations.

use colored::Colorize;
use rust_decimal::Decimal;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::dispatcher::AuditOutcome;
use crate::ledger::SplitEvent;
use crate::reports::{AuditReport, PriceSource};
use crate::utils::{format_currency, format_fixed, yes_no};

fn colored_pl(value: Decimal, text: String) -> String {
    if value >= Decimal::ZERO {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

/// Format an audit report for terminal table output
pub fn format_report_table(report: &AuditReport) -> String {
    if report.is_empty() {
        return format!("{} No positions found in the trade history\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct AuditRow {
        #[tabled(rename = "Ticker")]
        ticker: String,
        #[tabled(rename = "Since")]
        initial_year: i32,
        #[tabled(rename = "Avg Paid")]
        avg_price_paid: String,
        #[tabled(rename = "Price")]
        current_price: String,
        #[tabled(rename = "Shares")]
        current_shares: String,
        #[tabled(rename = "Position")]
        position_size: String,
        #[tabled(rename = "Total P&L")]
        total_pl: String,
        #[tabled(rename = "CAGR %")]
        cagr: String,
        #[tabled(rename = "Exited")]
        exited: &'static str,
        #[tabled(rename = "Re-entered")]
        re_entered: &'static str,
        #[tabled(rename = "Half-years")]
        bi_annual_periods: String,
        #[tabled(rename = "Years")]
        years_held: String,
    }

    let rows: Vec<AuditRow> = report
        .records
        .iter()
        .map(|r| AuditRow {
            ticker: r.ticker.clone(),
            initial_year: r.initial_year,
            avg_price_paid: format_currency(r.avg_price_paid),
            current_price: format_currency(r.current_price),
            current_shares: format_fixed(r.current_shares, 2),
            position_size: format_currency(r.position_size_usd),
            total_pl: colored_pl(r.total_pl_usd, format_currency(r.total_pl_usd)),
            cagr: colored_pl(r.cagr_pct, format!("{}%", format_fixed(r.cagr_pct, 2))),
            exited: yes_no(r.exited),
            re_entered: yes_no(r.re_entered),
            bi_annual_periods: format_fixed(r.bi_annual_periods, 2),
            years_held: format_fixed(r.years_held, 2),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    // Right-align numeric columns (Ticker and Since stay left)
    table.modify(Columns::new(2..8), Alignment::right());
    table.modify(Columns::new(10..), Alignment::right());

    let mut output = table.to_string();

    let total_position: Decimal = report.records.iter().map(|r| r.position_size_usd).sum();
    let total_pl: Decimal = report.records.iter().map(|r| r.total_pl_usd).sum();

    output.push_str(&format!("\n\n{} Summary", "━".repeat(60).bright_black()));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Open Positions:".bold(),
        format_currency(total_position)
    ));
    output.push_str(&format!(
        "\n{:<20} {}\n",
        "Total P&L:".bold(),
        colored_pl(total_pl, format_currency(total_pl))
    ));

    output
}

/// Row counts and fallbacks for a finished run
pub fn format_run_summary(outcome: &AuditOutcome) -> String {
    let stats = &outcome.stats;
    let mut output = format!(
        "  Rows read: {}, kept: {}, dropped: {}\n",
        stats.rows_read,
        stats.rows_kept.to_string().green(),
        if stats.rows_dropped() > 0 {
            stats.rows_dropped().to_string().yellow()
        } else {
            stats.rows_dropped().to_string().normal()
        }
    );
    if stats.rows_dropped() > 0 {
        output.push_str(&format!(
            "    ({} unresolved ticker, {} bad date)\n",
            stats.dropped_unresolved_ticker, stats.dropped_bad_date
        ));
    }
    output.push_str(&format!(
        "  Tickers processed: {}\n",
        outcome.tickers_processed()
    ));
    output.push_str(&format!(
        "  Split-adjusted transactions: {}\n",
        outcome.split_adjusted_transactions
    ));

    let fallbacks: Vec<&str> = outcome
        .summaries
        .iter()
        .filter(|s| s.price_source == PriceSource::LastTrade)
        .map(|s| s.ticker.as_str())
        .collect();
    if !fallbacks.is_empty() {
        output.push_str(&format!(
            "  {} Valued at last trade price: {}\n",
            "⚠".yellow(),
            fallbacks.join(", ")
        ));
    }
    if outcome.split_fetch_failures > 0 {
        output.push_str(&format!(
            "  {} Split history unavailable for {} ticker(s)\n",
            "⚠".yellow(),
            outcome.split_fetch_failures
        ));
    }
    if !outcome.failed_tickers.is_empty() {
        output.push_str(&format!(
            "  {} Skipped after internal error: {}\n",
            "✗".red(),
            outcome.failed_tickers.join(", ")
        ));
    }

    output
}

/// Split schedule table for one ticker
pub fn format_splits_table(ticker: &str, splits: &[SplitEvent]) -> String {
    if splits.is_empty() {
        return format!("{} No splits found for {}\n", "ℹ".blue().bold(), ticker.bold());
    }

    #[derive(Tabled)]
    struct SplitRow {
        #[tabled(rename = "Effective")]
        date: String,
        #[tabled(rename = "Ratio")]
        ratio: String,
        #[tabled(rename = "Factor")]
        cumulative: String,
    }

    // Cumulative factor applied to a trade made before each split
    let mut cumulative = Decimal::ONE;
    let mut rows: Vec<SplitRow> = splits
        .iter()
        .rev()
        .map(|s| {
            cumulative *= s.ratio;
            SplitRow {
                date: s.effective_date.format("%Y-%m-%d").to_string(),
                ratio: s.ratio.normalize().to_string(),
                cumulative: cumulative.normalize().to_string(),
            }
        })
        .collect();
    rows.reverse();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(1..), Alignment::right());

    format!("\n{} Splits for {}\n\n{}\n", "📈".cyan().bold(), ticker.bold(), table)
}

pub fn format_status_success(path: &str) -> String {
    format!("STATUS: SUCCESS\nPATH: {}", path)
}

pub fn format_status_failure(message: &str) -> String {
    format!("STATUS: FAILED\nERROR: {}", message)
}
