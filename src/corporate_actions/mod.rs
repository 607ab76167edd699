// Corporate actions module - Split adjustment engine

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::ledger::{SplitEvent, Transaction};

/// Cumulative split factor for a trade made on `date`: the product of the
/// ratios of every split that took effect strictly after that date.
///
/// A trade on the split's effective date already reflects the split and is
/// not adjusted for it. Non-positive ratios are ignored.
pub fn cumulative_factor(date: chrono::NaiveDate, splits: &[SplitEvent]) -> Decimal {
    splits
        .iter()
        .filter(|s| s.ratio > Decimal::ZERO && date < s.effective_date)
        .fold(Decimal::ONE, |acc, s| acc.saturating_mul(s.ratio))
}

/// Rewrite a ticker's ledger in today's share units
///
/// For splits:    new_shares = old_shares × factor
///                new_price  = old_price  / factor
///
/// where `factor` is the product of all split ratios effective after the
/// trade date. Cash values are untouched, so shares × price is preserved.
/// The split schedule may come in any order; the result is the same.
///
/// Returns the number of transactions adjusted.
pub fn apply_splits(ledger: &mut [Transaction], splits: &[SplitEvent]) -> usize {
    if splits.is_empty() || ledger.is_empty() {
        return 0;
    }

    for split in splits.iter().filter(|s| s.ratio <= Decimal::ZERO) {
        warn!(
            "Ignoring split on {} with non-positive ratio {}",
            split.effective_date, split.ratio
        );
    }

    let mut adjusted_count = 0;
    for tx in ledger.iter_mut() {
        let factor = cumulative_factor(tx.date, splits);
        if factor == Decimal::ONE {
            continue;
        }

        let old_shares = tx.shares;
        let old_price = tx.price;

        let (Some(new_shares), Some(new_price)) =
            (old_shares.checked_mul(factor), old_price.checked_div(factor))
        else {
            warn!(
                "{} {}: split factor {} out of range, leaving trade unadjusted",
                tx.ticker, tx.date, factor
            );
            continue;
        };
        tx.shares = new_shares;
        tx.price = new_price;

        debug!(
            "{} {}: shares {} -> {}, price {} -> {} (factor {})",
            tx.ticker, tx.date, old_shares, tx.shares, old_price, tx.price, factor
        );

        // Verify adjustments (trade value should remain unchanged)
        let expected_total = old_shares.checked_mul(old_price);
        let actual_total = tx.shares.checked_mul(tx.price);
        let diff = match (expected_total, actual_total) {
            (Some(e), Some(a)) => a.checked_sub(e).map(|d| d.abs()),
            _ => None,
        };
        if diff.map_or(true, |d| d > Decimal::new(1, 2)) {
            warn!(
                "Trade value changed for {} on {}: {:?} -> {:?} (diff: {:?})",
                tx.ticker, tx.date, expected_total, actual_total, diff
            );
        }

        adjusted_count += 1;
    }

    if adjusted_count > 0 {
        info!(
            "Split-adjusted {} transactions for {} ({} split events)",
            adjusted_count,
            ledger[0].ticker,
            splits.len()
        );
    }

    adjusted_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TradeAction;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn buy(on: NaiveDate, shares: Decimal, price: Decimal) -> Transaction {
        Transaction {
            ticker: "AAPL".to_string(),
            trade_action: TradeAction::Buy,
            date: on,
            shares,
            price,
            cash_value: -(shares * price),
        }
    }

    #[test]
    fn test_split_calculation() {
        // 2-for-1 split - each share becomes 2
        let mut ledger = vec![buy(date(2000, 1, 1), dec!(100), dec!(50))];
        let splits = [SplitEvent::new(date(2005, 1, 1), dec!(2))];

        assert_eq!(apply_splits(&mut ledger, &splits), 1);
        assert_eq!(ledger[0].shares, dec!(200));
        assert_eq!(ledger[0].price, dec!(25));
        assert_eq!(ledger[0].cash_value, dec!(-5000)); // Cash unchanged
    }

    #[test]
    fn test_oversized_split_factor_leaves_trade_unadjusted() {
        let mut ledger = vec![buy(date(2000, 1, 1), dec!(1000000000000000000), dec!(1))];
        let splits = [
            SplitEvent::new(date(2001, 1, 1), dec!(1000000000000000)),
            SplitEvent::new(date(2002, 1, 1), dec!(1000000000000000)),
        ];

        assert_eq!(apply_splits(&mut ledger, &splits), 0);
        assert_eq!(ledger[0].shares, dec!(1000000000000000000));
        assert_eq!(ledger[0].price, dec!(1));
    }

    #[test]
    fn test_reverse_split_calculation() {
        // 1-for-10 reverse split - 10 shares become 1
        let mut ledger = vec![buy(date(2000, 1, 1), dec!(100), dec!(5))];
        let splits = [SplitEvent::new(date(2001, 1, 1), dec!(0.1))];

        apply_splits(&mut ledger, &splits);
        assert_eq!(ledger[0].shares, dec!(10));
        assert_eq!(ledger[0].price, dec!(50));
    }

    #[test]
    fn test_split_boundary_is_strict() {
        let split_day = date(2014, 6, 9);
        let mut ledger = vec![
            buy(date(2014, 6, 8), dec!(10), dec!(600)),
            buy(split_day, dec!(70), dec!(90)),
        ];
        let splits = [SplitEvent::new(split_day, dec!(7))];

        assert_eq!(apply_splits(&mut ledger, &splits), 1);
        // Day before: adjusted
        assert_eq!(ledger[0].shares, dec!(70));
        // Same day: already in post-split units
        assert_eq!(ledger[1].shares, dec!(70));
        assert_eq!(ledger[1].price, dec!(90));
    }

    #[test]
    fn test_cumulative_splits() {
        let mut ledger = vec![
            buy(date(1999, 1, 1), dec!(1), dec!(400)),
            buy(date(2003, 1, 1), dec!(1), dec!(100)),
            buy(date(2010, 1, 1), dec!(1), dec!(30)),
        ];
        let splits = [
            SplitEvent::new(date(2000, 6, 21), dec!(2)),
            SplitEvent::new(date(2005, 2, 28), dec!(2)),
        ];

        assert_eq!(apply_splits(&mut ledger, &splits), 2);
        assert_eq!(ledger[0].shares, dec!(4));
        assert_eq!(ledger[0].price, dec!(100));
        assert_eq!(ledger[1].shares, dec!(2));
        assert_eq!(ledger[1].price, dec!(50));
        assert_eq!(ledger[2].shares, dec!(1));
    }

    #[test]
    fn test_split_order_does_not_matter() {
        let original = vec![
            buy(date(1998, 3, 1), dec!(100), dec!(90)),
            buy(date(2002, 3, 1), dec!(50), dec!(40)),
        ];
        let a = SplitEvent::new(date(2000, 1, 1), dec!(3));
        let b = SplitEvent::new(date(2004, 1, 1), dec!(2));

        let mut forward = original.clone();
        apply_splits(&mut forward, &[a, b]);
        let mut backward = original.clone();
        apply_splits(&mut backward, &[b, a]);

        let tolerance = dec!(0.0000001);
        for (f, r) in forward.iter().zip(&backward) {
            assert!((f.shares - r.shares).abs() < tolerance);
            assert!((f.price - r.price).abs() < tolerance);
        }
        assert_eq!(forward[0].shares, dec!(600));
        assert_eq!(forward[0].price, dec!(15));
    }

    #[test]
    fn test_no_splits_leaves_ledger_untouched() {
        let original = vec![buy(date(2000, 1, 1), dec!(100), dec!(50))];
        let mut ledger = original.clone();
        assert_eq!(apply_splits(&mut ledger, &[]), 0);
        assert_eq!(ledger, original);
    }

    #[test]
    fn test_non_positive_ratio_ignored() {
        let mut ledger = vec![buy(date(2000, 1, 1), dec!(100), dec!(50))];
        let splits = [
            SplitEvent::new(date(2005, 1, 1), Decimal::ZERO),
            SplitEvent::new(date(2006, 1, 1), dec!(-2)),
        ];
        assert_eq!(apply_splits(&mut ledger, &splits), 0);
        assert_eq!(ledger[0].shares, dec!(100));
    }

    #[test]
    fn test_sell_shares_keep_sign() {
        let mut ledger = vec![Transaction {
            ticker: "AAPL".to_string(),
            trade_action: TradeAction::Sell,
            date: date(2000, 1, 1),
            shares: dec!(-10),
            price: dec!(100),
            cash_value: dec!(1000),
        }];
        apply_splits(&mut ledger, &[SplitEvent::new(date(2001, 1, 1), dec!(4))]);
        assert_eq!(ledger[0].shares, dec!(-40));
        assert_eq!(ledger[0].price, dec!(25));
    }
}
