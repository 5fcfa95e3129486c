//! Fill cost pipeline: spread, then slippage, then fee.
//!
//! Each step adjusts the running price in the adverse direction for the
//! order's side (buys pay more, sells receive less). Cost amounts are the
//! per-step price deltas times quantity, always non-negative.

use crate::config::{ExecutionProfile, IntrabarMode, SpreadMode};
use crate::domain::{Bar, Side};

use super::intrabar::raw_fill_price;

/// Final executed price with the cost decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedFill {
    pub price: f64,
    pub fee_cost: f64,
    pub slippage_cost: f64,
    pub spread_cost: f64,
}

/// Apply the full pipeline to one order against one bar.
///
/// Order of operations is fixed and observable: intrabar raw price, then the
/// half-spread (`fixed_bps` mode pays `spread_bps / 2` per side), then
/// slippage, then the taker fee on the final notional.
pub fn price_fill(
    profile: &ExecutionProfile,
    spread_mode: SpreadMode,
    intrabar_mode: IntrabarMode,
    side: Side,
    qty: f64,
    bar: &Bar,
) -> PricedFill {
    let raw = raw_fill_price(intrabar_mode, side, bar);

    let after_spread = match spread_mode {
        SpreadMode::None => raw,
        SpreadMode::FixedBps => {
            raw + side.sign() * (profile.spread_bps / 2.0 / 10_000.0) * raw
        }
    };
    let spread_cost = (after_spread - raw).abs() * qty.abs();

    let after_slippage =
        after_spread + side.sign() * (profile.slippage_bps / 10_000.0) * after_spread;
    let slippage_cost = (after_slippage - after_spread).abs() * qty.abs();

    let fee_cost = profile.taker_fee * (qty * after_slippage).abs();

    PricedFill { price: after_slippage, fee_cost, slippage_cost, spread_cost }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar() -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        Bar::new(ts, "AAA", 100.0, 102.0, 100.0, 101.0, 10.0)
    }

    #[test]
    fn tier2_buy_worst_case_matches_hand_math() {
        let profile = ExecutionProfile::builtin("tier2").unwrap();
        let fill = price_fill(
            &profile,
            SpreadMode::FixedBps,
            IntrabarMode::WorstCase,
            Side::Buy,
            100.0,
            &bar(),
        );

        // raw = high = 102; half-spread 0.5 bps; slippage 2 bps.
        let after_spread = 102.0 * (1.0 + 0.5 / 10_000.0);
        let expected = after_spread * (1.0 + 2.0 / 10_000.0);
        assert!((fill.price - expected).abs() < 1e-12);
        assert!((fill.spread_cost - (after_spread - 102.0) * 100.0).abs() < 1e-12);
        assert!((fill.slippage_cost - (expected - after_spread) * 100.0).abs() < 1e-12);
        assert!((fill.fee_cost - 0.0006 * 100.0 * expected).abs() < 1e-12);
    }

    #[test]
    fn sell_side_receives_less() {
        let profile = ExecutionProfile::builtin("tier2").unwrap();
        let fill = price_fill(
            &profile,
            SpreadMode::FixedBps,
            IntrabarMode::WorstCase,
            Side::Sell,
            10.0,
            &bar(),
        );
        // raw = low = 100; both adjustments push the price down.
        assert!(fill.price < 100.0);
        assert!(fill.spread_cost > 0.0);
        assert!(fill.slippage_cost > 0.0);
    }

    #[test]
    fn spread_mode_none_skips_spread() {
        let profile = ExecutionProfile::builtin("tier2").unwrap();
        let fill = price_fill(
            &profile,
            SpreadMode::None,
            IntrabarMode::Midpoint,
            Side::Buy,
            10.0,
            &bar(),
        );
        assert_eq!(fill.spread_cost, 0.0);
        // midpoint = 101, slipped by 2 bps.
        assert!((fill.price - 101.0 * 1.0002).abs() < 1e-12);
    }

    #[test]
    fn tier1_frictionless_spread_and_delay() {
        let profile = ExecutionProfile::builtin("tier1").unwrap();
        let fill = price_fill(
            &profile,
            SpreadMode::None,
            IntrabarMode::BestCase,
            Side::Buy,
            10.0,
            &bar(),
        );
        // raw = low = 100, slippage 0.5 bps only.
        assert!((fill.price - 100.0 * 1.00005).abs() < 1e-12);
        assert_eq!(fill.spread_cost, 0.0);
    }

    #[test]
    fn costs_are_non_negative_for_both_sides() {
        let profile = ExecutionProfile::builtin("tier3").unwrap();
        for side in [Side::Buy, Side::Sell] {
            let fill = price_fill(
                &profile,
                SpreadMode::FixedBps,
                IntrabarMode::WorstCase,
                side,
                5.0,
                &bar(),
            );
            assert!(fill.fee_cost >= 0.0);
            assert!(fill.slippage_cost >= 0.0);
            assert!(fill.spread_cost >= 0.0);
        }
    }
}
