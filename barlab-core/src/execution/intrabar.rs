//! Intrabar price assumptions for market fills.

use crate::config::IntrabarMode;
use crate::domain::{Bar, Side};

/// Raw executed price within a bar, before spread/slippage.
///
/// `worst_case` fills buys at the high and sells at the low; `best_case`
/// inverts that; `midpoint` uses the middle of the bar's range for both.
pub fn raw_fill_price(mode: IntrabarMode, side: Side, bar: &Bar) -> f64 {
    match (mode, side) {
        (IntrabarMode::WorstCase, Side::Buy) => bar.high,
        (IntrabarMode::WorstCase, Side::Sell) => bar.low,
        (IntrabarMode::BestCase, Side::Buy) => bar.low,
        (IntrabarMode::BestCase, Side::Sell) => bar.high,
        (IntrabarMode::Midpoint, _) => bar.midpoint(),
    }
}
