//! Position — an open holding in a single symbol, with MAE/MFE tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bar::Bar;
use super::signal::Side;

/// Risk provenance captured from the opening intent, propagated onto the
/// closing trade so R-multiples can be reconstructed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskProvenance {
    pub risk_amount: Option<f64>,
    pub stop_distance: Option<f64>,
    pub stop_source: Option<String>,
    pub r_metrics_valid: bool,
    pub used_legacy_stop_proxy: bool,
}

/// An open position. Invariant: `qty > 0`; direction is carried by `side`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub avg_price: f64,
    pub open_ts: DateTime<Utc>,
    /// Entry-side fees accumulated so far (exit fees land on the trade).
    pub fees_paid: f64,
    /// Entry-side slippage + spread accumulated so far.
    pub friction_paid: f64,
    /// Worst price observed since entry (adverse excursion level).
    pub mae_price: f64,
    /// Best price observed since entry (favorable excursion level).
    pub mfe_price: f64,
    pub risk: RiskProvenance,
}

impl Position {
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        qty: f64,
        price: f64,
        open_ts: DateTime<Utc>,
        risk: RiskProvenance,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            qty,
            avg_price: price,
            open_ts,
            fees_paid: 0.0,
            friction_paid: 0.0,
            mae_price: price,
            mfe_price: price,
            risk,
        }
    }

    /// Track MAE/MFE from a bar's extremes.
    ///
    /// For longs the adverse level is the lowest low and the favorable level
    /// the highest high since entry; for shorts the roles flip.
    pub fn observe_bar(&mut self, bar: &Bar) {
        match self.side {
            Side::Buy => {
                self.mae_price = self.mae_price.min(bar.low);
                self.mfe_price = self.mfe_price.max(bar.high);
            }
            Side::Sell => {
                self.mae_price = self.mae_price.max(bar.high);
                self.mfe_price = self.mfe_price.min(bar.low);
            }
        }
    }

    /// Price PnL of closing `qty` units at `price` (fees excluded).
    pub fn price_pnl(&self, price: f64, qty: f64) -> f64 {
        (price - self.avg_price) * qty * self.side.sign()
    }

    /// Unrealized price PnL at a mark price.
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.price_pnl(mark, self.qty)
    }

    pub fn notional(&self, mark: f64) -> f64 {
        self.qty * mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bar(high: f64, low: f64) -> Bar {
        Bar::new(ts0(), "AAA", (high + low) / 2.0, high, low, (high + low) / 2.0, 1.0)
    }

    #[test]
    fn long_unrealized_pnl() {
        let pos = Position::open("AAA", Side::Buy, 10.0, 100.0, ts0(), RiskProvenance::default());
        assert_eq!(pos.unrealized_pnl(110.0), 100.0);
        assert_eq!(pos.unrealized_pnl(90.0), -100.0);
    }

    #[test]
    fn short_unrealized_pnl() {
        let pos = Position::open("AAA", Side::Sell, 10.0, 100.0, ts0(), RiskProvenance::default());
        assert_eq!(pos.unrealized_pnl(90.0), 100.0);
    }

    #[test]
    fn long_mae_mfe_from_bar_extremes() {
        let mut pos = Position::open("AAA", Side::Buy, 1.0, 100.0, ts0(), RiskProvenance::default());
        pos.observe_bar(&bar(108.0, 97.0));
        pos.observe_bar(&bar(104.0, 99.0));
        assert_eq!(pos.mae_price, 97.0);
        assert_eq!(pos.mfe_price, 108.0);
    }

    #[test]
    fn short_mae_is_highest_high() {
        let mut pos = Position::open("AAA", Side::Sell, 1.0, 100.0, ts0(), RiskProvenance::default());
        pos.observe_bar(&bar(108.0, 97.0));
        assert_eq!(pos.mae_price, 108.0);
        assert_eq!(pos.mfe_price, 97.0);
    }
}
