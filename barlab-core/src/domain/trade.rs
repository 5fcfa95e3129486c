//! Closed trade record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Side;

/// One closed (or reduced) round trip. Emitted by the position book whenever
/// an opposite-side fill reduces an open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Price PnL before any costs.
    pub pnl_price: f64,
    /// Entry + exit fees attributed to this trade.
    pub fees_paid: f64,
    /// `pnl_price - fees_paid`.
    pub pnl_net: f64,
    /// Entry + exit slippage/spread friction attributed to this trade.
    pub slippage: f64,
    pub mae_price: f64,
    pub mfe_price: f64,
    pub risk_amount: Option<f64>,
    pub stop_distance: Option<f64>,
    /// `pnl_price / risk_amount`; only defined when risk metrics are valid.
    pub r_multiple_gross: Option<f64>,
    /// `pnl_net / risk_amount`; only defined when risk metrics are valid.
    pub r_multiple_net: Option<f64>,
    /// Optional analytics bucket label (strategy-assigned).
    pub bucket: Option<String>,
}

/// `pnl / risk_amount` when the risk amount is present and positive.
pub fn r_multiple(pnl: f64, risk_amount: Option<f64>) -> Option<f64> {
    match risk_amount {
        Some(amount) if amount > 0.0 => Some(pnl / amount),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_multiple_requires_positive_risk() {
        assert_eq!(r_multiple(50.0, Some(100.0)), Some(0.5));
        assert_eq!(r_multiple(50.0, Some(0.0)), None);
        assert_eq!(r_multiple(50.0, None), None);
    }
}
