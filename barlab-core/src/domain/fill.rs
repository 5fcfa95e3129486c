//! Fill — a completed order execution with its cost decomposition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::RiskProvenance;
use super::signal::Side;

/// Execution context stamped onto a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillMeta {
    pub intrabar_mode: String,
    pub delay_bars: u32,
    /// Set when the fill was produced by a forced liquidation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidation: Option<String>,
    /// Risk provenance from the originating intent (entries only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskProvenance>,
}

/// Record of a market order fill. `price` is the final executed price after
/// the intrabar/spread/slippage pipeline; costs are recorded separately and
/// are always non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub ts_filled: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub fee_cost: f64,
    pub slippage_cost: f64,
    pub spread_cost: f64,
    pub meta: FillMeta,
}

impl Fill {
    /// Total execution friction on this fill.
    pub fn total_cost(&self) -> f64 {
        self.fee_cost + self.slippage_cost + self.spread_cost
    }

    pub fn notional(&self) -> f64 {
        self.qty.abs() * self.price
    }
}
