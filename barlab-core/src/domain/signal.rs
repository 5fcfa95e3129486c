//! Strategy output: trade intent, not orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Direction of a signal, order, or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Raw stop payload attached to a signal, prior to risk normalization.
///
/// This mirrors the shape strategies emit; the risk engine's normalizer is
/// the only consumer and turns it into a validated `StopSpec` variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StopSpecPayload {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_stop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr_multiple: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr_indicator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hybrid_components: Vec<StopSpecPayload>,
}

/// A strategy's desired trade at one timestamp. Intent only: quantity,
/// pricing, and acceptance are decided downstream by the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub signal_type: String,
    /// Conviction in [0, 1].
    pub confidence: f64,
    /// Explicit stop price. Takes precedence over `stop_spec`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    /// Structured stop intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_spec: Option<StopSpecPayload>,
    #[serde(default)]
    pub is_exit: bool,
    #[serde(default)]
    pub reduce_only: bool,
    /// Free-form diagnostics carried through to the decision log.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Signal {
    pub fn entry(
        ts: DateTime<Utc>,
        symbol: impl Into<String>,
        side: Side,
        signal_type: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            symbol: symbol.into(),
            side,
            signal_type: signal_type.into(),
            confidence: 1.0,
            stop_price: None,
            stop_spec: None,
            is_exit: false,
            reduce_only: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn exit(
        ts: DateTime<Utc>,
        symbol: impl Into<String>,
        side: Side,
        signal_type: impl Into<String>,
    ) -> Self {
        let mut signal = Self::entry(ts, symbol, side, signal_type);
        signal.is_exit = true;
        signal
    }

    pub fn with_stop_price(mut self, stop_price: f64) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    /// An exit-like signal reduces or closes; it never opens exposure.
    pub fn is_exit_like(&self) -> bool {
        self.is_exit || self.reduce_only || self.signal_type.ends_with("_exit")
    }
}
