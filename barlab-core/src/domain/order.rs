//! Order intents — accepted risk decisions waiting for execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Side;

/// Only market orders are simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
}

/// Risk metadata riding on every accepted intent. Written verbatim into the
/// decision log and propagated onto positions and trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_source: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub stop_details: serde_json::Value,
    pub r_metrics_valid: bool,
    pub used_legacy_stop_proxy: bool,
    pub stop_resolution_mode: String,
    pub reduce_only: bool,
    pub reason_code: String,
    /// Estimated notional at decision time (qty * reference price).
    pub notional: f64,
    /// Initial margin the position will lock.
    pub margin_required: f64,
}

impl IntentMeta {
    /// Metadata for a reduce-only exit intent; stop resolution is bypassed.
    pub fn reduce_only(mode: &str, reason_code: &str) -> Self {
        Self {
            risk_amount: None,
            stop_price: None,
            stop_distance: None,
            stop_source: None,
            stop_details: serde_json::Value::Null,
            r_metrics_valid: false,
            used_legacy_stop_proxy: false,
            stop_resolution_mode: mode.to_string(),
            reduce_only: true,
            reason_code: reason_code.to_string(),
            notional: 0.0,
            margin_required: 0.0,
        }
    }
}

/// An accepted order intent. Always `qty > 0`; direction is carried by `side`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub ts_created: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub qty: f64,
    pub meta: IntentMeta,
}
