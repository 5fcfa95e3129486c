//! Per-run sanity counters, surfaced in `run_status.json`.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::risk::codes;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SanityCounters {
    pub signals_emitted: u64,
    pub signals_approved: u64,
    pub signals_rejected: u64,
    pub approved_by_reason: BTreeMap<String, u64>,
    pub rejected_by_reason: BTreeMap<String, u64>,
    pub fills: u64,
    pub closed_trades: u64,
    pub forced_liquidations: u64,
    /// Stop-contract accounting keyed by stable count names.
    pub stop_resolution_counts: BTreeMap<String, u64>,
}

/// Collapse `risk_rejected:<head>[:rest]` to its head segment for the
/// by-reason histogram.
fn rejection_key(reason_code: &str) -> String {
    match reason_code.strip_prefix("risk_rejected:") {
        Some(rest) => rest.split(':').next().unwrap_or(rest).to_string(),
        None => reason_code.to_string(),
    }
}

fn stop_count_key(reason_code: &str) -> Option<&'static str> {
    match reason_code {
        codes::RESOLVED_EXPLICIT => Some("resolved_explicit"),
        codes::RESOLVED_STRUCTURAL => Some("resolved_structural"),
        codes::RESOLVED_ATR => Some("resolved_atr"),
        codes::RESOLVED_HYBRID => Some("resolved_hybrid"),
        codes::FALLBACK_LEGACY_PROXY => Some("fallback_legacy_proxy"),
        codes::RISK_REJECTED_STOP_UNRESOLVABLE_STRICT
        | codes::RISK_REJECTED_STOP_UNRESOLVABLE_SAFE_NO_PROXY => Some("rejected_missing_stop"),
        codes::RISK_REJECTED_STOP_UNRESOLVABLE
        | codes::RISK_REJECTED_INDICATOR_NOT_READY => Some("rejected_unresolvable_stop"),
        _ => None,
    }
}

impl SanityCounters {
    pub fn record_decision(&mut self, approved: bool, reason_code: &str) {
        self.signals_emitted += 1;
        if approved {
            self.signals_approved += 1;
            *self.approved_by_reason.entry(reason_code.to_string()).or_insert(0) += 1;
        } else {
            self.signals_rejected += 1;
            *self.rejected_by_reason.entry(rejection_key(reason_code)).or_insert(0) += 1;
        }
        if let Some(key) = stop_count_key(reason_code) {
            *self.stop_resolution_counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }
}
