//! Stable reason/decision code strings.
//!
//! These are client-facing contract strings: they appear verbatim in
//! `decisions.jsonl`, `run_status.json`, and downstream analytics, and must
//! not change across releases.

// Rejections.
pub const RISK_REJECTED_INSUFFICIENT_MARGIN: &str = "risk_rejected:insufficient_margin";
pub const RISK_REJECTED_MAX_POSITIONS: &str = "risk_rejected:max_positions";
pub const RISK_REJECTED_NOTIONAL_CAP: &str = "risk_rejected:notional_cap";
pub const RISK_REJECTED_STOP_UNRESOLVABLE: &str = "risk_rejected:stop_unresolvable";
pub const RISK_REJECTED_STOP_UNRESOLVABLE_STRICT: &str = "risk_rejected:stop_unresolvable:strict";
pub const RISK_REJECTED_STOP_UNRESOLVABLE_SAFE_NO_PROXY: &str =
    "risk_rejected:stop_unresolvable:safe_no_proxy";
pub const RISK_REJECTED_MIN_STOP_DISTANCE: &str = "risk_rejected:min_stop_distance";
pub const RISK_REJECTED_INDICATOR_NOT_READY: &str = "risk_rejected:indicator_not_ready";
pub const RISK_REJECTED_QTY_BELOW_LOT: &str = "risk_rejected:qty_below_lot";
pub const RISK_REJECTED_CLOSE_ONLY_NO_POSITION: &str = "risk_rejected:close_only_no_position";

// Approvals.
pub const RISK_APPROVED_CLOSE_ONLY: &str = "risk_approved:close_only";
pub const RESOLVED_EXPLICIT: &str = "resolved_explicit";
pub const RESOLVED_STRUCTURAL: &str = "resolved_structural";
pub const RESOLVED_ATR: &str = "resolved_atr";
pub const RESOLVED_HYBRID: &str = "resolved_hybrid";
pub const FALLBACK_LEGACY_PROXY: &str = "fallback_legacy_proxy";

// Forced liquidations.
pub const LIQUIDATION_END_OF_RUN: &str = "liquidation:end_of_run";
pub const LIQUIDATION_NEGATIVE_FREE_MARGIN: &str = "liquidation:negative_free_margin";

// Stop-source provenance labels. Kept for artifact compatibility with the
// older decision-log consumers; `reason_code` carries the richer taxonomy.
pub const SOURCE_EXPLICIT: &str = "explicit_stop_price";
pub const SOURCE_STRUCTURAL: &str = "structural_stop";
pub const SOURCE_ATR: &str = "atr_multiple";
pub const SOURCE_HYBRID: &str = "hybrid";
pub const SOURCE_LEGACY_PROXY: &str = "legacy_high_low_proxy";

/// All stable codes, for artifact validation.
pub const ALL_CODES: &[&str] = &[
    RISK_REJECTED_INSUFFICIENT_MARGIN,
    RISK_REJECTED_MAX_POSITIONS,
    RISK_REJECTED_NOTIONAL_CAP,
    RISK_REJECTED_STOP_UNRESOLVABLE,
    RISK_REJECTED_STOP_UNRESOLVABLE_STRICT,
    RISK_REJECTED_STOP_UNRESOLVABLE_SAFE_NO_PROXY,
    RISK_REJECTED_MIN_STOP_DISTANCE,
    RISK_REJECTED_INDICATOR_NOT_READY,
    RISK_REJECTED_QTY_BELOW_LOT,
    RISK_REJECTED_CLOSE_ONLY_NO_POSITION,
    RISK_APPROVED_CLOSE_ONLY,
    RESOLVED_EXPLICIT,
    RESOLVED_STRUCTURAL,
    RESOLVED_ATR,
    RESOLVED_HYBRID,
    FALLBACK_LEGACY_PROXY,
    LIQUIDATION_END_OF_RUN,
    LIQUIDATION_NEGATIVE_FREE_MARGIN,
];

pub fn is_known(code: &str) -> bool {
    ALL_CODES.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(RISK_REJECTED_MAX_POSITIONS, "risk_rejected:max_positions");
        assert_eq!(
            RISK_REJECTED_STOP_UNRESOLVABLE_STRICT,
            "risk_rejected:stop_unresolvable:strict"
        );
        assert_eq!(LIQUIDATION_END_OF_RUN, "liquidation:end_of_run");
        assert!(is_known(FALLBACK_LEGACY_PROXY));
        assert!(!is_known("risk_rejected:made_up"));
    }
}
