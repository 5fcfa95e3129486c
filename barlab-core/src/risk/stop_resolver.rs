//! Stop distance resolution.
//!
//! Turns a normalized `StopSpec` into a concrete stop distance for sizing,
//! or a rejection. Rejections here are decisions (recorded and skipped),
//! never errors.

use serde_json::json;

use crate::domain::{Bar, Side};
use crate::indicators::IndicatorRegistry;

use super::codes;
use super::stop_spec::{HybridPolicy, StopSpec};

/// Successful stop resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct StopResolution {
    pub stop_price: Option<f64>,
    pub stop_distance: f64,
    pub stop_source: String,
    pub used_fallback: bool,
    pub reason_code: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Resolved(StopResolution),
    Rejected { reason_code: String, detail: String },
}

fn rejected(reason_code: &str, detail: impl Into<String>) -> StopOutcome {
    StopOutcome::Rejected { reason_code: reason_code.to_string(), detail: detail.into() }
}

/// Validate that an explicit/structural stop sits on the protective side of
/// the entry for the given direction.
fn directional_distance(side: Side, entry_price: f64, stop_price: f64) -> Option<f64> {
    let valid = match side {
        Side::Buy => stop_price < entry_price,
        Side::Sell => stop_price > entry_price,
    };
    if !valid {
        return None;
    }
    let distance = (entry_price - stop_price).abs();
    (distance > 0.0).then_some(distance)
}

/// Resolve a stop spec against the current market state.
///
/// `proxy_bar` is the most recently completed bar for the symbol (the bar
/// the decision is made on, i.e. the bar before any eventual fill); the
/// legacy proxy measures its distance from that bar's extremes.
/// `default_policy` applies to hybrid specs that do not carry their own
/// policy.
pub fn resolve_stop(
    spec: &StopSpec,
    symbol: &str,
    side: Side,
    entry_price: f64,
    proxy_bar: Option<&Bar>,
    indicators: &IndicatorRegistry,
    default_policy: HybridPolicy,
) -> StopOutcome {
    if entry_price <= 0.0 {
        return rejected(
            codes::RISK_REJECTED_STOP_UNRESOLVABLE,
            format!("{symbol}: entry_price must be > 0, got {entry_price}"),
        );
    }

    match spec {
        StopSpec::Explicit { stop_price } => {
            match directional_distance(side, entry_price, *stop_price) {
                Some(stop_distance) => StopOutcome::Resolved(StopResolution {
                    stop_price: Some(*stop_price),
                    stop_distance,
                    stop_source: codes::SOURCE_EXPLICIT.to_string(),
                    used_fallback: false,
                    reason_code: codes::RESOLVED_EXPLICIT.to_string(),
                    details: json!({ "stop_price": stop_price }),
                }),
                None => rejected(
                    codes::RISK_REJECTED_STOP_UNRESOLVABLE,
                    format!(
                        "{symbol}: invalid stop_price for {side}: stop={stop_price} \
                         entry={entry_price}"
                    ),
                ),
            }
        }
        StopSpec::Structural { stop_price } => {
            match directional_distance(side, entry_price, *stop_price) {
                Some(stop_distance) => StopOutcome::Resolved(StopResolution {
                    stop_price: Some(*stop_price),
                    stop_distance,
                    stop_source: codes::SOURCE_STRUCTURAL.to_string(),
                    used_fallback: false,
                    reason_code: codes::RESOLVED_STRUCTURAL.to_string(),
                    details: json!({ "structural_stop": stop_price }),
                }),
                None => rejected(
                    codes::RISK_REJECTED_STOP_UNRESOLVABLE,
                    format!(
                        "{symbol}: invalid structural stop for {side}: stop={stop_price} \
                         entry={entry_price}"
                    ),
                ),
            }
        }
        StopSpec::Atr { atr_multiple, atr_indicator } => {
            if !indicators.is_ready(symbol, atr_indicator) {
                return rejected(
                    codes::RISK_REJECTED_INDICATOR_NOT_READY,
                    format!(
                        "{symbol}: ATR indicator '{atr_indicator}' is not ready; \
                         ensure enough history is available before sizing"
                    ),
                );
            }
            let atr_value = indicators
                .value(symbol, atr_indicator)
                .expect("ready indicator has a value");
            if atr_value <= 0.0 {
                return rejected(
                    codes::RISK_REJECTED_STOP_UNRESOLVABLE,
                    format!("{symbol}: ATR '{atr_indicator}' must be > 0, got {atr_value}"),
                );
            }
            let stop_distance = atr_multiple * atr_value;
            let stop_price = entry_price - side.sign() * stop_distance;
            StopOutcome::Resolved(StopResolution {
                stop_price: Some(stop_price),
                stop_distance,
                stop_source: codes::SOURCE_ATR.to_string(),
                used_fallback: false,
                reason_code: codes::RESOLVED_ATR.to_string(),
                details: json!({
                    "atr_multiple": atr_multiple,
                    "atr_value": atr_value,
                    "atr_name": atr_indicator,
                }),
            })
        }
        StopSpec::Hybrid { components, policy } => {
            let mut resolved = Vec::with_capacity(components.len());
            for component in components {
                match resolve_stop(
                    component,
                    symbol,
                    side,
                    entry_price,
                    proxy_bar,
                    indicators,
                    default_policy,
                ) {
                    StopOutcome::Resolved(resolution) => resolved.push(resolution),
                    rejection @ StopOutcome::Rejected { .. } => return rejection,
                }
            }

            // Signal-local policy wins over the global default.
            let effective = policy.unwrap_or(default_policy);
            let chosen = match effective {
                HybridPolicy::Wider => resolved
                    .iter()
                    .max_by(|a, b| a.stop_distance.total_cmp(&b.stop_distance)),
                HybridPolicy::Tighter => resolved
                    .iter()
                    .min_by(|a, b| a.stop_distance.total_cmp(&b.stop_distance)),
            }
            .expect("hybrid has at least two components");

            let stop_distance = chosen.stop_distance;
            let stop_price = entry_price - side.sign() * stop_distance;
            StopOutcome::Resolved(StopResolution {
                stop_price: Some(stop_price),
                stop_distance,
                stop_source: codes::SOURCE_HYBRID.to_string(),
                used_fallback: false,
                reason_code: codes::RESOLVED_HYBRID.to_string(),
                details: json!({
                    "hybrid_policy": match effective {
                        HybridPolicy::Wider => "wider",
                        HybridPolicy::Tighter => "tighter",
                    },
                    "component_sources":
                        resolved.iter().map(|r| r.stop_source.clone()).collect::<Vec<_>>(),
                    "component_distances":
                        resolved.iter().map(|r| r.stop_distance).collect::<Vec<_>>(),
                }),
            })
        }
        StopSpec::LegacyProxy => {
            let Some(prev) = proxy_bar else {
                return rejected(
                    codes::RISK_REJECTED_STOP_UNRESOLVABLE,
                    format!("{symbol}: legacy proxy needs a completed bar"),
                );
            };
            let stop_distance = match side {
                Side::Buy => entry_price - prev.low,
                Side::Sell => prev.high - entry_price,
            };
            if stop_distance <= 0.0 {
                return rejected(
                    codes::RISK_REJECTED_STOP_UNRESOLVABLE,
                    format!(
                        "{symbol}: legacy proxy stop_distance must be > 0, got {stop_distance}"
                    ),
                );
            }
            let stop_price = entry_price - side.sign() * stop_distance;
            StopOutcome::Resolved(StopResolution {
                stop_price: Some(stop_price),
                stop_distance,
                stop_source: codes::SOURCE_LEGACY_PROXY.to_string(),
                used_fallback: true,
                reason_code: codes::FALLBACK_LEGACY_PROXY.to_string(),
                details: json!({ "proxy_high": prev.high, "proxy_low": prev.low }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use chrono::{TimeZone, Utc};

    fn indicators(warm: bool) -> IndicatorRegistry {
        let mut registry = IndicatorRegistry::new(2);
        if warm {
            for i in 0..3 {
                let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, i, 0).unwrap();
                registry.update(&Bar::new(ts, "AAA", 100.0, 104.0, 96.0, 100.0, 1.0));
            }
        }
        registry
    }

    fn prev_bar() -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Bar::new(ts, "AAA", 100.0, 101.0, 99.0, 100.0, 1.0)
    }

    fn resolve(spec: &StopSpec, side: Side, entry: f64, warm: bool) -> StopOutcome {
        let registry = indicators(warm);
        let prev = prev_bar();
        resolve_stop(spec, "AAA", side, entry, Some(&prev), &registry, HybridPolicy::Wider)
    }

    #[test]
    fn explicit_long_stop_below_entry() {
        let spec = StopSpec::Explicit { stop_price: 99.0 };
        match resolve(&spec, Side::Buy, 100.0, false) {
            StopOutcome::Resolved(r) => {
                assert_eq!(r.stop_distance, 1.0);
                assert_eq!(r.stop_source, "explicit_stop_price");
                assert_eq!(r.reason_code, "resolved_explicit");
                assert!(!r.used_fallback);
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn explicit_wrong_side_rejected() {
        let spec = StopSpec::Explicit { stop_price: 101.0 };
        match resolve(&spec, Side::Buy, 100.0, false) {
            StopOutcome::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:stop_unresolvable");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn short_stop_must_sit_above_entry() {
        let spec = StopSpec::Explicit { stop_price: 102.0 };
        assert!(matches!(resolve(&spec, Side::Sell, 100.0, false), StopOutcome::Resolved(_)));
        let wrong = StopSpec::Explicit { stop_price: 98.0 };
        assert!(matches!(resolve(&wrong, Side::Sell, 100.0, false), StopOutcome::Rejected { .. }));
    }

    #[test]
    fn atr_requires_warm_indicator() {
        let spec = StopSpec::Atr { atr_multiple: 2.0, atr_indicator: "atr".into() };
        match resolve(&spec, Side::Buy, 100.0, false) {
            StopOutcome::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:indicator_not_ready");
            }
            other => panic!("expected rejection, got {other:?}"),
        }

        match resolve(&spec, Side::Buy, 100.0, true) {
            StopOutcome::Resolved(r) => {
                // ATR for constant 8-point ranges is 8.0.
                assert_eq!(r.stop_distance, 16.0);
                assert_eq!(r.reason_code, "resolved_atr");
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_wider_picks_larger_distance() {
        let spec = StopSpec::Hybrid {
            components: vec![
                StopSpec::Explicit { stop_price: 99.0 },
                StopSpec::Atr { atr_multiple: 2.0, atr_indicator: "atr".into() },
            ],
            policy: Some(HybridPolicy::Wider),
        };
        match resolve(&spec, Side::Buy, 100.0, true) {
            StopOutcome::Resolved(r) => {
                assert_eq!(r.stop_distance, 16.0);
                assert_eq!(r.stop_source, "hybrid");
                assert_eq!(r.reason_code, "resolved_hybrid");
            }
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_tighter_picks_smaller_distance() {
        let spec = StopSpec::Hybrid {
            components: vec![
                StopSpec::Explicit { stop_price: 99.0 },
                StopSpec::Atr { atr_multiple: 2.0, atr_indicator: "atr".into() },
            ],
            policy: Some(HybridPolicy::Tighter),
        };
        match resolve(&spec, Side::Buy, 100.0, true) {
            StopOutcome::Resolved(r) => assert_eq!(r.stop_distance, 1.0),
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_wider_never_tighter_than_tighter() {
        let components = vec![
            StopSpec::Explicit { stop_price: 99.0 },
            StopSpec::Atr { atr_multiple: 2.0, atr_indicator: "atr".into() },
        ];
        let wider = StopSpec::Hybrid { components: clone_components(&components), policy: Some(HybridPolicy::Wider) };
        let tighter = StopSpec::Hybrid { components, policy: Some(HybridPolicy::Tighter) };
        let (StopOutcome::Resolved(w), StopOutcome::Resolved(t)) = (
            resolve(&wider, Side::Buy, 100.0, true),
            resolve(&tighter, Side::Buy, 100.0, true),
        ) else {
            panic!("expected both to resolve");
        };
        assert!(w.stop_distance >= t.stop_distance);
    }

    fn clone_components(components: &[StopSpec]) -> Vec<StopSpec> {
        components.to_vec()
    }

    #[test]
    fn hybrid_defaults_to_global_policy() {
        let spec = StopSpec::Hybrid {
            components: vec![
                StopSpec::Explicit { stop_price: 99.0 },
                StopSpec::Atr { atr_multiple: 2.0, atr_indicator: "atr".into() },
            ],
            policy: None,
        };
        let registry = indicators(true);
        let prev = prev_bar();
        let outcome =
            resolve_stop(&spec, "AAA", Side::Buy, 100.0, Some(&prev), &registry, HybridPolicy::Tighter);
        match outcome {
            StopOutcome::Resolved(r) => assert_eq!(r.stop_distance, 1.0),
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn legacy_proxy_uses_prev_bar_extremes() {
        match resolve(&StopSpec::LegacyProxy, Side::Buy, 100.0, false) {
            StopOutcome::Resolved(r) => {
                // entry - prev.low = 100 - 99 = 1.
                assert_eq!(r.stop_distance, 1.0);
                assert!(r.used_fallback);
                assert_eq!(r.reason_code, "fallback_legacy_proxy");
                assert_eq!(r.stop_source, "legacy_high_low_proxy");
            }
            other => panic!("expected resolution, got {other:?}"),
        }

        match resolve(&StopSpec::LegacyProxy, Side::Sell, 100.0, false) {
            // prev.high - entry = 101 - 100 = 1.
            StopOutcome::Resolved(r) => assert_eq!(r.stop_distance, 1.0),
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[test]
    fn legacy_proxy_without_prev_bar_rejected() {
        let registry = indicators(false);
        let outcome = resolve_stop(
            &StopSpec::LegacyProxy,
            "AAA",
            Side::Buy,
            100.0,
            None,
            &registry,
            HybridPolicy::Wider,
        );
        assert!(matches!(outcome, StopOutcome::Rejected { .. }));
    }
}
