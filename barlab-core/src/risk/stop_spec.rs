//! Normalized stop intent.
//!
//! All ingestion of strategy stop payloads goes through `normalize_stop_spec`;
//! downstream code only ever handles the tagged `StopSpec` variants, never
//! free-form payloads.

use serde::Serialize;

use crate::domain::{Signal, StopSpecPayload};

use super::RiskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridPolicy {
    /// Pick the larger of the component distances.
    Wider,
    /// Pick the smaller of the component distances.
    Tighter,
}

impl HybridPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "wider" => Some(HybridPolicy::Wider),
            "tighter" => Some(HybridPolicy::Tighter),
            _ => None,
        }
    }
}

/// Tagged stop intent, one variant per resolution kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopSpec {
    Explicit { stop_price: f64 },
    Structural { stop_price: f64 },
    Atr { atr_multiple: f64, atr_indicator: String },
    Hybrid { components: Vec<StopSpec>, policy: Option<HybridPolicy> },
    LegacyProxy,
}

impl StopSpec {
    pub fn kind_label(&self) -> &'static str {
        match self {
            StopSpec::Explicit { .. } => "explicit",
            StopSpec::Structural { .. } => "structural",
            StopSpec::Atr { .. } => "atr",
            StopSpec::Hybrid { .. } => "hybrid",
            StopSpec::LegacyProxy => "legacy_proxy",
        }
    }
}

/// A normalized spec plus provenance of where the intent came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedStopSpec {
    pub spec: StopSpec,
    pub raw_source: String,
}

fn invalid(path: &str, expected: &str, got: impl ToString, fix: &str) -> RiskError {
    RiskError::InvalidStopSpec {
        path: path.to_string(),
        expected: expected.to_string(),
        got: got.to_string(),
        fix: fix.to_string(),
    }
}

fn positive_finite(value: Option<f64>, path: &str) -> Result<f64, RiskError> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(invalid(path, "a finite number > 0", v, "stop_price: 123.45")),
        None => Err(invalid(path, "a finite number > 0", "missing", "stop_price: 123.45")),
    }
}

fn normalize_payload(payload: &StopSpecPayload, path: &str) -> Result<StopSpec, RiskError> {
    match payload.kind.as_str() {
        "explicit" => {
            let stop_price = positive_finite(payload.stop_price, &format!("{path}.stop_price"))?;
            Ok(StopSpec::Explicit { stop_price })
        }
        "structural" => {
            // Structural stops may arrive under either field name.
            let level = payload.structural_stop.or(payload.stop_price);
            let stop_price = positive_finite(level, &format!("{path}.structural_stop"))?;
            Ok(StopSpec::Structural { stop_price })
        }
        "atr" => {
            let atr_multiple =
                positive_finite(payload.atr_multiple, &format!("{path}.atr_multiple"))?;
            let atr_indicator =
                payload.atr_indicator.clone().unwrap_or_else(|| "atr".to_string());
            Ok(StopSpec::Atr { atr_multiple, atr_indicator })
        }
        "hybrid" => {
            let policy = match payload.hybrid_policy.as_deref() {
                None => None,
                Some(raw) => Some(HybridPolicy::parse(raw).ok_or_else(|| {
                    invalid(
                        &format!("{path}.hybrid_policy"),
                        "one of wider|tighter",
                        raw,
                        "hybrid_policy: \"wider\"",
                    )
                })?),
            };

            let components = if !payload.hybrid_components.is_empty() {
                payload
                    .hybrid_components
                    .iter()
                    .enumerate()
                    .map(|(i, component)| {
                        normalize_payload(component, &format!("{path}.hybrid_components[{i}]"))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                // Compact form: stop_price + atr_multiple on the hybrid itself.
                let mut components = Vec::new();
                if let Some(stop_price) = payload.stop_price {
                    let stop_price =
                        positive_finite(Some(stop_price), &format!("{path}.stop_price"))?;
                    components.push(StopSpec::Structural { stop_price });
                }
                if let Some(atr_multiple) = payload.atr_multiple {
                    let atr_multiple =
                        positive_finite(Some(atr_multiple), &format!("{path}.atr_multiple"))?;
                    let atr_indicator =
                        payload.atr_indicator.clone().unwrap_or_else(|| "atr".to_string());
                    components.push(StopSpec::Atr { atr_multiple, atr_indicator });
                }
                components
            };

            if components.len() < 2 {
                return Err(invalid(
                    path,
                    "a hybrid with at least two components",
                    format!("{} component(s)", components.len()),
                    "stop_spec: {kind: hybrid, stop_price: 100.0, atr_multiple: 2.0}",
                ));
            }
            Ok(StopSpec::Hybrid { components, policy })
        }
        other => Err(invalid(
            &format!("{path}.kind"),
            "one of explicit|structural|atr|hybrid",
            other,
            "stop_spec: {kind: \"atr\", atr_multiple: 2.0}",
        )),
    }
}

/// Convert a signal's stop intent into a normalized `StopSpec`.
///
/// Precedence: explicit `stop_price` on the signal, then the structured
/// `stop_spec` payload. Returns `None` when no stop intent is present at all.
/// This function only parses and validates; safe/strict enforcement happens
/// in the risk engine.
pub fn normalize_stop_spec(signal: &Signal) -> Result<Option<NormalizedStopSpec>, RiskError> {
    if let Some(stop_price) = signal.stop_price {
        let stop_price = positive_finite(Some(stop_price), "signal.stop_price")?;
        return Ok(Some(NormalizedStopSpec {
            spec: StopSpec::Explicit { stop_price },
            raw_source: "signal.stop_price".to_string(),
        }));
    }

    if let Some(payload) = &signal.stop_spec {
        let spec = normalize_payload(payload, "signal.stop_spec")?;
        return Ok(Some(NormalizedStopSpec {
            spec,
            raw_source: "signal.stop_spec".to_string(),
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::{TimeZone, Utc};

    fn signal() -> Signal {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Signal::entry(ts, "AAA", Side::Buy, "test")
    }

    fn payload(kind: &str) -> StopSpecPayload {
        StopSpecPayload { kind: kind.to_string(), ..Default::default() }
    }

    #[test]
    fn no_stop_intent_is_none() {
        assert_eq!(normalize_stop_spec(&signal()).unwrap(), None);
    }

    #[test]
    fn explicit_stop_price_takes_precedence() {
        let mut s = signal().with_stop_price(99.0);
        s.stop_spec = Some(StopSpecPayload {
            atr_multiple: Some(2.0),
            ..payload("atr")
        });
        let normalized = normalize_stop_spec(&s).unwrap().unwrap();
        assert_eq!(normalized.spec, StopSpec::Explicit { stop_price: 99.0 });
        assert_eq!(normalized.raw_source, "signal.stop_price");
    }

    #[test]
    fn invalid_explicit_price_is_error() {
        let s = signal().with_stop_price(-1.0);
        assert!(normalize_stop_spec(&s).is_err());
    }

    #[test]
    fn atr_payload_normalizes_with_default_indicator() {
        let mut s = signal();
        s.stop_spec = Some(StopSpecPayload { atr_multiple: Some(2.5), ..payload("atr") });
        let normalized = normalize_stop_spec(&s).unwrap().unwrap();
        assert_eq!(
            normalized.spec,
            StopSpec::Atr { atr_multiple: 2.5, atr_indicator: "atr".into() }
        );
        assert_eq!(normalized.raw_source, "signal.stop_spec");
    }

    #[test]
    fn structural_accepts_either_field() {
        let mut s = signal();
        s.stop_spec = Some(StopSpecPayload { structural_stop: Some(95.0), ..payload("structural") });
        let normalized = normalize_stop_spec(&s).unwrap().unwrap();
        assert_eq!(normalized.spec, StopSpec::Structural { stop_price: 95.0 });
    }

    #[test]
    fn hybrid_compact_form_builds_two_components() {
        let mut s = signal();
        s.stop_spec = Some(StopSpecPayload {
            stop_price: Some(95.0),
            atr_multiple: Some(2.0),
            hybrid_policy: Some("tighter".into()),
            ..payload("hybrid")
        });
        let normalized = normalize_stop_spec(&s).unwrap().unwrap();
        match normalized.spec {
            StopSpec::Hybrid { components, policy } => {
                assert_eq!(components.len(), 2);
                assert_eq!(policy, Some(HybridPolicy::Tighter));
            }
            other => panic!("expected hybrid, got {other:?}"),
        }
    }

    #[test]
    fn hybrid_with_one_component_is_error() {
        let mut s = signal();
        s.stop_spec = Some(StopSpecPayload { stop_price: Some(95.0), ..payload("hybrid") });
        assert!(normalize_stop_spec(&s).is_err());
    }

    #[test]
    fn unknown_kind_is_error() {
        let mut s = signal();
        s.stop_spec = Some(payload("chandelier"));
        let err = normalize_stop_spec(&s).unwrap_err();
        assert!(err.to_string().contains("explicit|structural|atr|hybrid"));
    }
}
