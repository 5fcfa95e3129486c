//! The risk engine: converts signals into order intents or rejected
//! decisions.
//!
//! Pipeline for entries: normalize stop intent, enforce the safe/strict
//! mode, resolve stop distance, apply the minimum-distance floor, size under
//! the equity-percent R model, then run the guardrails in order
//! (max_positions, notional cap, margin). The first failing check rejects.
//! Exit-like signals short-circuit into reduce-only intents.

use serde_json::json;

use crate::config::{RiskConfig, StopResolutionMode};
use crate::domain::{Bar, IntentMeta, OrderIntent, OrderType, Position, Signal};
use crate::indicators::IndicatorRegistry;

use super::codes;
use super::margin;
use super::stop_resolver::{resolve_stop, StopOutcome, StopResolution};
use super::stop_spec::{normalize_stop_spec, HybridPolicy, NormalizedStopSpec, StopSpec};
use super::RiskError;

/// Portfolio state the risk engine reads at one decision point.
pub struct RiskInputs<'a> {
    pub bar: &'a Bar,
    pub equity: f64,
    pub free_margin: f64,
    pub open_positions: usize,
    /// Open position on the signal's symbol, if any.
    pub position: Option<&'a Position>,
    pub indicators: &'a IndicatorRegistry,
}

#[derive(Debug, Clone)]
pub enum RiskDecision {
    Accepted(OrderIntent),
    Rejected { reason_code: String, detail: String },
}

pub struct RiskEngine {
    cfg: RiskConfig,
}

impl RiskEngine {
    pub fn new(cfg: RiskConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.cfg
    }

    fn default_hybrid_policy(&self) -> HybridPolicy {
        HybridPolicy::parse(&self.cfg.hybrid_policy).unwrap_or(HybridPolicy::Wider)
    }

    fn mode_label(&self) -> &'static str {
        self.cfg.stop_resolution_mode.as_str()
    }

    /// Evaluate one signal. Rejections are decisions; only contract
    /// violations (malformed stop payloads) surface as errors.
    pub fn evaluate(
        &self,
        signal: &Signal,
        inputs: &RiskInputs<'_>,
    ) -> Result<RiskDecision, RiskError> {
        if signal.is_exit_like() {
            return Ok(self.evaluate_exit(signal, inputs));
        }
        self.evaluate_entry(signal, inputs)
    }

    /// Exit short-circuit: reduce-only, sized to the open position, stop
    /// resolution bypassed entirely.
    fn evaluate_exit(&self, signal: &Signal, inputs: &RiskInputs<'_>) -> RiskDecision {
        let Some(position) = inputs.position else {
            return RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_CLOSE_ONLY_NO_POSITION.to_string(),
                detail: format!("{}: exit signal with no open position", signal.symbol),
            };
        };

        // Callers may request a partial reduction via metadata.
        let requested = signal
            .metadata
            .get("reduce_qty")
            .and_then(|v| v.as_f64())
            .filter(|q| *q > 0.0);
        let qty = requested.map(|q| q.min(position.qty)).unwrap_or(position.qty);

        let intent = OrderIntent {
            ts_created: signal.ts,
            symbol: signal.symbol.clone(),
            side: position.side.opposite(),
            order_type: OrderType::Market,
            qty,
            meta: IntentMeta::reduce_only(self.mode_label(), codes::RISK_APPROVED_CLOSE_ONLY),
        };
        RiskDecision::Accepted(intent)
    }

    /// Mode gate: what to do when a signal carries no stop intent at all.
    fn missing_stop_decision(&self, signal: &Signal) -> Result<NormalizedStopSpec, RiskDecision> {
        match self.cfg.stop_resolution_mode {
            StopResolutionMode::Strict => Err(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_STOP_UNRESOLVABLE_STRICT.to_string(),
                detail: format!(
                    "{}: strict mode requires entry signals to provide stop_price or stop_spec",
                    signal.symbol
                ),
            }),
            StopResolutionMode::Safe if !self.cfg.allow_legacy_proxy => {
                Err(RiskDecision::Rejected {
                    reason_code: codes::RISK_REJECTED_STOP_UNRESOLVABLE_SAFE_NO_PROXY.to_string(),
                    detail: format!(
                        "{}: no stop intent and risk.allow_legacy_proxy=false",
                        signal.symbol
                    ),
                })
            }
            StopResolutionMode::Safe => Ok(NormalizedStopSpec {
                spec: StopSpec::LegacyProxy,
                raw_source: "synthesized:legacy_proxy".to_string(),
            }),
        }
    }

    fn evaluate_entry(
        &self,
        signal: &Signal,
        inputs: &RiskInputs<'_>,
    ) -> Result<RiskDecision, RiskError> {
        let normalized = match normalize_stop_spec(signal)? {
            Some(normalized) => normalized,
            None => match self.missing_stop_decision(signal) {
                Ok(synthesized) => synthesized,
                Err(rejection) => return Ok(rejection),
            },
        };

        let entry_price = inputs.bar.close;
        let resolution = match resolve_stop(
            &normalized.spec,
            &signal.symbol,
            signal.side,
            entry_price,
            Some(inputs.bar),
            inputs.indicators,
            self.default_hybrid_policy(),
        ) {
            StopOutcome::Resolved(resolution) => resolution,
            StopOutcome::Rejected { reason_code, detail } => {
                return Ok(RiskDecision::Rejected { reason_code, detail })
            }
        };

        let floor = self
            .cfg
            .min_stop_distance
            .max(self.cfg.min_stop_distance_pct * entry_price);
        if resolution.stop_distance < floor {
            return Ok(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_MIN_STOP_DISTANCE.to_string(),
                detail: format!(
                    "{}: stop_distance {} below floor {floor}",
                    signal.symbol, resolution.stop_distance
                ),
            });
        }

        // Equity-percent R model, rounded down to the contract lot.
        let risk_amount = self.cfg.r_per_trade * inputs.equity;
        let raw_qty = risk_amount / resolution.stop_distance;
        let qty = (raw_qty / self.cfg.lot_size).floor() * self.cfg.lot_size;
        if qty <= 0.0 {
            return Ok(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_QTY_BELOW_LOT.to_string(),
                detail: format!(
                    "{}: sized qty {raw_qty} rounds below lot {}",
                    signal.symbol, self.cfg.lot_size
                ),
            });
        }

        if inputs.open_positions >= self.cfg.max_positions {
            return Ok(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_MAX_POSITIONS.to_string(),
                detail: format!(
                    "{}: {} open positions at cap {}",
                    signal.symbol, inputs.open_positions, self.cfg.max_positions
                ),
            });
        }

        let notional = qty * entry_price;
        let notional_cap = self.cfg.max_notional_pct_equity * inputs.equity;
        if notional > notional_cap {
            return Ok(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_NOTIONAL_CAP.to_string(),
                detail: format!("{}: notional {notional} exceeds cap {notional_cap}", signal.symbol),
            });
        }

        let margin_required = margin::initial_margin_required(notional, self.cfg.max_leverage);
        let free_after = margin::free_margin_after(inputs.free_margin, notional, self.cfg.max_leverage);
        let maintenance = self.cfg.maintenance_free_margin_pct * inputs.equity;
        if free_after < maintenance {
            return Ok(RiskDecision::Rejected {
                reason_code: codes::RISK_REJECTED_INSUFFICIENT_MARGIN.to_string(),
                detail: format!(
                    "{}: free margin after {free_after} below maintenance {maintenance}",
                    signal.symbol
                ),
            });
        }

        Ok(RiskDecision::Accepted(self.build_intent(
            signal,
            qty,
            risk_amount,
            notional,
            margin_required,
            &normalized,
            &resolution,
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_intent(
        &self,
        signal: &Signal,
        qty: f64,
        risk_amount: f64,
        notional: f64,
        margin_required: f64,
        normalized: &NormalizedStopSpec,
        resolution: &StopResolution,
    ) -> OrderIntent {
        let mut stop_details = resolution.details.clone();
        if let serde_json::Value::Object(map) = &mut stop_details {
            map.insert("raw_source".to_string(), json!(normalized.raw_source));
            map.insert("kind".to_string(), json!(normalized.spec.kind_label()));
        }

        OrderIntent {
            ts_created: signal.ts,
            symbol: signal.symbol.clone(),
            side: signal.side,
            order_type: OrderType::Market,
            qty,
            meta: IntentMeta {
                risk_amount: Some(risk_amount),
                stop_price: resolution.stop_price,
                stop_distance: Some(resolution.stop_distance),
                stop_source: Some(resolution.stop_source.clone()),
                stop_details,
                r_metrics_valid: !resolution.used_fallback,
                used_legacy_stop_proxy: resolution.used_fallback,
                stop_resolution_mode: self.mode_label().to_string(),
                reduce_only: false,
                reason_code: resolution.reason_code.clone(),
                notional,
                margin_required,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RiskProvenance, Side};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn cfg(mode: StopResolutionMode, allow_proxy: bool) -> RiskConfig {
        RiskConfig {
            r_per_trade: 0.01,
            min_stop_distance: 0.0,
            min_stop_distance_pct: 0.0,
            max_positions: 5,
            max_notional_pct_equity: 10.0,
            maintenance_free_margin_pct: 0.0,
            max_leverage: 2.0,
            lot_size: 1e-8,
            stop_resolution_mode: mode,
            allow_legacy_proxy: allow_proxy,
            hybrid_policy: "wider".into(),
            atr_period: 14,
        }
    }

    fn bar() -> Bar {
        Bar::new(ts0(), "AAA", 100.0, 101.0, 99.0, 100.0, 10.0)
    }

    fn eval(
        engine: &RiskEngine,
        signal: &Signal,
        position: Option<&Position>,
        open_positions: usize,
    ) -> RiskDecision {
        let indicators = IndicatorRegistry::new(14);
        let current = bar();
        let inputs = RiskInputs {
            bar: &current,
            equity: 10_000.0,
            free_margin: 10_000.0,
            open_positions,
            position,
            indicators: &indicators,
        };
        engine.evaluate(signal, &inputs).unwrap()
    }

    fn entry_with_stop(stop: f64) -> Signal {
        Signal::entry(ts0(), "AAA", Side::Buy, "test").with_stop_price(stop)
    }

    #[test]
    fn sizes_with_r_model() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Strict, false));
        match eval(&engine, &entry_with_stop(99.0), None, 0) {
            RiskDecision::Accepted(intent) => {
                // risk = 1% of 10_000 = 100; distance 1.0 -> qty 100.
                assert_eq!(intent.qty, 100.0);
                assert_eq!(intent.meta.risk_amount, Some(100.0));
                assert_eq!(intent.meta.stop_distance, Some(1.0));
                assert!(intent.meta.r_metrics_valid);
                assert!(!intent.meta.used_legacy_stop_proxy);
                assert_eq!(intent.meta.reason_code, "resolved_explicit");
                assert_eq!(intent.meta.stop_resolution_mode, "strict");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn strict_rejects_missing_stop() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Strict, false));
        let signal = Signal::entry(ts0(), "AAA", Side::Buy, "test");
        match eval(&engine, &signal, None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:stop_unresolvable:strict");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn safe_without_proxy_rejects_missing_stop() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Safe, false));
        let signal = Signal::entry(ts0(), "AAA", Side::Buy, "test");
        match eval(&engine, &signal, None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:stop_unresolvable:safe_no_proxy");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn safe_with_proxy_synthesizes_legacy_stop() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Safe, true));
        let signal = Signal::entry(ts0(), "AAA", Side::Buy, "test");
        match eval(&engine, &signal, None, 0) {
            RiskDecision::Accepted(intent) => {
                assert!(intent.meta.used_legacy_stop_proxy);
                assert!(!intent.meta.r_metrics_valid);
                assert_eq!(intent.meta.reason_code, "fallback_legacy_proxy");
                assert_eq!(intent.meta.stop_source.as_deref(), Some("legacy_high_low_proxy"));
                // entry 100 - bar.low 99 = 1.0 -> qty = 100 / 1.0 = 100.
                assert_eq!(intent.qty, 100.0);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn min_stop_distance_floor_rejects() {
        let mut config = cfg(StopResolutionMode::Strict, false);
        config.min_stop_distance_pct = 0.05; // floor = 5.0 at entry 100
        let engine = RiskEngine::new(config);
        match eval(&engine, &entry_with_stop(99.0), None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:min_stop_distance");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn max_positions_guardrail() {
        let mut config = cfg(StopResolutionMode::Strict, false);
        config.max_positions = 1;
        let engine = RiskEngine::new(config);
        match eval(&engine, &entry_with_stop(99.0), None, 1) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:max_positions");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn notional_cap_guardrail() {
        let mut config = cfg(StopResolutionMode::Strict, false);
        config.max_notional_pct_equity = 0.5; // cap = 5_000
        let engine = RiskEngine::new(config);
        // distance 1.0 -> qty 100 -> notional 10_000 > 5_000.
        match eval(&engine, &entry_with_stop(99.0), None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:notional_cap");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn margin_guardrail() {
        let mut config = cfg(StopResolutionMode::Strict, false);
        config.maintenance_free_margin_pct = 1.0;
        let engine = RiskEngine::new(config);
        // margin required 5_000 leaves 5_000 < maintenance 10_000.
        match eval(&engine, &entry_with_stop(99.0), None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:insufficient_margin");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn lot_rounding_rejects_dust() {
        let mut config = cfg(StopResolutionMode::Strict, false);
        config.lot_size = 1000.0;
        let engine = RiskEngine::new(config);
        // qty 100 rounds down to 0 lots.
        match eval(&engine, &entry_with_stop(99.0), None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:qty_below_lot");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn exit_reduces_open_position() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Strict, false));
        let position =
            Position::open("AAA", Side::Buy, 7.0, 100.0, ts0(), RiskProvenance::default());
        let signal = Signal::exit(ts0(), "AAA", Side::Sell, "flatten");
        match eval(&engine, &signal, Some(&position), 1) {
            RiskDecision::Accepted(intent) => {
                assert!(intent.meta.reduce_only);
                assert_eq!(intent.qty, 7.0);
                assert_eq!(intent.side, Side::Sell);
                assert_eq!(intent.meta.reason_code, "risk_approved:close_only");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn exit_without_position_rejected() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Strict, false));
        let signal = Signal::exit(ts0(), "AAA", Side::Sell, "flatten");
        match eval(&engine, &signal, None, 0) {
            RiskDecision::Rejected { reason_code, .. } => {
                assert_eq!(reason_code, "risk_rejected:close_only_no_position");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn partial_exit_respects_reduce_qty() {
        let engine = RiskEngine::new(cfg(StopResolutionMode::Strict, false));
        let position =
            Position::open("AAA", Side::Buy, 10.0, 100.0, ts0(), RiskProvenance::default());
        let mut signal = Signal::exit(ts0(), "AAA", Side::Sell, "trim");
        signal.metadata.insert("reduce_qty".into(), serde_json::json!(4.0));
        match eval(&engine, &signal, Some(&position), 1) {
            RiskDecision::Accepted(intent) => assert_eq!(intent.qty, 4.0),
            other => panic!("expected acceptance, got {other:?}"),
        }
    }
}
