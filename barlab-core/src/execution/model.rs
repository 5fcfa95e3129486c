//! Pending-order queue with bar-count delay.
//!
//! Accepted intents queue with `delay_remaining` initialized from the
//! profile. On each bar where the order's symbol trades, the delay is
//! decremented; at zero the order becomes fill-eligible at that same bar.
//! A symbol gap neither fills nor decrements. Intents enqueued during a step
//! are first processed on the following step, so fills can never happen on
//! the bar that created them.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::{ExecutionProfile, IntrabarMode, SpreadMode};
use crate::domain::{Bar, Fill, FillMeta, OrderIntent, OrderType};

use super::costs::price_fill;
use super::ExecutionError;

#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub intent: OrderIntent,
    pub delay_remaining: u32,
}

pub struct ExecutionModel {
    profile: ExecutionProfile,
    spread_mode: SpreadMode,
    intrabar_mode: IntrabarMode,
    queue: Vec<PendingOrder>,
}

impl ExecutionModel {
    pub fn new(
        profile: ExecutionProfile,
        spread_mode: SpreadMode,
        intrabar_mode: IntrabarMode,
    ) -> Self {
        Self { profile, spread_mode, intrabar_mode, queue: Vec::new() }
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    pub fn intrabar_mode(&self) -> IntrabarMode {
        self.intrabar_mode
    }

    pub fn spread_mode(&self) -> SpreadMode {
        self.spread_mode
    }

    pub fn pending(&self) -> &[PendingOrder] {
        &self.queue
    }

    /// Enqueue an accepted intent. Non-market orders are a fatal
    /// misconfiguration, not a rejection.
    pub fn submit(&mut self, intent: OrderIntent) -> Result<(), ExecutionError> {
        match intent.order_type {
            OrderType::Market => {}
        }
        let delay_remaining = self.profile.delay_bars;
        self.queue.push(PendingOrder { intent, delay_remaining });
        Ok(())
    }

    /// Process the queue against one step's bars: decrement delays, fill
    /// eligible orders, keep the rest queued. Fill order follows submission
    /// order (FIFO).
    pub fn on_bar(
        &mut self,
        ts: DateTime<Utc>,
        bars_by_symbol: &BTreeMap<String, Bar>,
    ) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut remaining = Vec::with_capacity(self.queue.len());

        for mut order in std::mem::take(&mut self.queue) {
            let Some(bar) = bars_by_symbol.get(&order.intent.symbol) else {
                remaining.push(order);
                continue;
            };

            if order.delay_remaining > 0 {
                order.delay_remaining -= 1;
            }
            if order.delay_remaining > 0 {
                remaining.push(order);
                continue;
            }

            fills.push(self.fill_order(&order.intent, ts, bar, None));
        }

        self.queue = remaining;
        fills
    }

    /// Produce a fill for an intent against a bar through the full cost
    /// pipeline. Used by the queue and by forced liquidation (which bypasses
    /// the delay and stamps a liquidation reason).
    pub fn fill_order(
        &self,
        intent: &OrderIntent,
        ts: DateTime<Utc>,
        bar: &Bar,
        liquidation: Option<&str>,
    ) -> Fill {
        let priced = price_fill(
            &self.profile,
            self.spread_mode,
            self.intrabar_mode,
            intent.side,
            intent.qty,
            bar,
        );
        let risk = (!intent.meta.reduce_only).then(|| crate::domain::RiskProvenance {
            risk_amount: intent.meta.risk_amount,
            stop_distance: intent.meta.stop_distance,
            stop_source: intent.meta.stop_source.clone(),
            r_metrics_valid: intent.meta.r_metrics_valid,
            used_legacy_stop_proxy: intent.meta.used_legacy_stop_proxy,
        });
        Fill {
            ts_filled: ts,
            symbol: intent.symbol.clone(),
            side: intent.side,
            qty: intent.qty,
            price: priced.price,
            fee_cost: priced.fee_cost,
            slippage_cost: priced.slippage_cost,
            spread_cost: priced.spread_cost,
            meta: FillMeta {
                intrabar_mode: self.intrabar_mode.to_string(),
                delay_bars: self.profile.delay_bars,
                liquidation: liquidation.map(str::to_string),
                risk,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IntentMeta, Side};
    use chrono::TimeZone;

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn bar_at(i: i64, symbol: &str) -> Bar {
        Bar::new(ts(i), symbol, 100.0, 102.0, 100.0, 101.0, 10.0)
    }

    fn bars(i: i64, symbols: &[&str]) -> BTreeMap<String, Bar> {
        symbols.iter().map(|s| (s.to_string(), bar_at(i, s))).collect()
    }

    fn intent(symbol: &str) -> OrderIntent {
        OrderIntent {
            ts_created: ts(0),
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: 10.0,
            meta: IntentMeta::reduce_only("strict", "risk_approved:close_only"),
        }
    }

    fn model(profile_name: &str) -> ExecutionModel {
        ExecutionModel::new(
            ExecutionProfile::builtin(profile_name).unwrap(),
            SpreadMode::FixedBps,
            IntrabarMode::WorstCase,
        )
    }

    #[test]
    fn delay_one_fills_on_next_bar() {
        let mut model = model("tier2"); // delay_bars = 1
        model.submit(intent("AAA")).unwrap();

        let fills = model.on_bar(ts(1), &bars(1, &["AAA"]));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].ts_filled, ts(1));
        assert!(model.pending().is_empty());
    }

    #[test]
    fn delay_two_waits_two_bars() {
        let mut model = ExecutionModel::new(
            ExecutionProfile::custom(0.0, 0.0006, 2.0, 1.0, 2),
            SpreadMode::FixedBps,
            IntrabarMode::Midpoint,
        );
        model.submit(intent("AAA")).unwrap();

        assert!(model.on_bar(ts(1), &bars(1, &["AAA"])).is_empty());
        let fills = model.on_bar(ts(2), &bars(2, &["AAA"]));
        assert_eq!(fills.len(), 1);
        // Midpoint of the t2 bar.
        assert!((fills[0].price - bar_at(2, "AAA").midpoint() * (1.0 + 0.5 / 10_000.0) * 1.0002).abs() < 1e-9);
    }

    #[test]
    fn zero_delay_still_fills_no_earlier_than_next_bar() {
        let mut model = model("tier1"); // delay_bars = 0
        model.submit(intent("AAA")).unwrap();
        // The engine only calls on_bar at the next step; the order fills there.
        let fills = model.on_bar(ts(1), &bars(1, &["AAA"]));
        assert_eq!(fills.len(), 1);
    }

    #[test]
    fn symbol_gap_neither_fills_nor_decrements() {
        let mut model = model("tier2");
        model.submit(intent("AAA")).unwrap();

        // Bar for another symbol only: order stays queued with delay intact.
        assert!(model.on_bar(ts(1), &bars(1, &["BBB"])).is_empty());
        assert_eq!(model.pending()[0].delay_remaining, 1);

        let fills = model.on_bar(ts(2), &bars(2, &["AAA"]));
        assert_eq!(fills.len(), 1);
    }

    #[test]
    fn fills_follow_submission_order() {
        let mut model = model("tier2");
        model.submit(intent("AAA")).unwrap();
        model.submit(intent("BBB")).unwrap();
        let fills = model.on_bar(ts(1), &bars(1, &["AAA", "BBB"]));
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].symbol, "AAA");
        assert_eq!(fills[1].symbol, "BBB");
    }

    #[test]
    fn liquidation_fill_stamps_reason() {
        let model = model("tier2");
        let fill = model.fill_order(
            &intent("AAA"),
            ts(5),
            &bar_at(5, "AAA"),
            Some("liquidation:end_of_run"),
        );
        assert_eq!(fill.meta.liquidation.as_deref(), Some("liquidation:end_of_run"));
    }
}
