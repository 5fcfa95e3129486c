//! No-lookahead guarantees: strategies only observe bars up to the current
//! step, HTF bars close strictly before they become visible, and fills never
//! land before the configured delay.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};

use barlab_core::config::resolve_config;
use barlab_core::data::resample::Timeframe;
use barlab_core::data::MemoryFeed;
use barlab_core::domain::{Bar, Side, Signal};
use barlab_core::engine::Engine;
use barlab_core::strategy::{ContextView, Strategy};

fn ts(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i)
}

fn bars(n: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let base = 100.0 + i as f64;
            Bar::new(ts(i), "AAA", base, base + 1.0, base - 1.0, base + 0.5, 10.0)
        })
        .collect()
}

/// Asserts observation invariants on every call.
struct ObservingStrategy {
    emitted_entry: bool,
}

impl Strategy for ObservingStrategy {
    fn on_bars(
        &mut self,
        ts: DateTime<Utc>,
        bars_by_symbol: &BTreeMap<String, Bar>,
        _tradeable: &BTreeSet<String>,
        ctx: &ContextView<'_>,
    ) -> Vec<Signal> {
        // No bar from the future, in the batch or in history.
        for bar in bars_by_symbol.values() {
            assert!(bar.ts <= ts);
        }
        for bar in ctx.history("AAA") {
            assert!(bar.ts <= ts);
        }
        // History ends at the current bar.
        assert_eq!(ctx.history("AAA").last().map(|b| b.ts), Some(ts));

        if let Some(htf_bar) = ctx.htf(Timeframe::M5, "AAA") {
            assert!(htf_bar.ts < ts, "HTF bucket must close before observation");
        }

        if !self.emitted_entry {
            self.emitted_entry = true;
            let close = bars_by_symbol["AAA"].close;
            return vec![
                Signal::entry(ts, "AAA", Side::Buy, "probe").with_stop_price(close - 2.0)
            ];
        }
        Vec::new()
    }
}

#[test]
fn strategy_never_observes_future_bars() {
    let config = resolve_config(
        serde_yaml::from_str(
            "run: {initial_cash: 10000}\n\
             risk: {stop_resolution_mode: strict}\n\
             htf_resampler: {timeframes: [5m], strict: true}\n",
        )
        .unwrap(),
    )
    .unwrap();

    let strategy = ObservingStrategy { emitted_entry: false };
    let mut engine =
        Engine::new(&config, Box::new(MemoryFeed::new(bars(16))), Box::new(strategy)).unwrap();
    engine.run().unwrap();
    let report = engine.report();

    // The intent was created at t0 under tier2 (delay_bars=1): the fill may
    // not land before t0 + 1 bar.
    let entry = &report.fills[0];
    assert!(entry.ts_filled >= ts(1));
}

#[test]
fn htf_bars_emitted_only_after_bucket_close() {
    let config = resolve_config(
        serde_yaml::from_str(
            "run: {initial_cash: 10000}\n\
             risk: {stop_resolution_mode: strict}\n\
             htf_resampler: {timeframes: [5m], strict: true}\n",
        )
        .unwrap(),
    )
    .unwrap();

    let strategy = ObservingStrategy { emitted_entry: true };
    let mut engine =
        Engine::new(&config, Box::new(MemoryFeed::new(bars(12))), Box::new(strategy)).unwrap();
    engine.run().unwrap();
    // The per-call assertions inside ObservingStrategy are the test; if a
    // bucket leaked early the run would have panicked.
}
