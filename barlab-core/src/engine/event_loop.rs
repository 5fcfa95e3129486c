//! Bar-by-bar timestep coordinator.
//!
//! Per step the sub-order is fixed and observable: feed batch, delay
//! decrement + fills, indicator/HTF/strategy, conflict policy + risk,
//! enqueue, mark-to-market, row emission, liquidation check. The strategy
//! and risk engine only ever see bars up to and including the current
//! timestamp.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::benchmark::BuyHoldTracker;
use crate::config::ResolvedConfig;
use crate::data::resample::{HtfBar, Timeframe, TimeframeResampler};
use crate::data::BarFeed;
use crate::domain::{Bar, Fill, IntentMeta, OrderIntent, OrderType, Trade};
use crate::execution::ExecutionModel;
use crate::indicators::IndicatorRegistry;
use crate::portfolio::{Portfolio, PortfolioSnapshot};
use crate::risk::{codes, RiskDecision, RiskEngine, RiskInputs};
use crate::strategy::{
    resolve_signal_conflicts, validate_signals, ConflictPolicy, ContextView, Strategy,
};

use super::counters::SanityCounters;
use super::EngineError;

/// Bars of history retained per symbol for strategy lookups.
const HISTORY_CAP: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct EquityRow {
    pub ts: DateTime<Utc>,
    pub cash: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub margin_used: f64,
}

/// One risk/conflict/liquidation decision, written to `decisions.jsonl`.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub accepted: bool,
    pub reason_code: String,
    pub metadata: serde_json::Value,
}

/// Everything a run produced, buffered for the artifact writers.
pub struct EngineReport {
    pub equity: Vec<EquityRow>,
    pub decisions: Vec<DecisionRecord>,
    pub fills: Vec<Fill>,
    pub trades: Vec<Trade>,
    pub counters: SanityCounters,
    pub final_snapshot: PortfolioSnapshot,
    pub benchmark: Option<BuyHoldTracker>,
    /// True when any accepted intent used the legacy stop proxy.
    pub used_legacy_stop_proxy: bool,
    /// True when every accepted entry intent had valid R metrics.
    pub r_metrics_valid: bool,
}

pub struct Engine {
    feed: Box<dyn BarFeed>,
    strategy: Box<dyn Strategy>,
    risk: RiskEngine,
    execution: ExecutionModel,
    portfolio: Portfolio,
    resampler: Option<TimeframeResampler>,
    indicators: IndicatorRegistry,
    conflict_policy: ConflictPolicy,
    benchmark: Option<BuyHoldTracker>,
    tradeable: BTreeSet<String>,

    history: BTreeMap<String, VecDeque<Bar>>,
    latest_htf: BTreeMap<Timeframe, BTreeMap<String, HtfBar>>,
    counters: SanityCounters,
    equity: Vec<EquityRow>,
    decisions: Vec<DecisionRecord>,
    fills: Vec<Fill>,
    trades: Vec<Trade>,
    last_ts: Option<DateTime<Utc>>,
    last_bars: BTreeMap<String, Bar>,
    any_legacy_proxy: bool,
    all_r_valid: bool,
}

impl Engine {
    pub fn new(
        config: &ResolvedConfig,
        feed: Box<dyn BarFeed>,
        strategy: Box<dyn Strategy>,
    ) -> Result<Self, EngineError> {
        let resampler = match &config.htf {
            Some(htf) => Some(TimeframeResampler::new(&htf.timeframes, htf.strict, Timeframe::M1)?),
            None => None,
        };
        let execution = ExecutionModel::new(
            config.profile.clone(),
            config.spread_mode,
            config.intrabar_mode,
        );
        let tradeable: BTreeSet<String> = feed.symbols().into_iter().collect();
        let benchmark = config
            .benchmark_enabled
            .then(|| BuyHoldTracker::new(config.run.initial_cash, config.benchmark_symbol.clone()));

        Ok(Self {
            feed,
            strategy,
            risk: RiskEngine::new(config.risk.clone()),
            execution,
            portfolio: Portfolio::new(config.run.initial_cash, config.risk.max_leverage),
            resampler,
            indicators: IndicatorRegistry::new(config.risk.atr_period),
            conflict_policy: config.strategy.signal_conflict_policy,
            benchmark,
            tradeable,
            history: BTreeMap::new(),
            latest_htf: BTreeMap::new(),
            counters: SanityCounters::default(),
            equity: Vec::new(),
            decisions: Vec::new(),
            fills: Vec::new(),
            trades: Vec::new(),
            last_ts: None,
            last_bars: BTreeMap::new(),
            any_legacy_proxy: false,
            all_r_valid: true,
        })
    }

    /// Drive the feed to exhaustion, then flatten what remains.
    pub fn run(&mut self) -> Result<(), EngineError> {
        while let Some((ts, bars)) = self.feed.next() {
            self.step(ts, &bars)?;
            self.last_ts = Some(ts);
            self.last_bars = bars;
        }

        // End-of-run liquidation never fails the run.
        if let Some(ts) = self.last_ts {
            let bars = std::mem::take(&mut self.last_bars);
            let fills_before = self.fills.len();
            if let Err(error) = self.liquidate_all(ts, &bars, codes::LIQUIDATION_END_OF_RUN) {
                tracing::warn!(%error, "end-of-run liquidation failed; continuing");
            }
            if self.fills.len() > fills_before {
                self.push_equity_row(ts);
            }
        }
        Ok(())
    }

    pub fn report(self) -> EngineReport {
        EngineReport {
            equity: self.equity,
            decisions: self.decisions,
            fills: self.fills,
            trades: self.trades,
            counters: self.counters,
            final_snapshot: self.portfolio.snapshot(),
            benchmark: self.benchmark,
            used_legacy_stop_proxy: self.any_legacy_proxy,
            r_metrics_valid: self.all_r_valid,
        }
    }

    fn step(&mut self, ts: DateTime<Utc>, bars: &BTreeMap<String, Bar>) -> Result<(), EngineError> {
        // (2)+(3) Decrement delays, fill eligible orders, apply to portfolio.
        for fill in self.execution.on_bar(ts, bars) {
            self.apply_fill(fill)?;
        }

        // (4) Roll indicators and HTF buckets, then consult the strategy.
        for bar in bars.values() {
            self.indicators.update(bar);
            if let Some(resampler) = &mut self.resampler {
                for htf_bar in resampler.update(bar) {
                    self.latest_htf
                        .entry(htf_bar.timeframe)
                        .or_default()
                        .insert(htf_bar.symbol.clone(), htf_bar);
                }
            }
            let history = self.history.entry(bar.symbol.clone()).or_default();
            history.push_back(bar.clone());
            if history.len() > HISTORY_CAP {
                history.pop_front();
            }
        }

        let snapshot = self.portfolio.snapshot();
        let ctx = ContextView::new(
            ts,
            snapshot.equity,
            snapshot.cash,
            snapshot.positions,
            &self.indicators,
            &self.latest_htf,
            &self.history,
        );
        let signals = self.strategy.on_bars(ts, bars, &self.tradeable, &ctx);
        validate_signals(ts, &signals)?;

        // (5) Conflict policy, then risk, per surviving signal.
        let (resolved, summaries) = resolve_signal_conflicts(signals, self.conflict_policy)?;
        for summary in summaries {
            self.decisions.push(DecisionRecord {
                ts,
                symbol: summary.symbol.clone(),
                accepted: false,
                reason_code: format!("signal_conflict:{}", summary.policy.as_str()),
                metadata: serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null),
            });
        }

        for signal in resolved {
            let Some(bar) = bars.get(&signal.symbol) else {
                let reason_code = codes::RISK_REJECTED_STOP_UNRESOLVABLE;
                self.counters.record_decision(false, reason_code);
                self.decisions.push(DecisionRecord {
                    ts,
                    symbol: signal.symbol.clone(),
                    accepted: false,
                    reason_code: reason_code.to_string(),
                    metadata: json!({
                        "detail": "no bar for symbol at this timestamp",
                        "signal_type": signal.signal_type,
                    }),
                });
                continue;
            };

            let inputs = RiskInputs {
                bar,
                equity: self.portfolio.equity(),
                free_margin: self.portfolio.free_margin(),
                open_positions: self.portfolio.book().open_count(),
                position: self.portfolio.book().get(&signal.symbol),
                indicators: &self.indicators,
            };

            match self.risk.evaluate(&signal, &inputs)? {
                RiskDecision::Accepted(intent) => {
                    self.counters.record_decision(true, &intent.meta.reason_code);
                    if intent.meta.used_legacy_stop_proxy {
                        self.any_legacy_proxy = true;
                    }
                    if !intent.meta.reduce_only && !intent.meta.r_metrics_valid {
                        self.all_r_valid = false;
                    }
                    self.decisions.push(DecisionRecord {
                        ts,
                        symbol: signal.symbol.clone(),
                        accepted: true,
                        reason_code: intent.meta.reason_code.clone(),
                        metadata: json!({
                            "order": intent,
                            "signal_type": signal.signal_type,
                            "confidence": signal.confidence,
                        }),
                    });
                    // (6) Accepted intents enter the queue; earliest fill is
                    // the next bar.
                    self.execution.submit(intent)?;
                }
                RiskDecision::Rejected { reason_code, detail } => {
                    self.counters.record_decision(false, &reason_code);
                    self.decisions.push(DecisionRecord {
                        ts,
                        symbol: signal.symbol.clone(),
                        accepted: false,
                        reason_code,
                        metadata: json!({
                            "detail": detail,
                            "signal_type": signal.signal_type,
                            "side": signal.side,
                        }),
                    });
                }
            }
        }

        // (7)+(8) Mark-to-market and row emission.
        self.portfolio.mark_to_market(bars);
        self.portfolio.assert_invariants()?;
        self.push_equity_row(ts);
        if let Some(benchmark) = &mut self.benchmark {
            benchmark.update(ts, bars);
        }

        // (9) Forced liquidation on negative free margin.
        if self.portfolio.free_margin() < 0.0 {
            self.liquidate_all(ts, bars, codes::LIQUIDATION_NEGATIVE_FREE_MARGIN)?;
            self.push_equity_row(ts);
        }

        Ok(())
    }

    fn apply_fill(&mut self, fill: Fill) -> Result<(), EngineError> {
        self.counters.fills += 1;
        if let Some(trade) = self.portfolio.apply_fill(&fill)? {
            self.counters.closed_trades += 1;
            self.trades.push(trade);
        }
        self.fills.push(fill);
        Ok(())
    }

    fn push_equity_row(&mut self, ts: DateTime<Utc>) {
        self.equity.push(EquityRow {
            ts,
            cash: self.portfolio.cash(),
            equity: self.portfolio.equity(),
            realized_pnl: self.portfolio.realized_pnl(),
            unrealized_pnl: self.portfolio.unrealized_pnl(),
            margin_used: self.portfolio.margin_used(),
        });
    }

    /// Close every open position at the current bar's intrabar price (or the
    /// last known close when the bar is missing), through the full cost
    /// pipeline, bypassing the delay queue.
    fn liquidate_all(
        &mut self,
        ts: DateTime<Utc>,
        bars: &BTreeMap<String, Bar>,
        reason: &str,
    ) -> Result<(), EngineError> {
        for symbol in self.portfolio.book().symbols() {
            let Some(position) = self.portfolio.book().get(&symbol) else { continue };
            let intent = OrderIntent {
                ts_created: ts,
                symbol: symbol.clone(),
                side: position.side.opposite(),
                order_type: OrderType::Market,
                qty: position.qty,
                meta: IntentMeta::reduce_only(
                    self.risk.config().stop_resolution_mode.as_str(),
                    reason,
                ),
            };

            let bar = bars.get(&symbol).cloned().unwrap_or_else(|| {
                let mark = self.portfolio.last_mark(&symbol).unwrap_or(position.avg_price);
                Bar::new(ts, symbol.clone(), mark, mark, mark, mark, 0.0)
            });

            let fill = self.execution.fill_order(&intent, ts, &bar, Some(reason));
            self.counters.forced_liquidations += 1;
            self.decisions.push(DecisionRecord {
                ts,
                symbol: symbol.clone(),
                accepted: true,
                reason_code: reason.to_string(),
                metadata: json!({ "qty": fill.qty, "price": fill.price }),
            });
            self.apply_fill(fill)?;
        }
        self.portfolio.mark_to_market(&BTreeMap::new());
        Ok(())
    }
}
