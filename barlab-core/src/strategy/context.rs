//! Read-only strategy context.
//!
//! Immutable by construction: every accessor takes `&self` and returns
//! copies of scalars or shared borrows. There is no mutable surface for a
//! strategy to reach engine state through.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

use crate::data::resample::{HtfBar, Timeframe};
use crate::domain::{Bar, Side};
use crate::indicators::IndicatorRegistry;

/// Scalar summary of one open position, copied out of the portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSummary {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub avg_price: f64,
    pub unrealized_pnl: f64,
}

/// Snapshot view handed to `Strategy::on_bars`.
pub struct ContextView<'a> {
    ts: DateTime<Utc>,
    equity: f64,
    cash: f64,
    positions: BTreeMap<String, PositionSummary>,
    indicators: &'a IndicatorRegistry,
    htf: &'a BTreeMap<Timeframe, BTreeMap<String, HtfBar>>,
    history: &'a BTreeMap<String, VecDeque<Bar>>,
}

impl<'a> ContextView<'a> {
    pub(crate) fn new(
        ts: DateTime<Utc>,
        equity: f64,
        cash: f64,
        positions: BTreeMap<String, PositionSummary>,
        indicators: &'a IndicatorRegistry,
        htf: &'a BTreeMap<Timeframe, BTreeMap<String, HtfBar>>,
        history: &'a BTreeMap<String, VecDeque<Bar>>,
    ) -> Self {
        Self { ts, equity, cash, positions, indicators, htf, history }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionSummary> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &PositionSummary> {
        self.positions.values()
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.len()
    }

    /// Value of a warmed indicator for a symbol.
    pub fn indicator(&self, symbol: &str, name: &str) -> Option<f64> {
        self.indicators.value(symbol, name)
    }

    pub fn indicator_ready(&self, symbol: &str, name: &str) -> bool {
        self.indicators.is_ready(symbol, name)
    }

    /// Most recently closed HTF bar for a timeframe/symbol. Always satisfies
    /// `htf_bar.ts < self.ts()` (the bucket closed before observation).
    pub fn htf(&self, timeframe: Timeframe, symbol: &str) -> Option<&HtfBar> {
        self.htf.get(&timeframe).and_then(|by_symbol| by_symbol.get(symbol))
    }

    /// Bar history up to and including the current step, oldest first.
    pub fn history(&self, symbol: &str) -> impl Iterator<Item = &Bar> {
        self.history.get(symbol).into_iter().flatten()
    }

    /// The bar immediately before the current one for a symbol.
    pub fn prev_bar(&self, symbol: &str) -> Option<&Bar> {
        let bars = self.history.get(symbol)?;
        if bars.len() < 2 {
            return None;
        }
        bars.get(bars.len() - 2)
    }
}
