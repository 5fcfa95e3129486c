//! Buy-and-hold benchmark tracker.
//!
//! Invests the starting cash in one symbol at its first observed close and
//! marks that holding at every step, producing a curve aligned with the
//! strategy equity curve.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::Bar;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BenchmarkPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
}

pub struct BuyHoldTracker {
    initial_cash: f64,
    /// Pinned symbol; `None` means "first symbol the feed produces".
    symbol: Option<String>,
    units: Option<f64>,
    last_equity: f64,
    curve: Vec<BenchmarkPoint>,
}

impl BuyHoldTracker {
    pub fn new(initial_cash: f64, symbol: Option<String>) -> Self {
        Self { initial_cash, symbol, units: None, last_equity: initial_cash, curve: Vec::new() }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn curve(&self) -> &[BenchmarkPoint] {
        &self.curve
    }

    pub fn final_equity(&self) -> f64 {
        self.last_equity
    }

    pub fn update(&mut self, ts: DateTime<Utc>, bars_by_symbol: &BTreeMap<String, Bar>) {
        if self.symbol.is_none() {
            self.symbol = bars_by_symbol.keys().next().cloned();
        }
        if let Some(symbol) = &self.symbol {
            if let Some(bar) = bars_by_symbol.get(symbol) {
                let units = *self.units.get_or_insert(self.initial_cash / bar.close);
                self.last_equity = units * bar.close;
            }
        }
        self.curve.push(BenchmarkPoint { ts, equity: self.last_equity });
    }
}
