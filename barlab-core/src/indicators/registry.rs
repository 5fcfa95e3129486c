//! Per-symbol indicator registry maintained by the engine loop.

use std::collections::BTreeMap;

use crate::domain::Bar;

use super::atr::Atr;
use super::StreamingIndicator;

/// Name under which the engine's ATR is registered for stop resolution.
pub const ATR_NAME: &str = "atr";

/// Holds one ATR per symbol, created lazily on first bar. The canonical
/// lookup name is `atr`; `atr_{period}` is accepted as an alias so signals
/// can pin the period they expect.
pub struct IndicatorRegistry {
    atr_period: usize,
    atrs: BTreeMap<String, Atr>,
}

impl IndicatorRegistry {
    pub fn new(atr_period: usize) -> Self {
        Self { atr_period, atrs: BTreeMap::new() }
    }

    pub fn update(&mut self, bar: &Bar) {
        self.atrs
            .entry(bar.symbol.clone())
            .or_insert_with(|| Atr::new(self.atr_period))
            .update(bar);
    }

    fn matches_atr(&self, name: &str) -> bool {
        name == ATR_NAME || name == format!("atr_{}", self.atr_period)
    }

    pub fn is_ready(&self, symbol: &str, name: &str) -> bool {
        self.matches_atr(name)
            && self.atrs.get(symbol).map(|atr| atr.is_ready()).unwrap_or(false)
    }

    /// Value of a warmed indicator, `None` when unknown or not ready.
    pub fn value(&self, symbol: &str, name: &str) -> Option<f64> {
        if !self.matches_atr(name) {
            return None;
        }
        self.atrs.get(symbol).and_then(|atr| atr.value())
    }
}
