//! Seeded coinflip strategy.
//!
//! Deterministic RNG baseline: flips for an entry with probability
//! `p_trade`, attaches an explicit stop one bar-range away, and exits after
//! `max_hold_bars` bars in a position. Useful for exercising the whole
//! pipeline without any market logic.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_yaml::Mapping;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ConfigError;
use crate::domain::{Bar, Side, Signal};

use super::{ContextView, Strategy};

pub struct CoinflipStrategy {
    seed: u64,
    p_trade: f64,
    cooldown_bars: usize,
    max_hold_bars: usize,
    rng: ChaCha8Rng,
    bars_since_signal: BTreeMap<String, usize>,
    bars_in_position: BTreeMap<String, usize>,
}

fn param_f64(params: &Mapping, key: &str, default: f64) -> Result<f64, ConfigError> {
    match params.get(serde_yaml::Value::String(key.to_string())) {
        None | Some(serde_yaml::Value::Null) => Ok(default),
        Some(serde_yaml::Value::Number(n)) => Ok(n.as_f64().unwrap_or(default)),
        Some(_) => Err(ConfigError::InvalidValue {
            key: format!("strategy.{key}"),
            expected: "a number".into(),
            got: "non-numeric value".into(),
        }),
    }
}

impl CoinflipStrategy {
    pub fn new(seed: u64, p_trade: f64, cooldown_bars: usize, max_hold_bars: usize) -> Self {
        Self {
            seed,
            p_trade,
            cooldown_bars,
            max_hold_bars,
            rng: ChaCha8Rng::seed_from_u64(seed),
            bars_since_signal: BTreeMap::new(),
            bars_in_position: BTreeMap::new(),
        }
    }

    pub fn from_params(params: &Mapping, seed: u64) -> Result<Self, ConfigError> {
        let p_trade = param_f64(params, "p_trade", 0.2)?;
        if !(0.0..=1.0).contains(&p_trade) {
            return Err(ConfigError::InvalidValue {
                key: "strategy.p_trade".into(),
                expected: "a number in [0, 1]".into(),
                got: p_trade.to_string(),
            });
        }
        let cooldown_bars = param_f64(params, "cooldown_bars", 0.0)? as usize;
        let max_hold_bars = param_f64(params, "max_hold_bars", 60.0)?.max(1.0) as usize;
        Ok(Self::new(seed, p_trade, cooldown_bars, max_hold_bars))
    }

    fn entry_signal(&mut self, ts: DateTime<Utc>, bar: &Bar) -> Signal {
        let side = if self.rng.gen::<f64>() < 0.5 { Side::Buy } else { Side::Sell };
        let stop_distance = bar.range().max(1e-8);
        let stop_price = match side {
            Side::Buy => bar.close - stop_distance,
            Side::Sell => bar.close + stop_distance,
        };
        let mut signal =
            Signal::entry(ts, bar.symbol.clone(), side, "coinflip").with_stop_price(stop_price);
        signal.confidence = 0.5;
        signal
            .metadata
            .insert("seed".into(), serde_json::json!(self.seed));
        signal
    }
}

impl Strategy for CoinflipStrategy {
    fn on_bars(
        &mut self,
        ts: DateTime<Utc>,
        bars_by_symbol: &BTreeMap<String, Bar>,
        tradeable: &BTreeSet<String>,
        ctx: &ContextView<'_>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();

        for symbol in tradeable {
            let Some(bar) = bars_by_symbol.get(symbol) else { continue };

            if let Some(position) = ctx.position(symbol) {
                let held = self.bars_in_position.entry(symbol.clone()).or_insert(0);
                *held += 1;
                if *held >= self.max_hold_bars {
                    let mut signal = Signal::exit(
                        ts,
                        symbol.clone(),
                        position.side.opposite(),
                        "coinflip_exit",
                    );
                    signal
                        .metadata
                        .insert("exit_reason".into(), serde_json::json!("max_hold_bars"));
                    signals.push(signal);
                    *held = 0;
                }
                continue;
            }
            self.bars_in_position.remove(symbol);

            let since = self
                .bars_since_signal
                .entry(symbol.clone())
                .or_insert(self.cooldown_bars);
            if *since < self.cooldown_bars {
                *since += 1;
                continue;
            }

            if self.rng.gen::<f64>() >= self.p_trade {
                continue;
            }
            signals.push(self.entry_signal(ts, bar));
            self.bars_since_signal.insert(symbol.clone(), 0);
        }

        signals
    }
}
