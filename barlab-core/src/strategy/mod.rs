//! Strategy contract and built-in strategies.
//!
//! A strategy is called once per timestamp with the bars at that instant, the
//! tradeable universe, and a read-only context view. It returns signals
//! (intent only); sizing and acceptance happen in the risk engine.

pub mod coinflip;
pub mod conflicts;
pub mod context;

use chrono::{DateTime, Utc};
use serde_yaml::Mapping;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{Bar, Signal};

pub use coinflip::CoinflipStrategy;
pub use conflicts::{resolve_signal_conflicts, ConflictPolicy, ConflictSummary};
pub use context::{ContextView, PositionSummary};

/// User-facing strategy contract.
///
/// `bars_by_symbol` includes only symbols with a bar at `ts` (gaps
/// preserved). The context is read-only; strategies hold no references into
/// engine state.
pub trait Strategy {
    fn on_bars(
        &mut self,
        ts: DateTime<Utc>,
        bars_by_symbol: &BTreeMap<String, Bar>,
        tradeable: &BTreeSet<String>,
        ctx: &ContextView<'_>,
    ) -> Vec<Signal>;
}

#[derive(Debug, Error)]
pub enum StrategyContractError {
    #[error(
        "signal conflict at ts={ts} symbol={symbol}: got {count} signals [{involved}]. \
         Set strategy.signal_conflict_policy to one of reject|first_wins|last_wins|net_out"
    )]
    Conflict { ts: String, symbol: String, count: usize, involved: String },

    #[error("invalid signal from strategy: {0}")]
    InvalidSignal(String),
}

/// Construct a named built-in strategy from resolved config params.
pub fn make_strategy(
    name: &str,
    params: &Mapping,
    seed: u64,
) -> Result<Box<dyn Strategy>, ConfigError> {
    match name {
        "coinflip" => Ok(Box::new(CoinflipStrategy::from_params(params, seed)?)),
        other => Err(ConfigError::InvalidValue {
            key: "strategy.name".into(),
            expected: "a registered strategy (coinflip)".into(),
            got: other.to_string(),
        }),
    }
}

/// Contract checks applied to every emitted signal before conflict
/// resolution. Violations are fatal.
pub fn validate_signals(ts: DateTime<Utc>, signals: &[Signal]) -> Result<(), StrategyContractError> {
    for signal in signals {
        if signal.symbol.trim().is_empty() {
            return Err(StrategyContractError::InvalidSignal(
                "signal.symbol must be non-empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&signal.confidence) {
            return Err(StrategyContractError::InvalidSignal(format!(
                "signal.confidence must be in [0, 1], got {}",
                signal.confidence
            )));
        }
        if signal.ts != ts {
            return Err(StrategyContractError::InvalidSignal(format!(
                "signal.ts {} does not match the current step ts {ts}",
                signal.ts
            )));
        }
    }
    Ok(())
}
