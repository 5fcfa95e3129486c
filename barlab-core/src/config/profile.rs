//! Execution profiles: bundled cost parameters for quick setup.
//!
//! `tier1`/`tier2`/`tier3` are fixed presets; `custom` requires all five
//! override keys. Tier presets forbid overrides so a run can never silently
//! mix preset and ad-hoc friction numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::resolver::ConfigError;

/// Fields a `custom` profile must provide (and tiers must not).
pub const PROFILE_OVERRIDE_FIELDS: [&str; 5] =
    ["maker_fee", "taker_fee", "slippage_bps", "delay_bars", "spread_bps"];

/// A fixed bundle of execution cost parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub name: String,
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub slippage_bps: f64,
    pub spread_bps: f64,
    pub delay_bars: u32,
}

impl ExecutionProfile {
    /// Built-in tier presets, as `(maker_fee, taker_fee, slippage_bps,
    /// spread_bps, delay_bars)`.
    pub fn builtin(name: &str) -> Option<Self> {
        let (maker_fee, taker_fee, slippage_bps, spread_bps, delay_bars) = match name {
            "tier1" => (0.0, 0.0004, 0.5, 0.0, 0),
            "tier2" => (0.0, 0.0006, 2.0, 1.0, 1),
            "tier3" => (0.0, 0.0008, 5.0, 3.0, 1),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            maker_fee,
            taker_fee,
            slippage_bps,
            spread_bps,
            delay_bars,
        })
    }

    pub fn custom(
        maker_fee: f64,
        taker_fee: f64,
        slippage_bps: f64,
        spread_bps: f64,
        delay_bars: u32,
    ) -> Self {
        Self {
            name: "custom".to_string(),
            maker_fee,
            taker_fee,
            slippage_bps,
            spread_bps,
            delay_bars,
        }
    }
}

/// Policy mapping (open, high, low, close) and side to an executed price
/// within a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarMode {
    WorstCase,
    BestCase,
    Midpoint,
}

impl IntrabarMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "worst_case" => Ok(IntrabarMode::WorstCase),
            "best_case" => Ok(IntrabarMode::BestCase),
            "midpoint" => Ok(IntrabarMode::Midpoint),
            other => Err(ConfigError::InvalidValue {
                key: "execution.intrabar_mode".into(),
                expected: "one of worst_case|best_case|midpoint".into(),
                got: other.into(),
            }),
        }
    }
}

impl fmt::Display for IntrabarMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntrabarMode::WorstCase => "worst_case",
            IntrabarMode::BestCase => "best_case",
            IntrabarMode::Midpoint => "midpoint",
        };
        write!(f, "{label}")
    }
}

/// Spread application mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadMode {
    None,
    FixedBps,
}

impl SpreadMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "none" => Ok(SpreadMode::None),
            "fixed_bps" => Ok(SpreadMode::FixedBps),
            other => Err(ConfigError::InvalidValue {
                key: "execution.spread_mode".into(),
                expected: "one of none|fixed_bps".into(),
                got: other.into(),
            }),
        }
    }
}

impl fmt::Display for SpreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpreadMode::None => "none",
            SpreadMode::FixedBps => "fixed_bps",
        };
        write!(f, "{label}")
    }
}
