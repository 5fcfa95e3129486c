use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Single OHLCV bar with a UTC timestamp and symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        ts: DateTime<Utc>,
        symbol: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self { ts, symbol: symbol.into(), open, high, low, close, volume }
    }

    /// Validate OHLC sanity invariants.
    ///
    /// `low <= min(open, close)`, `high >= max(open, close)`, `high >= low`,
    /// and `volume >= 0`.
    pub fn validate(&self) -> Result<(), BarError> {
        if self.high < self.low {
            return Err(BarError::InvalidRange { high: self.high, low: self.low });
        }
        if self.low > self.open.min(self.close) {
            return Err(BarError::LowAboveBody);
        }
        if self.high < self.open.max(self.close) {
            return Err(BarError::HighBelowBody);
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume(self.volume));
        }
        Ok(())
    }

    /// Bar range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Midpoint of the bar's range.
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

#[derive(Debug, Error)]
pub enum BarError {
    #[error("invalid bar range: high={high}, low={low}")]
    InvalidRange { high: f64, low: f64 },

    #[error("low must be <= min(open, close)")]
    LowAboveBody,

    #[error("high must be >= max(open, close)")]
    HighBelowBody,

    #[error("negative volume not allowed: {0}")]
    NegativeVolume(f64),
}
