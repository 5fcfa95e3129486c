//! Streaming higher-timeframe (HTF) resampling from 1-minute bars.
//!
//! Event-driven and bar-by-bar only: no lookahead, no interpolation of
//! missing 1m bars, and in strict mode only complete HTF bars are emitted.
//! `HtfBar.ts` is the bucket-start timestamp (UTC floor at the target
//! period). A bucket is finalized only when the next bucket's first bar
//! arrives; unclosed final buckets are never emitted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::Bar;

use super::DataError;

/// Supported resampling targets. The base feed is always 1-minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" => Some(Timeframe::M1),
            "3m" => Some(Timeframe::M3),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn supported_labels() -> Vec<&'static str> {
        vec!["1m", "3m", "5m", "15m", "30m", "1h", "4h", "1d"]
    }

    /// UTC floor of `ts` to this timeframe's bucket boundary.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let period = self.minutes() * 60;
        let floored = secs - secs.rem_euclid(period);
        Utc.timestamp_opt(floored, 0).single().expect("floored timestamp is valid")
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed higher-timeframe bar aggregated from 1m bars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtfBar {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
    pub n_bars: u32,
    pub expected_bars: u32,
    pub is_complete: bool,
}

#[derive(Debug, Clone)]
struct BucketState {
    bucket_start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    n_bars: u32,
    expected_bars: u32,
    is_incomplete: bool,
    last_seen_minute: DateTime<Utc>,
}

impl BucketState {
    fn init(bucket_start: DateTime<Utc>, timeframe: Timeframe, bar: &Bar) -> Self {
        Self {
            bucket_start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            n_bars: 1,
            expected_bars: timeframe.minutes() as u32,
            is_incomplete: false,
            last_seen_minute: bar.ts,
        }
    }
}

/// Streaming per-symbol/per-timeframe resampler.
///
/// Input must be 1-minute UTC bars; a different base timeframe fails at
/// construction. A gap of more than one minute inside a bucket marks it
/// incomplete; strict mode drops incomplete buckets instead of emitting them.
pub struct TimeframeResampler {
    timeframes: Vec<Timeframe>,
    strict: bool,
    states: BTreeMap<(String, Timeframe), BucketState>,
    latest_closed: BTreeMap<(String, Timeframe), HtfBar>,
}

impl TimeframeResampler {
    pub fn new(timeframes: &[Timeframe], strict: bool, base: Timeframe) -> Result<Self, DataError> {
        if base != Timeframe::M1 {
            return Err(DataError::Invalid(format!(
                "only a 1m base feed is supported, got {base}"
            )));
        }
        if timeframes.is_empty() {
            return Err(DataError::Invalid("at least one timeframe is required".into()));
        }
        // Preserve declared order while deduplicating.
        let mut deduped = Vec::new();
        for tf in timeframes {
            if !deduped.contains(tf) {
                deduped.push(*tf);
            }
        }
        Ok(Self {
            timeframes: deduped,
            strict,
            states: BTreeMap::new(),
            latest_closed: BTreeMap::new(),
        })
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Reset all in-flight and latest-closed state.
    pub fn reset(&mut self) {
        self.states.clear();
        self.latest_closed.clear();
    }

    /// Latest closed HTF bar for a symbol/timeframe.
    pub fn latest_closed(&self, symbol: &str, timeframe: Timeframe) -> Option<&HtfBar> {
        self.latest_closed.get(&(symbol.to_string(), timeframe))
    }

    /// Update state with one 1m bar and return newly closed HTF bars.
    pub fn update(&mut self, bar: &Bar) -> Vec<HtfBar> {
        let mut emitted = Vec::new();

        for &timeframe in &self.timeframes {
            let bucket_start = timeframe.bucket_start(bar.ts);
            let key = (bar.symbol.clone(), timeframe);

            match self.states.get_mut(&key) {
                None => {
                    self.states.insert(key, BucketState::init(bucket_start, timeframe, bar));
                }
                Some(state) if bucket_start != state.bucket_start => {
                    let closed = finalize(&bar.symbol, timeframe, state, self.strict);
                    if let Some(htf_bar) = closed {
                        self.latest_closed.insert(key.clone(), htf_bar.clone());
                        emitted.push(htf_bar);
                    }
                    self.states.insert(key, BucketState::init(bucket_start, timeframe, bar));
                }
                Some(state) => {
                    // Same bucket: detect a minute gap, then roll the candle.
                    if bar.ts - state.last_seen_minute > chrono::Duration::minutes(1) {
                        state.is_incomplete = true;
                    }
                    state.high = state.high.max(bar.high);
                    state.low = state.low.min(bar.low);
                    state.close = bar.close;
                    state.volume += bar.volume;
                    state.n_bars += 1;
                    state.last_seen_minute = bar.ts;
                }
            }
        }

        emitted
    }
}

fn finalize(
    symbol: &str,
    timeframe: Timeframe,
    state: &BucketState,
    strict: bool,
) -> Option<HtfBar> {
    let is_complete = !state.is_incomplete && state.n_bars == state.expected_bars;
    if strict && !is_complete {
        return None;
    }
    Some(HtfBar {
        ts: state.bucket_start,
        symbol: symbol.to_string(),
        open: state.open,
        high: state.high,
        low: state.low,
        close: state.close,
        volume: state.volume,
        timeframe,
        n_bars: state.n_bars,
        expected_bars: state.expected_bars,
        is_complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn bar_at(i: i64) -> Bar {
        let px = 100.0 + i as f64;
        Bar::new(minute(i), "AAA", px, px + 1.0, px - 1.0, px + 0.5, 10.0)
    }

    #[test]
    fn rejects_non_1m_base() {
        assert!(TimeframeResampler::new(&[Timeframe::M15], true, Timeframe::M5).is_err());
    }

    #[test]
    fn requires_at_least_one_timeframe() {
        assert!(TimeframeResampler::new(&[], true, Timeframe::M1).is_err());
    }

    #[test]
    fn bucket_start_floors_to_period() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 10, 47, 0).unwrap();
        assert_eq!(
            Timeframe::M15.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 45, 0).unwrap()
        );
        assert_eq!(
            Timeframe::H1.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::D1.bucket_start(ts),
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn complete_bucket_emits_on_rollover() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M5], true, Timeframe::M1).unwrap();

        for i in 0..5 {
            assert!(resampler.update(&bar_at(i)).is_empty());
        }
        // First bar of the next bucket closes the previous one.
        let emitted = resampler.update(&bar_at(5));
        assert_eq!(emitted.len(), 1);
        let htf = &emitted[0];
        assert_eq!(htf.ts, minute(0));
        assert_eq!(htf.open, 100.0);
        assert_eq!(htf.close, 104.5);
        assert_eq!(htf.high, 105.0);
        assert_eq!(htf.low, 99.0);
        assert_eq!(htf.volume, 50.0);
        assert_eq!(htf.n_bars, 5);
        assert!(htf.is_complete);
        assert_eq!(resampler.latest_closed("AAA", Timeframe::M5), Some(htf));
    }

    #[test]
    fn strict_drops_bucket_with_minute_gap() {
        // 15m bucket over minutes 0..15 with minute 8 missing.
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M15], true, Timeframe::M1).unwrap();
        for i in (0..15).filter(|&i| i != 8) {
            assert!(resampler.update(&bar_at(i)).is_empty());
        }
        // Minute 15 starts the next bucket: the gapped bucket is dropped.
        assert!(resampler.update(&bar_at(15)).is_empty());
        assert!(resampler.latest_closed("AAA", Timeframe::M15).is_none());
    }

    #[test]
    fn lenient_mode_emits_incomplete_bucket() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M15], false, Timeframe::M1).unwrap();
        for i in (0..15).filter(|&i| i != 8) {
            resampler.update(&bar_at(i));
        }
        let emitted = resampler.update(&bar_at(15));
        assert_eq!(emitted.len(), 1);
        assert!(!emitted[0].is_complete);
        assert_eq!(emitted[0].n_bars, 14);
    }

    #[test]
    fn unclosed_final_bucket_never_emitted() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M5], true, Timeframe::M1).unwrap();
        for i in 0..4 {
            resampler.update(&bar_at(i));
        }
        // Stream ends mid-bucket; nothing was emitted and nothing is closed.
        assert!(resampler.latest_closed("AAA", Timeframe::M5).is_none());
    }

    #[test]
    fn emitted_ts_is_bucket_start_and_before_current() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M5], true, Timeframe::M1).unwrap();
        for i in 0..5 {
            resampler.update(&bar_at(i));
        }
        let emitted = resampler.update(&bar_at(5));
        assert!(emitted[0].ts < minute(5));
    }

    #[test]
    fn multiple_timeframes_track_independently() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M5, Timeframe::M15], true, Timeframe::M1)
                .unwrap();
        let mut fives = 0;
        let mut fifteens = 0;
        for i in 0..31 {
            for htf in resampler.update(&bar_at(i)) {
                match htf.timeframe {
                    Timeframe::M5 => fives += 1,
                    Timeframe::M15 => fifteens += 1,
                    _ => unreachable!(),
                }
            }
        }
        assert_eq!(fives, 6);
        assert_eq!(fifteens, 2);
    }

    #[test]
    fn reset_clears_state() {
        let mut resampler =
            TimeframeResampler::new(&[Timeframe::M5], true, Timeframe::M1).unwrap();
        for i in 0..6 {
            resampler.update(&bar_at(i));
        }
        assert!(resampler.latest_closed("AAA", Timeframe::M5).is_some());
        resampler.reset();
        assert!(resampler.latest_closed("AAA", Timeframe::M5).is_none());
    }
}
