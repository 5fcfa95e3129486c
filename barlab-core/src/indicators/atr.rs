//! Average True Range (ATR), streaming form.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR uses Wilder smoothing (EMA with alpha = 1/period), seeded by the mean
//! of the first `period` true ranges. The first bar has no previous close,
//! so warmup needs `period + 1` bars.

use crate::domain::Bar;

use super::StreamingIndicator;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    seed_count: usize,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period, prev_close: None, seed_sum: 0.0, seed_count: 0, value: None }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl StreamingIndicator for Atr {
    fn update(&mut self, bar: &Bar) {
        let Some(prev_close) = self.prev_close else {
            // First bar: only a seed for the next true range.
            self.prev_close = Some(bar.close);
            return;
        };

        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        self.prev_close = Some(bar.close);

        match self.value {
            Some(prev) => {
                let alpha = 1.0 / self.period as f64;
                self.value = Some(alpha * tr + (1.0 - alpha) * prev);
            }
            None => {
                self.seed_sum += tr;
                self.seed_count += 1;
                if self.seed_count == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn value(&self) -> Option<f64> {
        self.value
    }
}
