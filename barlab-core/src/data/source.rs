//! Streaming per-symbol bar source with strict row validation.
//!
//! Each source reads one CSV/Parquet file through polars, validates rows
//! (UTC tz-awareness, strict monotonic timestamps, OHLC sanity, non-negative
//! volume), applies the date-range and row-limit scope knobs, and then acts
//! as a restartable ordered stream of bars.

use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::*;
use std::path::Path;

use crate::domain::Bar;

use super::DataError;

/// Scope knobs applied to a source before it enters the merge.
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
    /// UTC half-open `[start, end)` filter.
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Truncate the stream after this many rows.
    pub row_limit: Option<usize>,
}

/// Validated, restartable bar stream for one symbol.
#[derive(Debug)]
pub struct SymbolSource {
    symbol: String,
    bars: Vec<Bar>,
    cursor: usize,
}

impl SymbolSource {
    pub fn load(symbol: &str, path: &Path, scope: &ScopeOptions) -> Result<Self, DataError> {
        if symbol.is_empty() {
            return Err(DataError::Invalid("symbol must be a non-empty string".into()));
        }
        if !path.is_file() {
            return Err(DataError::PathNotFound(format!(
                "{symbol}: data file not found: {}",
                path.display()
            )));
        }

        let df = read_frame(path)?;

        // A per-symbol file must not carry rows for any other symbol.
        if let Ok(col) = df.column("symbol") {
            if let Ok(values) = col.as_materialized_series().str() {
                for value in values.into_iter().flatten() {
                    if value != symbol {
                        return Err(DataError::InvalidRow {
                            symbol: symbol.to_string(),
                            detail: format!(
                                "encountered mismatched symbol value '{value}' in file"
                            ),
                        });
                    }
                }
            }
        }

        let bars = validate_frame_rows(symbol, &df, scope).map_err(|e| match e {
            DataError::InvalidRow { symbol, detail } => DataError::InvalidRow {
                symbol,
                detail: format!("{detail} (in {})", path.display()),
            },
            other => other,
        })?;
        Ok(Self { symbol: symbol.to_string(), bars, cursor: 0 })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn next_bar(&mut self) -> Option<Bar> {
        let bar = self.bars.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(bar)
    }
}

/// Read a CSV or Parquet file into a DataFrame, keyed by extension.
pub fn read_frame(path: &Path) -> Result<DataFrame, DataError> {
    let ingest_err = |detail: String| DataError::Ingest {
        path: path.display().to_string(),
        detail,
    };

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let lazy = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .map_err(|e| ingest_err(e.to_string()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .map_err(|e| ingest_err(e.to_string()))?,
        other => return Err(DataError::UnsupportedExtension(format!(".{other}"))),
    };

    lazy.collect().map_err(|e| ingest_err(e.to_string()))
}

fn column<'a>(df: &'a DataFrame, name: &str, symbol: &str) -> Result<&'a Series, DataError> {
    df.column(name)
        .map(|col| col.as_materialized_series())
        .map_err(|_| DataError::InvalidRow {
            symbol: symbol.to_string(),
            detail: format!("missing required column '{name}'"),
        })
}

fn f64_column(df: &DataFrame, name: &str, symbol: &str) -> Result<Vec<f64>, DataError> {
    let series = column(df, name, symbol)?;
    let cast = series.cast(&DataType::Float64).map_err(|_| DataError::InvalidRow {
        symbol: symbol.to_string(),
        detail: format!("column '{name}' must be numeric"),
    })?;
    let values = cast.f64().expect("cast to f64");
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| DataError::InvalidRow {
                symbol: symbol.to_string(),
                detail: format!("row {} column '{name}' must not be null", row + 1),
            })
        })
        .collect()
}

/// Extract `ts` as tz-aware UTC instants.
///
/// Accepts a polars Datetime column carrying a UTC timezone, or a string
/// column of RFC3339 timestamps with an explicit offset. Naive timestamps
/// are rejected.
fn ts_column_utc(df: &DataFrame, symbol: &str) -> Result<Vec<DateTime<Utc>>, DataError> {
    let series = column(df, "ts", symbol)?;
    match series.dtype() {
        DataType::Datetime(unit, tz) => {
            match tz.as_deref() {
                Some("UTC") => {}
                Some(other) => {
                    return Err(DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: format!("ts must be in UTC, got timezone {other}"),
                    })
                }
                None => {
                    return Err(DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: "ts must be timezone-aware UTC".into(),
                    })
                }
            }
            let unit = *unit;
            let values = series.datetime().expect("datetime dtype");
            values
                .into_iter()
                .enumerate()
                .map(|(row, raw)| {
                    let raw = raw.ok_or_else(|| DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: format!("row {} ts must not be null", row + 1),
                    })?;
                    let ts = match unit {
                        TimeUnit::Milliseconds => Utc.timestamp_millis_opt(raw).single(),
                        TimeUnit::Microseconds => Some(Utc.timestamp_nanos(raw * 1_000)),
                        TimeUnit::Nanoseconds => Some(Utc.timestamp_nanos(raw)),
                    };
                    ts.ok_or_else(|| DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: format!("row {} ts out of range", row + 1),
                    })
                })
                .collect()
        }
        DataType::String => {
            let values = series.str().expect("string dtype");
            values
                .into_iter()
                .enumerate()
                .map(|(row, raw)| {
                    let raw = raw.ok_or_else(|| DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: format!("row {} ts must not be null", row + 1),
                    })?;
                    DateTime::parse_from_rfc3339(raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|_| DataError::InvalidRow {
                            symbol: symbol.to_string(),
                            detail: format!(
                                "row {} ts must be timezone-aware UTC (got: {raw})",
                                row + 1
                            ),
                        })
                })
                .collect()
        }
        other => Err(DataError::InvalidRow {
            symbol: symbol.to_string(),
            detail: format!("ts column must be a datetime or RFC3339 string, got {other:?}"),
        }),
    }
}

/// Validate a frame's rows for one symbol and apply scope knobs.
///
/// When the frame carries a `symbol` column, rows for other symbols are
/// skipped (multi-symbol single-file mode).
pub(crate) fn validate_frame_rows(
    symbol: &str,
    df: &DataFrame,
    scope: &ScopeOptions,
) -> Result<Vec<Bar>, DataError> {
    let ts = ts_column_utc(df, symbol)?;
    let opens = f64_column(df, "open", symbol)?;
    let highs = f64_column(df, "high", symbol)?;
    let lows = f64_column(df, "low", symbol)?;
    let closes = f64_column(df, "close", symbol)?;
    let volumes = f64_column(df, "volume", symbol)?;

    let row_symbols: Option<Vec<Option<String>>> = match df.column("symbol") {
        Ok(col) => {
            let values = col.as_materialized_series().str().map_err(|_| {
                DataError::InvalidRow {
                    symbol: symbol.to_string(),
                    detail: "symbol column must contain strings".into(),
                }
            })?;
            Some(values.into_iter().map(|v| v.map(str::to_string)).collect())
        }
        Err(_) => None,
    };

    let mut bars = Vec::new();
    let mut last_ts: Option<DateTime<Utc>> = None;
    for row in 0..df.height() {
        if let Some(symbols) = &row_symbols {
            match symbols[row].as_deref() {
                Some(value) if value == symbol => {}
                Some(_) => continue,
                None => {
                    return Err(DataError::InvalidRow {
                        symbol: symbol.to_string(),
                        detail: format!("row {} symbol must not be null", row + 1),
                    })
                }
            }
        }

        let row_ts = ts[row];
        if let Some(prev) = last_ts {
            if row_ts <= prev {
                return Err(DataError::InvalidRow {
                    symbol: symbol.to_string(),
                    detail: format!("non-monotonic ts at row {} ({row_ts})", row + 1),
                });
            }
        }

        if let Some((start, end)) = scope.date_range {
            if row_ts < start || row_ts >= end {
                continue;
            }
        }

        let (o, h, l, c, v) = (opens[row], highs[row], lows[row], closes[row], volumes[row]);
        if l > o.min(c) || h < o.max(c) || h < l {
            return Err(DataError::InvalidRow {
                symbol: symbol.to_string(),
                detail: format!(
                    "invalid OHLC at row {}: open={o}, high={h}, low={l}, close={c}",
                    row + 1
                ),
            });
        }
        if v < 0.0 {
            return Err(DataError::InvalidRow {
                symbol: symbol.to_string(),
                detail: format!("negative volume at row {}: {v}", row + 1),
            });
        }

        bars.push(Bar::new(row_ts, symbol, o, h, l, c, v));
        last_ts = Some(row_ts);
        if let Some(limit) = scope.row_limit {
            if bars.len() >= limit {
                break;
            }
        }
    }

    Ok(bars)
}
