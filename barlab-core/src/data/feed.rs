//! Time-aligned bar feeds.
//!
//! A feed yields `(ts, symbol -> Bar)` batches containing only symbols with a
//! bar at exactly that timestamp; gaps are preserved, nothing is synthesized.
//! Two implementations: a streaming k-way merge over per-symbol sources
//! (dataset directories) and an in-memory dataframe feed (single files).

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::path::Path;

use crate::config::{DataConfig, ResolvedConfig};
use crate::domain::Bar;

use super::manifest::DatasetManifest;
use super::source::{read_frame, ScopeOptions, SymbolSource};
use super::DataError;

/// Restartable time-aligned bar feed.
pub trait BarFeed {
    fn symbols(&self) -> Vec<String>;
    fn reset(&mut self);
    /// Next batch of bars sharing one timestamp, or `None` at exhaustion.
    fn next(&mut self) -> Option<(DateTime<Utc>, BTreeMap<String, Bar>)>;
}

/// Heap entry keyed by `(ts, symbol_order)` so merge order is deterministic.
#[derive(Debug)]
struct HeapItem {
    ts: DateTime<Utc>,
    symbol_order: usize,
    bar: Bar,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.ts == other.ts && self.symbol_order == other.symbol_order
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.ts, self.symbol_order).cmp(&(other.ts, other.symbol_order))
    }
}

/// Merge per-symbol sources into timestamp batches with bounded memory.
pub struct StreamingFeed {
    sources: Vec<SymbolSource>,
    heap: BinaryHeap<Reverse<HeapItem>>,
}

impl StreamingFeed {
    pub fn open(
        dataset_dir: &Path,
        manifest: &DatasetManifest,
        scope: &ScopeOptions,
    ) -> Result<Self, DataError> {
        let mut sources = Vec::with_capacity(manifest.symbols.len());
        for symbol in &manifest.symbols {
            let rel_path = &manifest.files_by_symbol[symbol];
            sources.push(SymbolSource::load(symbol, &dataset_dir.join(rel_path), scope)?);
        }
        let mut feed = Self { sources, heap: BinaryHeap::new() };
        feed.prime();
        Ok(feed)
    }

    fn prime(&mut self) {
        self.heap.clear();
        for order in 0..self.sources.len() {
            self.push_next(order);
        }
    }

    fn push_next(&mut self, symbol_order: usize) {
        if let Some(bar) = self.sources[symbol_order].next_bar() {
            self.heap.push(Reverse(HeapItem { ts: bar.ts, symbol_order, bar }));
        }
    }
}

impl BarFeed for StreamingFeed {
    fn symbols(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.symbol().to_string()).collect()
    }

    fn reset(&mut self) {
        for source in &mut self.sources {
            source.reset();
        }
        self.prime();
    }

    fn next(&mut self) -> Option<(DateTime<Utc>, BTreeMap<String, Bar>)> {
        let Reverse(first) = self.heap.pop()?;
        let ts = first.ts;
        let mut orders = vec![first.symbol_order];
        let mut bars = BTreeMap::new();
        bars.insert(first.bar.symbol.clone(), first.bar);

        while let Some(Reverse(peeked)) = self.heap.peek() {
            if peeked.ts != ts {
                break;
            }
            let Reverse(item) = self.heap.pop().expect("peeked item exists");
            orders.push(item.symbol_order);
            bars.insert(item.bar.symbol.clone(), item.bar);
        }

        for order in orders {
            self.push_next(order);
        }

        Some((ts, bars))
    }
}

/// Whole-table feed for single CSV/Parquet files.
pub struct DataFrameFeed {
    symbols: Vec<String>,
    batches: Vec<(DateTime<Utc>, BTreeMap<String, Bar>)>,
    cursor: usize,
}

impl DataFrameFeed {
    pub fn load(path: &Path, data_cfg: &DataConfig) -> Result<Self, DataError> {
        let df = read_frame(path)?;
        let fallback_symbol = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("__single__")
            .to_string();
        Self::from_frame(&df, &fallback_symbol, data_cfg)
    }

    /// Split a (possibly multi-symbol) table into validated per-symbol
    /// sub-frames, then merge them back into timestamp batches.
    fn from_frame(
        df: &DataFrame,
        fallback_symbol: &str,
        data_cfg: &DataConfig,
    ) -> Result<Self, DataError> {
        let scope = ScopeOptions {
            date_range: data_cfg.date_range,
            row_limit: data_cfg.row_limit_per_symbol,
        };

        let mut symbols = symbol_order(df, fallback_symbol)?;
        if let Some(subset) = &data_cfg.symbols_subset {
            let unknown: Vec<&String> =
                subset.iter().filter(|s| !symbols.contains(*s)).collect();
            if !unknown.is_empty() {
                return Err(DataError::Invalid(format!(
                    "data.symbols_subset contains unknown symbol(s): {unknown:?}"
                )));
            }
            symbols = subset.clone();
        }
        if let Some(cap) = data_cfg.max_symbols {
            symbols.truncate(cap);
        }

        let mut per_symbol: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for symbol in &symbols {
            let bars = super::source::validate_frame_rows(symbol, df, &scope)?;
            per_symbol.insert(symbol.clone(), bars);
        }

        let mut by_ts: BTreeMap<DateTime<Utc>, BTreeMap<String, Bar>> = BTreeMap::new();
        for bars in per_symbol.into_values() {
            for bar in bars {
                let slot = by_ts.entry(bar.ts).or_default();
                if slot.insert(bar.symbol.clone(), bar).is_some() {
                    return Err(DataError::Invalid(
                        "duplicate bars found for symbol/ts".into(),
                    ));
                }
            }
        }

        Ok(Self { symbols, batches: by_ts.into_iter().collect(), cursor: 0 })
    }
}

/// Symbols in order of first appearance, or the fallback when the table has
/// no `symbol` column.
fn symbol_order(df: &DataFrame, fallback_symbol: &str) -> Result<Vec<String>, DataError> {
    let Ok(col) = df.column("symbol") else {
        return Ok(vec![fallback_symbol.to_string()]);
    };
    let values = col
        .as_materialized_series()
        .str()
        .map_err(|_| DataError::Invalid("symbol column must contain strings".into()))?;
    let mut symbols = Vec::new();
    for value in values.into_iter() {
        let value = value.ok_or_else(|| DataError::Invalid("symbol must be non-empty".into()))?;
        if value.trim().is_empty() {
            return Err(DataError::Invalid("symbol must be non-empty".into()));
        }
        if !symbols.iter().any(|s| s == value) {
            symbols.push(value.to_string());
        }
    }
    Ok(symbols)
}

impl BarFeed for DataFrameFeed {
    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next(&mut self) -> Option<(DateTime<Utc>, BTreeMap<String, Bar>)> {
        let batch = self.batches.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(batch)
    }
}

/// In-memory feed over pre-built bars, grouped by timestamp. Used by tests
/// and embedders that already hold validated bars.
pub struct MemoryFeed {
    symbols: Vec<String>,
    batches: Vec<(DateTime<Utc>, BTreeMap<String, Bar>)>,
    cursor: usize,
}

impl MemoryFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        let mut symbols = Vec::new();
        let mut by_ts: BTreeMap<DateTime<Utc>, BTreeMap<String, Bar>> = BTreeMap::new();
        for bar in bars {
            if !symbols.contains(&bar.symbol) {
                symbols.push(bar.symbol.clone());
            }
            by_ts.entry(bar.ts).or_default().insert(bar.symbol.clone(), bar);
        }
        Self { symbols, batches: by_ts.into_iter().collect(), cursor: 0 }
    }
}

impl BarFeed for MemoryFeed {
    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next(&mut self) -> Option<(DateTime<Utc>, BTreeMap<String, Bar>)> {
        let batch = self.batches.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(batch)
    }
}

/// Construct the engine feed for `data_path`.
///
/// Directories stream through the dataset manifest; single files load as a
/// dataframe feed. `data.mode=dataframe` on a dataset directory is not
/// supported.
pub fn load_feed(data_path: &Path, config: &ResolvedConfig) -> Result<Box<dyn BarFeed>, DataError> {
    let data_cfg = &config.data;

    if data_path.is_dir() {
        if data_cfg.mode.as_deref() == Some("dataframe") {
            return Err(DataError::Invalid(
                "dataset directories are not supported in dataframe mode; \
                 use data.mode=streaming"
                    .into(),
            ));
        }
        let manifest = DatasetManifest::load(data_path)?.apply_scope(
            data_path,
            data_cfg.symbols_subset.as_deref(),
            data_cfg.max_symbols,
        )?;
        let scope = ScopeOptions {
            date_range: data_cfg.date_range,
            row_limit: data_cfg.row_limit_per_symbol,
        };
        return Ok(Box::new(StreamingFeed::open(data_path, &manifest, &scope)?));
    }

    if data_path.is_file() {
        return Ok(Box::new(DataFrameFeed::load(data_path, data_cfg)?));
    }

    Err(DataError::PathNotFound(data_path.display().to_string()))
}
