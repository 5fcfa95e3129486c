//! Market data: per-symbol validated sources, time-aligned feeds, dataset
//! manifests, and higher-timeframe resampling.

pub mod feed;
pub mod manifest;
pub mod resample;
pub mod source;

use thiserror::Error;

pub use feed::{load_feed, BarFeed, DataFrameFeed, MemoryFeed, StreamingFeed};
pub use manifest::DatasetManifest;
pub use resample::{HtfBar, Timeframe, TimeframeResampler};
pub use source::SymbolSource;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("{path}: failed to read data: {detail}")]
    Ingest { path: String, detail: String },

    #[error("{symbol}: {detail}")]
    InvalidRow { symbol: String, detail: String },

    #[error("dataset manifest validation failed for '{dataset_dir}': {detail}")]
    Manifest { dataset_dir: String, detail: String },

    #[error("data path not found: {0}")]
    PathNotFound(String),

    #[error("unsupported data file extension: {0}")]
    UnsupportedExtension(String),

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("{0}")]
    Invalid(String),
}
