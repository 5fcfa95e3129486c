//! `data_scope.json` — written only when scope-reducing knobs are active,
//! so a reduced run is self-describing.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde_json::json;
use std::path::Path;

use barlab_core::config::DataConfig;

pub fn write_data_scope(
    run_dir: &Path,
    data: &DataConfig,
    effective_symbols: &[String],
) -> Result<()> {
    let date_range = data.date_range.map(|(start, end)| {
        json!({
            "start": start.to_rfc3339_opts(SecondsFormat::Secs, true),
            "end": end.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    });

    let payload = json!({
        "schema_version": 1,
        "symbols_subset": data.symbols_subset,
        "max_symbols": data.max_symbols,
        "date_range": date_range,
        "row_limit_per_symbol": data.row_limit_per_symbol,
        "chunksize": data.chunksize,
        "symbols_effective": effective_symbols,
    });

    let path = run_dir.join("data_scope.json");
    std::fs::write(&path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
