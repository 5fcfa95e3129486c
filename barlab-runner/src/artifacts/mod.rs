//! Artifact writers for the run directory.
//!
//! Writers consume the engine's buffered report and flush once, at run end
//! or on failure. `run_status.json` is always written, even on error.

mod equity;
mod jsonl;
mod scope;
mod status;
mod trades;

use anyhow::{Context, Result};
use std::path::Path;

use barlab_core::config::ResolvedConfig;

pub use equity::{write_benchmark_equity_csv, write_equity_csv};
pub use jsonl::{write_decisions_jsonl, write_fills_jsonl};
pub use scope::write_data_scope;
pub use status::{classify_error, write_run_status, RunStatus};
pub use trades::write_trades_csv;

/// Artifacts every successful run must contain.
pub const REQUIRED_ARTIFACTS: [&str; 8] = [
    "config_used.yaml",
    "equity.csv",
    "trades.csv",
    "fills.jsonl",
    "decisions.jsonl",
    "performance.json",
    "performance_by_bucket.csv",
    "run_status.json",
];

/// Serialize the resolved config tree verbatim; written before the engine
/// starts so a crashed run still shows what it was configured to do.
pub fn write_config_used(run_dir: &Path, config: &ResolvedConfig) -> Result<()> {
    let path = run_dir.join("config_used.yaml");
    let yaml = config.to_yaml().context("failed to serialize resolved config")?;
    std::fs::write(&path, yaml)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Validate that all required artifacts exist in `run_dir`.
pub fn validate_run_artifacts(run_dir: &Path) -> Result<()> {
    let missing: Vec<&str> = REQUIRED_ARTIFACTS
        .iter()
        .copied()
        .filter(|name| !run_dir.join(name).exists())
        .collect();
    anyhow::ensure!(
        missing.is_empty(),
        "run artifact validation failed; missing in {}: {}",
        run_dir.display(),
        missing.join(", ")
    );
    Ok(())
}
