//! Single-run orchestration.
//!
//! Overlays compose in documented order (base, built-in fee defaults,
//! built-in slippage defaults, each override, then the local override), the
//! resolved config is written before the engine starts, and
//! `run_status.json` is emitted on every path, including failures.

use anyhow::{Context, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};

use barlab_core::config::{merge_overlays, resolve_config};
use barlab_core::data::load_feed;
use barlab_core::engine::{Engine, EngineReport};
use barlab_core::strategy::make_strategy;

use crate::artifacts::{self, RunStatus};
use crate::defaults;
use crate::performance;
use crate::summary;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_path: PathBuf,
    pub config_path: PathBuf,
    pub overrides: Vec<PathBuf>,
    pub local_config: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub run_name: Option<String>,
}

/// Wall-clock run id, e.g. `run_20260117_130501`.
pub fn make_run_id() -> String {
    format!("run_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}

fn load_yaml_mapping(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("config path not found: {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse YAML config: {}", path.display()))?;
    match value {
        Value::Null => Ok(Value::Mapping(Default::default())),
        Value::Mapping(_) => Ok(value),
        _ => anyhow::bail!("expected a YAML mapping in {}", path.display()),
    }
}

/// Run a single backtest and return the created run directory.
pub fn run_backtest(options: &RunOptions) -> Result<PathBuf> {
    let mut overlays = vec![load_yaml_mapping(&options.config_path)?];
    overlays.push(serde_yaml::from_str(defaults::FEES_DEFAULTS_YAML).expect("built-in overlay"));
    overlays
        .push(serde_yaml::from_str(defaults::SLIPPAGE_DEFAULTS_YAML).expect("built-in overlay"));
    for path in &options.overrides {
        overlays.push(load_yaml_mapping(path)?);
    }
    if let Some(path) = &options.local_config {
        overlays.push(load_yaml_mapping(path)?);
    }
    let merged = merge_overlays(&overlays);

    let run_id = options.run_name.clone().unwrap_or_else(make_run_id);
    let run_dir = options.out_dir.join(&run_id);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;

    let mut status = RunStatus { run_id, r_metrics_valid: true, ..Default::default() };
    match execute(merged, options, &run_dir, &mut status) {
        Ok(()) => {
            artifacts::write_run_status(&run_dir, &status, None)?;
            tracing::info!(run_dir = %run_dir.display(), "backtest complete");
            Ok(run_dir)
        }
        Err(error) => {
            // Best-effort status emission; the original error wins.
            if let Err(status_error) = artifacts::write_run_status(&run_dir, &status, Some(&error))
            {
                tracing::warn!(%status_error, "failed to write run_status.json");
            }
            Err(error)
        }
    }
}

fn build_notes(status: &RunStatus, report: &EngineReport) -> Vec<String> {
    let mut notes = Vec::new();
    if status.stop_resolution.as_deref() == Some("strict") {
        notes.push(
            "Strict mode requires entry signals to provide stop_price or stop_spec.".to_string(),
        );
    }
    if report.used_legacy_stop_proxy {
        notes.push(
            "Legacy proxy fallback was used for entries with unresolved stop inputs.".to_string(),
        );
    }
    notes
}

fn execute(
    merged: Value,
    options: &RunOptions,
    run_dir: &Path,
    status: &mut RunStatus,
) -> Result<()> {
    let config = resolve_config(merged)?;
    status.execution_profile = Some(config.profile.clone());
    status.spread_mode = Some(config.spread_mode.to_string());
    status.intrabar_mode = Some(config.intrabar_mode.to_string());
    status.stop_resolution = Some(config.risk.stop_resolution_mode.as_str().to_string());
    status.allow_legacy_proxy = Some(config.risk.allow_legacy_proxy);

    artifacts::write_config_used(run_dir, &config)?;

    let feed = load_feed(&options.data_path, &config)?;
    if config.data.scope_knobs_active() {
        artifacts::write_data_scope(run_dir, &config.data, &feed.symbols())?;
    }

    let strategy =
        make_strategy(&config.strategy.name, &config.strategy.params, config.run.seed)?;
    let mut engine = Engine::new(&config, feed, strategy)?;
    tracing::info!(
        profile = %config.profile.name,
        mode = %config.risk.stop_resolution_mode.as_str(),
        "starting backtest"
    );
    let run_result = engine.run();
    let report = engine.report();

    status.used_legacy_stop_proxy = report.used_legacy_stop_proxy;
    status.r_metrics_valid = report.r_metrics_valid;
    status.stop_resolution_counts = report.counters.stop_resolution_counts.clone();
    status.notes = build_notes(status, &report);

    // Flush the buffered rows even when the loop failed, so a failed run
    // directory is still inspectable; then propagate.
    artifacts::write_equity_csv(&run_dir.join("equity.csv"), &report.equity)?;
    artifacts::write_trades_csv(&run_dir.join("trades.csv"), &report.trades)?;
    artifacts::write_fills_jsonl(&run_dir.join("fills.jsonl"), &report.fills)?;
    artifacts::write_decisions_jsonl(&run_dir.join("decisions.jsonl"), &report.decisions)?;
    run_result?;

    let perf = performance::compute(
        &report,
        &status.run_id,
        config.run.initial_cash,
        config.run.periods_per_year,
    );
    performance::write(run_dir, &perf)?;

    if let Some(benchmark) = &report.benchmark {
        summary::write_benchmark_artifacts(
            run_dir,
            benchmark,
            perf.final_equity,
            config.run.initial_cash,
        )?;
    }
    if config.summary_enabled {
        summary::write_summary_txt(run_dir, &perf)?;
    }

    artifacts::validate_run_artifacts(run_dir)?;
    Ok(())
}
