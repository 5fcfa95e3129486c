//! `run_status.json` — always written, even when the run fails.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

use barlab_core::config::{ConfigError, ExecutionProfile};
use barlab_core::data::DataError;
use barlab_core::engine::EngineError;

/// Execution/stop context carried into the status file. Filled
/// progressively so a failure before config resolution still produces a
/// valid (if sparse) status.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub execution_profile: Option<ExecutionProfile>,
    pub spread_mode: Option<String>,
    pub intrabar_mode: Option<String>,
    pub stop_resolution: Option<String>,
    pub allow_legacy_proxy: Option<bool>,
    pub used_legacy_stop_proxy: bool,
    pub r_metrics_valid: bool,
    pub stop_resolution_counts: BTreeMap<String, u64>,
    pub notes: Vec<String>,
}

/// Map an error chain onto the stable taxonomy label.
pub fn classify_error(error: &anyhow::Error) -> &'static str {
    if error.downcast_ref::<ConfigError>().is_some() {
        return "ConfigError";
    }
    if error.downcast_ref::<DataError>().is_some() {
        return "DataError";
    }
    if let Some(engine_error) = error.downcast_ref::<EngineError>() {
        return engine_error.kind();
    }
    "RuntimeError"
}

pub fn write_run_status(
    run_dir: &Path,
    status: &RunStatus,
    error: Option<&anyhow::Error>,
) -> Result<()> {
    let profile = status.execution_profile.as_ref();
    let effective_execution = profile.map(|p| {
        json!({
            "maker_fee": p.maker_fee,
            "taker_fee": p.taker_fee,
            "slippage_bps": p.slippage_bps,
            "spread_bps": p.spread_bps,
            "delay_bars": p.delay_bars,
        })
    });

    let stop_contract = status.stop_resolution.as_ref().map(|mode| {
        json!({
            "version": 1,
            "mode": mode,
            "allow_legacy_proxy": status.allow_legacy_proxy.unwrap_or(false),
            "counts": status.stop_resolution_counts,
            "notes": status.notes,
        })
    });

    let payload = json!({
        "schema_version": 1,
        "status": if error.is_none() { "PASS" } else { "FAIL" },
        "error_type": error.map(classify_error).unwrap_or(""),
        "error_message": error.map(|e| e.to_string()).unwrap_or_default(),
        "traceback": error.map(|e| format!("{e:?}")).unwrap_or_default(),
        "run_id": status.run_id,
        "execution_profile": profile.map(|p| p.name.clone()),
        "effective_execution": effective_execution,
        "spread_mode": status.spread_mode,
        "intrabar_mode": status.intrabar_mode,
        "stop_resolution": status.stop_resolution,
        "used_legacy_stop_proxy": status.used_legacy_stop_proxy,
        "r_metrics_valid": status.r_metrics_valid,
        "stop_resolution_counts": status.stop_resolution_counts,
        "notes": status.notes,
        "stop_contract": stop_contract,
    });

    let path = run_dir.join("run_status.json");
    std::fs::write(&path, serde_json::to_string_pretty(&payload)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_status_has_empty_error_fields() {
        let dir = tempfile::tempdir().unwrap();
        let status = RunStatus {
            run_id: "run_test".into(),
            stop_resolution: Some("strict".into()),
            r_metrics_valid: true,
            ..Default::default()
        };
        write_run_status(dir.path(), &status, None).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("run_status.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["status"], "PASS");
        assert_eq!(parsed["error_type"], "");
        assert_eq!(parsed["stop_contract"]["mode"], "strict");
    }

    #[test]
    fn fail_status_carries_taxonomy_label() {
        let dir = tempfile::tempdir().unwrap();
        let error = anyhow::Error::from(ConfigError::RootNotMapping);
        write_run_status(dir.path(), &RunStatus::default(), Some(&error)).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("run_status.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["status"], "FAIL");
        assert_eq!(parsed["error_type"], "ConfigError");
        assert!(!parsed["error_message"].as_str().unwrap().is_empty());
    }
}
