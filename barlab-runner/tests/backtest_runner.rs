//! End-to-end runner tests: the artifact contract on success, and the
//! always-written run status on failure.

use std::path::{Path, PathBuf};

use barlab_runner::{run_backtest, RunOptions};

fn write_bars_csv(path: &Path, n: usize) {
    let mut contents = String::from("ts,symbol,open,high,low,close,volume\n");
    for i in 0..n {
        let minute = i % 60;
        let hour = i / 60;
        let px = 100.0 + (i % 9) as f64;
        contents.push_str(&format!(
            "2024-01-01T{hour:02}:{minute:02}:00Z,AAA,{px},{},{},{px},25\n",
            px + 2.0,
            px - 2.0,
        ));
    }
    std::fs::write(path, contents).unwrap();
}

fn options(dir: &Path, config_yaml: &str, run_name: &str) -> RunOptions {
    let data_path = dir.join("bars.csv");
    write_bars_csv(&data_path, 120);
    let config_path = dir.join("config.yaml");
    std::fs::write(&config_path, config_yaml).unwrap();
    RunOptions {
        data_path,
        config_path,
        overrides: Vec::new(),
        local_config: None,
        out_dir: dir.join("runs"),
        run_name: Some(run_name.to_string()),
    }
}

const COINFLIP_STRICT: &str = "\
run: {initial_cash: 10000, seed: 7}
risk: {r_per_trade: 0.005, stop_resolution_mode: strict, max_leverage: 10}
strategy: {name: coinflip, p_trade: 0.5, max_hold_bars: 10}
summary: {enabled: true}
benchmark: {enabled: true}
";

#[test]
fn successful_run_writes_the_full_artifact_contract() {
    let dir = tempfile::tempdir().unwrap();
    let run_dir = run_backtest(&options(dir.path(), COINFLIP_STRICT, "run_contract")).unwrap();

    for artifact in [
        "config_used.yaml",
        "equity.csv",
        "trades.csv",
        "fills.jsonl",
        "decisions.jsonl",
        "performance.json",
        "performance_by_bucket.csv",
        "run_status.json",
        "summary.txt",
        "benchmark_equity.csv",
        "benchmark_metrics.json",
        "comparison_summary.json",
    ] {
        assert!(run_dir.join(artifact).exists(), "missing {artifact}");
    }

    // No scope knobs active, so no data_scope.json.
    assert!(!run_dir.join("data_scope.json").exists());

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    assert!(equity.starts_with("ts,cash,equity,realized_pnl,unrealized_pnl,margin_used\n"));
    // One row per feed timestamp at minimum.
    assert!(equity.lines().count() > 120);

    let status: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("run_status.json")).unwrap())
            .unwrap();
    assert_eq!(status["status"], "PASS");
    assert_eq!(status["execution_profile"], "tier2");
    assert_eq!(status["stop_resolution"], "strict");
    assert_eq!(status["used_legacy_stop_proxy"], false);
    assert_eq!(status["r_metrics_valid"], true);
    assert_eq!(status["effective_execution"]["taker_fee"], 0.0006);

    let performance: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("performance.json")).unwrap())
            .unwrap();
    assert_eq!(performance["schema_version"], 1);
    assert!(performance["final_equity"].as_f64().unwrap() > 0.0);

    let bucket_csv =
        std::fs::read_to_string(run_dir.join("performance_by_bucket.csv")).unwrap();
    assert!(bucket_csv.starts_with("bucket,n_trades,ev_net\n"));

    // The resolved config round-trips through the resolver untouched.
    let config_used = std::fs::read_to_string(run_dir.join("config_used.yaml")).unwrap();
    let reparsed: serde_yaml::Value = serde_yaml::from_str(&config_used).unwrap();
    let resolved = barlab_core::config::resolve_config(reparsed.clone()).unwrap();
    assert_eq!(resolved.tree(), &reparsed);
}

#[test]
fn runs_are_deterministic_given_identical_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let run_a = run_backtest(&options(dir.path(), COINFLIP_STRICT, "run_a")).unwrap();
    let run_b = run_backtest(&options(dir.path(), COINFLIP_STRICT, "run_b")).unwrap();

    for artifact in ["equity.csv", "trades.csv", "fills.jsonl"] {
        let a = std::fs::read(run_a.join(artifact)).unwrap();
        let b = std::fs::read(run_b.join(artifact)).unwrap();
        assert_eq!(a, b, "{artifact} differs between identical runs");
    }
}

#[test]
fn scope_knobs_emit_data_scope_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = format!("{COINFLIP_STRICT}data: {{row_limit_per_symbol: 30}}\n");
    let run_dir = run_backtest(&options(dir.path(), &config, "run_scoped")).unwrap();

    let scope: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("data_scope.json")).unwrap())
            .unwrap();
    assert_eq!(scope["row_limit_per_symbol"], 30);
    assert_eq!(scope["symbols_effective"][0], "AAA");

    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();
    // Header plus at most the row-limited timestamps (plus a possible
    // end-of-run liquidation row).
    assert!(equity.lines().count() <= 32);
}

#[test]
fn config_error_still_writes_fail_status() {
    let dir = tempfile::tempdir().unwrap();
    let bad = "risk: {stop_resolution_mode: strict, allow_legacy_proxy: true}\n";
    let options = options(dir.path(), bad, "run_bad_config");
    let error = run_backtest(&options).unwrap_err();
    assert!(error.to_string().contains("strict"));

    let status_path = options.out_dir.join("run_bad_config").join("run_status.json");
    let status: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(status_path).unwrap()).unwrap();
    assert_eq!(status["status"], "FAIL");
    assert_eq!(status["error_type"], "ConfigError");
    assert!(!status["error_message"].as_str().unwrap().is_empty());
    assert!(!status["traceback"].as_str().unwrap().is_empty());
}

#[test]
fn missing_data_path_fails_with_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options(dir.path(), COINFLIP_STRICT, "run_missing_data");
    options.data_path = PathBuf::from("/nonexistent/bars.csv");
    let error = run_backtest(&options).unwrap_err();

    let status_path = options.out_dir.join("run_missing_data").join("run_status.json");
    let status: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(status_path).unwrap()).unwrap();
    assert_eq!(status["status"], "FAIL");
    assert_eq!(status["error_type"], "DataError");
    drop(error);
}

#[test]
fn overlays_compose_in_documented_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut options = options(dir.path(), COINFLIP_STRICT, "run_overlay");

    let override_path = dir.path().join("override.yaml");
    std::fs::write(&override_path, "execution: {profile: tier3}\n").unwrap();
    options.overrides.push(override_path);

    let local_path = dir.path().join("local.yaml");
    std::fs::write(&local_path, "risk: {r_per_trade: 0.002}\n").unwrap();
    options.local_config = Some(local_path);

    let run_dir = run_backtest(&options).unwrap();
    let config_used: serde_yaml::Value = serde_yaml::from_str(
        &std::fs::read_to_string(run_dir.join("config_used.yaml")).unwrap(),
    )
    .unwrap();
    assert_eq!(config_used["execution"]["profile"], "tier3");
    assert_eq!(config_used["risk"]["r_per_trade"], 0.002);
}
