//! `run_backtest` — run a single backtest from YAML config overlays.
//!
//! Exit code 0 on success, 1 on failure. Overlays compose in documented
//! order: base config, built-in fee/slippage defaults, each `--override` in
//! order, then `--local-config` last.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use barlab_runner::{run_backtest, RunOptions};

#[derive(Parser)]
#[command(
    name = "run_backtest",
    about = "Event-driven bar-by-bar backtest runner",
    version
)]
struct Cli {
    /// Data input: a CSV/Parquet file or a dataset directory with manifest.yaml
    #[arg(long)]
    data: PathBuf,

    /// Base YAML config
    #[arg(long)]
    config: PathBuf,

    /// Additional override overlays, applied in order
    #[arg(long = "override")]
    overrides: Vec<PathBuf>,

    /// Local override overlay, applied last
    #[arg(long)]
    local_config: Option<PathBuf>,

    /// Output directory for run artifacts
    #[arg(long, default_value = "outputs/runs")]
    out: PathBuf,

    /// Run directory name (defaults to a timestamped id)
    #[arg(long)]
    run_name: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = RunOptions {
        data_path: cli.data,
        config_path: cli.config,
        overrides: cli.overrides,
        local_config: cli.local_config,
        out_dir: cli.out,
        run_name: cli.run_name,
    };

    match run_backtest(&options) {
        Ok(run_dir) => {
            println!("{}", run_dir.display());
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
