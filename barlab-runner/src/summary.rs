//! Optional human-readable run digest (`summary.txt`) and benchmark
//! comparison artifacts.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use barlab_core::benchmark::BuyHoldTracker;

use crate::artifacts::write_benchmark_equity_csv;
use crate::performance::PerformanceReport;

pub fn write_summary_txt(run_dir: &Path, performance: &PerformanceReport) -> Result<()> {
    fn fmt_opt(value: Option<f64>) -> String {
        value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string())
    }

    let text = format!(
        "run {id}\n\
         final equity     {final_equity:.2}\n\
         trades           {trades} (win rate {win_rate:.1}%)\n\
         net pnl          {net:.2} (gross {gross:.2})\n\
         costs            fees {fees:.2} / slippage {slip:.2} / spread {spread:.2}\n\
         max drawdown     {dd:.2}%\n\
         sharpe (ann.)    {sharpe}\n\
         cagr             {cagr}\n",
        id = performance.run_id,
        final_equity = performance.final_equity,
        trades = performance.total_trades,
        win_rate = performance.win_rate * 100.0,
        net = performance.net_pnl,
        gross = performance.gross_pnl,
        fees = performance.fee_total,
        slip = performance.slippage_total,
        spread = performance.spread_total,
        dd = performance.max_drawdown_pct * 100.0,
        sharpe = fmt_opt(performance.sharpe_annualized),
        cagr = fmt_opt(performance.cagr),
    );

    let path = run_dir.join("summary.txt");
    std::fs::write(&path, text)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Write `benchmark_equity.csv`, `benchmark_metrics.json`, and
/// `comparison_summary.json` for an enabled buy-and-hold benchmark.
pub fn write_benchmark_artifacts(
    run_dir: &Path,
    benchmark: &BuyHoldTracker,
    strategy_final_equity: f64,
    initial_cash: f64,
) -> Result<()> {
    write_benchmark_equity_csv(&run_dir.join("benchmark_equity.csv"), benchmark.curve())?;

    let final_equity = benchmark.final_equity();
    let total_return_pct = if initial_cash > 0.0 {
        100.0 * (final_equity / initial_cash - 1.0)
    } else {
        0.0
    };
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for point in benchmark.curve() {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            max_dd = max_dd.min(point.equity / peak - 1.0);
        }
    }

    let metrics = json!({
        "schema_version": 1,
        "symbol": benchmark.symbol(),
        "final_equity": final_equity,
        "total_return_pct": total_return_pct,
        "max_drawdown_pct": max_dd,
    });
    std::fs::write(
        run_dir.join("benchmark_metrics.json"),
        serde_json::to_string_pretty(&metrics)?,
    )
    .context("failed to write benchmark_metrics.json")?;

    let excess_return_pct = if initial_cash > 0.0 {
        100.0 * (strategy_final_equity - final_equity) / initial_cash
    } else {
        0.0
    };
    let comparison = json!({
        "schema_version": 1,
        "strategy_final_equity": strategy_final_equity,
        "benchmark_final_equity": final_equity,
        "excess_return_pct": excess_return_pct,
    });
    std::fs::write(
        run_dir.join("comparison_summary.json"),
        serde_json::to_string_pretty(&comparison)?,
    )
    .context("failed to write comparison_summary.json")?;

    Ok(())
}
