//! Performance metrics computed from the engine report.
//!
//! Annualization infers periods-per-year from the median bar spacing
//! (sub-90-second spacing reads as a 1-minute feed) unless the config pins
//! `run.periods_per_year`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use barlab_core::engine::{EngineReport, EquityRow};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub schema_version: u32,
    pub run_id: String,
    pub final_equity: f64,
    pub total_trades: usize,
    pub ev_net: f64,
    pub ev_gross: f64,
    pub win_rate: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    pub fee_total: f64,
    pub slippage_total: f64,
    pub spread_total: f64,
    pub fee_drag_pct: f64,
    pub slippage_drag_pct: f64,
    pub spread_drag_pct: f64,
    /// Most negative peak-to-trough equity fraction (<= 0).
    pub max_drawdown_pct: f64,
    pub cagr: Option<f64>,
    pub sharpe_annualized: Option<f64>,
    pub sortino_annualized: Option<f64>,
    pub mar_ratio: Option<f64>,
    pub ev_r_gross: Option<f64>,
    pub ev_r_net: Option<f64>,
    pub ev_by_bucket: BTreeMap<String, f64>,
    pub trades_by_bucket: BTreeMap<String, usize>,
}

fn drag_pct(cost: f64, gross_pnl: f64) -> f64 {
    if gross_pnl == 0.0 {
        return 0.0;
    }
    100.0 * cost / gross_pnl.abs()
}

fn max_drawdown(equity: &[EquityRow]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for row in equity {
        peak = peak.max(row.equity);
        if peak > 0.0 {
            max_dd = max_dd.min(row.equity / peak - 1.0);
        }
    }
    max_dd
}

fn infer_periods_per_year(equity: &[EquityRow]) -> u32 {
    let mut deltas: Vec<i64> = equity
        .windows(2)
        .map(|w| (w[1].ts - w[0].ts).num_seconds())
        .filter(|d| *d > 0)
        .collect();
    if deltas.is_empty() {
        return 365;
    }
    deltas.sort_unstable();
    let median = deltas[deltas.len() / 2];
    if median <= 90 {
        365 * 24 * 60
    } else {
        365
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        return None;
    }
    Some(collected.iter().sum::<f64>() / collected.len() as f64)
}

pub fn compute(
    report: &EngineReport,
    run_id: &str,
    initial_cash: f64,
    periods_per_year_override: Option<u32>,
) -> PerformanceReport {
    let equity = &report.equity;
    let trades = &report.trades;

    let final_equity = equity.last().map(|row| row.equity).unwrap_or(initial_cash);

    let gross_pnl: f64 = trades.iter().map(|t| t.pnl_price).sum();
    let net_pnl: f64 = trades.iter().map(|t| t.pnl_net).sum();
    let fee_total: f64 = report.fills.iter().map(|f| f.fee_cost.abs()).sum();
    let slippage_total: f64 = report.fills.iter().map(|f| f.slippage_cost.abs()).sum();
    let spread_total: f64 = report.fills.iter().map(|f| f.spread_cost.abs()).sum();

    let total_trades = trades.len();
    let wins = trades.iter().filter(|t| t.pnl_net > 0.0).count();
    let win_rate = if total_trades > 0 { wins as f64 / total_trades as f64 } else { 0.0 };
    let ev_net = if total_trades > 0 { net_pnl / total_trades as f64 } else { 0.0 };
    let ev_gross = if total_trades > 0 { gross_pnl / total_trades as f64 } else { 0.0 };

    // Per-bar returns for the ratio metrics.
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0].equity != 0.0)
        .map(|w| w[1].equity / w[0].equity - 1.0)
        .collect();
    let (sharpe_annualized, sortino_annualized) = if returns.len() < 3 {
        (None, None)
    } else {
        let periods =
            periods_per_year_override.unwrap_or_else(|| infer_periods_per_year(equity)) as f64;
        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance = returns.iter().map(|r| (r - mean_return).powi(2)).sum::<f64>()
            / returns.len() as f64;
        let std_dev = variance.sqrt();
        let sharpe =
            (std_dev > 0.0).then(|| mean_return / std_dev * periods.sqrt());

        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let sortino = if downside.is_empty() {
            None
        } else {
            let downside_var =
                downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
            let downside_dev = downside_var.sqrt();
            (downside_dev > 0.0).then(|| mean_return / downside_dev * periods.sqrt())
        };
        (sharpe, sortino)
    };

    let max_drawdown_pct = max_drawdown(equity);

    let cagr = match (equity.first(), equity.last()) {
        (Some(first), Some(last)) if last.ts > first.ts => {
            let years = (last.ts - first.ts).num_seconds() as f64 / SECONDS_PER_YEAR;
            let initial = first.equity;
            (years > 0.0 && initial > 0.0 && final_equity > 0.0)
                .then(|| (final_equity / initial).powf(1.0 / years) - 1.0)
        }
        _ => None,
    };
    let mar_ratio = match (cagr, max_drawdown_pct) {
        (Some(cagr), dd) if dd != 0.0 => Some(cagr / dd.abs()),
        _ => None,
    };

    let ev_r_gross = mean(trades.iter().filter_map(|t| t.r_multiple_gross));
    let ev_r_net = mean(trades.iter().filter_map(|t| t.r_multiple_net));

    let mut ev_by_bucket: BTreeMap<String, f64> = BTreeMap::new();
    let mut trades_by_bucket: BTreeMap<String, usize> = BTreeMap::new();
    if total_trades == 0 {
        ev_by_bucket.insert("all".into(), 0.0);
        trades_by_bucket.insert("all".into(), 0);
    } else {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for trade in trades {
            let bucket = trade.bucket.clone().unwrap_or_else(|| "all".to_string());
            *sums.entry(bucket.clone()).or_insert(0.0) += trade.pnl_net;
            *trades_by_bucket.entry(bucket).or_insert(0) += 1;
        }
        for (bucket, sum) in sums {
            let count = trades_by_bucket[&bucket] as f64;
            ev_by_bucket.insert(bucket, sum / count);
        }
    }

    PerformanceReport {
        schema_version: 1,
        run_id: run_id.to_string(),
        final_equity,
        total_trades,
        ev_net,
        ev_gross,
        win_rate,
        gross_pnl,
        net_pnl,
        fee_total,
        slippage_total,
        spread_total,
        fee_drag_pct: drag_pct(fee_total, gross_pnl),
        slippage_drag_pct: drag_pct(slippage_total, gross_pnl),
        spread_drag_pct: drag_pct(spread_total, gross_pnl),
        max_drawdown_pct,
        cagr,
        sharpe_annualized,
        sortino_annualized,
        mar_ratio,
        ev_r_gross,
        ev_r_net,
        ev_by_bucket,
        trades_by_bucket,
    }
}

pub fn write(run_dir: &Path, report: &PerformanceReport) -> Result<()> {
    let json_path = run_dir.join("performance.json");
    std::fs::write(&json_path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    let csv_path = run_dir.join("performance_by_bucket.csv");
    let file = std::fs::File::create(&csv_path)
        .with_context(|| format!("failed to create {}", csv_path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    writeln!(out, "bucket,n_trades,ev_net")?;
    for (bucket, ev) in &report.ev_by_bucket {
        let n = report.trades_by_bucket.get(bucket).copied().unwrap_or(0);
        writeln!(out, "{bucket},{n},{ev:.8}")?;
    }
    out.flush()?;
    Ok(())
}
