//! Equity curve export.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use barlab_core::benchmark::BenchmarkPoint;
use barlab_core::engine::EquityRow;

pub fn write_equity_csv(path: &Path, rows: &[EquityRow]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "ts,cash,equity,realized_pnl,unrealized_pnl,margin_used")?;
    for row in rows {
        writeln!(
            out,
            "{},{:.8},{:.8},{:.8},{:.8},{:.8}",
            row.ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            row.cash,
            row.equity,
            row.realized_pnl,
            row.unrealized_pnl,
            row.margin_used
        )?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_benchmark_equity_csv(path: &Path, curve: &[BenchmarkPoint]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "ts,equity")?;
    for point in curve {
        writeln!(
            out,
            "{},{:.8}",
            point.ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            point.equity
        )?;
    }
    out.flush()?;
    Ok(())
}
