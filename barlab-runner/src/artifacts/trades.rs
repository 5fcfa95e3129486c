//! Trade tape export.
//!
//! Stable column set; optional cells are left empty when undefined. `pnl`
//! and `fees` duplicate `pnl_price` and `fees_paid` for older consumers of
//! the tape.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use barlab_core::domain::Trade;

const COLUMNS: &str = "entry_ts,exit_ts,symbol,side,qty,entry_price,exit_price,pnl,pnl_price,\
fees_paid,pnl_net,fees,slippage,mae_price,mfe_price,risk_amount,stop_distance,\
r_multiple_gross,r_multiple_net";

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.8}")).unwrap_or_default()
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{COLUMNS}")?;
    for trade in trades {
        writeln!(
            out,
            "{},{},{},{},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{:.8},{},{},{},{}",
            trade.entry_ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            trade.exit_ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            trade.symbol,
            trade.side,
            trade.qty,
            trade.entry_price,
            trade.exit_price,
            trade.pnl_price,
            trade.pnl_price,
            trade.fees_paid,
            trade.pnl_net,
            trade.fees_paid,
            trade.slippage,
            trade.mae_price,
            trade.mfe_price,
            opt(trade.risk_amount),
            opt(trade.stop_distance),
            opt(trade.r_multiple_gross),
            opt(trade.r_multiple_net),
        )?;
    }
    out.flush()?;
    Ok(())
}
