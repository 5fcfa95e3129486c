//! JSONL exports: fills and decisions, one object per line.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use barlab_core::domain::Fill;
use barlab_core::engine::DecisionRecord;

/// One JSON object per fill with the canonical cost fields `fee_cost`,
/// `slippage_cost`, `spread_cost`.
pub fn write_fills_jsonl(path: &Path, fills: &[Fill]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for fill in fills {
        let record = json!({
            "ts_filled": fill.ts_filled.to_rfc3339_opts(SecondsFormat::Secs, true),
            "symbol": fill.symbol,
            "side": fill.side,
            "qty": fill.qty,
            "price": fill.price,
            "fee_cost": fill.fee_cost,
            "slippage_cost": fill.slippage_cost,
            "spread_cost": fill.spread_cost,
            "metadata": fill.meta,
        });
        writeln!(out, "{record}")?;
    }
    out.flush()?;
    Ok(())
}

/// One JSON object per risk/conflict/liquidation decision.
pub fn write_decisions_jsonl(path: &Path, decisions: &[DecisionRecord]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for decision in decisions {
        let record = json!({
            "ts": decision.ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            "symbol": decision.symbol,
            "accepted": decision.accepted,
            "reason_code": decision.reason_code,
            "metadata": decision.metadata,
        });
        writeln!(out, "{record}")?;
    }
    out.flush()?;
    Ok(())
}
