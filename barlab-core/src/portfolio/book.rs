//! Position book: one open position per symbol, trade extraction on
//! reduction.
//!
//! Same-side fills open or extend (quantity-weighted average price);
//! opposite-side fills reduce and emit a `Trade` for the reduced portion,
//! then flip any residual quantity into a new position at the executed
//! price. Fees and friction are attributed pro-rata between the closed
//! portion and what stays open.

use std::collections::BTreeMap;

use crate::domain::trade::r_multiple;
use crate::domain::{Fill, Position, RiskProvenance, Trade};

use super::PortfolioError;

#[derive(Default)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Position)> {
        self.positions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Position)> {
        self.positions.iter_mut()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    /// Apply a fill. Returns the trade closed by this fill, if any.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<Option<Trade>, PortfolioError> {
        if fill.qty <= 0.0 {
            return Err(PortfolioError::NonPositiveFillQty(fill.qty));
        }

        let Some(position) = self.positions.get_mut(&fill.symbol) else {
            self.positions.insert(fill.symbol.clone(), open_position(fill, fill.qty));
            return Ok(None);
        };

        if position.side == fill.side {
            // Extend: quantity-weighted average entry.
            let new_qty = position.qty + fill.qty;
            position.avg_price =
                (position.avg_price * position.qty + fill.price * fill.qty) / new_qty;
            position.qty = new_qty;
            position.fees_paid += fill.fee_cost;
            position.friction_paid += fill.slippage_cost + fill.spread_cost;
            return Ok(None);
        }

        // Opposite side: reduce, maybe close, maybe flip.
        let reduce_qty = position.qty.min(fill.qty);
        let entry_share = reduce_qty / position.qty;
        let exit_share = reduce_qty / fill.qty;

        let pnl_price = position.price_pnl(fill.price, reduce_qty);
        let fees_paid = position.fees_paid * entry_share + fill.fee_cost * exit_share;
        let slippage = position.friction_paid * entry_share
            + (fill.slippage_cost + fill.spread_cost) * exit_share;

        // Partial reductions carry a pro-rata share of the original risk so
        // R-multiples stay comparable across trade rows.
        let risk_amount = position.risk.risk_amount.map(|amount| amount * entry_share);
        let trade = Trade {
            entry_ts: position.open_ts,
            exit_ts: fill.ts_filled,
            symbol: position.symbol.clone(),
            side: position.side,
            qty: reduce_qty,
            entry_price: position.avg_price,
            exit_price: fill.price,
            pnl_price,
            fees_paid,
            pnl_net: pnl_price - fees_paid,
            slippage,
            mae_price: position.mae_price,
            mfe_price: position.mfe_price,
            risk_amount,
            stop_distance: position.risk.stop_distance,
            r_multiple_gross: position
                .risk
                .r_metrics_valid
                .then(|| r_multiple(pnl_price, risk_amount))
                .flatten(),
            r_multiple_net: position
                .risk
                .r_metrics_valid
                .then(|| r_multiple(pnl_price - fees_paid, risk_amount))
                .flatten(),
            bucket: None,
        };

        let residual_fill_qty = fill.qty - reduce_qty;
        let remaining_qty = position.qty - reduce_qty;

        if remaining_qty > 0.0 {
            position.qty = remaining_qty;
            position.fees_paid *= 1.0 - entry_share;
            position.friction_paid *= 1.0 - entry_share;
            if let Some(amount) = position.risk.risk_amount {
                position.risk.risk_amount = Some(amount * (1.0 - entry_share));
            }
        } else if residual_fill_qty > 0.0 {
            // Flip: the residual opens a new position on the fill's side,
            // carrying the residual share of the fill's costs.
            let mut flipped = open_position(fill, residual_fill_qty);
            let residual_share = residual_fill_qty / fill.qty;
            flipped.fees_paid = fill.fee_cost * residual_share;
            flipped.friction_paid = (fill.slippage_cost + fill.spread_cost) * residual_share;
            self.positions.insert(fill.symbol.clone(), flipped);
        } else {
            self.positions.remove(&fill.symbol);
        }

        Ok(Some(trade))
    }
}

fn open_position(fill: &Fill, qty: f64) -> Position {
    let risk = fill.meta.risk.clone().unwrap_or_else(RiskProvenance::default);
    let mut position =
        Position::open(fill.symbol.clone(), fill.side, qty, fill.price, fill.ts_filled, risk);
    position.fees_paid = fill.fee_cost;
    position.friction_paid = fill.slippage_cost + fill.spread_cost;
    position
}
