//! Portfolio accounting with margin and PnL decomposition.
//!
//! Margin-style accounting: cash only moves on fees; price PnL accrues into
//! `realized_pnl_cum` when trades close and `unrealized_pnl` while positions
//! stay open. The identity `equity = cash + realized_pnl_cum +
//! unrealized_pnl` holds at every step by construction and is re-checked
//! from first principles in `assert_invariants`.

use std::collections::BTreeMap;

use crate::domain::{Bar, Fill, Trade};
use crate::strategy::PositionSummary;

use super::book::PositionBook;
use super::PortfolioError;

#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub equity: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub margin_used: f64,
    pub free_margin: f64,
    pub positions: BTreeMap<String, PositionSummary>,
}

pub struct Portfolio {
    initial_cash: f64,
    cash: f64,
    realized_pnl_cum: f64,
    unrealized_pnl: f64,
    equity: f64,
    margin_used: f64,
    free_margin: f64,
    max_leverage: f64,
    book: PositionBook,
    /// Last known close per symbol. A symbol without a bar keeps its last
    /// mark (no interpolation).
    marks: BTreeMap<String, f64>,
}

impl Portfolio {
    pub fn new(initial_cash: f64, max_leverage: f64) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            realized_pnl_cum: 0.0,
            unrealized_pnl: 0.0,
            equity: initial_cash,
            margin_used: 0.0,
            free_margin: initial_cash,
            max_leverage,
            book: PositionBook::new(),
            marks: BTreeMap::new(),
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl_cum
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    pub fn margin_used(&self) -> f64 {
        self.margin_used
    }

    pub fn free_margin(&self) -> f64 {
        self.free_margin
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }

    pub fn last_mark(&self, symbol: &str) -> Option<f64> {
        self.marks.get(symbol).copied()
    }

    /// Apply one fill: fees debit cash immediately; closed price PnL moves
    /// into the realized bucket.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<Option<Trade>, PortfolioError> {
        self.cash -= fill.fee_cost;
        self.marks.entry(fill.symbol.clone()).or_insert(fill.price);

        let trade = self.book.apply_fill(fill)?;
        if let Some(trade) = &trade {
            self.realized_pnl_cum += trade.pnl_price;
        }
        if self.book.get(&fill.symbol).is_none() {
            self.marks.remove(&fill.symbol);
        }
        self.recalculate();
        Ok(trade)
    }

    /// Mark open positions to the current bars' closes and refresh the
    /// MAE/MFE extremes from the bars' highs/lows.
    pub fn mark_to_market(&mut self, bars_by_symbol: &BTreeMap<String, Bar>) {
        for (symbol, bar) in bars_by_symbol {
            self.marks.insert(symbol.clone(), bar.close);
            if let Some(position) = self.book.get_mut(symbol) {
                position.observe_bar(bar);
            }
        }
        self.recalculate();
    }

    fn recalculate(&mut self) {
        let mut unrealized = 0.0;
        let mut margin_used = 0.0;
        for (symbol, position) in self.book.iter() {
            let Some(mark) = self.marks.get(symbol) else { continue };
            unrealized += position.unrealized_pnl(*mark);
            margin_used += position.notional(*mark) / self.max_leverage;
        }
        self.unrealized_pnl = unrealized;
        self.equity = self.cash + self.realized_pnl_cum + self.unrealized_pnl;
        self.margin_used = margin_used;
        self.free_margin = self.equity - self.margin_used;
    }

    /// Re-derive the equity identity from first principles and check open
    /// position quantities. Failure is fatal to the run.
    pub fn assert_invariants(&self) -> Result<(), PortfolioError> {
        let mut unrealized = 0.0;
        for (symbol, position) in self.book.iter() {
            if position.qty <= 0.0 {
                return Err(PortfolioError::InvariantViolation(format!(
                    "{symbol}: open position qty must be > 0, got {}",
                    position.qty
                )));
            }
            if let Some(mark) = self.marks.get(symbol) {
                unrealized += position.unrealized_pnl(*mark);
            }
        }
        let expected = self.cash + self.realized_pnl_cum + unrealized;
        if (self.equity - expected).abs() > 1e-8 {
            return Err(PortfolioError::InvariantViolation(format!(
                "equity {} != cash {} + realized {} + unrealized {unrealized}",
                self.equity, self.cash, self.realized_pnl_cum
            )));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let positions = self
            .book
            .iter()
            .map(|(symbol, position)| {
                let mark = self.marks.get(symbol).copied().unwrap_or(position.avg_price);
                (
                    symbol.clone(),
                    PositionSummary {
                        symbol: symbol.clone(),
                        side: position.side,
                        qty: position.qty,
                        avg_price: position.avg_price,
                        unrealized_pnl: position.unrealized_pnl(mark),
                    },
                )
            })
            .collect();

        PortfolioSnapshot {
            cash: self.cash,
            equity: self.equity,
            realized_pnl: self.realized_pnl_cum,
            unrealized_pnl: self.unrealized_pnl,
            margin_used: self.margin_used,
            free_margin: self.free_margin,
            positions,
        }
    }
}
