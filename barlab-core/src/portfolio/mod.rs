//! Portfolio accounting: position book, cash/PnL decomposition,
//! mark-to-market, and the trade builder.

pub mod book;
#[allow(clippy::module_inception)]
pub mod portfolio;

use thiserror::Error;

pub use book::PositionBook;
pub use portfolio::{Portfolio, PortfolioSnapshot};

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("portfolio invariant violated: {0}")]
    InvariantViolation(String),

    #[error("fill quantity must be > 0, got {0}")]
    NonPositiveFillQty(f64),
}
