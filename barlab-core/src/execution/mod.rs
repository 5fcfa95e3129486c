//! Execution simulation: delayed market-order queue and the
//! intrabar/spread/slippage/fee cost pipeline.

pub mod costs;
pub mod intrabar;
pub mod model;

use thiserror::Error;

pub use costs::{price_fill, PricedFill};
pub use intrabar::raw_fill_price;
pub use model::{ExecutionModel, PendingOrder};

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("only MARKET orders are supported, got {0}")]
    UnsupportedOrderType(String),
}
