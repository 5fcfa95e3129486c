//! The engine loop: timestep coordinator wiring feed, strategy, risk,
//! execution, portfolio, and writers.

pub mod counters;
pub mod event_loop;

use thiserror::Error;

pub use counters::SanityCounters;
pub use event_loop::{DecisionRecord, Engine, EngineReport, EquityRow};

use crate::data::DataError;
use crate::execution::ExecutionError;
use crate::portfolio::PortfolioError;
use crate::risk::RiskError;
use crate::strategy::StrategyContractError;

/// Fatal engine failures, by taxonomy kind. Risk rejections never surface
/// here; they are recorded decisions.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    StrategyContract(#[from] StrategyContractError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Portfolio(#[from] PortfolioError),
}

impl EngineError {
    /// Stable taxonomy label for `run_status.json.error_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Data(_) => "DataError",
            EngineError::StrategyContract(_) => "StrategyContractError",
            EngineError::Risk(_) => "RiskError",
            EngineError::Execution(_) => "ExecutionError",
            EngineError::Portfolio(_) => "PortfolioError",
        }
    }
}
