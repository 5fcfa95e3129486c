//! Risk boundary: stop normalization, stop-distance resolution, R-based
//! sizing, and guardrails with safe/strict enforcement.

pub mod codes;
pub mod engine;
pub mod margin;
pub mod stop_resolver;
pub mod stop_spec;

use thiserror::Error;

pub use engine::{RiskDecision, RiskEngine, RiskInputs};
pub use stop_resolver::{resolve_stop, StopOutcome, StopResolution};
pub use stop_spec::{normalize_stop_spec, HybridPolicy, NormalizedStopSpec, StopSpec};

/// Risk *errors* are contract violations (malformed stop payloads and the
/// like). Risk *rejections* are decisions, not errors, and never surface
/// through this type.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("invalid {path}: expected {expected}, got {got}. Example fix: {fix}")]
    InvalidStopSpec { path: String, expected: String, got: String, fix: String },
}
