//! Layered configuration: deep-merge of YAML overlays, alias normalization,
//! bounds validation, and the resolved canonical tree.

pub mod profile;
pub mod resolver;

pub use profile::{ExecutionProfile, IntrabarMode, SpreadMode};
pub use resolver::{
    deep_merge, merge_overlays, resolve_config, ConfigError, DataConfig, HtfConfig,
    ResolvedConfig, RiskConfig, RunConfig, StopResolutionMode, StrategySettings,
};
