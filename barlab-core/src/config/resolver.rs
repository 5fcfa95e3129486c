//! Resolve layered config overlays into a single canonical tree.
//!
//! Overlays deep-merge in order (later wins), aliases are normalized to
//! canonical keys, bounds are validated, and the resolved tree is written
//! back so `config_used.yaml` is the single source of truth. Resolving an
//! already-resolved tree is a fixed point.

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::data::resample::Timeframe;
use crate::strategy::conflicts::ConflictPolicy;

use super::profile::{
    ExecutionProfile, IntrabarMode, SpreadMode, PROFILE_OVERRIDE_FIELDS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config root must be a mapping")]
    RootNotMapping,

    #[error("{key} must be a mapping when provided")]
    SectionNotMapping { key: String },

    #[error("invalid {key}: expected {expected}, got {got}")]
    InvalidValue { key: String, expected: String, got: String },

    #[error("missing required key {key}: {detail}")]
    MissingKey { key: String, detail: String },

    #[error("conflicting config values: {0}")]
    Conflict(String),

    #[error("failed to parse YAML config: {0}")]
    Parse(String),
}

/// Stop-resolution enforcement mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResolutionMode {
    Safe,
    Strict,
}

impl StopResolutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StopResolutionMode::Safe => "safe",
            StopResolutionMode::Strict => "strict",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub r_per_trade: f64,
    pub min_stop_distance: f64,
    pub min_stop_distance_pct: f64,
    pub max_positions: usize,
    pub max_notional_pct_equity: f64,
    pub maintenance_free_margin_pct: f64,
    pub max_leverage: f64,
    pub lot_size: f64,
    pub stop_resolution_mode: StopResolutionMode,
    pub allow_legacy_proxy: bool,
    pub hybrid_policy: String,
    pub atr_period: usize,
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub mode: Option<String>,
    pub symbols_subset: Option<Vec<String>>,
    pub max_symbols: Option<usize>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub row_limit_per_symbol: Option<usize>,
    pub chunksize: usize,
    pub timeframe: Option<Timeframe>,
}

impl DataConfig {
    /// True when any scope-reducing knob is active (drives `data_scope.json`).
    pub fn scope_knobs_active(&self) -> bool {
        self.symbols_subset.is_some()
            || self.max_symbols.is_some()
            || self.date_range.is_some()
            || self.row_limit_per_symbol.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StrategySettings {
    pub name: String,
    pub signal_conflict_policy: ConflictPolicy,
    /// Remaining strategy keys, passed through to the strategy factory.
    pub params: Mapping,
}

#[derive(Debug, Clone)]
pub struct HtfConfig {
    pub timeframes: Vec<Timeframe>,
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub initial_cash: f64,
    pub seed: u64,
    pub periods_per_year: Option<u32>,
}

/// Fully resolved configuration: the canonical tree plus typed section views.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    tree: Value,
    pub profile: ExecutionProfile,
    pub spread_mode: SpreadMode,
    pub intrabar_mode: IntrabarMode,
    pub risk: RiskConfig,
    pub data: DataConfig,
    pub strategy: StrategySettings,
    pub htf: Option<HtfConfig>,
    pub benchmark_enabled: bool,
    pub benchmark_symbol: Option<String>,
    pub summary_enabled: bool,
    pub run: RunConfig,
}

impl ResolvedConfig {
    /// The canonical tree, serialized verbatim into `config_used.yaml`.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.tree).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Recursively merge `overlay` into `base`.
///
/// Mapping + mapping merges key-by-key; any other pair is replaced wholesale
/// by the overlay. Null overlay values are skipped (meaning "keep base").
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            if !overlay.is_null() {
                *base = overlay.clone();
            }
        }
    }
}

/// Merge an ordered list of overlays (later wins) into one owned tree.
pub fn merge_overlays(overlays: &[Value]) -> Value {
    let mut merged = Value::Mapping(Mapping::new());
    for overlay in overlays {
        deep_merge(&mut merged, overlay);
    }
    merged
}

// ---------------------------------------------------------------------------
// Typed extraction helpers
// ---------------------------------------------------------------------------

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

fn section<'a>(root: &'a Mapping, name: &str) -> Result<Mapping, ConfigError> {
    match root.get(Value::String(name.to_string())) {
        None | Some(Value::Null) => Ok(Mapping::new()),
        Some(Value::Mapping(map)) => Ok(map.clone()),
        Some(other) => Err(ConfigError::SectionNotMapping {
            key: format!("{name} (got {})", type_name(other)),
        }),
    }
}

fn f64_opt(map: &Mapping, key: &str, path: &str) -> Result<Option<f64>, ConfigError> {
    match map.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(other) => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "a number".into(),
            got: type_name(other).into(),
        }),
    }
}

fn usize_opt(map: &Mapping, key: &str, path: &str) -> Result<Option<usize>, ConfigError> {
    match map.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(Some(v as usize)),
            None => Err(ConfigError::InvalidValue {
                key: path.to_string(),
                expected: "a non-negative integer".into(),
                got: n.to_string(),
            }),
        },
        Some(other) => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "a non-negative integer".into(),
            got: type_name(other).into(),
        }),
    }
}

fn bool_opt(map: &Mapping, key: &str, path: &str) -> Result<Option<bool>, ConfigError> {
    match map.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "a boolean".into(),
            got: type_name(other).into(),
        }),
    }
}

fn str_opt(map: &Mapping, key: &str, path: &str) -> Result<Option<String>, ConfigError> {
    match map.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "a string".into(),
            got: type_name(other).into(),
        }),
    }
}

fn string_seq_opt(map: &Mapping, key: &str, path: &str) -> Result<Option<Vec<String>>, ConfigError> {
    match map.get(Value::String(key.to_string())) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(seq)) => {
            let mut out = Vec::new();
            for item in seq {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        let trimmed = s.trim().to_string();
                        if !out.contains(&trimmed) {
                            out.push(trimmed);
                        }
                    }
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            key: path.to_string(),
                            expected: "a non-empty list of strings".into(),
                            got: type_name(item).into(),
                        })
                    }
                }
            }
            if out.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: path.to_string(),
                    expected: "a non-empty list of strings".into(),
                    got: "empty list".into(),
                });
            }
            Ok(Some(out))
        }
        Some(other) => Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "a list of strings".into(),
            got: type_name(other).into(),
        }),
    }
}

fn bounded(value: f64, path: &str, lo: f64, hi: f64, lo_open: bool) -> Result<f64, ConfigError> {
    let ok = if lo_open { value > lo } else { value >= lo };
    if !ok || value > hi || !value.is_finite() {
        let bracket = if lo_open { "(" } else { "[" };
        return Err(ConfigError::InvalidValue {
            key: path.to_string(),
            expected: format!("a number in {bracket}{lo}, {hi}]"),
            got: value.to_string(),
        });
    }
    Ok(value)
}

fn parse_utc(raw: &str, path: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidValue {
            key: path.to_string(),
            expected: "an RFC3339 timezone-aware timestamp".into(),
            got: raw.to_string(),
        })
}

fn set(map: &mut Mapping, key: &str, value: Value) {
    map.insert(Value::String(key.to_string()), value);
}

fn remove(map: &mut Mapping, key: &str) {
    map.remove(Value::String(key.to_string()));
}

// ---------------------------------------------------------------------------
// Section resolvers
// ---------------------------------------------------------------------------

fn resolve_execution(
    exec: &mut Mapping,
) -> Result<(ExecutionProfile, SpreadMode, IntrabarMode), ConfigError> {
    let raw_profile = str_opt(exec, "profile", "execution.profile")?
        .unwrap_or_else(|| "tier2".to_string());

    let profile = match raw_profile.as_str() {
        "tier1" | "tier2" | "tier3" => {
            let conflicting: Vec<&str> = PROFILE_OVERRIDE_FIELDS
                .iter()
                .copied()
                .filter(|field| exec.contains_key(Value::String((*field).to_string())))
                .collect();
            if !conflicting.is_empty() {
                return Err(ConfigError::Conflict(format!(
                    "execution.profile={raw_profile} forbids overrides ({}); \
                     set execution.profile=custom to specify them",
                    conflicting.join(", ")
                )));
            }
            ExecutionProfile::builtin(&raw_profile).expect("tier presets are built in")
        }
        "custom" => {
            let missing: Vec<String> = PROFILE_OVERRIDE_FIELDS
                .iter()
                .filter(|field| !exec.contains_key(Value::String((**field).to_string())))
                .map(|field| format!("execution.{field}"))
                .collect();
            if !missing.is_empty() {
                return Err(ConfigError::MissingKey {
                    key: missing.join(", "),
                    detail: "execution.profile=custom requires all override keys".into(),
                });
            }
            let required = |key: &str| ConfigError::MissingKey {
                key: format!("execution.{key}"),
                detail: "execution.profile=custom requires a non-null value".into(),
            };
            let maker_fee =
                f64_opt(exec, "maker_fee", "execution.maker_fee")?.ok_or_else(|| required("maker_fee"))?;
            let taker_fee =
                f64_opt(exec, "taker_fee", "execution.taker_fee")?.ok_or_else(|| required("taker_fee"))?;
            let slippage_bps = f64_opt(exec, "slippage_bps", "execution.slippage_bps")?
                .ok_or_else(|| required("slippage_bps"))?;
            let spread_bps = f64_opt(exec, "spread_bps", "execution.spread_bps")?
                .ok_or_else(|| required("spread_bps"))?;
            let delay_bars = usize_opt(exec, "delay_bars", "execution.delay_bars")?
                .ok_or_else(|| required("delay_bars"))? as u32;
            for (value, key) in [
                (maker_fee, "execution.maker_fee"),
                (taker_fee, "execution.taker_fee"),
                (slippage_bps, "execution.slippage_bps"),
                (spread_bps, "execution.spread_bps"),
            ] {
                if value < 0.0 || !value.is_finite() {
                    return Err(ConfigError::InvalidValue {
                        key: key.into(),
                        expected: "a number >= 0".into(),
                        got: value.to_string(),
                    });
                }
            }
            ExecutionProfile::custom(maker_fee, taker_fee, slippage_bps, spread_bps, delay_bars)
        }
        other => {
            return Err(ConfigError::InvalidValue {
                key: "execution.profile".into(),
                expected: "one of tier1|tier2|tier3|custom".into(),
                got: other.to_string(),
            })
        }
    };

    let spread_mode = match str_opt(exec, "spread_mode", "execution.spread_mode")? {
        Some(raw) => SpreadMode::parse(&raw)?,
        None if profile.spread_bps > 0.0 => SpreadMode::FixedBps,
        None => SpreadMode::None,
    };
    let intrabar_mode = match str_opt(exec, "intrabar_mode", "execution.intrabar_mode")? {
        Some(raw) => IntrabarMode::parse(&raw)?,
        None => IntrabarMode::WorstCase,
    };

    set(exec, "profile", Value::String(profile.name.clone()));
    set(exec, "spread_mode", Value::String(spread_mode.to_string()));
    set(exec, "intrabar_mode", Value::String(intrabar_mode.to_string()));

    Ok((profile, spread_mode, intrabar_mode))
}

fn resolve_stop_resolution(
    risk: &mut Mapping,
) -> Result<(StopResolutionMode, bool), ConfigError> {
    let canonical_mode = str_opt(risk, "stop_resolution_mode", "risk.stop_resolution_mode")?;
    let canonical_proxy = bool_opt(risk, "allow_legacy_proxy", "risk.allow_legacy_proxy")?;
    let legacy = str_opt(risk, "stop_resolution", "risk.stop_resolution")?;

    let legacy_pair = match legacy.as_deref() {
        None => None,
        Some("strict") => Some((StopResolutionMode::Strict, false)),
        Some("allow_legacy_proxy") => Some((StopResolutionMode::Safe, true)),
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "risk.stop_resolution".into(),
                expected: "one of strict|allow_legacy_proxy".into(),
                got: other.to_string(),
            })
        }
    };

    let mode = match canonical_mode.as_deref() {
        None => None,
        Some("safe") => Some(StopResolutionMode::Safe),
        Some("strict") => Some(StopResolutionMode::Strict),
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "risk.stop_resolution_mode".into(),
                expected: "one of safe|strict".into(),
                got: other.to_string(),
            })
        }
    };

    if let Some((legacy_mode, legacy_proxy)) = legacy_pair {
        if let Some(explicit_mode) = mode {
            if explicit_mode != legacy_mode {
                return Err(ConfigError::Conflict(format!(
                    "risk.stop_resolution={} contradicts risk.stop_resolution_mode={}",
                    legacy.as_deref().unwrap_or_default(),
                    explicit_mode.as_str()
                )));
            }
        }
        if let Some(explicit_proxy) = canonical_proxy {
            if explicit_proxy != legacy_proxy {
                return Err(ConfigError::Conflict(format!(
                    "risk.stop_resolution={} contradicts risk.allow_legacy_proxy={}",
                    legacy.as_deref().unwrap_or_default(),
                    explicit_proxy
                )));
            }
        }
    }

    let resolved_mode = mode
        .or(legacy_pair.map(|(m, _)| m))
        .unwrap_or(StopResolutionMode::Safe);
    let resolved_proxy = canonical_proxy
        .or(legacy_pair.map(|(_, p)| p))
        .unwrap_or(false);

    if resolved_mode == StopResolutionMode::Strict && resolved_proxy {
        return Err(ConfigError::Conflict(
            "risk.stop_resolution_mode=strict cannot be combined with \
             risk.allow_legacy_proxy=true"
                .into(),
        ));
    }

    remove(risk, "stop_resolution");
    set(risk, "stop_resolution_mode", Value::String(resolved_mode.as_str().to_string()));
    set(risk, "allow_legacy_proxy", Value::Bool(resolved_proxy));

    Ok((resolved_mode, resolved_proxy))
}

fn resolve_risk(risk: &mut Mapping) -> Result<RiskConfig, ConfigError> {
    let (stop_resolution_mode, allow_legacy_proxy) = resolve_stop_resolution(risk)?;

    let r_per_trade = bounded(
        f64_opt(risk, "r_per_trade", "risk.r_per_trade")?.unwrap_or(0.01),
        "risk.r_per_trade",
        0.0,
        1.0,
        true,
    )?;
    let min_stop_distance_pct = bounded(
        f64_opt(risk, "min_stop_distance_pct", "risk.min_stop_distance_pct")?.unwrap_or(0.0),
        "risk.min_stop_distance_pct",
        0.0,
        1.0,
        false,
    )?;
    let max_notional_pct_equity = bounded(
        f64_opt(risk, "max_notional_pct_equity", "risk.max_notional_pct_equity")?.unwrap_or(1.0),
        "risk.max_notional_pct_equity",
        0.0,
        10.0,
        true,
    )?;
    let maintenance_free_margin_pct = bounded(
        f64_opt(risk, "maintenance_free_margin_pct", "risk.maintenance_free_margin_pct")?
            .unwrap_or(0.0),
        "risk.maintenance_free_margin_pct",
        0.0,
        1.0,
        false,
    )?;

    let min_stop_distance =
        f64_opt(risk, "min_stop_distance", "risk.min_stop_distance")?.unwrap_or(0.0);
    if min_stop_distance < 0.0 || !min_stop_distance.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: "risk.min_stop_distance".into(),
            expected: "a number >= 0".into(),
            got: min_stop_distance.to_string(),
        });
    }

    let max_positions = usize_opt(risk, "max_positions", "risk.max_positions")?.unwrap_or(5);
    if max_positions == 0 {
        return Err(ConfigError::InvalidValue {
            key: "risk.max_positions".into(),
            expected: "an integer >= 1".into(),
            got: "0".into(),
        });
    }

    let max_leverage = f64_opt(risk, "max_leverage", "risk.max_leverage")?.unwrap_or(2.0);
    if max_leverage <= 0.0 || !max_leverage.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: "risk.max_leverage".into(),
            expected: "a number > 0".into(),
            got: max_leverage.to_string(),
        });
    }

    let lot_size = f64_opt(risk, "lot_size", "risk.lot_size")?.unwrap_or(1e-8);
    if lot_size <= 0.0 || !lot_size.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: "risk.lot_size".into(),
            expected: "a number > 0".into(),
            got: lot_size.to_string(),
        });
    }

    let hybrid_policy =
        str_opt(risk, "hybrid_policy", "risk.hybrid_policy")?.unwrap_or_else(|| "wider".into());
    if hybrid_policy != "wider" && hybrid_policy != "tighter" {
        return Err(ConfigError::InvalidValue {
            key: "risk.hybrid_policy".into(),
            expected: "one of wider|tighter".into(),
            got: hybrid_policy,
        });
    }

    let atr_period = usize_opt(risk, "atr_period", "risk.atr_period")?.unwrap_or(14);
    if atr_period == 0 {
        return Err(ConfigError::InvalidValue {
            key: "risk.atr_period".into(),
            expected: "an integer >= 1".into(),
            got: "0".into(),
        });
    }

    set(risk, "r_per_trade", serde_yaml::to_value(r_per_trade).unwrap());
    set(risk, "min_stop_distance", serde_yaml::to_value(min_stop_distance).unwrap());
    set(risk, "min_stop_distance_pct", serde_yaml::to_value(min_stop_distance_pct).unwrap());
    set(risk, "max_positions", serde_yaml::to_value(max_positions).unwrap());
    set(risk, "max_notional_pct_equity", serde_yaml::to_value(max_notional_pct_equity).unwrap());
    set(
        risk,
        "maintenance_free_margin_pct",
        serde_yaml::to_value(maintenance_free_margin_pct).unwrap(),
    );
    set(risk, "max_leverage", serde_yaml::to_value(max_leverage).unwrap());
    set(risk, "lot_size", serde_yaml::to_value(lot_size).unwrap());
    set(risk, "hybrid_policy", Value::String(hybrid_policy.clone()));
    set(risk, "atr_period", serde_yaml::to_value(atr_period).unwrap());

    Ok(RiskConfig {
        r_per_trade,
        min_stop_distance,
        min_stop_distance_pct,
        max_positions,
        max_notional_pct_equity,
        maintenance_free_margin_pct,
        max_leverage,
        lot_size,
        stop_resolution_mode,
        allow_legacy_proxy,
        hybrid_policy,
        atr_period,
    })
}

fn resolve_data(data: &mut Mapping) -> Result<DataConfig, ConfigError> {
    let mode = match str_opt(data, "mode", "data.mode")? {
        None => None,
        Some(m) if m == "streaming" || m == "dataframe" => Some(m),
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "data.mode".into(),
                expected: "one of streaming|dataframe".into(),
                got: other,
            })
        }
    };

    let subset = string_seq_opt(data, "symbols_subset", "data.symbols_subset")?;
    let alias = string_seq_opt(data, "symbols", "data.symbols")?;
    let symbols_subset = match (subset, alias) {
        (Some(a), Some(b)) if a != b => {
            return Err(ConfigError::Conflict(
                "data.symbols and data.symbols_subset both set but differ; use only one".into(),
            ))
        }
        (Some(a), _) => Some(a),
        (None, b) => b,
    };
    remove(data, "symbols");
    if let Some(ref subset) = symbols_subset {
        set(
            data,
            "symbols_subset",
            Value::Sequence(subset.iter().cloned().map(Value::String).collect()),
        );
    }

    let max_symbols = usize_opt(data, "max_symbols", "data.max_symbols")?;
    if max_symbols == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "data.max_symbols".into(),
            expected: "a positive integer".into(),
            got: "0".into(),
        });
    }

    let date_range = match data.get(Value::String("date_range".into())) {
        None | Some(Value::Null) => None,
        Some(Value::Mapping(range)) => {
            let start = str_opt(range, "start", "data.date_range.start")?.ok_or_else(|| {
                ConfigError::MissingKey {
                    key: "data.date_range.start".into(),
                    detail: "date_range requires both start and end".into(),
                }
            })?;
            let end = str_opt(range, "end", "data.date_range.end")?.ok_or_else(|| {
                ConfigError::MissingKey {
                    key: "data.date_range.end".into(),
                    detail: "date_range requires both start and end".into(),
                }
            })?;
            let start = parse_utc(&start, "data.date_range.start")?;
            let end = parse_utc(&end, "data.date_range.end")?;
            if start >= end {
                return Err(ConfigError::InvalidValue {
                    key: "data.date_range".into(),
                    expected: "start < end".into(),
                    got: format!("start={start}, end={end}"),
                });
            }
            Some((start, end))
        }
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "data.date_range".into(),
                expected: "a mapping with start/end".into(),
                got: type_name(other).into(),
            })
        }
    };

    let row_limit_per_symbol =
        usize_opt(data, "row_limit_per_symbol", "data.row_limit_per_symbol")?;
    if row_limit_per_symbol == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "data.row_limit_per_symbol".into(),
            expected: "a positive integer".into(),
            got: "0".into(),
        });
    }

    let chunksize = usize_opt(data, "chunksize", "data.chunksize")?.unwrap_or(200_000);
    if chunksize == 0 {
        return Err(ConfigError::InvalidValue {
            key: "data.chunksize".into(),
            expected: "a positive integer".into(),
            got: "0".into(),
        });
    }

    let timeframe = match str_opt(data, "timeframe", "data.timeframe")? {
        None => None,
        Some(raw) => Some(Timeframe::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "data.timeframe".into(),
            expected: format!("one of {}", Timeframe::supported_labels().join("|")),
            got: raw,
        })?),
    };

    Ok(DataConfig {
        mode,
        symbols_subset,
        max_symbols,
        date_range,
        row_limit_per_symbol,
        chunksize,
        timeframe,
    })
}

fn resolve_htf(
    root: &mut Mapping,
    data: &DataConfig,
) -> Result<Option<HtfConfig>, ConfigError> {
    let block_present = matches!(
        root.get(Value::String("htf_resampler".into())),
        Some(Value::Mapping(_))
    );
    let mut htf = section(root, "htf_resampler")?;

    let mut timeframes = match string_seq_opt(&htf, "timeframes", "htf_resampler.timeframes")? {
        Some(raw) => {
            let mut out = Vec::new();
            for label in raw {
                let tf = Timeframe::parse(&label).ok_or_else(|| ConfigError::InvalidValue {
                    key: "htf_resampler.timeframes".into(),
                    expected: format!("one of {}", Timeframe::supported_labels().join("|")),
                    got: label,
                })?;
                if !out.contains(&tf) {
                    out.push(tf);
                }
            }
            out
        }
        None => Vec::new(),
    };
    let mut strict = bool_opt(&htf, "strict", "htf_resampler.strict")?.unwrap_or(true);

    // data.timeframe collapses the resampler to a single timeframe; when the
    // block was absent entirely, it also forces strict mode on.
    if let Some(tf) = data.timeframe {
        timeframes = vec![tf];
        if !block_present {
            strict = true;
        }
    }

    if timeframes.is_empty() {
        return Ok(None);
    }

    set(
        &mut htf,
        "timeframes",
        Value::Sequence(
            timeframes.iter().map(|tf| Value::String(tf.as_str().to_string())).collect(),
        ),
    );
    set(&mut htf, "strict", Value::Bool(strict));
    set(root, "htf_resampler", Value::Mapping(htf));

    Ok(Some(HtfConfig { timeframes, strict }))
}

fn resolve_strategy(strategy: &mut Mapping) -> Result<StrategySettings, ConfigError> {
    let name = str_opt(strategy, "name", "strategy.name")?.unwrap_or_else(|| "coinflip".into());
    let policy_raw = str_opt(strategy, "signal_conflict_policy", "strategy.signal_conflict_policy")?
        .unwrap_or_else(|| "reject".into());
    let signal_conflict_policy =
        ConflictPolicy::parse(&policy_raw).ok_or_else(|| ConfigError::InvalidValue {
            key: "strategy.signal_conflict_policy".into(),
            expected: "one of reject|first_wins|last_wins|net_out".into(),
            got: policy_raw.clone(),
        })?;

    let mut params = strategy.clone();
    params.remove(Value::String("name".into()));
    params.remove(Value::String("signal_conflict_policy".into()));

    set(strategy, "name", Value::String(name.clone()));
    set(strategy, "signal_conflict_policy", Value::String(policy_raw));

    Ok(StrategySettings { name, signal_conflict_policy, params })
}

fn resolve_run(run: &mut Mapping) -> Result<RunConfig, ConfigError> {
    let initial_cash = f64_opt(run, "initial_cash", "run.initial_cash")?.unwrap_or(100_000.0);
    if initial_cash <= 0.0 || !initial_cash.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: "run.initial_cash".into(),
            expected: "a number > 0".into(),
            got: initial_cash.to_string(),
        });
    }
    let seed = usize_opt(run, "seed", "run.seed")?.unwrap_or(42) as u64;
    let periods_per_year =
        usize_opt(run, "periods_per_year", "run.periods_per_year")?.map(|v| v as u32);

    set(run, "initial_cash", serde_yaml::to_value(initial_cash).unwrap());
    set(run, "seed", serde_yaml::to_value(seed).unwrap());

    Ok(RunConfig { initial_cash, seed, periods_per_year })
}

/// Normalize a merged config tree into one authoritative shape.
///
/// Enforces precedence rules, rejects contradictions instead of silently
/// picking, and returns the canonical tree alongside typed section views.
pub fn resolve_config(tree: Value) -> Result<ResolvedConfig, ConfigError> {
    let mut root = match tree {
        Value::Mapping(map) => map,
        Value::Null => Mapping::new(),
        _ => return Err(ConfigError::RootNotMapping),
    };

    let mut exec = section(&root, "execution")?;
    let (profile, spread_mode, intrabar_mode) = resolve_execution(&mut exec)?;
    set(&mut root, "execution", Value::Mapping(exec));

    let mut risk_section = section(&root, "risk")?;
    let risk = resolve_risk(&mut risk_section)?;
    set(&mut root, "risk", Value::Mapping(risk_section));

    let mut data_section = section(&root, "data")?;
    let data = resolve_data(&mut data_section)?;
    set(&mut root, "data", Value::Mapping(data_section));

    let htf = resolve_htf(&mut root, &data)?;

    let mut strategy_section = section(&root, "strategy")?;
    let strategy = resolve_strategy(&mut strategy_section)?;
    set(&mut root, "strategy", Value::Mapping(strategy_section));

    let benchmark = section(&root, "benchmark")?;
    let benchmark_enabled = bool_opt(&benchmark, "enabled", "benchmark.enabled")?.unwrap_or(false);
    let benchmark_symbol = str_opt(&benchmark, "symbol", "benchmark.symbol")?;

    let summary = section(&root, "summary")?;
    let summary_enabled = bool_opt(&summary, "enabled", "summary.enabled")?.unwrap_or(false);

    let mut run_section = section(&root, "run")?;
    let run = resolve_run(&mut run_section)?;
    set(&mut root, "run", Value::Mapping(run_section));

    Ok(ResolvedConfig {
        tree: Value::Mapping(root),
        profile,
        spread_mode,
        intrabar_mode,
        risk,
        data,
        strategy,
        htf,
        benchmark_enabled,
        benchmark_symbol,
        summary_enabled,
        run,
    })
}
