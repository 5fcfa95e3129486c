//! Deterministic per-(ts, symbol) signal conflict resolution.

use serde::Serialize;

use crate::domain::{Side, Signal};

use super::StrategyContractError;

/// How multiple signals for the same `(ts, symbol)` pair collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Reject,
    FirstWins,
    LastWins,
    NetOut,
}

impl ConflictPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reject" => Some(ConflictPolicy::Reject),
            "first_wins" => Some(ConflictPolicy::FirstWins),
            "last_wins" => Some(ConflictPolicy::LastWins),
            "net_out" => Some(ConflictPolicy::NetOut),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::Reject => "reject",
            ConflictPolicy::FirstWins => "first_wins",
            ConflictPolicy::LastWins => "last_wins",
            ConflictPolicy::NetOut => "net_out",
        }
    }
}

/// Resolution trace for one conflicting group, recorded in the decision log.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictSummary {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub symbol: String,
    pub policy: ConflictPolicy,
    /// `signal_type` of the kept signal, if any survived.
    pub kept: Option<String>,
    pub dropped_count: usize,
    pub reason: String,
}

fn compact_group(signals: &[&Signal]) -> String {
    signals
        .iter()
        .map(|s| format!("{}:{}", s.signal_type, s.side))
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary(
    group: &[&Signal],
    policy: ConflictPolicy,
    kept: Option<&Signal>,
    reason: &str,
) -> ConflictSummary {
    let first = group[0];
    ConflictSummary {
        ts: first.ts,
        symbol: first.symbol.clone(),
        policy,
        kept: kept.map(|s| s.signal_type.clone()),
        dropped_count: if kept.is_some() { group.len() - 1 } else { group.len() },
        reason: reason.to_string(),
    }
}

/// Enforce the per-(ts, symbol) conflict policy.
///
/// Deterministic and stable: groups keep emission order, and survivors are
/// returned in their original positions.
pub fn resolve_signal_conflicts(
    signals: Vec<Signal>,
    policy: ConflictPolicy,
) -> Result<(Vec<Signal>, Vec<ConflictSummary>), StrategyContractError> {
    // Group indices per (ts, symbol) preserving first-seen group order.
    let mut group_keys: Vec<(chrono::DateTime<chrono::Utc>, String)> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (index, signal) in signals.iter().enumerate() {
        let key = (signal.ts, signal.symbol.clone());
        match group_keys.iter().position(|k| *k == key) {
            Some(slot) => groups[slot].push(index),
            None => {
                group_keys.push(key);
                groups.push(vec![index]);
            }
        }
    }

    let mut keep = vec![false; signals.len()];
    let mut summaries = Vec::new();

    for indices in &groups {
        if indices.len() == 1 {
            keep[indices[0]] = true;
            continue;
        }
        let group: Vec<&Signal> = indices.iter().map(|&i| &signals[i]).collect();

        match policy {
            ConflictPolicy::Reject => {
                let first = group[0];
                return Err(StrategyContractError::Conflict {
                    ts: first.ts.to_rfc3339(),
                    symbol: first.symbol.clone(),
                    count: group.len(),
                    involved: compact_group(&group),
                });
            }
            ConflictPolicy::FirstWins => {
                keep[indices[0]] = true;
                summaries.push(summary(&group, policy, Some(group[0]), "kept first emitted signal"));
            }
            ConflictPolicy::LastWins => {
                keep[*indices.last().unwrap()] = true;
                summaries.push(summary(
                    &group,
                    policy,
                    Some(group[group.len() - 1]),
                    "kept last emitted signal",
                ));
            }
            ConflictPolicy::NetOut => {
                let exits: Vec<usize> = indices
                    .iter()
                    .copied()
                    .filter(|&i| signals[i].is_exit_like())
                    .collect();
                if let Some(&last_exit) = exits.last() {
                    // Any exit-like signal outranks entries; keep the last.
                    keep[last_exit] = true;
                    summaries.push(summary(
                        &group,
                        policy,
                        Some(&signals[last_exit]),
                        "exit wins; kept last exit-like signal",
                    ));
                    continue;
                }

                let entry_sides: Vec<Side> =
                    indices.iter().map(|&i| signals[i].side).collect();
                let has_buy = entry_sides.contains(&Side::Buy);
                let has_sell = entry_sides.contains(&Side::Sell);
                if has_buy && has_sell {
                    summaries.push(summary(
                        &group,
                        policy,
                        None,
                        "opposite entry sides netted to no-op",
                    ));
                    continue;
                }

                let last = *indices.last().unwrap();
                keep[last] = true;
                summaries.push(summary(
                    &group,
                    policy,
                    Some(&signals[last]),
                    "kept last entry-like signal",
                ));
            }
        }
    }

    let resolved = signals
        .into_iter()
        .enumerate()
        .filter_map(|(index, signal)| keep[index].then_some(signal))
        .collect();
    Ok((resolved, summaries))
}
