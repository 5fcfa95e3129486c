//! Built-in overlay defaults.
//!
//! These sit between the user's base config and their overrides in the
//! overlay chain, so a bare config still resolves to a fully specified cost
//! model. They intentionally set nothing beyond their own concern.

/// Fee defaults: the tier2 preset carries the fees; nothing to pin here
/// beyond the profile choice itself.
pub const FEES_DEFAULTS_YAML: &str = "\
execution:
  profile: tier2
";

/// Slippage/intrabar defaults.
pub const SLIPPAGE_DEFAULTS_YAML: &str = "\
execution:
  intrabar_mode: worst_case
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_as_yaml_mappings() {
        for doc in [FEES_DEFAULTS_YAML, SLIPPAGE_DEFAULTS_YAML] {
            let value: serde_yaml::Value = serde_yaml::from_str(doc).unwrap();
            assert!(value.is_mapping());
        }
    }
}
