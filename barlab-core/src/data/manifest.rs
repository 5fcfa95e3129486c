//! Dataset manifest normalization and validation.
//!
//! Two accepted schemas:
//!
//! Strict v1:
//! ```yaml
//! version: 1
//! format: parquet
//! files:
//!   - { symbol: BTC, path: btc.parquet }
//! ```
//! (or `files: [path, ...]` with deterministic synthetic symbol names)
//!
//! Legacy:
//! ```yaml
//! format: per_symbol_parquet
//! symbols: [BTC, ETH]
//! path: "bars_{symbol}.parquet"
//! ```

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::DataError;

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetManifest {
    pub version: u32,
    pub format: String,
    /// Symbols in declared order.
    pub symbols: Vec<String>,
    pub files_by_symbol: BTreeMap<String, String>,
}

fn err(dataset_dir: &Path, detail: impl Into<String>) -> DataError {
    DataError::Manifest {
        dataset_dir: dataset_dir.display().to_string(),
        detail: detail.into(),
    }
}

fn validate_relative_file(dataset_dir: &Path, rel_path: &str) -> Result<(), DataError> {
    let resolved = dataset_dir.join(rel_path);
    if !resolved.is_file() {
        return Err(err(dataset_dir, format!("referenced file is missing: '{rel_path}'")));
    }
    let canonical = resolved
        .canonicalize()
        .map_err(|e| err(dataset_dir, format!("cannot resolve '{rel_path}': {e}")))?;
    let root = dataset_dir
        .canonicalize()
        .map_err(|e| err(dataset_dir, format!("cannot resolve dataset_dir: {e}")))?;
    if !canonical.starts_with(&root) {
        return Err(err(
            dataset_dir,
            format!("file path '{rel_path}' resolves outside dataset_dir"),
        ));
    }
    Ok(())
}

fn normalize_v1(dataset_dir: &Path, manifest: &serde_yaml::Mapping) -> Result<DatasetManifest, DataError> {
    match manifest.get(Value::String("version".into())) {
        Some(Value::Number(n)) if n.as_u64() == Some(1) => {}
        _ => return Err(err(dataset_dir, "version must be 1 for strict manifests")),
    }
    match manifest.get(Value::String("format".into())) {
        Some(Value::String(s)) if s == "parquet" => {}
        _ => return Err(err(dataset_dir, "format must be 'parquet' for version=1 manifests")),
    }

    let files = match manifest.get(Value::String("files".into())) {
        Some(Value::Sequence(seq)) if !seq.is_empty() => seq,
        _ => return Err(err(dataset_dir, "files must be a non-empty list")),
    };

    let mut symbols = Vec::new();
    let mut files_by_symbol = BTreeMap::new();

    if files.iter().all(|entry| matches!(entry, Value::String(_))) {
        // Bare path entries get deterministic synthetic symbol names.
        for (index, entry) in files.iter().enumerate() {
            let rel_path = match entry {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                _ => return Err(err(dataset_dir, "files entries must be non-empty strings")),
            };
            let symbol = format!("__file_{:03}__", index + 1);
            validate_relative_file(dataset_dir, &rel_path)?;
            symbols.push(symbol.clone());
            files_by_symbol.insert(symbol, rel_path);
        }
    } else {
        for (index, entry) in files.iter().enumerate() {
            let map = match entry {
                Value::Mapping(map) => map,
                _ => {
                    return Err(err(
                        dataset_dir,
                        format!(
                            "files[{}] must be either a string path or an object with symbol/path",
                            index + 1
                        ),
                    ))
                }
            };
            let symbol = match map.get(Value::String("symbol".into())) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => {
                    return Err(err(
                        dataset_dir,
                        format!("files[{}].symbol must be a non-empty string", index + 1),
                    ))
                }
            };
            let rel_path = match map.get(Value::String("path".into())) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => {
                    return Err(err(
                        dataset_dir,
                        format!("files[{}].path must be a non-empty string", index + 1),
                    ))
                }
            };
            if files_by_symbol.contains_key(&symbol) {
                return Err(err(dataset_dir, format!("duplicate symbol in files list: '{symbol}'")));
            }
            validate_relative_file(dataset_dir, &rel_path)?;
            symbols.push(symbol.clone());
            files_by_symbol.insert(symbol, rel_path);
        }
    }

    Ok(DatasetManifest { version: 1, format: "parquet".into(), symbols, files_by_symbol })
}

fn normalize_legacy(
    dataset_dir: &Path,
    manifest: &serde_yaml::Mapping,
) -> Result<DatasetManifest, DataError> {
    match manifest.get(Value::String("format".into())) {
        Some(Value::String(s)) if s == "per_symbol_parquet" => {}
        _ => {
            return Err(err(
                dataset_dir,
                "unsupported schema: expected strict v1 parquet or legacy per_symbol_parquet",
            ))
        }
    }

    let symbols_raw = match manifest.get(Value::String("symbols".into())) {
        Some(Value::Sequence(seq)) if !seq.is_empty() => seq,
        _ => return Err(err(dataset_dir, "symbols must be a non-empty list")),
    };
    let mut symbols = Vec::new();
    for (index, entry) in symbols_raw.iter().enumerate() {
        let symbol = match entry {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Err(err(
                    dataset_dir,
                    format!("symbols[{}] must be a non-empty string", index + 1),
                ))
            }
        };
        if symbols.contains(&symbol) {
            return Err(err(dataset_dir, format!("duplicate symbol in symbols list: '{symbol}'")));
        }
        symbols.push(symbol);
    }

    let template = match manifest.get(Value::String("path".into())) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Err(err(dataset_dir, "path must be a non-empty string")),
    };
    if !template.contains("{symbol}") {
        return Err(err(dataset_dir, "path must include '{symbol}' placeholder"));
    }

    let mut files_by_symbol = BTreeMap::new();
    for symbol in &symbols {
        let rel_path = template.replace("{symbol}", symbol);
        validate_relative_file(dataset_dir, &rel_path)?;
        files_by_symbol.insert(symbol.clone(), rel_path);
    }

    Ok(DatasetManifest {
        version: 1,
        format: "per_symbol_parquet".into(),
        symbols,
        files_by_symbol,
    })
}

impl DatasetManifest {
    /// Load and normalize `<dataset_dir>/manifest.yaml`.
    pub fn load(dataset_dir: &Path) -> Result<Self, DataError> {
        if !dataset_dir.is_dir() {
            return Err(err(dataset_dir, "dataset_dir is not an existing directory"));
        }
        let manifest_path = dataset_dir.join("manifest.yaml");
        if !manifest_path.is_file() {
            return Err(err(dataset_dir, "manifest.yaml is missing"));
        }
        let raw = std::fs::read_to_string(&manifest_path)
            .map_err(|e| err(dataset_dir, format!("cannot read manifest.yaml: {e}")))?;
        let value: Value = serde_yaml::from_str(&raw)
            .map_err(|_| err(dataset_dir, "manifest.yaml is invalid YAML"))?;
        let mapping = match value {
            Value::Mapping(map) => map,
            _ => return Err(err(dataset_dir, "manifest root must be a mapping")),
        };

        if mapping.contains_key(Value::String("version".into())) {
            normalize_v1(dataset_dir, &mapping)
        } else {
            normalize_legacy(dataset_dir, &mapping)
        }
    }

    /// Restrict to a symbol subset, then cap to the first `max_symbols`.
    pub fn apply_scope(
        &self,
        dataset_dir: &Path,
        subset: Option<&[String]>,
        max_symbols: Option<usize>,
    ) -> Result<Self, DataError> {
        let mut symbols = self.symbols.clone();

        if let Some(requested) = subset {
            let unknown: Vec<&String> = requested
                .iter()
                .filter(|symbol| !self.files_by_symbol.contains_key(*symbol))
                .collect();
            if !unknown.is_empty() {
                return Err(err(
                    dataset_dir,
                    format!("data.symbols_subset contains unknown symbol(s): {unknown:?}"),
                ));
            }
            symbols = requested.to_vec();
        }

        if let Some(cap) = max_symbols {
            symbols.truncate(cap);
        }

        let files_by_symbol = symbols
            .iter()
            .map(|symbol| (symbol.clone(), self.files_by_symbol[symbol].clone()))
            .collect();

        Ok(Self {
            version: self.version,
            format: self.format.clone(),
            symbols,
            files_by_symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(manifest: &str, files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest.yaml"), manifest).unwrap();
        for file in files {
            std::fs::write(dir.path().join(file), b"stub").unwrap();
        }
        dir
    }

    #[test]
    fn strict_v1_with_symbol_entries() {
        let dir = dataset(
            "version: 1\nformat: parquet\nfiles:\n  - {symbol: BTC, path: btc.parquet}\n  - {symbol: ETH, path: eth.parquet}\n",
            &["btc.parquet", "eth.parquet"],
        );
        let manifest = DatasetManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.symbols, vec!["BTC", "ETH"]);
        assert_eq!(manifest.files_by_symbol["BTC"], "btc.parquet");
    }

    #[test]
    fn strict_v1_with_bare_paths_gets_synthetic_symbols() {
        let dir = dataset(
            "version: 1\nformat: parquet\nfiles:\n  - a.parquet\n  - b.parquet\n",
            &["a.parquet", "b.parquet"],
        );
        let manifest = DatasetManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.symbols, vec!["__file_001__", "__file_002__"]);
    }

    #[test]
    fn legacy_per_symbol_template() {
        let dir = dataset(
            "format: per_symbol_parquet\nsymbols: [BTC, ETH]\npath: \"bars_{symbol}.parquet\"\n",
            &["bars_BTC.parquet", "bars_ETH.parquet"],
        );
        let manifest = DatasetManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.format, "per_symbol_parquet");
        assert_eq!(manifest.files_by_symbol["ETH"], "bars_ETH.parquet");
    }

    #[test]
    fn missing_file_is_rejected() {
        let dir = dataset(
            "version: 1\nformat: parquet\nfiles:\n  - {symbol: BTC, path: missing.parquet}\n",
            &[],
        );
        assert!(DatasetManifest::load(dir.path()).is_err());
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let dir = dataset(
            "version: 1\nformat: parquet\nfiles:\n  - {symbol: BTC, path: a.parquet}\n  - {symbol: BTC, path: b.parquet}\n",
            &["a.parquet", "b.parquet"],
        );
        assert!(DatasetManifest::load(dir.path()).is_err());
    }

    #[test]
    fn scope_subset_then_cap() {
        let dir = dataset(
            "version: 1\nformat: parquet\nfiles:\n  - {symbol: A, path: a.parquet}\n  - {symbol: B, path: b.parquet}\n  - {symbol: C, path: c.parquet}\n",
            &["a.parquet", "b.parquet", "c.parquet"],
        );
        let manifest = DatasetManifest::load(dir.path()).unwrap();

        let scoped = manifest
            .apply_scope(dir.path(), Some(&["C".into(), "A".into()]), Some(1))
            .unwrap();
        assert_eq!(scoped.symbols, vec!["C"]);

        let unknown = manifest.apply_scope(dir.path(), Some(&["ZZZ".into()]), None);
        assert!(unknown.is_err());
    }
}
