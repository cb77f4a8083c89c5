// Pipeline configuration
//
// Everything that used to be process-wide constants (FX rates, target table
// names, chunk size) is an explicit value handed to each component at
// construction, so tests can substitute fixtures.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::transform::FxTable;

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_STAGING_SUFFIX: &str = "_staging";

/// Source file and target table for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Path to the delimited input file.
    pub source: PathBuf,
    /// Fully-qualified target table identifier.
    pub target_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sales: DomainConfig,
    pub financial: DomainConfig,
    pub attendance: DomainConfig,

    /// Currency code -> USD conversion multiplier.
    pub fx_rates: HashMap<String, f64>,

    /// Rows per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Suffix appended to a target table name to form its staging table.
    #[serde(default = "default_staging_suffix")]
    pub staging_suffix: String,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_staging_suffix() -> String {
    DEFAULT_STAGING_SUFFIX.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut fx_rates = HashMap::new();
        fx_rates.insert("USD".to_string(), 1.0);
        fx_rates.insert("EUR".to_string(), 1.1);
        fx_rates.insert("GBP".to_string(), 1.25);
        fx_rates.insert("MXN".to_string(), 0.05);

        PipelineConfig {
            sales: DomainConfig {
                source: PathBuf::from("data/sales_dataset.csv"),
                target_table: "sales".to_string(),
            },
            financial: DomainConfig {
                source: PathBuf::from("data/financial_dataset.csv"),
                target_table: "financial".to_string(),
            },
            attendance: DomainConfig {
                source: PathBuf::from("data/attendance_dataset.csv"),
                target_table: "attendance".to_string(),
            },
            fx_rates,
            chunk_size: DEFAULT_CHUNK_SIZE,
            staging_suffix: DEFAULT_STAGING_SUFFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Build the immutable FX lookup table handed to transformers.
    pub fn fx_table(&self) -> FxTable {
        FxTable::new(self.fx_rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_size, 100_000);
        assert_eq!(config.staging_suffix, "_staging");
        assert_eq!(config.fx_rates.get("USD"), Some(&1.0));
        assert_eq!(config.sales.target_table, "sales");
    }

    #[test]
    fn test_config_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "sales": {{"source": "s.csv", "target_table": "t.sales"}},
                "financial": {{"source": "f.csv", "target_table": "t.financial"}},
                "attendance": {{"source": "a.csv", "target_table": "t.attendance"}},
                "fx_rates": {{"EUR": 1.1}},
                "chunk_size": 500
            }}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.chunk_size, 500);
        // omitted fields fall back to defaults
        assert_eq!(config.staging_suffix, "_staging");
        assert_eq!(config.sales.target_table, "t.sales");
        assert_eq!(config.fx_rates.get("EUR"), Some(&1.1));
    }

    #[test]
    fn test_config_missing_file() {
        let result = PipelineConfig::from_json_file(Path::new("no_such_config.json"));
        assert!(result.is_err());
    }
}
