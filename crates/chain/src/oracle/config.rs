//! Oracle pricing configuration for TOML-based setup.

use super::OracleFamily;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Confidence handling and fetch parameters for oracle prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum confidence as a fraction of price
    #[serde(default = "default_max_confidence_ratio")]
    pub max_confidence_ratio: f64,
    /// Multiple applied to Pyth confidence (standard deviations)
    #[serde(default = "default_pyth_conf_multiple")]
    pub pyth_conf_multiple: f64,
    /// Multiple applied to Switchboard standard deviation
    #[serde(default = "default_switchboard_conf_multiple")]
    pub switchboard_conf_multiple: f64,
    /// Maximum accounts requested per RPC batch
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,
    /// Maximum concurrent RPC batches
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_max_confidence_ratio() -> f64 {
    0.05
}
fn default_pyth_conf_multiple() -> f64 {
    2.12
}
fn default_switchboard_conf_multiple() -> f64 {
    1.96
}
fn default_fetch_batch_size() -> usize {
    100
}
fn default_fetch_concurrency() -> usize {
    4
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_confidence_ratio: default_max_confidence_ratio(),
            pyth_conf_multiple: default_pyth_conf_multiple(),
            switchboard_conf_multiple: default_switchboard_conf_multiple(),
            fetch_batch_size: default_fetch_batch_size(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl OracleConfig {
    /// Load from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse oracle config: {}", e))
    }

    /// Confidence multiple for a provider family.
    pub fn conf_multiple(&self, family: OracleFamily) -> f64 {
        match family {
            OracleFamily::Push => self.pyth_conf_multiple,
            OracleFamily::Pull => self.switchboard_conf_multiple,
            OracleFamily::Constant => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_config_parsing() {
        let toml = r#"
max_confidence_ratio = 0.1
pyth_conf_multiple = 3.0
"#;

        let config = OracleConfig::from_toml(toml).unwrap();
        assert_eq!(config.max_confidence_ratio, 0.1);
        assert_eq!(config.pyth_conf_multiple, 3.0);
        assert_eq!(config.switchboard_conf_multiple, 1.96); // default
        assert_eq!(config.fetch_batch_size, 100);
    }

    #[test]
    fn test_conf_multiple_by_family() {
        let config = OracleConfig::default();
        assert_eq!(config.conf_multiple(OracleFamily::Push), 2.12);
        assert_eq!(config.conf_multiple(OracleFamily::Pull), 1.96);
        assert_eq!(config.conf_multiple(OracleFamily::Constant), 0.0);
    }
}
