//! Planner configuration with profile support.
//!
//! Values here are only read by callers; the pure solvers take options
//! structs built from a [`PlannerConfig`].

use crate::crank::CrankSolverOptions;
use crate::health::HealthOptions;
use crate::max_amount::MaxAmountOptions;
use crate::oracle_prices::PriceResolveOptions;
use anyhow::Context;
use lendplan_chain::OracleConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Oracle confidence handling and fetch parameters
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Risk solver parameters
    #[serde(default)]
    pub risk: RiskConfig,

    /// Crank solver parameters
    #[serde(default)]
    pub crank: CrankConfig,

    /// Remote service endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Risk solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of free collateral max-borrow/max-withdraw may use
    #[serde(default = "default_volatility_factor")]
    pub default_volatility_factor: f64,

    /// Skip the Initial-weight soft limit on collateral value
    #[serde(default)]
    pub ignore_soft_limits: bool,
}

fn default_volatility_factor() -> f64 {
    1.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            default_volatility_factor: default_volatility_factor(),
            ignore_soft_limits: false,
        }
    }
}

/// Crank solver parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrankConfig {
    /// Upper bound on oracle subsets evaluated per search
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,

    /// Crankability lookup timeout (milliseconds)
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,
}

fn default_max_combinations() -> usize {
    4096
}
fn default_check_timeout() -> u64 {
    10_000
}

impl Default for CrankConfig {
    fn default() -> Self {
        Self {
            max_combinations: default_max_combinations(),
            check_timeout_ms: default_check_timeout(),
        }
    }
}

impl CrankConfig {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

/// Remote service endpoints. All optional; unset services are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub crossbar_url: Option<String>,
    #[serde(default)]
    pub fallback_price_url: Option<String>,
    #[serde(default)]
    pub crank_check_url: Option<String>,
}

impl EndpointsConfig {
    /// Overlay `RPC_URL`, `CROSSBAR_URL`, `FALLBACK_PRICE_URL` and
    /// `CRANK_CHECK_URL` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let slots = [
            ("RPC_URL", &mut self.rpc_url),
            ("CROSSBAR_URL", &mut self.crossbar_url),
            ("FALLBACK_PRICE_URL", &mut self.fallback_price_url),
            ("CRANK_CHECK_URL", &mut self.crank_check_url),
        ];
        for (key, slot) in slots {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            oracle: OracleConfig::default(),
            risk: RiskConfig::default(),
            crank: CrankConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse planner config")
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read planner config {path}"))?;
        Self::from_toml(&content)
    }

    /// Tighter confidence cap and a haircut on free collateral.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            oracle: OracleConfig {
                max_confidence_ratio: 0.02,
                ..Default::default()
            },
            risk: RiskConfig {
                default_volatility_factor: 0.9,
                ignore_soft_limits: false,
            },
            crank: CrankConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }

    /// Small search bounds and short timeouts for local runs.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            oracle: OracleConfig {
                fetch_concurrency: 1,
                ..Default::default()
            },
            risk: RiskConfig {
                default_volatility_factor: 1.0,
                ignore_soft_limits: true,
            },
            crank: CrankConfig {
                max_combinations: 256,
                check_timeout_ms: 2_000,
            },
            endpoints: EndpointsConfig::default(),
        }
    }

    /// Named profile; unknown names fall back to the default profile.
    pub fn profile(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "testing" | "test" => Self::testing(),
            _ => Self::default(),
        }
    }

    /// Build from the environment.
    ///
    /// `PLANNER_CONFIG` names a TOML file that takes precedence over
    /// `PLANNER_PROFILE`. Endpoint variables are applied last either way.
    pub fn from_env() -> Self {
        let mut config = match std::env::var("PLANNER_CONFIG") {
            Ok(path) => Self::from_file(&path).unwrap_or_else(|e| {
                tracing::warn!(path = %path, error = %e, "Falling back to profile config");
                Self::profile_from_env()
            }),
            Err(_) => Self::profile_from_env(),
        };
        config.endpoints.apply_env();
        config
    }

    fn profile_from_env() -> Self {
        let profile = std::env::var("PLANNER_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::profile(&profile)
    }

    /// Health options carrying the configured soft-limit switch.
    pub fn health_options(&self) -> HealthOptions {
        HealthOptions {
            ignore_soft_limits: self.risk.ignore_soft_limits,
            ..Default::default()
        }
    }

    pub fn max_amount_options(&self) -> MaxAmountOptions {
        MaxAmountOptions {
            volatility_factor: self.risk.default_volatility_factor,
            health: self.health_options(),
        }
    }

    pub fn crank_options(&self) -> CrankSolverOptions {
        CrankSolverOptions {
            max_combinations: self.crank.max_combinations,
            check_timeout: self.crank.check_timeout(),
            health: self.health_options(),
        }
    }

    pub fn price_options(&self) -> PriceResolveOptions {
        PriceResolveOptions {
            oracle: self.oracle.clone(),
            ..Default::default()
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Planner configuration loaded");
        tracing::info!(
            max_confidence_ratio = self.oracle.max_confidence_ratio,
            pyth_conf_multiple = self.oracle.pyth_conf_multiple,
            switchboard_conf_multiple = self.oracle.switchboard_conf_multiple,
            fetch_concurrency = self.oracle.fetch_concurrency,
            "Oracle parameters"
        );
        tracing::info!(
            volatility_factor = self.risk.default_volatility_factor,
            ignore_soft_limits = self.risk.ignore_soft_limits,
            "Risk parameters"
        );
        tracing::info!(
            max_combinations = self.crank.max_combinations,
            check_timeout_ms = self.crank.check_timeout_ms,
            "Crank parameters"
        );
        tracing::info!(
            rpc = self.endpoints.rpc_url.is_some(),
            crossbar = self.endpoints.crossbar_url.is_some(),
            fallback_prices = self.endpoints.fallback_price_url.is_some(),
            crank_check = self.endpoints.crank_check_url.is_some(),
            "Endpoints configured"
        );
    }
}

use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<PlannerConfig> = OnceLock::new();

/// Initialize global configuration. Later calls are ignored.
pub fn init_config(config: PlannerConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static PlannerConfig {
    GLOBAL_CONFIG.get_or_init(PlannerConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PlannerConfig::default();
        assert_eq!(config.profile, "default");
        assert_eq!(config.oracle.max_confidence_ratio, 0.05);
        assert_eq!(config.oracle.pyth_conf_multiple, 2.12);
        assert_eq!(config.oracle.switchboard_conf_multiple, 1.96);
        assert_eq!(config.risk.default_volatility_factor, 1.0);
        assert!(!config.risk.ignore_soft_limits);
        assert_eq!(config.crank.max_combinations, 4096);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(PlannerConfig::profile("conservative").profile, "conservative");
        assert_eq!(PlannerConfig::profile("TEST").profile, "testing");
        assert_eq!(PlannerConfig::profile("unknown").profile, "default");
        assert!(PlannerConfig::conservative().risk.default_volatility_factor < 1.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PlannerConfig::from_toml(
            r#"
profile = "custom"

[risk]
default_volatility_factor = 0.8

[crank]
check_timeout_ms = 500

[endpoints]
crossbar_url = "https://crossbar.example"
"#,
        )
        .unwrap();

        assert_eq!(config.profile, "custom");
        assert_eq!(config.risk.default_volatility_factor, 0.8);
        assert!(!config.risk.ignore_soft_limits);
        assert_eq!(config.crank.max_combinations, 4096);
        assert_eq!(config.crank.check_timeout(), Duration::from_millis(500));
        assert_eq!(config.oracle.max_confidence_ratio, 0.05);
        assert_eq!(
            config.endpoints.crossbar_url.as_deref(),
            Some("https://crossbar.example")
        );
        assert!(config.endpoints.rpc_url.is_none());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(PlannerConfig::from_toml("[risk]\ndefault_volatility_factor = \"high\"").is_err());
    }

    #[test]
    fn test_endpoint_overrides() {
        let env: HashMap<&str, &str> = [
            ("RPC_URL", "https://rpc.example"),
            ("CRANK_CHECK_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut endpoints = EndpointsConfig {
            crank_check_url: Some("https://crank.example".to_string()),
            ..Default::default()
        };
        endpoints.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(endpoints.rpc_url.as_deref(), Some("https://rpc.example"));
        // Blank values leave the configured endpoint alone
        assert_eq!(
            endpoints.crank_check_url.as_deref(),
            Some("https://crank.example")
        );
        assert!(endpoints.crossbar_url.is_none());
    }

    #[test]
    fn test_options_builders() {
        let config = PlannerConfig::testing();

        let max = config.max_amount_options();
        assert_eq!(max.volatility_factor, 1.0);
        assert!(max.health.ignore_soft_limits);

        let crank = config.crank_options();
        assert_eq!(crank.max_combinations, 256);
        assert_eq!(crank.check_timeout, Duration::from_secs(2));

        let prices = config.price_options();
        assert_eq!(prices.oracle.fetch_concurrency, 1);
        assert!(prices.isolated_prices.is_empty());
    }

    #[test]
    fn test_serialization() {
        let config = PlannerConfig::conservative();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"conservative\""));

        let parsed = PlannerConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.profile, "conservative");
        assert_eq!(parsed.oracle.max_confidence_ratio, 0.02);
    }

    #[test]
    fn test_global_config() {
        init_config(PlannerConfig::testing());
        assert_eq!(config().profile, "testing");

        // Later initialization is ignored
        init_config(PlannerConfig::conservative());
        assert_eq!(config().profile, "testing");
        assert_eq!(config().crank.max_combinations, 256);
    }
}
