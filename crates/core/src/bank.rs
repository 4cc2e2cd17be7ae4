//! Bank (lending pool) data model.

use lendplan_chain::OracleSetup;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use solana_pubkey::Pubkey;
use std::collections::HashMap;

/// Read-only snapshot of the bank registry, keyed by bank address.
pub type BankMap = HashMap<Pubkey, Bank>;

/// Risk classification of a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RiskTier {
    /// Regular collateral, can be combined with any debt
    #[default]
    Collateral,
    /// Cannot be combined with other debt; not counted as collateral
    Isolated,
}

/// Which side of a bank earns emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EmissionsMode {
    #[default]
    None,
    /// Depositors earn emissions
    Lending,
    /// Borrowers earn emissions
    Borrowing,
}

/// Emissions configuration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EmissionsConfig {
    /// Emitting side
    #[serde(default)]
    pub mode: EmissionsMode,
    /// Emission tokens per token of balance per year
    #[serde(default)]
    pub rate: f64,
    /// Emissions mint
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default)]
    pub mint: Option<Pubkey>,
}

/// Risk and oracle configuration of a bank.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Risk tier
    #[serde(default)]
    pub risk_tier: RiskTier,
    /// Asset weight at Initial margin (e.g., 0.8)
    pub asset_weight_init: f64,
    /// Asset weight at Maintenance margin
    pub asset_weight_maint: f64,
    /// Liability weight at Initial margin (e.g., 1.25)
    pub liability_weight_init: f64,
    /// Liability weight at Maintenance margin
    pub liability_weight_maint: f64,
    /// Soft cap on total collateral USD value before the Initial asset weight
    /// is scaled down; zero disables it
    #[serde(default)]
    pub total_asset_value_init_limit: f64,
    /// Oracle setup
    #[serde(default)]
    pub oracle_setup: OracleSetup,
    /// Oracle accounts; the first is the price feed
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(default)]
    pub oracle_keys: Vec<Pubkey>,
}

/// A lending pool for one token.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    /// Bank address
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    /// Token mint
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    /// Mint decimals
    pub mint_decimals: u8,
    /// Risk and oracle configuration
    pub config: BankConfig,
    /// Total asset shares outstanding
    #[serde(default)]
    pub total_asset_shares: f64,
    /// Total liability shares outstanding
    #[serde(default)]
    pub total_liability_shares: f64,
    /// Asset shares to native quantity
    pub asset_share_value: f64,
    /// Liability shares to native quantity
    pub liability_share_value: f64,
    /// Price for `OracleSetup::Fixed`
    #[serde(default)]
    pub fixed_price: Option<f64>,
    /// Underlying tokens per wrapped token, for integration banks
    #[serde(default)]
    pub integration_multiplier: Option<f64>,
    /// Emissions configuration
    #[serde(default)]
    pub emissions: EmissionsConfig,
}

impl Bank {
    /// Price feed account, if the bank has one.
    pub fn oracle_key(&self) -> Option<Pubkey> {
        self.config.oracle_keys.first().copied()
    }

    /// Whether the bank is in the isolated risk tier.
    pub fn is_isolated(&self) -> bool {
        self.config.risk_tier == RiskTier::Isolated
    }

    /// Whether the bank's oracle must be cranked before use.
    pub fn requires_crank(&self) -> bool {
        self.config.oracle_setup.requires_crank() && self.oracle_key().is_some()
    }

    /// Multiplier converting wrapped quantities to underlying (1 when not an integration bank).
    pub fn integration_multiplier(&self) -> f64 {
        match self.integration_multiplier {
            Some(m) if m.is_finite() && m > 0.0 => m,
            _ => 1.0,
        }
    }

    /// `10^mint_decimals`
    pub fn decimal_scale(&self) -> f64 {
        10f64.powi(self.mint_decimals as i32)
    }
}

/// Index banks by address.
pub fn bank_map(banks: impl IntoIterator<Item = Bank>) -> BankMap {
    banks.into_iter().map(|b| (b.address, b)).collect()
}
