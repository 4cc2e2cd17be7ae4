//! Account, balance slots and the cached health snapshot.

use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use solana_pubkey::Pubkey;
use tracing::warn;

use crate::bank::{Bank, EmissionsMode};
use crate::health::HealthComponents;
use crate::pricing::MarginRequirement;

/// Fixed number of balance slots per account.
pub const MAX_BALANCES: usize = 16;

const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// One position slot within an account.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Whether the slot holds a position
    pub active: bool,
    /// Bank of the position; `Pubkey::default()` when inactive
    #[serde_as(as = "DisplayFromStr")]
    pub bank_pk: Pubkey,
    /// Deposit shares
    #[serde(default)]
    pub asset_shares: f64,
    /// Borrow shares
    #[serde(default)]
    pub liability_shares: f64,
    /// Emissions accrued but not yet claimed (emission token, UI units)
    #[serde(default)]
    pub emissions_outstanding: f64,
    /// Unix timestamp of the last balance update
    #[serde(default)]
    pub last_update: i64,
}

impl Default for Balance {
    fn default() -> Self {
        Self::empty()
    }
}

impl Balance {
    /// An inactive slot.
    pub const fn empty() -> Self {
        Self {
            active: false,
            bank_pk: Pubkey::new_from_array([0u8; 32]),
            asset_shares: 0.0,
            liability_shares: 0.0,
            emissions_outstanding: 0.0,
            last_update: 0,
        }
    }

    /// A fresh active slot for a bank.
    pub fn open(bank_pk: Pubkey, last_update: i64) -> Self {
        Self {
            active: true,
            bank_pk,
            last_update,
            ..Self::empty()
        }
    }

    /// Reset to an inactive slot.
    pub fn deactivate(&mut self) {
        *self = Self::empty();
    }

    /// Whether the slot has any deposit.
    pub fn is_lending(&self) -> bool {
        self.active && self.asset_shares > 0.0
    }

    /// Whether the slot has any debt.
    pub fn is_borrowing(&self) -> bool {
        self.active && self.liability_shares > 0.0
    }

    /// Native (asset, liability) quantities.
    pub fn compute_quantity(&self, bank: &Bank) -> (f64, f64) {
        (
            bank.get_asset_quantity(self.asset_shares),
            bank.get_liability_quantity(self.liability_shares),
        )
    }

    /// UI (asset, liability) quantities.
    pub fn compute_quantity_ui(&self, bank: &Bank) -> (f64, f64) {
        let (assets, liabilities) = self.compute_quantity(bank);
        (bank.to_ui(assets), bank.to_ui(liabilities))
    }

    /// Outstanding emissions plus what accrued since `last_update`, at time `now`.
    pub fn total_emissions(&self, bank: &Bank, now: i64) -> f64 {
        if !self.active {
            return 0.0;
        }
        let (assets, liabilities) = self.compute_quantity_ui(bank);
        let balance = match bank.emissions.mode {
            EmissionsMode::Lending => assets,
            EmissionsMode::Borrowing => liabilities,
            EmissionsMode::None => return self.emissions_outstanding,
        };

        let period = now.saturating_sub(self.last_update).max(0) as f64;
        self.emissions_outstanding + period * balance * bank.emissions.rate / SECONDS_PER_YEAR
    }
}

/// Status of a cached health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HealthCacheStatus {
    /// Never computed
    #[default]
    Unset,
    /// Computed from balances, banks and prices
    Computed,
    /// Computation (or simulation) reported an error
    Error,
}

/// Cached asset and liability values for every margin requirement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct HealthCache {
    pub asset_value_initial: f64,
    pub liability_value_initial: f64,
    pub asset_value_maint: f64,
    pub liability_value_maint: f64,
    pub asset_value_equity: f64,
    pub liability_value_equity: f64,
    /// Unix timestamp of the computation
    pub timestamp: i64,
    pub status: HealthCacheStatus,
}

impl HealthCache {
    /// Components for one requirement.
    pub fn components(&self, requirement: MarginRequirement) -> HealthComponents {
        match requirement {
            MarginRequirement::Initial => {
                HealthComponents::new(self.asset_value_initial, self.liability_value_initial)
            }
            MarginRequirement::Maintenance => {
                HealthComponents::new(self.asset_value_maint, self.liability_value_maint)
            }
            MarginRequirement::Equity => {
                HealthComponents::new(self.asset_value_equity, self.liability_value_equity)
            }
        }
    }

    /// Store components for one requirement.
    pub fn set_components(&mut self, requirement: MarginRequirement, components: HealthComponents) {
        let (assets, liabilities) = match requirement {
            MarginRequirement::Initial => (&mut self.asset_value_initial, &mut self.liability_value_initial),
            MarginRequirement::Maintenance => (&mut self.asset_value_maint, &mut self.liability_value_maint),
            MarginRequirement::Equity => (&mut self.asset_value_equity, &mut self.liability_value_equity),
        };
        *assets = components.assets;
        *liabilities = components.liabilities;
    }
}

/// A borrower's account.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account address
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    /// Owner
    #[serde_as(as = "DisplayFromStr")]
    pub authority: Pubkey,
    /// Balance slots; shorter lists are padded with inactive slots
    #[serde(deserialize_with = "deserialize_balances")]
    pub balances: [Balance; MAX_BALANCES],
    /// Cached health
    #[serde(default)]
    pub health_cache: HealthCache,
}

fn deserialize_balances<'de, D>(deserializer: D) -> Result<[Balance; MAX_BALANCES], D::Error>
where
    D: Deserializer<'de>,
{
    let list = Vec::<Balance>::deserialize(deserializer)?;
    pad_balances(list).map_err(serde::de::Error::custom)
}

fn pad_balances(list: Vec<Balance>) -> Result<[Balance; MAX_BALANCES], String> {
    if list.len() > MAX_BALANCES {
        return Err(format!(
            "account has {} balances, maximum is {}",
            list.len(),
            MAX_BALANCES
        ));
    }
    let mut balances = [Balance::empty(); MAX_BALANCES];
    for (slot, balance) in balances.iter_mut().zip(list) {
        *slot = balance;
    }
    Ok(balances)
}

impl Account {
    /// Create an account from its active balances.
    ///
    /// Panics if more than [`MAX_BALANCES`] balances are given.
    pub fn new(address: Pubkey, authority: Pubkey, balances: Vec<Balance>) -> Self {
        let balances = match pad_balances(balances) {
            Ok(b) => b,
            Err(e) => panic!("{}", e),
        };
        Self {
            address,
            authority,
            balances,
            health_cache: HealthCache::default(),
        }
    }

    /// Active balances, in slot order.
    pub fn active_balances(&self) -> impl Iterator<Item = &Balance> {
        self.balances.iter().filter(|b| b.active)
    }

    /// Active balance for a bank.
    pub fn balance_for(&self, bank: &Pubkey) -> Option<&Balance> {
        self.active_balances().find(|b| &b.bank_pk == bank)
    }

    /// Cached components for a requirement. Warns when the cache was never computed.
    pub fn cached_health(&self, requirement: MarginRequirement) -> HealthComponents {
        if self.health_cache.status == HealthCacheStatus::Unset {
            warn!(
                account = %self.address,
                requirement = ?requirement,
                "Reading health cache that was never computed"
            );
        }
        self.health_cache.components(requirement)
    }

    /// Merge a health snapshot produced by an external simulation.
    pub fn apply_simulated_health(&mut self, cache: HealthCache) {
        if cache.status == HealthCacheStatus::Error {
            warn!(account = %self.address, "Simulated health reported an error");
        }
        self.health_cache = cache;
    }

    /// Maintenance assets over maintenance liabilities from the cache.
    ///
    /// `None` without liabilities.
    pub fn maintenance_health_ratio(&self) -> Option<f64> {
        let maint = self.cached_health(MarginRequirement::Maintenance);
        if maint.liabilities == 0.0 {
            return None;
        }
        Some(maint.assets / maint.liabilities)
    }
}
