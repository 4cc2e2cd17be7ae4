//! Account health aggregation.
//!
//! Sums weighted asset and liability USD values across active balances.
//! A balance whose bank or price cannot be resolved is left out of the sums
//! with a warning; aggregation itself never fails.

use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::account::{Account, Balance, HealthCache, HealthCacheStatus};
use crate::bank::{Bank, BankMap};
use crate::pricing::{EmodeOverrides, MarginRequirement, PriceMap};
use lendplan_chain::{OraclePrice, PriceBias};

/// Weighted asset and liability totals in USD.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthComponents {
    pub assets: f64,
    pub liabilities: f64,
}

impl HealthComponents {
    pub fn new(assets: f64, liabilities: f64) -> Self {
        Self {
            assets,
            liabilities,
        }
    }

    /// Assets minus liabilities (signed).
    pub fn health(&self) -> f64 {
        self.assets - self.liabilities
    }
}

impl std::ops::Add for HealthComponents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.assets + rhs.assets, self.liabilities + rhs.liabilities)
    }
}

impl std::iter::Sum for HealthComponents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, c| acc + c)
    }
}

/// Options shared by every health computation.
#[derive(Debug, Clone, Default)]
pub struct HealthOptions {
    /// Banks left out of the sums entirely
    pub excluded_banks: HashSet<Pubkey>,
    /// Emode weight overrides; these can only raise asset weights
    pub emode: EmodeOverrides,
    /// Skip the Initial-weight soft limit
    pub ignore_soft_limits: bool,
}

impl HealthOptions {
    /// Same options with one more bank excluded.
    pub fn excluding(&self, bank: Pubkey) -> Self {
        let mut opts = self.clone();
        opts.excluded_banks.insert(bank);
        opts
    }
}

/// Read-only bank registry and price snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MarketContext<'a> {
    pub banks: &'a BankMap,
    pub prices: &'a PriceMap,
}

impl<'a> MarketContext<'a> {
    pub fn new(banks: &'a BankMap, prices: &'a PriceMap) -> Self {
        Self { banks, prices }
    }

    /// Bank and price for a bank address.
    pub fn resolve(&self, bank: &Pubkey) -> Option<(&'a Bank, &'a OraclePrice)> {
        Some((self.banks.get(bank)?, self.prices.get(bank)?))
    }
}

/// Contribution of one balance to a health snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankHealth {
    pub bank: Pubkey,
    pub assets: f64,
    pub liabilities: f64,
}

/// Per-balance contributions for a requirement.
///
/// `biased` reads the Lowest price for assets and the Highest price for
/// liabilities; otherwise both read the spot price.
pub fn compute_bank_health(
    balances: &[Balance],
    market: &MarketContext<'_>,
    requirement: MarginRequirement,
    biased: bool,
    opts: &HealthOptions,
) -> Vec<BankHealth> {
    balances
        .iter()
        .filter(|b| b.active && !opts.excluded_banks.contains(&b.bank_pk))
        .filter_map(|balance| {
            let Some((bank, price)) = market.resolve(&balance.bank_pk) else {
                warn!(
                    bank = %balance.bank_pk,
                    requirement = ?requirement,
                    "Bank or price not found, excluding balance from health"
                );
                return None;
            };

            let weights = bank.risk_weights(
                requirement,
                price,
                opts.emode.get(&bank.address),
                opts.ignore_soft_limits,
            );
            Some(BankHealth {
                bank: bank.address,
                assets: bank.compute_asset_usd_value(
                    price,
                    balance.asset_shares,
                    requirement,
                    biased,
                    weights,
                ),
                liabilities: bank.compute_liability_usd_value(
                    price,
                    balance.liability_shares,
                    requirement,
                    biased,
                    weights,
                ),
            })
        })
        .collect()
}

/// Health totals with conservative price bias.
pub fn compute_health_components(
    balances: &[Balance],
    market: &MarketContext<'_>,
    requirement: MarginRequirement,
    opts: &HealthOptions,
) -> HealthComponents {
    sum(compute_bank_health(balances, market, requirement, true, opts))
}

/// Health totals at the neutral price.
pub fn compute_health_components_without_bias(
    balances: &[Balance],
    market: &MarketContext<'_>,
    requirement: MarginRequirement,
    opts: &HealthOptions,
) -> HealthComponents {
    sum(compute_bank_health(balances, market, requirement, false, opts))
}

fn sum(per_bank: Vec<BankHealth>) -> HealthComponents {
    per_bank
        .into_iter()
        .map(|h| HealthComponents::new(h.assets, h.liabilities))
        .sum()
}

/// Health snapshot for all three requirements.
///
/// Initial and Maintenance are biased; Equity is neutral.
pub fn health_snapshot(
    balances: &[Balance],
    market: &MarketContext<'_>,
    opts: &HealthOptions,
    now: i64,
) -> HealthCache {
    let mut cache = HealthCache {
        timestamp: now,
        status: HealthCacheStatus::Computed,
        ..Default::default()
    };
    for requirement in MarginRequirement::ALL {
        let components = match requirement {
            MarginRequirement::Equity => {
                compute_health_components_without_bias(balances, market, requirement, opts)
            }
            _ => compute_health_components(balances, market, requirement, opts),
        };
        cache.set_components(requirement, components);
    }
    cache
}

/// Recompute and store the account's health cache.
pub fn compute_health_cache(
    account: &mut Account,
    market: &MarketContext<'_>,
    opts: &HealthOptions,
    now: i64,
) -> HealthCache {
    let cache = health_snapshot(&account.balances, market, opts, now);
    debug!(
        account = %account.address,
        init_health = cache.components(MarginRequirement::Initial).health(),
        maint_health = cache.components(MarginRequirement::Maintenance).health(),
        "Health cache computed"
    );
    account.health_cache = cache;
    cache
}

/// Initial assets minus Initial liabilities; clamped at zero when `clamp` is set.
pub fn compute_free_collateral(
    balances: &[Balance],
    market: &MarketContext<'_>,
    opts: &HealthOptions,
    clamp: bool,
) -> f64 {
    let health =
        compute_health_components(balances, market, MarginRequirement::Initial, opts).health();
    if clamp {
        health.max(0.0)
    } else {
        health
    }
}

/// Oracle price at which the account reaches zero Maintenance health
/// through its position in `bank_pk`.
///
/// `None` when the account has no active balance in the bank, when a lending
/// position has nothing else borrowed against it, or when the result is
/// NaN, negative or infinite.
pub fn compute_liquidation_price(
    balances: &[Balance],
    bank_pk: &Pubkey,
    market: &MarketContext<'_>,
    opts: &HealthOptions,
) -> Option<f64> {
    let balance = balances.iter().find(|b| b.active && &b.bank_pk == bank_pk)?;
    let (bank, price) = market.resolve(bank_pk)?;

    let requirement = MarginRequirement::Maintenance;
    let others = compute_health_components(balances, market, requirement, &opts.excluding(*bank_pk));
    let (assets_ui, liabilities_ui) = balance.compute_quantity_ui(bank);
    let multiplier = bank.integration_multiplier();
    let weights = bank.risk_weights(
        requirement,
        price,
        opts.emode.get(bank_pk),
        opts.ignore_soft_limits,
    );
    let spot = price.get(PriceBias::None, false);

    let liquidation_price = if balance.liability_shares == 0.0 {
        if others.liabilities == 0.0 {
            return None;
        }
        let band = spot - price.get(PriceBias::Lowest, false);
        (others.liabilities - others.assets) / (assets_ui * multiplier * weights.asset) + band
    } else {
        let band = price.get(PriceBias::Highest, false) - spot;
        (others.assets - others.liabilities) / (liabilities_ui * multiplier * weights.liability)
            - band
    };

    if !liquidation_price.is_finite() || liquidation_price < 0.0 {
        return None;
    }
    Some(liquidation_price)
}
