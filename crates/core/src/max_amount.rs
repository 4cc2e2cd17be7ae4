//! Maximum borrow and withdraw amounts for one bank.
//!
//! Results are in UI units of the bank's token and never negative.

use lendplan_chain::PriceBias;
use solana_pubkey::Pubkey;
use tracing::{debug, warn};

use crate::account::Balance;
use crate::health::{
    compute_bank_health, compute_free_collateral, compute_health_components, HealthOptions,
    MarketContext,
};
use crate::pricing::MarginRequirement;

/// Options for max-amount calculations.
#[derive(Debug, Clone)]
pub struct MaxAmountOptions {
    /// Fraction of free collateral the solver may use (1 = all of it)
    pub volatility_factor: f64,
    pub health: HealthOptions,
}

impl Default for MaxAmountOptions {
    fn default() -> Self {
        Self {
            volatility_factor: 1.0,
            health: HealthOptions::default(),
        }
    }
}

/// Initial-margin asset value the account holds in one bank (biased).
fn own_initial_asset_value(
    balances: &[Balance],
    bank_pk: &Pubkey,
    market: &MarketContext<'_>,
    opts: &HealthOptions,
) -> f64 {
    compute_bank_health(balances, market, MarginRequirement::Initial, true, opts)
        .into_iter()
        .filter(|h| &h.bank == bank_pk)
        .map(|h| h.assets)
        .sum()
}

/// Whether borrowing from `bank_pk` would mix isolated debt with other debt.
fn has_isolated_conflict(balances: &[Balance], bank_pk: &Pubkey, market: &MarketContext<'_>) -> bool {
    let target_isolated = market
        .banks
        .get(bank_pk)
        .map(|b| b.is_isolated())
        .unwrap_or(false);

    balances
        .iter()
        .filter(|b| b.is_borrowing() && &b.bank_pk != bank_pk)
        .any(|b| {
            target_isolated
                || market
                    .banks
                    .get(&b.bank_pk)
                    .map(|other| other.is_isolated())
                    .unwrap_or(false)
        })
}

/// Largest amount of `bank_pk` the account can borrow at Initial margin.
pub fn compute_max_borrow(
    balances: &[Balance],
    bank_pk: &Pubkey,
    market: &MarketContext<'_>,
    opts: &MaxAmountOptions,
) -> f64 {
    let Some((bank, price)) = market.resolve(bank_pk) else {
        warn!(bank = %bank_pk, "Bank or price not found, max borrow is zero");
        return 0.0;
    };

    if has_isolated_conflict(balances, bank_pk, market) {
        debug!(bank = %bank_pk, "Isolated debt conflict, max borrow is zero");
        return 0.0;
    }

    let free_collateral =
        compute_free_collateral(balances, market, &opts.health, true) * opts.volatility_factor;
    let untied = own_initial_asset_value(balances, bank_pk, market, &opts.health).min(free_collateral);

    let weights = bank.risk_weights(
        MarginRequirement::Initial,
        price,
        opts.health.emode.get(bank_pk),
        opts.health.ignore_soft_limits,
    );
    let lowest = bank.effective_price(price, PriceBias::Lowest, true);
    let highest = bank.effective_price(price, PriceBias::Highest, true);

    let borrow_denominator = highest * weights.liability;
    if borrow_denominator <= 0.0 || !borrow_denominator.is_finite() {
        warn!(bank = %bank_pk, price = highest, "Unusable borrow price, max borrow is zero");
        return 0.0;
    }
    let from_free = (free_collateral - untied) / borrow_denominator;

    let max = if weights.asset == 0.0 {
        let deposited_ui = balances
            .iter()
            .find(|b| b.active && &b.bank_pk == bank_pk)
            .map(|b| b.compute_quantity_ui(bank).0)
            .unwrap_or(0.0);
        deposited_ui + from_free
    } else if lowest > 0.0 {
        untied / (lowest * weights.asset) + from_free
    } else {
        from_free
    };

    max.max(0.0)
}

/// Largest amount of `bank_pk` the account can withdraw.
pub fn compute_max_withdraw(
    balances: &[Balance],
    bank_pk: &Pubkey,
    market: &MarketContext<'_>,
    opts: &MaxAmountOptions,
) -> f64 {
    let Some((bank, price)) = market.resolve(bank_pk) else {
        warn!(bank = %bank_pk, "Bank or price not found, max withdraw is zero");
        return 0.0;
    };
    let Some(balance) = balances.iter().find(|b| b.active && &b.bank_pk == bank_pk) else {
        return 0.0;
    };

    let deposited_ui = balance.compute_quantity_ui(bank).0;
    let emode = opts.health.emode.get(bank_pk);
    let init_weight = bank
        .risk_weights(MarginRequirement::Initial, price, emode, opts.health.ignore_soft_limits)
        .asset;
    let maint_weight = bank
        .risk_weights(MarginRequirement::Maintenance, price, emode, opts.health.ignore_soft_limits)
        .asset;

    let free_collateral = compute_free_collateral(balances, market, &opts.health, true);
    let initial =
        compute_health_components(balances, market, MarginRequirement::Initial, &opts.health);
    let has_liabilities = initial.liabilities > 0.0;

    // Isolated or non-collateral: the check is on the end state, not the delta
    if bank.is_isolated() || (init_weight == 0.0 && maint_weight == 0.0) {
        if free_collateral == 0.0 && has_liabilities {
            return 0.0;
        }
        return deposited_ui;
    }

    if init_weight == 0.0 {
        if !has_liabilities {
            return deposited_ui;
        }
        if free_collateral == 0.0 {
            return 0.0;
        }
        let maint =
            compute_health_components(balances, market, MarginRequirement::Maintenance, &opts.health);
        let lowest = bank.effective_price(price, PriceBias::Lowest, false);
        if lowest <= 0.0 {
            return deposited_ui;
        }
        let bound = (maint.health() / (lowest * maint_weight)).max(0.0);
        return bound.min(deposited_ui);
    }

    if !has_liabilities {
        return deposited_ui;
    }
    let own_value = own_initial_asset_value(balances, bank_pk, market, &opts.health);
    if own_value <= free_collateral {
        return deposited_ui;
    }

    let lowest = bank.effective_price(price, PriceBias::Lowest, true);
    if lowest <= 0.0 {
        return deposited_ui;
    }
    let bound = free_collateral * opts.volatility_factor / (lowest * init_weight);
    bound.max(0.0).min(deposited_ui)
}
