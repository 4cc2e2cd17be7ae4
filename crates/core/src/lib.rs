//! Lending-planner core logic.
//!
//! This crate provides the risk and transaction-planning engine:
//! - Bank pricing: share conversion, biased prices and risk weights
//! - Oracle price aggregation with fallback pricing for broken feeds
//! - Health snapshots (Initial, Maintenance, Equity) and liquidation prices
//! - Max-borrow / max-withdraw solvers
//! - Projection of account balances through pending instructions
//! - Minimal oracle-crank planning for Switchboard pull feeds
//!
//! Everything except price resolution and crank planning is pure and
//! synchronous; I/O lives in `lendplan-chain` and `lendplan-api`.

mod account;
mod bank;
pub mod config;
mod crank;
mod error;
mod health;
mod max_amount;
mod oracle_prices;
mod pricing;
mod projector;

#[cfg(test)]
mod fixtures;

pub use account::{Account, Balance, HealthCache, HealthCacheStatus, MAX_BALANCES};
pub use bank::{bank_map, Bank, BankConfig, BankMap, EmissionsConfig, EmissionsMode, RiskTier};
pub use config::{config, init_config, MarketSnapshot, PlannerConfig};
pub use crank::{
    plan_oracle_crank, refreshable_oracles_in_play, solve_oracle_crank, CrankBlocked, CrankPlan,
    CrankSolution, CrankSolverOptions, CrankStrategy, CrankabilityCheck, OraclesInPlay,
    UncrankableOracle,
};
pub use error::{PlannerError, PlannerResult};
pub use health::{
    compute_bank_health, compute_free_collateral, compute_health_cache,
    compute_health_components, compute_health_components_without_bias,
    compute_liquidation_price, health_snapshot, BankHealth, HealthComponents, HealthOptions,
    MarketContext,
};
pub use max_amount::{compute_max_borrow, compute_max_withdraw, MaxAmountOptions};
pub use oracle_prices::{
    classify_bank, resolve_oracle_prices, FallbackPriceSource, FeedSimulator, OraclePriceSnapshot,
    OracleSources, PriceResolveOptions, PricingStrategy,
};
pub use pricing::{
    EmodeOverrides, EmodeWeights, MarginRequirement, PriceMap, RiskWeights, Valuation,
};
pub use projector::{
    project_balances, BalanceAction, InstructionAmount, PendingInstruction, ProjectedBalances,
};
