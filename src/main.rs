//! Lending Planner
//!
//! Offline risk report for one borrower account:
//! - Loads a market snapshot (banks, prices, account, pending instructions)
//! - Optionally re-prices banks from live oracle accounts
//! - Logs Initial/Maintenance/Equity health, per-bank max borrow,
//!   max withdraw and liquidation price
//! - Plans the oracle crank for the pending instructions when a crank
//!   service is configured

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lendplan_api::{CrankCheckClient, CrossbarClient, FallbackPriceClient};
use lendplan_chain::RpcAccountFetcher;
use lendplan_core::{
    compute_health_cache, compute_liquidation_price, compute_max_borrow, compute_max_withdraw,
    config, init_config, plan_oracle_crank, resolve_oracle_prices, CrankPlan, MarginRequirement,
    MarketContext, MarketSnapshot, OracleSources, PlannerConfig,
};

/// Environment variable names.
mod env {
    pub const SNAPSHOT_PATH: &str = "SNAPSHOT_PATH";
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lendplan_core=debug,lendplan_chain=debug")),
        )
        .init();

    // PLANNER_PROFILE selects a profile, PLANNER_CONFIG points at a TOML file
    init_config(PlannerConfig::from_env());
    let planner_config = config();
    planner_config.log_config();

    let path = std::env::var(env::SNAPSHOT_PATH)
        .with_context(|| format!("Missing env var: {}", env::SNAPSHOT_PATH))?;
    let mut snapshot = MarketSnapshot::from_file(&path)?;

    if let Some(rpc_url) = planner_config.endpoints.rpc_url.as_deref() {
        refresh_prices(&mut snapshot, rpc_url, planner_config).await;
    }

    report_health(&mut snapshot, planner_config);
    report_limits(&snapshot, planner_config);

    if let Some(url) = planner_config.endpoints.crank_check_url.as_deref() {
        plan_crank(&snapshot, url, planner_config).await?;
    }

    Ok(())
}

/// Replace snapshot prices with live oracle prices.
async fn refresh_prices(snapshot: &mut MarketSnapshot, rpc_url: &str, config: &PlannerConfig) {
    let fetcher = RpcAccountFetcher::new(rpc_url)
        .with_batch_size(config.oracle.fetch_batch_size)
        .with_max_concurrent(config.oracle.fetch_concurrency);
    let fallback = config
        .endpoints
        .fallback_price_url
        .as_deref()
        .map(FallbackPriceClient::new);
    let crossbar = config.endpoints.crossbar_url.as_deref().map(CrossbarClient::new);

    let mut sources = OracleSources::new(&fetcher);
    if let Some(fallback) = fallback.as_ref() {
        sources = sources.with_fallback(fallback);
    }
    if let Some(crossbar) = crossbar.as_ref() {
        sources = sources.with_simulator(crossbar);
    }

    let resolved = resolve_oracle_prices(&snapshot.banks, &sources, &config.price_options()).await;
    info!(
        banks = resolved.prices.len(),
        fallback_priced = resolved.fallback_priced.len(),
        zero_filled = resolved.zero_filled.len(),
        "Prices refreshed from chain"
    );

    snapshot.prices.extend(resolved.prices);
    snapshot.feed_hashes.extend(resolved.feed_hashes);
}

fn report_health(snapshot: &mut MarketSnapshot, config: &PlannerConfig) {
    let now = snapshot.now();
    let market = MarketContext::new(&snapshot.banks, &snapshot.prices);
    compute_health_cache(&mut snapshot.account, &market, &config.health_options(), now);

    for requirement in MarginRequirement::ALL {
        let components = snapshot.account.cached_health(requirement);
        info!(
            requirement = ?requirement,
            assets = components.assets,
            liabilities = components.liabilities,
            health = components.health(),
            "Account health"
        );
    }
    match snapshot.account.maintenance_health_ratio() {
        Some(ratio) => info!(ratio, "Maintenance health ratio"),
        None => info!("No liabilities"),
    }
}

fn report_limits(snapshot: &MarketSnapshot, config: &PlannerConfig) {
    let market = snapshot.market();
    let opts = config.max_amount_options();
    let balances = &snapshot.account.balances;

    let mut banks: Vec<_> = snapshot.banks.keys().copied().collect();
    banks.sort();

    for bank in banks {
        let max_borrow = compute_max_borrow(balances, &bank, &market, &opts);
        let max_withdraw = compute_max_withdraw(balances, &bank, &market, &opts);
        let liquidation_price = compute_liquidation_price(balances, &bank, &market, &opts.health);
        info!(
            bank = %bank,
            max_borrow,
            max_withdraw,
            liquidation_price = ?liquidation_price,
            "Bank limits"
        );
    }
}

async fn plan_crank(snapshot: &MarketSnapshot, url: &str, config: &PlannerConfig) -> Result<()> {
    let checker = CrankCheckClient::new(url);
    let plan = plan_oracle_crank(
        &snapshot.account,
        &snapshot.instructions,
        &snapshot.market(),
        &snapshot.feed_hashes,
        &checker,
        &config.crank_options(),
    )
    .await?;

    match plan {
        CrankPlan::Ready(solution) => info!(
            strategy = ?solution.strategy,
            oracles = ?solution.required_oracles,
            projected_health = solution.projected_health,
            "Crank plan ready"
        ),
        CrankPlan::Blocked(blocked) => {
            for oracle in &blocked.uncrankable_liability_oracles {
                warn!(oracle = %oracle.oracle, reason = ?oracle.reason, "Liability oracle cannot be cranked");
            }
            for oracle in &blocked.uncrankable_asset_oracles {
                warn!(oracle = %oracle.oracle, reason = ?oracle.reason, "Asset oracle cannot be cranked");
            }
            warn!("Crank plan blocked");
        }
    }
    Ok(())
}
