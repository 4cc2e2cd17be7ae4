//! Oracle price resolution for a set of banks.
//!
//! Banks are classified first so that zero, fixed and isolated banks never
//! cost an external call. Standard banks are priced from the push and pull
//! families concurrently. Broken pull feeds fall back to a price-by-mint
//! source, and any standard bank still unresolved gets an explicit zero
//! record so the resulting map has no gaps.

use async_trait::async_trait;
use lendplan_api::{CrossbarClient, FallbackPriceClient};
use lendplan_chain::{
    price_from_samples, AccountFetcher, DecodedOracle, OracleConfig, OracleFamily, OraclePrice,
    OracleSetup,
};
use solana_pubkey::Pubkey;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};

use crate::bank::{Bank, BankMap};
use crate::pricing::PriceMap;

/// Price-by-mint source used for broken pull feeds.
#[async_trait]
pub trait FallbackPriceSource: Send + Sync {
    async fn prices_by_mint(&self, mints: &[Pubkey]) -> anyhow::Result<HashMap<Pubkey, f64>>;
}

#[async_trait]
impl FallbackPriceSource for FallbackPriceClient {
    async fn prices_by_mint(&self, mints: &[Pubkey]) -> anyhow::Result<HashMap<Pubkey, f64>> {
        self.get_prices(mints).await
    }
}

/// Off-chain pull feed simulation, keyed by feed hash.
#[async_trait]
pub trait FeedSimulator: Send + Sync {
    async fn simulate(&self, feed_hashes: &[String]) -> anyhow::Result<HashMap<String, Vec<f64>>>;
}

#[async_trait]
impl FeedSimulator for CrossbarClient {
    async fn simulate(&self, feed_hashes: &[String]) -> anyhow::Result<HashMap<String, Vec<f64>>> {
        self.simulate_feeds(feed_hashes).await
    }
}

/// How a bank gets its price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricingStrategy {
    /// Always zero, no external call
    Zero,
    /// Bank-configured constant
    Fixed(f64),
    /// Caller-supplied static price, otherwise zero
    IsolatedStatic,
    /// Must be fetched from its oracle
    Standard(OracleFamily),
}

/// Decide how a bank is priced.
pub fn classify_bank(bank: &Bank) -> PricingStrategy {
    match bank.config.oracle_setup {
        OracleSetup::None => PricingStrategy::Zero,
        OracleSetup::Fixed => match bank.fixed_price {
            Some(price) if price.is_finite() && price >= 0.0 => PricingStrategy::Fixed(price),
            _ => PricingStrategy::Zero,
        },
        _ if bank.is_isolated() => PricingStrategy::IsolatedStatic,
        setup => PricingStrategy::Standard(setup.family()),
    }
}

/// External collaborators for price resolution.
#[derive(Clone, Copy)]
pub struct OracleSources<'a> {
    pub accounts: &'a dyn AccountFetcher,
    pub fallback: Option<&'a dyn FallbackPriceSource>,
    pub simulator: Option<&'a dyn FeedSimulator>,
}

impl<'a> OracleSources<'a> {
    pub fn new(accounts: &'a dyn AccountFetcher) -> Self {
        Self {
            accounts,
            fallback: None,
            simulator: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a dyn FallbackPriceSource) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_simulator(mut self, simulator: &'a dyn FeedSimulator) -> Self {
        self.simulator = Some(simulator);
        self
    }
}

impl std::fmt::Debug for OracleSources<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSources")
            .field("fallback", &self.fallback.is_some())
            .field("simulator", &self.simulator.is_some())
            .finish()
    }
}

/// Options for price resolution.
#[derive(Debug, Clone, Default)]
pub struct PriceResolveOptions {
    pub oracle: OracleConfig,
    /// Static USD prices for isolated banks, keyed by bank address
    pub isolated_prices: HashMap<Pubkey, f64>,
}

/// Resolved prices plus how they were obtained.
#[derive(Debug, Clone, Default)]
pub struct OraclePriceSnapshot {
    /// One record per requested bank
    pub prices: PriceMap,
    /// Pull feed hash by oracle address
    pub feed_hashes: HashMap<Pubkey, String>,
    /// Banks priced from the fallback source
    pub fallback_priced: BTreeSet<Pubkey>,
    /// Standard banks with no usable price, filled with zero
    pub zero_filled: BTreeSet<Pubkey>,
}

/// Outcome of one provider family.
#[derive(Debug, Default)]
struct FamilyPrices {
    prices: PriceMap,
    feed_hashes: HashMap<Pubkey, String>,
    fallback_priced: BTreeSet<Pubkey>,
}

/// Resolve a price record for every bank.
///
/// Never fails: transport errors leave the affected banks zero-filled.
#[instrument(skip_all, fields(banks = banks.len()))]
pub async fn resolve_oracle_prices(
    banks: &BankMap,
    sources: &OracleSources<'_>,
    opts: &PriceResolveOptions,
) -> OraclePriceSnapshot {
    let mut snapshot = OraclePriceSnapshot::default();
    let mut push: Vec<&Bank> = Vec::new();
    let mut pull: Vec<&Bank> = Vec::new();

    for bank in banks.values() {
        match classify_bank(bank) {
            PricingStrategy::Zero => {
                snapshot.prices.insert(bank.address, OraclePrice::zero());
            }
            PricingStrategy::Fixed(price) => {
                snapshot.prices.insert(bank.address, OraclePrice::fixed(price));
            }
            PricingStrategy::IsolatedStatic => {
                let price = opts.isolated_prices.get(&bank.address).copied().unwrap_or(0.0);
                snapshot.prices.insert(bank.address, OraclePrice::fixed(price));
            }
            PricingStrategy::Standard(OracleFamily::Push) => push.push(bank),
            PricingStrategy::Standard(OracleFamily::Pull) => pull.push(bank),
            PricingStrategy::Standard(OracleFamily::Constant) => {
                snapshot.prices.insert(bank.address, OraclePrice::zero());
            }
        }
    }

    let (push_prices, pull_prices) = tokio::join!(
        resolve_push(&push, sources, &opts.oracle),
        resolve_pull(&pull, sources, &opts.oracle),
    );

    for family in [push_prices, pull_prices] {
        snapshot.prices.extend(family.prices);
        snapshot.feed_hashes.extend(family.feed_hashes);
        snapshot.fallback_priced.extend(family.fallback_priced);
    }

    for bank in push.iter().chain(&pull) {
        if !snapshot.prices.contains_key(&bank.address) {
            warn!(bank = %bank.address, mint = %bank.mint, "No price resolved, using zero");
            snapshot.prices.insert(bank.address, OraclePrice::zero());
            snapshot.zero_filled.insert(bank.address);
        }
    }

    info!(
        priced = snapshot.prices.len(),
        fallback = snapshot.fallback_priced.len(),
        zero_filled = snapshot.zero_filled.len(),
        "Oracle prices resolved"
    );
    snapshot
}

/// Fetch oracle accounts for banks, deduplicated by oracle key.
async fn fetch_oracles(
    banks: &[&Bank],
    sources: &OracleSources<'_>,
) -> HashMap<Pubkey, Vec<u8>> {
    let keys: Vec<Pubkey> = banks
        .iter()
        .filter_map(|b| b.oracle_key())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if keys.is_empty() {
        return HashMap::new();
    }

    match sources.accounts.get_multiple_accounts(&keys).await {
        Ok(accounts) if accounts.len() != keys.len() => {
            warn!(
                requested = keys.len(),
                returned = accounts.len(),
                "Oracle account fetch returned a misaligned batch"
            );
            HashMap::new()
        }
        Ok(accounts) => keys
            .into_iter()
            .zip(accounts)
            .filter_map(|(key, data)| Some((key, data?)))
            .collect(),
        Err(e) => {
            warn!(error = %e, oracles = keys.len(), "Oracle account fetch failed");
            HashMap::new()
        }
    }
}

fn decode_for(bank: &Bank, accounts: &HashMap<Pubkey, Vec<u8>>) -> Option<DecodedOracle> {
    let key = bank.oracle_key()?;
    let Some(data) = accounts.get(&key) else {
        warn!(bank = %bank.address, oracle = %key, "Oracle account missing");
        return None;
    };
    match DecodedOracle::decode(bank.config.oracle_setup, data) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(bank = %bank.address, oracle = %key, error = %e, "Failed to decode oracle");
            None
        }
    }
}

async fn resolve_push(banks: &[&Bank], sources: &OracleSources<'_>, config: &OracleConfig) -> FamilyPrices {
    let mut out = FamilyPrices::default();
    if banks.is_empty() {
        return out;
    }

    let accounts = fetch_oracles(banks, sources).await;
    for bank in banks {
        let Some(decoded) = decode_for(bank, &accounts) else {
            continue;
        };
        match decoded.to_oracle_price(config) {
            Some(price) => {
                out.prices.insert(bank.address, price);
            }
            None => warn!(bank = %bank.address, "Push oracle reports a non-positive price"),
        }
    }
    debug!(resolved = out.prices.len(), total = banks.len(), "Push prices resolved");
    out
}

async fn resolve_pull(banks: &[&Bank], sources: &OracleSources<'_>, config: &OracleConfig) -> FamilyPrices {
    let mut out = FamilyPrices::default();
    if banks.is_empty() {
        return out;
    }

    let accounts = fetch_oracles(banks, sources).await;
    let decoded: Vec<(&Bank, DecodedOracle)> = banks
        .iter()
        .filter_map(|bank| Some((*bank, decode_for(bank, &accounts)?)))
        .collect();

    for (bank, feed) in &decoded {
        if let (Some(key), Some(hash)) = (bank.oracle_key(), feed.feed_hash()) {
            out.feed_hashes.insert(key, hash);
        }
    }

    let simulated = match sources.simulator {
        Some(simulator) => {
            let hashes: Vec<String> = out
                .feed_hashes
                .values()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            simulator.simulate(&hashes).await.unwrap_or_else(|e| {
                warn!(error = %e, "Feed simulation failed, using on-chain values");
                HashMap::new()
            })
        }
        None => HashMap::new(),
    };

    let conf_multiple = config.conf_multiple(OracleFamily::Pull);
    let mut broken: Vec<&Bank> = Vec::new();
    for (bank, feed) in &decoded {
        let from_simulation = feed
            .feed_hash()
            .and_then(|hash| simulated.get(&hash))
            .and_then(|samples| price_from_samples(samples, conf_multiple, config.max_confidence_ratio));

        match from_simulation.or_else(|| feed.to_oracle_price(config)) {
            Some(price) => {
                out.prices.insert(bank.address, price);
            }
            None => {
                debug!(bank = %bank.address, mint = %bank.mint, "Pull feed broken");
                broken.push(*bank);
            }
        }
    }

    if !broken.is_empty() {
        apply_fallback(&broken, sources, &mut out).await;
    }
    debug!(resolved = out.prices.len(), total = banks.len(), "Pull prices resolved");
    out
}

async fn apply_fallback(broken: &[&Bank], sources: &OracleSources<'_>, out: &mut FamilyPrices) {
    let Some(fallback) = sources.fallback else {
        warn!(banks = broken.len(), "Broken pull feeds and no fallback price source");
        return;
    };

    let mints: Vec<Pubkey> = broken
        .iter()
        .map(|b| b.mint)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let prices = match fallback.prices_by_mint(&mints).await {
        Ok(prices) => prices,
        Err(e) => {
            warn!(error = %e, mints = mints.len(), "Fallback price fetch failed");
            return;
        }
    };

    for bank in broken {
        match prices.get(&bank.mint) {
            Some(&price) if price > 0.0 => {
                warn!(bank = %bank.address, mint = %bank.mint, price, "Broken feed priced from fallback");
                out.prices.insert(bank.address, OraclePrice::fixed(price));
                out.fallback_priced.insert(bank.address);
            }
            _ => warn!(bank = %bank.address, mint = %bank.mint, "No fallback price for broken feed"),
        }
    }
}
