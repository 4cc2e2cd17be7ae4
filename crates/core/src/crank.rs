//! Oracle crank planning.
//!
//! Picks the smallest set of pull-oracle feeds to refresh so that the account
//! has non-negative Initial health once its pending instructions execute.
//! Every liability oracle that needs a refresh is always refreshed; if one of
//! them cannot be, the plan is blocked.

use arrayvec::ArrayVec;
use async_trait::async_trait;
use lendplan_api::{CrankCheckClient, CrankStatus};
use smallvec::SmallVec;
use solana_pubkey::Pubkey;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::account::{Account, MAX_BALANCES};
use crate::error::PlannerResult;
use crate::health::{compute_health_components, HealthComponents, HealthOptions, MarketContext};
use crate::pricing::MarginRequirement;
use crate::projector::{project_balances, PendingInstruction, ProjectedBalances};

/// Batched crankability lookup by feed hash.
#[async_trait]
pub trait CrankabilityCheck: Send + Sync {
    async fn check_feeds(&self, feed_hashes: &[String]) -> anyhow::Result<HashMap<String, CrankStatus>>;
}

#[async_trait]
impl CrankabilityCheck for CrankCheckClient {
    async fn check_feeds(&self, feed_hashes: &[String]) -> anyhow::Result<HashMap<String, CrankStatus>> {
        CrankCheckClient::check_feeds(self, feed_hashes).await
    }
}

/// How a crank plan was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrankStrategy {
    /// No liabilities after the instructions
    NothingToCrank,
    /// Fresh collateral already covers every liability
    LiabilitiesOnly,
    /// Smallest subset found by search
    Minimal,
    /// Not even every oracle gets health to zero; crank all of them anyway
    FullCrankFallback,
}

/// Oracles to refresh before the instructions execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CrankSolution {
    /// Sorted, deduplicated
    pub required_oracles: Vec<Pubkey>,
    /// Initial health after cranking exactly these oracles
    pub projected_health: f64,
    pub strategy: CrankStrategy,
}

/// An oracle that cannot be refreshed, with the banks it prices.
#[derive(Debug, Clone, PartialEq)]
pub struct UncrankableOracle {
    pub oracle: Pubkey,
    pub banks: Vec<Pubkey>,
    pub reason: Option<String>,
}

/// Why no safe crank set exists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrankBlocked {
    pub uncrankable_liability_oracles: Vec<UncrankableOracle>,
    pub uncrankable_asset_oracles: Vec<UncrankableOracle>,
}

/// Result of crank planning.
#[derive(Debug, Clone, PartialEq)]
pub enum CrankPlan {
    Ready(CrankSolution),
    Blocked(CrankBlocked),
}

impl CrankPlan {
    /// Oracles to crank; empty when blocked.
    pub fn required_oracles(&self) -> &[Pubkey] {
        match self {
            Self::Ready(solution) => &solution.required_oracles,
            Self::Blocked(_) => &[],
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

/// Options for crank planning.
#[derive(Debug, Clone)]
pub struct CrankSolverOptions {
    /// Maximum subsets evaluated by the search
    pub max_combinations: usize,
    /// Wall-clock limit on the crankability lookup
    pub check_timeout: Duration,
    pub health: HealthOptions,
}

impl Default for CrankSolverOptions {
    fn default() -> Self {
        Self {
            max_combinations: 4096,
            check_timeout: Duration::from_secs(10),
            health: HealthOptions::default(),
        }
    }
}

/// Refreshable oracles touched by projected balances, keyed by oracle.
///
/// An oracle pricing any liability appears only in `liability`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OraclesInPlay {
    pub liability: BTreeMap<Pubkey, Vec<Pubkey>>,
    pub asset: BTreeMap<Pubkey, Vec<Pubkey>>,
    pub has_liabilities: bool,
}

impl OraclesInPlay {
    /// Every refreshable oracle in play.
    pub fn all(&self) -> impl Iterator<Item = &Pubkey> {
        self.liability.keys().chain(self.asset.keys())
    }
}

/// Classify refreshable oracles of the projected balances by side.
pub fn refreshable_oracles_in_play(
    projected: &ProjectedBalances,
    market: &MarketContext<'_>,
) -> OraclesInPlay {
    let mut in_play = OraclesInPlay::default();
    let mut assets: BTreeMap<Pubkey, Vec<Pubkey>> = BTreeMap::new();

    for balance in projected.active() {
        let borrowing = balance.liability_shares > 0.0;
        in_play.has_liabilities |= borrowing;

        let Some(bank) = market.banks.get(&balance.bank_pk) else {
            warn!(bank = %balance.bank_pk, "Bank not found, oracle not considered for crank");
            continue;
        };
        let Some(oracle) = bank.oracle_key().filter(|_| bank.requires_crank()) else {
            continue;
        };

        if borrowing {
            in_play.liability.entry(oracle).or_default().push(bank.address);
        } else if balance.asset_shares > 0.0 {
            assets.entry(oracle).or_default().push(bank.address);
        }
    }

    for (oracle, banks) in assets {
        if !in_play.liability.contains_key(&oracle) {
            in_play.asset.insert(oracle, banks);
        }
    }
    in_play
}

/// A candidate crank set and the health it reaches.
#[derive(Debug, Clone)]
struct CrankCombination {
    oracles: SmallVec<[Pubkey; 8]>,
    health: f64,
}

impl CrankCombination {
    fn better_than(&self, other: &Self) -> bool {
        self.oracles.len() < other.oracles.len()
            || (self.oracles.len() == other.oracles.len() && self.health > other.health)
    }
}

/// Lexicographic k-subsets of `0..n`.
struct Combinations {
    n: usize,
    indices: ArrayVec<usize, MAX_BALANCES>,
    first: bool,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        let done = k > n || k > MAX_BALANCES;
        Self {
            n,
            indices: if done { ArrayVec::new() } else { (0..k).collect() },
            first: true,
            done,
        }
    }
}

impl Iterator for Combinations {
    type Item = ArrayVec<usize, MAX_BALANCES>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.indices.clone());
        }

        let k = self.indices.len();
        let pivot = (0..k).rev().find(|&i| self.indices[i] != i + self.n - k);
        let Some(i) = pivot else {
            self.done = true;
            return None;
        };
        self.indices[i] += 1;
        for j in i + 1..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

/// Initial health with only the given asset oracles (plus non-refreshable ones) fresh.
fn health_with_fresh(
    projected: &ProjectedBalances,
    market: &MarketContext<'_>,
    in_play: &OraclesInPlay,
    fresh: &[Pubkey],
    opts: &HealthOptions,
) -> HealthComponents {
    let mut opts = opts.clone();
    for (oracle, banks) in &in_play.asset {
        if !fresh.contains(oracle) {
            opts.excluded_banks.extend(banks.iter().copied());
        }
    }
    compute_health_components(&projected.balances, market, MarginRequirement::Initial, &opts)
}

fn uncrankable(
    oracles: &BTreeMap<Pubkey, Vec<Pubkey>>,
    statuses: &HashMap<Pubkey, CrankStatus>,
) -> Vec<UncrankableOracle> {
    oracles
        .iter()
        .filter_map(|(oracle, banks)| {
            let reason = match statuses.get(oracle) {
                Some(status) if status.crankable => return None,
                Some(status) => status.reason.clone(),
                None => Some("crankability unknown".to_string()),
            };
            Some(UncrankableOracle {
                oracle: *oracle,
                banks: banks.clone(),
                reason,
            })
        })
        .collect()
}

fn ready(mut oracles: Vec<Pubkey>, projected_health: f64, strategy: CrankStrategy) -> CrankPlan {
    oracles.sort();
    oracles.dedup();
    CrankPlan::Ready(CrankSolution {
        required_oracles: oracles,
        projected_health,
        strategy,
    })
}

/// Choose oracles to crank for already-projected balances.
///
/// `statuses` maps oracle address to crankability; an oracle absent from it
/// is treated as uncrankable.
pub fn solve_oracle_crank(
    projected: &ProjectedBalances,
    market: &MarketContext<'_>,
    statuses: &HashMap<Pubkey, CrankStatus>,
    opts: &CrankSolverOptions,
) -> CrankPlan {
    let in_play = refreshable_oracles_in_play(projected, market);
    if !in_play.has_liabilities {
        let health = compute_health_components(
            &projected.balances,
            market,
            MarginRequirement::Initial,
            &opts.health,
        );
        return ready(Vec::new(), health.health(), CrankStrategy::NothingToCrank);
    }

    let blocked_liabilities = uncrankable(&in_play.liability, statuses);
    let blocked_assets = uncrankable(&in_play.asset, statuses);
    if !blocked_liabilities.is_empty() {
        info!(
            liabilities = blocked_liabilities.len(),
            assets = blocked_assets.len(),
            "Liability oracle cannot be cranked, plan blocked"
        );
        return CrankPlan::Blocked(CrankBlocked {
            uncrankable_liability_oracles: blocked_liabilities,
            uncrankable_asset_oracles: blocked_assets,
        });
    }

    let liability_oracles: Vec<Pubkey> = in_play.liability.keys().copied().collect();

    let base = health_with_fresh(projected, market, &in_play, &[], &opts.health);
    if base.assets > base.liabilities {
        debug!(
            oracles = liability_oracles.len(),
            health = base.health(),
            "Fresh collateral covers liabilities"
        );
        return ready(liability_oracles, base.health(), CrankStrategy::LiabilitiesOnly);
    }

    let candidates: Vec<Pubkey> = in_play
        .asset
        .keys()
        .filter(|oracle| statuses.get(*oracle).map(|s| s.crankable).unwrap_or(false))
        .copied()
        .collect();

    let best_possible = health_with_fresh(projected, market, &in_play, &candidates, &opts.health);
    if best_possible.health() < 0.0 {
        if !blocked_assets.is_empty() {
            info!(
                assets = blocked_assets.len(),
                health = best_possible.health(),
                "Uncrankable collateral oracles prevent a healthy plan"
            );
            return CrankPlan::Blocked(CrankBlocked {
                uncrankable_liability_oracles: Vec::new(),
                uncrankable_asset_oracles: blocked_assets,
            });
        }
        warn!(
            health = best_possible.health(),
            "No crank set reaches non-negative health, cranking everything"
        );
        let all = liability_oracles.iter().chain(&candidates).copied().collect();
        return ready(all, best_possible.health(), CrankStrategy::FullCrankFallback);
    }

    let full = CrankCombination {
        oracles: liability_oracles.iter().chain(&candidates).copied().collect(),
        health: best_possible.health(),
    };
    let best = search_minimal(projected, market, &in_play, &liability_oracles, &candidates, opts)
        .filter(|found| found.better_than(&full))
        .unwrap_or(full);

    debug!(
        oracles = best.oracles.len(),
        health = best.health,
        "Minimal crank set selected"
    );
    ready(best.oracles.into_vec(), best.health, CrankStrategy::Minimal)
}

/// Smallest healthy subset of `candidates`, by increasing subset size.
///
/// Stops at the first size with any healthy subset, or at the evaluation cap.
fn search_minimal(
    projected: &ProjectedBalances,
    market: &MarketContext<'_>,
    in_play: &OraclesInPlay,
    liability_oracles: &[Pubkey],
    candidates: &[Pubkey],
    opts: &CrankSolverOptions,
) -> Option<CrankCombination> {
    let mut evaluated = 0usize;
    let mut fresh: SmallVec<[Pubkey; 8]> = SmallVec::new();

    for size in 0..=candidates.len() {
        let mut best: Option<CrankCombination> = None;

        for subset in Combinations::new(candidates.len(), size) {
            if evaluated >= opts.max_combinations {
                warn!(evaluated, "Crank search cap reached");
                return best;
            }
            evaluated += 1;

            fresh.clear();
            fresh.extend(subset.iter().map(|&i| candidates[i]));
            let health = health_with_fresh(projected, market, in_play, &fresh, &opts.health).health();
            if health < 0.0 {
                continue;
            }

            let combination = CrankCombination {
                oracles: liability_oracles.iter().chain(&fresh).copied().collect(),
                health,
            };
            if best.as_ref().map_or(true, |b| combination.better_than(b)) {
                best = Some(combination);
            }
        }

        if best.is_some() {
            return best;
        }
    }
    None
}

/// Project instructions, look up crankability, and solve.
///
/// `feed_hashes` maps oracle address to feed hash. Oracles without a hash,
/// a failed lookup, and a lookup exceeding the timeout all count as
/// uncrankable.
#[instrument(skip_all, fields(account = %account.address, instructions = instructions.len()))]
pub async fn plan_oracle_crank<C: CrankabilityCheck + ?Sized>(
    account: &Account,
    instructions: &[PendingInstruction],
    market: &MarketContext<'_>,
    feed_hashes: &HashMap<Pubkey, String>,
    checker: &C,
    opts: &CrankSolverOptions,
) -> PlannerResult<CrankPlan> {
    let projected = project_balances(&account.balances, instructions, market.banks)?;
    let in_play = refreshable_oracles_in_play(&projected, market);

    let statuses = if in_play.has_liabilities {
        check_oracles(in_play.all().copied(), feed_hashes, checker, opts.check_timeout).await
    } else {
        HashMap::new()
    };

    Ok(solve_oracle_crank(&projected, market, &statuses, opts))
}

async fn check_oracles<C: CrankabilityCheck + ?Sized>(
    oracles: impl Iterator<Item = Pubkey>,
    feed_hashes: &HashMap<Pubkey, String>,
    checker: &C,
    timeout: Duration,
) -> HashMap<Pubkey, CrankStatus> {
    let mut statuses = HashMap::new();
    let mut by_hash: Vec<(Pubkey, String)> = Vec::new();

    for oracle in oracles {
        match feed_hashes.get(&oracle) {
            Some(hash) => by_hash.push((oracle, hash.clone())),
            None => {
                statuses.insert(oracle, CrankStatus::uncrankable("feed hash unknown"));
            }
        }
    }
    if by_hash.is_empty() {
        return statuses;
    }

    let hashes: Vec<String> = by_hash.iter().map(|(_, h)| h.clone()).collect();
    let results = match tokio::time::timeout(timeout, checker.check_feeds(&hashes)).await {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            warn!(error = %e, feeds = hashes.len(), "Crankability check failed, treating feeds as uncrankable");
            HashMap::new()
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Crankability check timed out");
            HashMap::new()
        }
    };

    for (oracle, hash) in by_hash {
        let status = results
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| CrankStatus::uncrankable("crankability check unavailable"));
        statuses.insert(oracle, status);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankMap;
    use crate::fixtures::*;
    use crate::pricing::PriceMap;
    use lendplan_chain::{OraclePrice, OracleSetup};

    const BONK_BANK: Pubkey = Pubkey::new_from_array([4u8; 32]);
    const BONK_ORACLE: Pubkey = Pubkey::new_from_array([14u8; 32]);

    /// SOL (Pyth), USDC/JUP/BONK (Switchboard)
    fn market() -> (BankMap, PriceMap) {
        let mut bonk = jup_bank();
        bonk.address = BONK_BANK;
        bonk.config.oracle_keys = vec![BONK_ORACLE];

        let mut banks = banks();
        banks.insert(BONK_BANK, bonk);
        let mut prices = prices(150.0);
        prices.insert(BONK_BANK, OraclePrice::fixed(1.0));
        (banks, prices)
    }

    fn all_crankable() -> HashMap<Pubkey, CrankStatus> {
        [USDC_ORACLE, JUP_ORACLE, BONK_ORACLE]
            .into_iter()
            .map(|o| (o, CrankStatus::ok()))
            .collect()
    }

    fn project(balances: Vec<crate::account::Balance>, banks: &BankMap) -> ProjectedBalances {
        project_balances(&account(balances).balances, &[], banks).unwrap()
    }

    #[test]
    fn test_combinations() {
        let all: Vec<Vec<usize>> = Combinations::new(4, 2).map(|c| c.to_vec()).collect();
        assert_eq!(
            all,
            vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
        assert_eq!(Combinations::new(3, 0).count(), 1);
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(16, 8).count(), 12_870);
    }

    #[test]
    fn test_nothing_to_crank_without_debt() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(vec![lending(&banks[&JUP_BANK], 100.0)], &banks);

        let plan = solve_oracle_crank(&projected, &market, &HashMap::new(), &CrankSolverOptions::default());
        let CrankPlan::Ready(solution) = plan else {
            panic!("expected ready plan");
        };
        assert_eq!(solution.strategy, CrankStrategy::NothingToCrank);
        assert!(solution.required_oracles.is_empty());
    }

    #[test]
    fn test_uncrankable_liability_blocks() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![
                lending(&banks[&SOL_BANK], 10.0),
                lending(&banks[&JUP_BANK], 10.0),
                borrowing(&banks[&USDC_BANK], 100.0),
            ],
            &banks,
        );
        let mut statuses = all_crankable();
        statuses.insert(USDC_ORACLE, CrankStatus::uncrankable("no funds"));
        statuses.insert(JUP_ORACLE, CrankStatus::uncrankable("stale job"));

        let plan = solve_oracle_crank(&projected, &market, &statuses, &CrankSolverOptions::default());
        assert!(plan.is_blocked());
        assert!(plan.required_oracles().is_empty());
        let CrankPlan::Blocked(blocked) = plan else {
            unreachable!()
        };
        assert_eq!(blocked.uncrankable_liability_oracles[0].oracle, USDC_ORACLE);
        assert_eq!(blocked.uncrankable_liability_oracles[0].banks, vec![USDC_BANK]);
        assert_eq!(
            blocked.uncrankable_liability_oracles[0].reason.as_deref(),
            Some("no funds")
        );
        assert_eq!(blocked.uncrankable_asset_oracles[0].oracle, JUP_ORACLE);
    }

    #[test]
    fn test_missing_status_blocks_liability() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![lending(&banks[&SOL_BANK], 10.0), borrowing(&banks[&USDC_BANK], 100.0)],
            &banks,
        );

        let plan = solve_oracle_crank(&projected, &market, &HashMap::new(), &CrankSolverOptions::default());
        assert!(plan.is_blocked());
    }

    #[test]
    fn test_push_collateral_covers_liabilities() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![
                lending(&banks[&SOL_BANK], 10.0),
                lending(&banks[&JUP_BANK], 1000.0),
                borrowing(&banks[&USDC_BANK], 100.0),
            ],
            &banks,
        );

        let plan = solve_oracle_crank(&projected, &market, &all_crankable(), &CrankSolverOptions::default());
        let CrankPlan::Ready(solution) = plan else {
            panic!("expected ready plan");
        };
        assert_eq!(solution.strategy, CrankStrategy::LiabilitiesOnly);
        assert_eq!(solution.required_oracles, vec![USDC_ORACLE]);
    }

    #[test]
    fn test_minimal_subset_prefers_fewest_then_healthiest() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        // Debt 1000 × 1.25 = 1250. SOL 1 → 127.5. JUP 2000 × 0.6 = 1200, BONK 1000 × 0.6 = 600.
        // Either JUP alone (1327.5) works; BONK alone does not.
        let projected = project(
            vec![
                lending(&banks[&SOL_BANK], 1.0),
                lending(&banks[&JUP_BANK], 2000.0),
                lending(&banks[&BONK_BANK], 1000.0),
                borrowing(&banks[&USDC_BANK], 1000.0),
            ],
            &banks,
        );

        let plan = solve_oracle_crank(&projected, &market, &all_crankable(), &CrankSolverOptions::default());
        let CrankPlan::Ready(solution) = plan else {
            panic!("expected ready plan");
        };
        assert_eq!(solution.strategy, CrankStrategy::Minimal);
        let mut expected = vec![USDC_ORACLE, JUP_ORACLE];
        expected.sort();
        assert_eq!(solution.required_oracles, expected);
        assert!((solution.projected_health - 77.5).abs() < 1e-9);
    }

    #[test]
    fn test_minimal_never_exceeds_full_crank() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let opts = CrankSolverOptions::default();

        for debt in [200.0, 700.0, 1200.0, 1500.0] {
            let projected = project(
                vec![
                    lending(&banks[&SOL_BANK], 1.0),
                    lending(&banks[&JUP_BANK], 2000.0),
                    lending(&banks[&BONK_BANK], 1000.0),
                    borrowing(&banks[&USDC_BANK], debt),
                ],
                &banks,
            );
            let full = refreshable_oracles_in_play(&projected, &market).all().count();

            let CrankPlan::Ready(solution) = solve_oracle_crank(&projected, &market, &all_crankable(), &opts)
            else {
                panic!("expected ready plan for debt {}", debt);
            };
            assert!(solution.required_oracles.len() <= full);
            assert!(solution.projected_health >= 0.0, "debt {}", debt);
        }
    }

    #[test]
    fn test_uncrankable_collateral_blocks_only_when_needed() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let mut statuses = all_crankable();
        statuses.insert(JUP_ORACLE, CrankStatus::uncrankable("stale"));

        // BONK alone suffices: JUP's status does not matter
        let projected = project(
            vec![
                lending(&banks[&JUP_BANK], 2000.0),
                lending(&banks[&BONK_BANK], 1000.0),
                borrowing(&banks[&USDC_BANK], 400.0),
            ],
            &banks,
        );
        let plan = solve_oracle_crank(&projected, &market, &statuses, &CrankSolverOptions::default());
        assert!(!plan.is_blocked());
        assert!(!plan.required_oracles().contains(&JUP_ORACLE));

        // JUP is needed and cannot be cranked
        let projected = project(
            vec![
                lending(&banks[&JUP_BANK], 2000.0),
                lending(&banks[&BONK_BANK], 1000.0),
                borrowing(&banks[&USDC_BANK], 1000.0),
            ],
            &banks,
        );
        let plan = solve_oracle_crank(&projected, &market, &statuses, &CrankSolverOptions::default());
        let CrankPlan::Blocked(blocked) = plan else {
            panic!("expected blocked plan");
        };
        assert!(blocked.uncrankable_liability_oracles.is_empty());
        assert_eq!(blocked.uncrankable_asset_oracles[0].oracle, JUP_ORACLE);
    }

    #[test]
    fn test_full_crank_fallback_when_hopeless() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![lending(&banks[&JUP_BANK], 10.0), borrowing(&banks[&USDC_BANK], 1000.0)],
            &banks,
        );

        let plan = solve_oracle_crank(&projected, &market, &all_crankable(), &CrankSolverOptions::default());
        let CrankPlan::Ready(solution) = plan else {
            panic!("expected ready plan");
        };
        assert_eq!(solution.strategy, CrankStrategy::FullCrankFallback);
        assert_eq!(solution.required_oracles.len(), 2);
        assert!(solution.projected_health < 0.0);
    }

    #[test]
    fn test_search_cap_falls_back_to_full_crank() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![
                lending(&banks[&SOL_BANK], 1.0),
                lending(&banks[&JUP_BANK], 2000.0),
                lending(&banks[&BONK_BANK], 1000.0),
                borrowing(&banks[&USDC_BANK], 1000.0),
            ],
            &banks,
        );
        let opts = CrankSolverOptions {
            max_combinations: 1,
            ..Default::default()
        };

        let CrankPlan::Ready(solution) = solve_oracle_crank(&projected, &market, &all_crankable(), &opts)
        else {
            panic!("expected ready plan");
        };
        assert_eq!(solution.required_oracles.len(), 3);
        assert!(solution.projected_health >= 0.0);
    }

    #[test]
    fn test_shared_oracle_counts_as_liability() {
        let (mut banks, mut prices) = market();
        // A second USDC bank priced by the same feed
        let mut usdc2 = usdc_bank();
        usdc2.address = Pubkey::new_from_array([5u8; 32]);
        prices.insert(usdc2.address, OraclePrice::fixed(1.0));
        banks.insert(usdc2.address, usdc2.clone());
        let market = MarketContext::new(&banks, &prices);

        let projected = project(
            vec![lending(&usdc2, 1000.0), borrowing(&banks[&USDC_BANK], 100.0)],
            &banks,
        );
        let in_play = refreshable_oracles_in_play(&projected, &market);
        assert_eq!(in_play.liability.len(), 1);
        assert!(in_play.asset.is_empty());
    }

    struct MockChecker {
        results: HashMap<String, CrankStatus>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl CrankabilityCheck for MockChecker {
        async fn check_feeds(&self, _feed_hashes: &[String]) -> anyhow::Result<HashMap<String, CrankStatus>> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(self.results.clone())
        }
    }

    fn feed_hashes() -> HashMap<Pubkey, String> {
        HashMap::from([
            (USDC_ORACLE, "aa".repeat(32)),
            (JUP_ORACLE, "bb".repeat(32)),
            (BONK_ORACLE, "cc".repeat(32)),
        ])
    }

    fn checker(fail: bool, delay: Duration) -> MockChecker {
        MockChecker {
            results: feed_hashes()
                .into_values()
                .map(|h| (h, CrankStatus::ok()))
                .collect(),
            fail,
            delay,
        }
    }

    #[tokio::test]
    async fn test_plan_with_pending_borrow() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let acc = account(vec![lending(&banks[&JUP_BANK], 2000.0)]);
        let instructions = [PendingInstruction::borrow(USDC_BANK, 500_000_000.0)];

        let plan = plan_oracle_crank(
            &acc,
            &instructions,
            &market,
            &feed_hashes(),
            &checker(false, Duration::ZERO),
            &CrankSolverOptions::default(),
        )
        .await
        .unwrap();

        let mut expected = vec![USDC_ORACLE, JUP_ORACLE];
        expected.sort();
        assert_eq!(plan.required_oracles(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_check_failure_is_fail_safe() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let acc = account(vec![lending(&banks[&SOL_BANK], 10.0)]);
        let instructions = [PendingInstruction::borrow(USDC_BANK, 100_000_000.0)];

        let plan = plan_oracle_crank(
            &acc,
            &instructions,
            &market,
            &feed_hashes(),
            &checker(true, Duration::ZERO),
            &CrankSolverOptions::default(),
        )
        .await
        .unwrap();
        assert!(plan.is_blocked());
    }

    #[tokio::test]
    async fn test_check_timeout_is_fail_safe() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let acc = account(vec![lending(&banks[&SOL_BANK], 10.0)]);
        let instructions = [PendingInstruction::borrow(USDC_BANK, 100_000_000.0)];
        let opts = CrankSolverOptions {
            check_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let plan = plan_oracle_crank(
            &acc,
            &instructions,
            &market,
            &feed_hashes(),
            &checker(false, Duration::from_secs(5)),
            &opts,
        )
        .await
        .unwrap();
        assert!(plan.is_blocked());
    }

    #[tokio::test]
    async fn test_projection_errors_propagate() {
        let (banks, prices) = market();
        let market = MarketContext::new(&banks, &prices);
        let acc = account(vec![]);

        let result = plan_oracle_crank(
            &acc,
            &[PendingInstruction::repay_all(USDC_BANK)],
            &market,
            &feed_hashes(),
            &checker(false, Duration::ZERO),
            &CrankSolverOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_fixed_setup_is_never_refreshable() {
        let (mut banks, prices) = market();
        banks.get_mut(&USDC_BANK).unwrap().config.oracle_setup = OracleSetup::Fixed;
        let market = MarketContext::new(&banks, &prices);
        let projected = project(
            vec![lending(&banks[&SOL_BANK], 10.0), borrowing(&banks[&USDC_BANK], 100.0)],
            &banks,
        );

        let in_play = refreshable_oracles_in_play(&projected, &market);
        assert!(in_play.has_liabilities);
        assert_eq!(in_play.all().count(), 0);
    }
}
