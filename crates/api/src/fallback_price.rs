//! Fallback price-by-mint API client.
//!
//! Used when a pull feed is broken: the bank's mint is priced from an
//! aggregator API instead.

use anyhow::Result;
use dashmap::DashMap;
use serde::Deserialize;
use solana_pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Cached mint price with timestamp for TTL expiration.
#[derive(Clone, Copy)]
struct CachedPrice {
    price: f64,
    cached_at: Instant,
}

/// Price-by-mint client with caching.
#[derive(Clone)]
pub struct FallbackPriceClient {
    client: reqwest::Client,
    base_url: String,
    /// Price cache: mint -> cached price
    cache: Arc<DashMap<Pubkey, CachedPrice>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for FallbackPriceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPriceClient")
            .field("base_url", &self.base_url)
            .field("cache_size", &self.cache.len())
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    data: HashMap<String, Option<MintPrice>>,
}

#[derive(Debug, Deserialize)]
struct MintPrice {
    price: Option<f64>,
}

impl FallbackPriceClient {
    /// Create a client for a price service.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(30),
        }
    }

    /// Set cache TTL.
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Seed the cache with a known price.
    pub fn insert_cached(&self, mint: Pubkey, price: f64) {
        self.cache.insert(
            mint,
            CachedPrice {
                price,
                cached_at: Instant::now(),
            },
        );
    }

    /// Clear expired entries from cache.
    pub fn cleanup_cache(&self) {
        self.cache.retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);
    }

    /// Get USD prices for mints. Mints without a usable price are omitted.
    #[instrument(skip(self, mints), fields(count = mints.len()))]
    pub async fn get_prices(&self, mints: &[Pubkey]) -> Result<HashMap<Pubkey, f64>> {
        let mut prices = HashMap::with_capacity(mints.len());
        let mut missing = Vec::new();

        for mint in mints {
            match self.cache.get(mint) {
                Some(cached) if cached.cached_at.elapsed() < self.cache_ttl => {
                    prices.insert(*mint, cached.price);
                }
                _ => missing.push(*mint),
            }
        }

        if missing.is_empty() {
            debug!(count = prices.len(), "All fallback prices served from cache");
            return Ok(prices);
        }

        let ids = missing.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(",");
        let url = format!("{}/v1/prices", self.base_url);

        let response = self.client.get(&url).query(&[("mints", ids)]).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Fallback price API error: {} - {}", status, body);
        }

        let body: PricesResponse = response.json().await?;
        let fetched = parse_prices(body);
        for (mint, price) in &fetched {
            self.insert_cached(*mint, *price);
        }

        debug!(
            requested = missing.len(),
            fetched = fetched.len(),
            "Fetched fallback prices"
        );
        prices.extend(fetched);
        Ok(prices)
    }
}

fn parse_prices(body: PricesResponse) -> HashMap<Pubkey, f64> {
    body.data
        .into_iter()
        .filter_map(|(mint, entry)| {
            let mint: Pubkey = match mint.parse() {
                Ok(mint) => mint,
                Err(_) => {
                    warn!(mint = %mint, "Ignoring fallback price for invalid mint");
                    return None;
                }
            };
            let price = entry?.price?;
            (price.is_finite() && price > 0.0).then_some((mint, price))
        })
        .collect()
}
