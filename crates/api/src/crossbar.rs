//! Switchboard crossbar simulation client.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// Simulated samples for one feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSimulation {
    /// Feed hash (hex)
    pub feed_hash: String,
    /// Simulated job results
    #[serde(default)]
    pub results: Vec<f64>,
}

/// Crossbar client for simulating pull feeds off-chain.
#[derive(Debug, Clone)]
pub struct CrossbarClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrossbarClient {
    /// Create a client with custom base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Simulate feeds; returns samples keyed by normalized feed hash.
    #[instrument(skip(self, feed_hashes), fields(count = feed_hashes.len()))]
    pub async fn simulate_feeds(&self, feed_hashes: &[String]) -> Result<HashMap<String, Vec<f64>>> {
        let hashes: Vec<String> = feed_hashes
            .iter()
            .filter_map(|h| {
                let normalized = normalize_feed_hash(h);
                if normalized.is_none() {
                    warn!(feed_hash = %h, "Skipping malformed feed hash");
                }
                normalized
            })
            .collect();
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/simulate/{}", self.base_url, hashes.join(","));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Crossbar API error: {} - {}", status, body);
        }

        let simulations: Vec<FeedSimulation> = response.json().await?;
        debug!(feeds = simulations.len(), "Crossbar simulation complete");

        Ok(simulations
            .into_iter()
            .filter_map(|sim| Some((normalize_feed_hash(&sim.feed_hash)?, sim.results)))
            .collect())
    }
}

/// Lowercase a feed hash and strip any `0x` prefix; `None` unless it is 32 bytes of hex.
pub fn normalize_feed_hash(hash: &str) -> Option<String> {
    let trimmed = hash.trim().trim_start_matches("0x").to_lowercase();
    match hex::decode(&trimmed) {
        Ok(bytes) if bytes.len() == 32 => Some(trimmed),
        _ => None,
    }
}
