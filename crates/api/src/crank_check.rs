//! Batched crankability check client.
//!
//! Asks a crank service whether each pull feed can currently be refreshed
//! on-chain (funded, has responsive oracles, job simulates cleanly).

use crate::crossbar::normalize_feed_hash;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Crankability of a single feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrankStatus {
    /// Whether the feed can be cranked
    pub crankable: bool,
    /// Reason when it cannot
    #[serde(default)]
    pub reason: Option<String>,
}

impl CrankStatus {
    /// Crankable feed.
    pub fn ok() -> Self {
        Self {
            crankable: true,
            reason: None,
        }
    }

    /// Uncrankable feed with a reason.
    pub fn uncrankable(reason: impl Into<String>) -> Self {
        Self {
            crankable: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    feed_hashes: &'a [String],
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    results: Vec<CheckResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckResult {
    feed_hash: String,
    crankable: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Crank service client.
#[derive(Debug, Clone)]
pub struct CrankCheckClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrankCheckClient {
    /// Create a client for a crank service.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Check feeds in one request. Feeds absent from the reply are reported uncrankable.
    #[instrument(skip(self, feed_hashes), fields(count = feed_hashes.len()))]
    pub async fn check_feeds(&self, feed_hashes: &[String]) -> Result<HashMap<String, CrankStatus>> {
        if feed_hashes.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/v1/crankable", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CheckRequest { feed_hashes })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Crank check API error: {} - {}", status, body);
        }

        let body: CheckResponse = response.json().await?;
        let statuses = merge_results(feed_hashes, body);

        debug!(
            crankable = statuses.values().filter(|s| s.crankable).count(),
            total = statuses.len(),
            "Crank check complete"
        );
        Ok(statuses)
    }
}

fn merge_results(requested: &[String], body: CheckResponse) -> HashMap<String, CrankStatus> {
    let mut by_hash: HashMap<String, CrankStatus> = body
        .results
        .into_iter()
        .filter_map(|r| {
            let hash = normalize_feed_hash(&r.feed_hash)?;
            Some((
                hash,
                CrankStatus {
                    crankable: r.crankable,
                    reason: r.reason,
                },
            ))
        })
        .collect();

    requested
        .iter()
        .map(|hash| {
            let status = normalize_feed_hash(hash)
                .and_then(|h| by_hash.remove(&h))
                .unwrap_or_else(|| CrankStatus::uncrankable("missing from crank service response"));
            (hash.clone(), status)
        })
        .collect()
}
