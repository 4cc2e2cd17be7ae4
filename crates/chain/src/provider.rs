//! Account fetching over Solana JSON-RPC, plus an in-memory fetcher for snapshots.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;
use solana_pubkey::Pubkey;
use tracing::{debug, instrument, warn};

/// Source of raw account data.
#[async_trait]
pub trait AccountFetcher: Send + Sync {
    /// Fetch accounts; the result is index-aligned with `keys`, `None` for missing accounts.
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>>;
}

/// In-memory account store, used for offline snapshots and tests.
#[derive(Debug, Default)]
pub struct StaticAccountFetcher {
    accounts: DashMap<Pubkey, Vec<u8>>,
}

impl StaticAccountFetcher {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn insert(&self, key: Pubkey, data: Vec<u8>) {
        self.accounts.insert(key, data);
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountFetcher for StaticAccountFetcher {
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        Ok(keys
            .iter()
            .map(|key| self.accounts.get(key).map(|data| data.clone()))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    value: Vec<Option<RpcAccount>>,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    /// `[data, encoding]`
    data: (String, String),
}

/// JSON-RPC account fetcher with batched, bounded-concurrency requests.
#[derive(Clone)]
pub struct RpcAccountFetcher {
    client: reqwest::Client,
    rpc_url: String,
    batch_size: usize,
    max_concurrent: usize,
}

impl std::fmt::Debug for RpcAccountFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcAccountFetcher")
            .field("rpc_url", &self.rpc_url)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl RpcAccountFetcher {
    /// Create a fetcher for an RPC endpoint.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            batch_size: 100,
            max_concurrent: 4,
        }
    }

    /// Set the maximum keys per `getMultipleAccounts` call (RPC limit is 100).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, 100);
        self
    }

    /// Set the maximum number of in-flight batches.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    async fn fetch_batch(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let encoded: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getMultipleAccounts",
            "params": [encoded, { "encoding": "base64", "commitment": "confirmed" }],
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("getMultipleAccounts request failed")?
            .json()
            .await
            .context("Invalid getMultipleAccounts response")?;

        if let Some(error) = response.error {
            anyhow::bail!("RPC error: {}", error);
        }
        let result = response.result.context("RPC response missing result")?;
        decode_accounts(keys.len(), result)
    }
}

/// Decode a `getMultipleAccounts` result; the reply must align with the request.
fn decode_accounts(requested: usize, result: RpcResult) -> Result<Vec<Option<Vec<u8>>>> {
    if result.value.len() != requested {
        anyhow::bail!(
            "getMultipleAccounts returned {} accounts for {} keys",
            result.value.len(),
            requested
        );
    }

    result
        .value
        .into_iter()
        .map(|account| match account {
            Some(account) => BASE64
                .decode(account.data.0.as_bytes())
                .map(Some)
                .context("Invalid base64 account data"),
            None => Ok(None),
        })
        .collect()
}

#[async_trait]
impl AccountFetcher for RpcAccountFetcher {
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        use futures::stream::{self, StreamExt};

        let chunks: Vec<Vec<Pubkey>> = keys.chunks(self.batch_size).map(<[_]>::to_vec).collect();
        let mut results: Vec<(usize, Result<Vec<Option<Vec<u8>>>>)> = stream::iter(chunks.into_iter().enumerate())
            .map(|(idx, chunk)| async move { (idx, self.fetch_batch(&chunk).await) })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut accounts = Vec::with_capacity(keys.len());
        for (idx, result) in results {
            match result {
                Ok(batch) => accounts.extend(batch),
                Err(e) => {
                    warn!(batch = idx, error = %e, "Account batch failed");
                    return Err(e);
                }
            }
        }

        debug!(
            requested = keys.len(),
            found = accounts.iter().filter(|a| a.is_some()).count(),
            "Fetched accounts"
        );
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_fetcher_alignment() {
        let fetcher = StaticAccountFetcher::new();
        let a = Pubkey::new_from_array([1u8; 32]);
        let b = Pubkey::new_from_array([2u8; 32]);
        fetcher.insert(b, vec![1, 2, 3]);

        let accounts = fetcher.get_multiple_accounts(&[a, b]).await.unwrap();
        assert_eq!(accounts, vec![None, Some(vec![1, 2, 3])]);
        assert_eq!(fetcher.len(), 1);
    }

    #[test]
    fn test_batch_size_clamped() {
        let fetcher = RpcAccountFetcher::new("http://localhost:8899").with_batch_size(500);
        assert_eq!(fetcher.batch_size, 100);
    }

    #[test]
    fn test_decode_accounts() {
        let result: RpcResult = serde_json::from_value(json!({
            "value": [
                { "data": [BASE64.encode([7u8, 8]), "base64"] },
                null
            ]
        }))
        .unwrap();
        let accounts = decode_accounts(2, result).unwrap();
        assert_eq!(accounts, vec![Some(vec![7, 8]), None]);
    }

    #[test]
    fn test_decode_accounts_rejects_short_reply() {
        let result: RpcResult = serde_json::from_value(json!({ "value": [null] })).unwrap();
        let err = decode_accounts(2, result).unwrap_err();
        assert!(err.to_string().contains("1 accounts for 2 keys"));
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_rpc_fetch() {
        let fetcher = RpcAccountFetcher::new("https://api.mainnet-beta.solana.com");
        let result = fetcher
            .get_multiple_accounts(&[Pubkey::new_from_array([0u8; 32])])
            .await;
        assert!(result.is_ok());
    }
}
