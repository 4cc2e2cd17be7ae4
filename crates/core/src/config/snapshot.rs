//! Offline market snapshots.
//!
//! A snapshot is a JSON document carrying everything the pure solvers need:
//! banks, one price record per bank, a borrower account and optionally a
//! queue of pending instructions.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use solana_pubkey::Pubkey;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::account::Account;
use crate::bank::{bank_map, Bank, BankMap};
use crate::health::MarketContext;
use crate::pricing::PriceMap;
use crate::projector::PendingInstruction;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Banks, given as a list in the document
    #[serde(deserialize_with = "deserialize_banks", serialize_with = "serialize_banks")]
    pub banks: BankMap,
    /// Price record per bank address
    #[serde_as(as = "HashMap<DisplayFromStr, _>")]
    pub prices: PriceMap,
    pub account: Account,
    #[serde(default)]
    pub instructions: Vec<PendingInstruction>,
    /// Pull feed hash per oracle address
    #[serde_as(as = "HashMap<DisplayFromStr, _>")]
    #[serde(default)]
    pub feed_hashes: HashMap<Pubkey, String>,
    /// Evaluation time; wall clock when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
}

fn deserialize_banks<'de, D>(deserializer: D) -> Result<BankMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(bank_map(Vec::<Bank>::deserialize(deserializer)?))
}

fn serialize_banks<S>(banks: &BankMap, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let mut list: Vec<&Bank> = banks.values().collect();
    list.sort_by_key(|b| b.address);
    serializer.collect_seq(list)
}

impl MarketSnapshot {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse market snapshot")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            banks = snapshot.banks.len(),
            prices = snapshot.prices.len(),
            instructions = snapshot.instructions.len(),
            "Loaded market snapshot"
        );
        Ok(snapshot)
    }

    pub fn market(&self) -> MarketContext<'_> {
        MarketContext::new(&self.banks, &self.prices)
    }

    /// Snapshot time, or the current wall clock.
    pub fn now(&self) -> i64 {
        self.timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp())
    }
}
