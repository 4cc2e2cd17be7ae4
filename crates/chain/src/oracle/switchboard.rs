//! Switchboard on-demand pull feed decoding.
//!
//! Only the fields the planner needs are read: the feed hash (used to ask
//! whether the feed can be cranked), the last-update timestamp and the current
//! aggregated result. Values are 18-decimal fixed point.

use super::bytes::ByteReader;
use super::{OraclePrice, PriceWithConfidence};
use anyhow::Result;

/// Fixed-point scale of pull-feed values.
pub const SWITCHBOARD_PRECISION: f64 = 1e18;

/// Raw values a feed reports when it was never populated or has degenerated.
///
/// Non-positive values are checked separately; these are the smallest
/// representable value and the overflow placeholder written by unfunded feeds.
pub const BROKEN_FEED_SENTINELS: [i128; 2] = [1, 1_000_000_000_000_000_000_000_000_000_000_000_000];

// Byte offsets inside `PullFeedAccountData` (after the 8-byte discriminator
// and 32 oracle submissions of 64 bytes each).
const FEED_HASH_OFFSET: usize = 2120;
const LAST_UPDATE_TIMESTAMP_OFFSET: usize = 2216;
const RESULT_OFFSET: usize = 2264;

/// Minimum account length covering every field read here.
pub const MIN_FEED_ACCOUNT_LEN: usize = RESULT_OFFSET + 32;

/// Decoded subset of a pull feed account.
#[derive(Debug, Clone, PartialEq)]
pub struct PullFeed {
    /// Hash identifying the feed job definition
    pub feed_hash: [u8; 32],
    /// Unix timestamp of the last update
    pub last_update_timestamp: i64,
    /// Raw current result value (18 decimals)
    pub value: i128,
    /// Raw standard deviation of the current result (18 decimals)
    pub std_dev: i128,
}

impl PullFeed {
    /// Decode from raw account data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let feed_hash = ByteReader::at(data, FEED_HASH_OFFSET).take::<32>()?;
        let last_update_timestamp = ByteReader::at(data, LAST_UPDATE_TIMESTAMP_OFFSET).i64()?;

        let mut result = ByteReader::at(data, RESULT_OFFSET);
        let value = result.i128()?;
        let std_dev = result.i128()?;

        Ok(Self {
            feed_hash,
            last_update_timestamp,
            value,
            std_dev,
        })
    }

    /// Feed hash as lowercase hex, the key used by crank services.
    pub fn feed_hash_hex(&self) -> String {
        hex::encode(self.feed_hash)
    }

    /// Whether the current value is non-positive or a degenerate sentinel.
    pub fn is_broken(&self) -> bool {
        is_broken_value(self.value)
    }

    /// Current value in USD.
    pub fn price(&self) -> f64 {
        self.value as f64 / SWITCHBOARD_PRECISION
    }

    /// Convert to a price record. Spot and time-weighted share the same sample.
    pub fn to_oracle_price(&self, conf_multiple: f64, max_confidence_ratio: f64) -> OraclePrice {
        let std_dev = self.std_dev as f64 / SWITCHBOARD_PRECISION;
        let sample = PriceWithConfidence::new(self.price(), std_dev * conf_multiple, max_confidence_ratio);
        OraclePrice::from_single(sample).with_timestamp(self.last_update_timestamp)
    }
}

/// Whether a raw pull-feed value is non-positive or one of the known sentinels.
pub fn is_broken_value(value: i128) -> bool {
    value <= 0 || BROKEN_FEED_SENTINELS.contains(&value)
}

/// Build a price record from crossbar simulation samples.
///
/// Returns `None` for empty or degenerate sample sets.
pub fn price_from_samples(samples: &[f64], conf_multiple: f64, max_confidence_ratio: f64) -> Option<OraclePrice> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };
    if median <= 0.0 {
        return None;
    }

    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / sorted.len() as f64;

    let sample = PriceWithConfidence::new(median, variance.sqrt() * conf_multiple, max_confidence_ratio);
    Some(OraclePrice::from_single(sample))
}

/// Lay out a minimal pull feed account holding `value` and `std_dev`.
///
/// Used to build offline snapshots; the last-update timestamp is fixed.
pub fn encode_pull_feed(feed_hash: [u8; 32], value: i128, std_dev: i128) -> Vec<u8> {
    let mut data = vec![0u8; MIN_FEED_ACCOUNT_LEN + 64];
    data[FEED_HASH_OFFSET..FEED_HASH_OFFSET + 32].copy_from_slice(&feed_hash);
    data[LAST_UPDATE_TIMESTAMP_OFFSET..LAST_UPDATE_TIMESTAMP_OFFSET + 8]
        .copy_from_slice(&1_700_000_000i64.to_le_bytes());
    data[RESULT_OFFSET..RESULT_OFFSET + 16].copy_from_slice(&value.to_le_bytes());
    data[RESULT_OFFSET + 16..RESULT_OFFSET + 32].copy_from_slice(&std_dev.to_le_bytes());
    data
}
