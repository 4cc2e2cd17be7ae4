//! Oracle account decoding and price records.
//!
//! This module turns raw oracle accounts into the canonical [`OraclePrice`]
//! record consumed by the risk engine.
//!
//! # Architecture
//!
//! - [`OracleSetup`]: how a bank is priced, and which provider family it uses
//! - [`pyth`]: Pyth push-oracle `PriceUpdateV2` accounts (spot + EMA)
//! - [`switchboard`]: Switchboard on-demand pull feeds (single sample, crankable)
//! - [`OracleConfig`]: confidence multiples and caps from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use lendplan_chain::oracle::{DecodedOracle, OracleConfig, OracleSetup};
//!
//! let decoded = DecodedOracle::decode(OracleSetup::PythPushOracle, &account_data)?;
//! if let Some(price) = decoded.to_oracle_price(&OracleConfig::default()) {
//!     debug!(spot = price.realtime.price, "Decoded price");
//! }
//! ```

mod bytes;
mod config;
pub mod pyth;
pub mod switchboard;
mod types;

pub use config::OracleConfig;
pub use pyth::{encode_price_update, PythPriceMessage, PythPriceUpdate, VerificationLevel};
pub use switchboard::{encode_pull_feed, is_broken_value, price_from_samples, PullFeed};
pub use types::{OracleFamily, OraclePrice, OracleSetup, PriceBias, PriceWithConfidence};

use anyhow::{bail, Result};

/// A decoded oracle account of either provider family.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedOracle {
    /// Pyth push oracle
    Push(PythPriceUpdate),
    /// Switchboard pull feed
    Pull(PullFeed),
}

impl DecodedOracle {
    /// Decode an oracle account according to the bank's setup.
    pub fn decode(setup: OracleSetup, data: &[u8]) -> Result<Self> {
        match setup.family() {
            OracleFamily::Push => Ok(Self::Push(PythPriceUpdate::decode(data)?)),
            OracleFamily::Pull => Ok(Self::Pull(PullFeed::decode(data)?)),
            OracleFamily::Constant => bail!("oracle setup {:?} has no oracle account", setup),
        }
    }

    /// Whether the decoded value is unusable (zero or a degenerate sentinel).
    pub fn is_broken(&self) -> bool {
        match self {
            Self::Push(update) => update.message.price <= 0,
            Self::Pull(feed) => feed.is_broken(),
        }
    }

    /// Feed hash of a pull feed, used for crankability checks.
    pub fn feed_hash(&self) -> Option<String> {
        match self {
            Self::Push(_) => None,
            Self::Pull(feed) => Some(feed.feed_hash_hex()),
        }
    }

    /// Convert to a price record, or `None` if the value is broken.
    pub fn to_oracle_price(&self, config: &OracleConfig) -> Option<OraclePrice> {
        if self.is_broken() {
            return None;
        }
        let price = match self {
            Self::Push(update) => update.to_oracle_price(
                config.conf_multiple(OracleFamily::Push),
                config.max_confidence_ratio,
            ),
            Self::Pull(feed) => feed.to_oracle_price(
                config.conf_multiple(OracleFamily::Pull),
                config.max_confidence_ratio,
            ),
        };
        Some(price)
    }
}
