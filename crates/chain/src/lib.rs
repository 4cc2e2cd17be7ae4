//! Lending-planner chain interaction layer.
//!
//! This crate provides:
//! - Oracle setup classification (push, pull, constant)
//! - Pyth `PriceUpdateV2` and Switchboard pull-feed account decoding
//! - Confidence-capped price records with spot and time-weighted samples
//! - Account fetching over JSON-RPC, batched with bounded concurrency
//!
//! Nothing here evaluates risk; see `lendplan-core` for that.

pub mod oracle;
mod provider;

pub use oracle::{
    encode_price_update, encode_pull_feed, price_from_samples, DecodedOracle, OracleConfig,
    OracleFamily, OraclePrice, OracleSetup, PriceBias, PriceWithConfidence, PullFeed,
    PythPriceUpdate,
};
pub use provider::{AccountFetcher, RpcAccountFetcher, StaticAccountFetcher};
