//! Lending-planner API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Crossbar: off-chain simulation of Switchboard pull feeds
//! - Fallback pricing: USD price by token mint, for broken feeds
//! - Crank service: batched crankability checks for pull feeds

mod crank_check;
mod crossbar;
mod fallback_price;

pub use crank_check::{CrankCheckClient, CrankStatus};
pub use crossbar::{normalize_feed_hash, CrossbarClient, FeedSimulation};
pub use fallback_price::FallbackPriceClient;
