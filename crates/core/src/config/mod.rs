//! Planner configuration and offline snapshot loading.
//!
//! - Runtime configuration (profiles, oracle/risk/crank parameters, endpoints)
//! - JSON market snapshots for the offline planner binary

mod planner;
mod snapshot;

pub use planner::{
    config, init_config, CrankConfig, EndpointsConfig, PlannerConfig, RiskConfig,
};

pub use snapshot::MarketSnapshot;
