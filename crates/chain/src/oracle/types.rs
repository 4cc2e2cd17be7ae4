//! Oracle price records and setup classification.

use serde::{Deserialize, Serialize};

/// Oracle setup configured on a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OracleSetup {
    /// No oracle: the bank is always priced at zero
    #[default]
    None,
    /// Bank-configured constant price
    Fixed,
    /// Pyth push oracle (`PriceUpdateV2` account)
    PythPushOracle,
    /// Switchboard on-demand pull feed
    SwitchboardPull,
    /// Staked SOL collateral priced from the SOL Pyth feed
    StakedWithPythPush,
    /// Kamino reserve collateral priced via Pyth
    KaminoPythPush,
    /// Kamino reserve collateral priced via Switchboard
    KaminoSwitchboardPull,
    /// Drift spot position priced via Pyth
    DriftPythPull,
    /// Drift spot position priced via Switchboard
    DriftSwitchboardPull,
}

/// Provider family an oracle setup is priced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OracleFamily {
    /// No external price
    Constant,
    /// Push/attested feeds (Pyth)
    Push,
    /// Pull/on-demand feeds (Switchboard)
    Pull,
}

impl OracleSetup {
    /// Provider family used to price this setup.
    pub fn family(&self) -> OracleFamily {
        match self {
            Self::None | Self::Fixed => OracleFamily::Constant,
            Self::PythPushOracle
            | Self::StakedWithPythPush
            | Self::KaminoPythPush
            | Self::DriftPythPull => OracleFamily::Push,
            Self::SwitchboardPull | Self::KaminoSwitchboardPull | Self::DriftSwitchboardPull => {
                OracleFamily::Pull
            }
        }
    }

    /// Whether the feed must be explicitly refreshed (cranked) before use.
    pub fn requires_crank(&self) -> bool {
        self.family() == OracleFamily::Pull
    }
}

/// Which side of the confidence band to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PriceBias {
    /// Conservative for assets
    Lowest,
    /// Conservative for liabilities
    Highest,
    /// Spot price
    #[default]
    None,
}

/// A single price sample with its capped confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceWithConfidence {
    /// Price in USD
    pub price: f64,
    /// Confidence after provider multiple and cap
    pub confidence: f64,
    /// `price - confidence`, floored at zero
    pub lowest_price: f64,
    /// `price + confidence`
    pub highest_price: f64,
}

impl PriceWithConfidence {
    /// Build a sample, capping the confidence at `max_confidence_ratio * price`.
    pub fn new(price: f64, confidence: f64, max_confidence_ratio: f64) -> Self {
        let cap = price.abs() * max_confidence_ratio;
        let confidence = confidence.abs().min(cap);
        Self {
            price,
            confidence,
            lowest_price: (price - confidence).max(0.0),
            highest_price: price + confidence,
        }
    }

    /// A sample with no confidence band.
    pub fn exact(price: f64) -> Self {
        Self {
            price,
            confidence: 0.0,
            lowest_price: price,
            highest_price: price,
        }
    }

    /// Read the price on the requested side of the band.
    pub fn biased(&self, bias: PriceBias) -> f64 {
        match bias {
            PriceBias::Lowest => self.lowest_price,
            PriceBias::Highest => self.highest_price,
            PriceBias::None => self.price,
        }
    }
}

/// Canonical price record for one bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct OraclePrice {
    /// Spot sample
    pub realtime: PriceWithConfidence,
    /// Time-weighted sample (equal to `realtime` for providers without one)
    pub time_weighted: PriceWithConfidence,
    /// Unix timestamp of the underlying sample, if known
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl OraclePrice {
    /// Explicit zero-price record.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Record where spot and time-weighted are the same sample.
    pub fn from_single(sample: PriceWithConfidence) -> Self {
        Self {
            realtime: sample,
            time_weighted: sample,
            timestamp: None,
        }
    }

    /// Exact price with no confidence, for fixed and static prices.
    pub fn fixed(price: f64) -> Self {
        Self::from_single(PriceWithConfidence::exact(price))
    }

    /// Attach the sample timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Select the time-weighted or spot sample, then the side of its band.
    pub fn get(&self, bias: PriceBias, weighted: bool) -> f64 {
        let sample = if weighted {
            &self.time_weighted
        } else {
            &self.realtime
        };
        sample.biased(bias)
    }

    /// Whether both samples are exactly zero.
    pub fn is_zero(&self) -> bool {
        self.realtime.price == 0.0 && self.time_weighted.price == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crank_classification() {
        assert!(OracleSetup::SwitchboardPull.requires_crank());
        assert!(OracleSetup::KaminoSwitchboardPull.requires_crank());
        assert!(!OracleSetup::PythPushOracle.requires_crank());
        assert!(!OracleSetup::Fixed.requires_crank());
        assert_eq!(OracleSetup::DriftPythPull.family(), OracleFamily::Push);
        assert_eq!(OracleSetup::None.family(), OracleFamily::Constant);
    }

    #[test]
    fn test_confidence_cap() {
        // 10% conf on $100 is capped to 5%
        let sample = PriceWithConfidence::new(100.0, 10.0, 0.05);
        assert!((sample.confidence - 5.0).abs() < 1e-9);
        assert!((sample.lowest_price - 95.0).abs() < 1e-9);
        assert!((sample.highest_price - 105.0).abs() < 1e-9);

        // Below the cap the confidence is kept
        let sample = PriceWithConfidence::new(100.0, 1.0, 0.05);
        assert!((sample.lowest_price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_biased_selection() {
        let price = OraclePrice {
            realtime: PriceWithConfidence::new(100.0, 2.0, 0.05),
            time_weighted: PriceWithConfidence::new(98.0, 1.0, 0.05),
            timestamp: None,
        };

        assert_eq!(price.get(PriceBias::None, false), 100.0);
        assert_eq!(price.get(PriceBias::Lowest, false), 98.0);
        assert_eq!(price.get(PriceBias::Highest, true), 99.0);
        assert!(OraclePrice::zero().is_zero());
    }
}
