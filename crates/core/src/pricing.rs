//! Bank pricing model: shares, quantities, weights and USD values.
//!
//! All quantities are in native token units unless a function says "ui".
//! Margin requirement handling lives in two places only:
//! [`MarginRequirement::valuation`] picks the price sample and bias, and
//! [`Bank::risk_weights`] picks the weights.

use lendplan_chain::{OraclePrice, PriceBias};
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use std::collections::HashMap;

use crate::bank::Bank;

/// Price records keyed by bank address.
pub type PriceMap = HashMap<Pubkey, OraclePrice>;

/// Per-bank emode overrides keyed by bank address.
pub type EmodeOverrides = HashMap<Pubkey, EmodeWeights>;

/// Margin requirement type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarginRequirement {
    /// Governs opening new positions
    Initial,
    /// Governs the liquidation threshold
    Maintenance,
    /// Unweighted net value
    Equity,
}

/// How to read prices for one margin requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Valuation {
    pub asset_bias: PriceBias,
    pub liability_bias: PriceBias,
    /// Use the time-weighted sample
    pub weighted: bool,
}

impl MarginRequirement {
    /// All requirement types, in health-cache order.
    pub const ALL: [MarginRequirement; 3] = [Self::Initial, Self::Maintenance, Self::Equity];

    /// Price selection for this requirement.
    ///
    /// `biased` applies Lowest to assets and Highest to liabilities; otherwise
    /// both read the neutral price. Only Initial reads the time-weighted sample.
    pub fn valuation(&self, biased: bool) -> Valuation {
        let (asset_bias, liability_bias) = if biased {
            (PriceBias::Lowest, PriceBias::Highest)
        } else {
            (PriceBias::None, PriceBias::None)
        };
        Valuation {
            asset_bias,
            liability_bias,
            weighted: matches!(self, Self::Initial),
        }
    }
}

/// Emode weights for one bank. These can only raise the bank's own weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EmodeWeights {
    pub asset_weight_init: f64,
    pub asset_weight_maint: f64,
}

/// Resolved weights for one bank and requirement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskWeights {
    pub asset: f64,
    pub liability: f64,
}

impl Bank {
    /// Native quantity for asset shares.
    pub fn get_asset_quantity(&self, shares: f64) -> f64 {
        shares * self.asset_share_value
    }

    /// Native quantity for liability shares.
    pub fn get_liability_quantity(&self, shares: f64) -> f64 {
        shares * self.liability_share_value
    }

    /// Asset shares for a native quantity; zero when the share value is zero.
    pub fn get_asset_shares(&self, quantity: f64) -> f64 {
        if self.asset_share_value == 0.0 {
            return 0.0;
        }
        quantity / self.asset_share_value
    }

    /// Liability shares for a native quantity; zero when the share value is zero.
    pub fn get_liability_shares(&self, quantity: f64) -> f64 {
        if self.liability_share_value == 0.0 {
            return 0.0;
        }
        quantity / self.liability_share_value
    }

    /// Total deposits in native units.
    pub fn total_asset_quantity(&self) -> f64 {
        self.get_asset_quantity(self.total_asset_shares)
    }

    /// Native quantity in UI units.
    pub fn to_ui(&self, quantity: f64) -> f64 {
        quantity / self.decimal_scale()
    }

    /// UI quantity in native units.
    pub fn from_ui(&self, ui_quantity: f64) -> f64 {
        ui_quantity * self.decimal_scale()
    }

    /// USD value of a native quantity.
    ///
    /// `quantity × multiplier × price × weight ÷ 10^decimals`
    pub fn compute_usd_value(
        &self,
        price: &OraclePrice,
        quantity: f64,
        bias: PriceBias,
        weighted: bool,
        weight: f64,
    ) -> f64 {
        self.to_ui(quantity) * self.integration_multiplier() * price.get(bias, weighted) * weight
    }

    /// Price of one wrapped token in USD, read with the given bias.
    pub fn effective_price(&self, price: &OraclePrice, bias: PriceBias, weighted: bool) -> f64 {
        price.get(bias, weighted) * self.integration_multiplier()
    }

    /// Unweighted value of all deposits at the lowest spot price.
    pub fn compute_total_collateral_value(&self, price: &OraclePrice) -> f64 {
        self.compute_usd_value(price, self.total_asset_quantity(), PriceBias::Lowest, false, 1.0)
    }

    /// Resolve asset and liability weights for a requirement.
    ///
    /// - Equity: 1 / 1
    /// - Maintenance: configured weights, asset side raised to the emode weight if higher
    /// - Initial: configured weights, asset side raised to the emode weight if higher, then
    ///   scaled by `limit / total_collateral_value` once deposits exceed the soft limit.
    ///   A configured Initial asset weight of zero always stays zero.
    pub fn risk_weights(
        &self,
        requirement: MarginRequirement,
        price: &OraclePrice,
        emode: Option<&EmodeWeights>,
        ignore_soft_limits: bool,
    ) -> RiskWeights {
        let cfg = &self.config;
        match requirement {
            MarginRequirement::Equity => RiskWeights {
                asset: 1.0,
                liability: 1.0,
            },
            MarginRequirement::Maintenance => {
                let asset = match emode {
                    Some(e) => cfg.asset_weight_maint.max(e.asset_weight_maint),
                    None => cfg.asset_weight_maint,
                };
                RiskWeights {
                    asset,
                    liability: cfg.liability_weight_maint,
                }
            }
            MarginRequirement::Initial => {
                if cfg.asset_weight_init == 0.0 {
                    return RiskWeights {
                        asset: 0.0,
                        liability: cfg.liability_weight_init,
                    };
                }

                let base = match emode {
                    Some(e) => cfg.asset_weight_init.max(e.asset_weight_init),
                    None => cfg.asset_weight_init,
                };

                let limit = cfg.total_asset_value_init_limit;
                let soft_limit_disabled = ignore_soft_limits || limit == 0.0;
                let asset = if soft_limit_disabled {
                    base
                } else {
                    let total = self.compute_total_collateral_value(price);
                    if total > limit {
                        limit / total * base
                    } else {
                        base
                    }
                };

                RiskWeights {
                    asset,
                    liability: cfg.liability_weight_init,
                }
            }
        }
    }

    /// Weighted USD value of asset shares.
    pub fn compute_asset_usd_value(
        &self,
        price: &OraclePrice,
        shares: f64,
        requirement: MarginRequirement,
        biased: bool,
        weights: RiskWeights,
    ) -> f64 {
        let valuation = requirement.valuation(biased);
        self.compute_usd_value(
            price,
            self.get_asset_quantity(shares),
            valuation.asset_bias,
            valuation.weighted,
            weights.asset,
        )
    }

    /// Weighted USD value of liability shares.
    pub fn compute_liability_usd_value(
        &self,
        price: &OraclePrice,
        shares: f64,
        requirement: MarginRequirement,
        biased: bool,
        weights: RiskWeights,
    ) -> f64 {
        let valuation = requirement.valuation(biased);
        self.compute_usd_value(
            price,
            self.get_liability_quantity(shares),
            valuation.liability_bias,
            valuation.weighted,
            weights.liability,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sol_bank, sol_price};
    use lendplan_chain::PriceWithConfidence;

    #[test]
    fn test_share_quantity_round_trip() {
        let mut bank = sol_bank();
        bank.asset_share_value = 1.037;
        bank.liability_share_value = 1.1;

        for q in [0.0, 1.0, 12_345.678, 9.99e15] {
            let shares = bank.get_asset_shares(q);
            assert!((bank.get_asset_quantity(shares) - q).abs() <= q * 1e-12);

            let shares = bank.get_liability_shares(q);
            assert!((bank.get_liability_quantity(shares) - q).abs() <= q * 1e-12);
        }
    }

    #[test]
    fn test_zero_share_value_gives_zero_shares() {
        let mut bank = sol_bank();
        bank.asset_share_value = 0.0;
        bank.liability_share_value = 0.0;
        assert_eq!(bank.get_asset_shares(1_000.0), 0.0);
        assert_eq!(bank.get_liability_shares(1_000.0), 0.0);
    }

    #[test]
    fn test_valuation_resolution() {
        let init = MarginRequirement::Initial.valuation(true);
        assert_eq!(init.asset_bias, PriceBias::Lowest);
        assert_eq!(init.liability_bias, PriceBias::Highest);
        assert!(init.weighted);

        let maint = MarginRequirement::Maintenance.valuation(true);
        assert!(!maint.weighted);

        let equity = MarginRequirement::Equity.valuation(false);
        assert_eq!(equity.asset_bias, PriceBias::None);
        assert!(!equity.weighted);
    }

    #[test]
    fn test_usd_value() {
        let bank = sol_bank();
        let price = sol_price(150.0);
        // 10 SOL at $150, weight 0.5
        let value = bank.compute_usd_value(&price, 10e9, PriceBias::None, false, 0.5);
        assert!((value - 750.0).abs() < 1e-9);
    }

    #[test]
    fn test_usd_value_with_integration_multiplier() {
        let mut bank = sol_bank();
        bank.integration_multiplier = Some(1.1);
        let value = bank.compute_usd_value(&sol_price(100.0), 1e9, PriceBias::None, false, 1.0);
        assert!((value - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_equity_weights_are_one() {
        let bank = sol_bank();
        let w = bank.risk_weights(MarginRequirement::Equity, &sol_price(150.0), None, false);
        assert_eq!(w, RiskWeights { asset: 1.0, liability: 1.0 });
    }

    #[test]
    fn test_soft_limit_scales_initial_weight() {
        let mut bank = sol_bank();
        // 1,000 SOL deposited at $150 = $150k against a $75k cap
        bank.total_asset_shares = 1_000e9;
        bank.config.total_asset_value_init_limit = 75_000.0;
        let price = sol_price(150.0);

        let w = bank.risk_weights(MarginRequirement::Initial, &price, None, false);
        assert!((w.asset - bank.config.asset_weight_init * 0.5).abs() < 1e-12);

        // Maintenance is unaffected
        let w = bank.risk_weights(MarginRequirement::Maintenance, &price, None, false);
        assert_eq!(w.asset, bank.config.asset_weight_maint);

        // Soft limits can be ignored, and a zero limit disables them
        let w = bank.risk_weights(MarginRequirement::Initial, &price, None, true);
        assert_eq!(w.asset, bank.config.asset_weight_init);
        bank.config.total_asset_value_init_limit = 0.0;
        let w = bank.risk_weights(MarginRequirement::Initial, &price, None, false);
        assert_eq!(w.asset, bank.config.asset_weight_init);
    }

    #[test]
    fn test_soft_limit_uses_lowest_price() {
        let mut bank = sol_bank();
        bank.total_asset_shares = 100e9;
        bank.config.total_asset_value_init_limit = 14_500.0;
        // $150 spot with a $10 band: lowest $140 puts total at $14k, under the cap
        let price = OraclePrice::from_single(PriceWithConfidence::new(150.0, 10.0, 0.1));

        let w = bank.risk_weights(MarginRequirement::Initial, &price, None, false);
        assert_eq!(w.asset, bank.config.asset_weight_init);
    }

    #[test]
    fn test_emode_only_raises() {
        let bank = sol_bank();
        let price = sol_price(150.0);

        let higher = EmodeWeights {
            asset_weight_init: 0.95,
            asset_weight_maint: 0.97,
        };
        let w = bank.risk_weights(MarginRequirement::Initial, &price, Some(&higher), false);
        assert_eq!(w.asset, 0.95);
        let w = bank.risk_weights(MarginRequirement::Maintenance, &price, Some(&higher), false);
        assert_eq!(w.asset, 0.97);

        let lower = EmodeWeights {
            asset_weight_init: 0.1,
            asset_weight_maint: 0.1,
        };
        let w = bank.risk_weights(MarginRequirement::Initial, &price, Some(&lower), false);
        assert_eq!(w.asset, bank.config.asset_weight_init);
        let w = bank.risk_weights(MarginRequirement::Maintenance, &price, Some(&lower), false);
        assert_eq!(w.asset, bank.config.asset_weight_maint);
    }

    #[test]
    fn test_zero_initial_weight_stays_zero() {
        let mut bank = sol_bank();
        bank.config.asset_weight_init = 0.0;
        let emode = EmodeWeights {
            asset_weight_init: 0.9,
            asset_weight_maint: 0.9,
        };

        let w = bank.risk_weights(MarginRequirement::Initial, &sol_price(150.0), Some(&emode), false);
        assert_eq!(w.asset, 0.0);
    }
}
