//! Shared test fixtures: a SOL collateral bank and a USDC borrow bank.

use lendplan_chain::{OraclePrice, OracleSetup, PriceWithConfidence};
use solana_pubkey::Pubkey;

use crate::account::{Account, Balance};
use crate::bank::{bank_map, Bank, BankConfig, BankMap, EmissionsConfig, RiskTier};
use crate::pricing::PriceMap;

pub const SOL_BANK: Pubkey = Pubkey::new_from_array([1u8; 32]);
pub const USDC_BANK: Pubkey = Pubkey::new_from_array([2u8; 32]);
pub const JUP_BANK: Pubkey = Pubkey::new_from_array([3u8; 32]);
pub const SOL_ORACLE: Pubkey = Pubkey::new_from_array([11u8; 32]);
pub const USDC_ORACLE: Pubkey = Pubkey::new_from_array([12u8; 32]);
pub const JUP_ORACLE: Pubkey = Pubkey::new_from_array([13u8; 32]);
pub const SOL_MINT: Pubkey = Pubkey::new_from_array([21u8; 32]);
pub const USDC_MINT: Pubkey = Pubkey::new_from_array([22u8; 32]);
pub const JUP_MINT: Pubkey = Pubkey::new_from_array([23u8; 32]);

fn bank(
    address: Pubkey,
    mint: Pubkey,
    mint_decimals: u8,
    weights: [f64; 4],
    oracle_setup: OracleSetup,
    oracle: Pubkey,
) -> Bank {
    Bank {
        address,
        mint,
        mint_decimals,
        config: BankConfig {
            risk_tier: RiskTier::Collateral,
            asset_weight_init: weights[0],
            asset_weight_maint: weights[1],
            liability_weight_init: weights[2],
            liability_weight_maint: weights[3],
            total_asset_value_init_limit: 0.0,
            oracle_setup,
            oracle_keys: vec![oracle],
        },
        total_asset_shares: 0.0,
        total_liability_shares: 0.0,
        asset_share_value: 1.0,
        liability_share_value: 1.0,
        fixed_price: None,
        integration_multiplier: None,
        emissions: EmissionsConfig::default(),
    }
}

/// SOL: 9 decimals, 0.85 / 0.9 asset weights, Pyth push oracle.
pub fn sol_bank() -> Bank {
    bank(
        SOL_BANK,
        SOL_MINT,
        9,
        [0.85, 0.9, 1.25, 1.1],
        OracleSetup::PythPushOracle,
        SOL_ORACLE,
    )
}

/// USDC: 6 decimals, 0.9 / 0.95 asset and 1.25 / 1.1 liability weights, Switchboard pull.
pub fn usdc_bank() -> Bank {
    bank(
        USDC_BANK,
        USDC_MINT,
        6,
        [0.9, 0.95, 1.25, 1.1],
        OracleSetup::SwitchboardPull,
        USDC_ORACLE,
    )
}

/// JUP: 6 decimals, 0.6 / 0.7 asset weights, Switchboard pull.
pub fn jup_bank() -> Bank {
    bank(
        JUP_BANK,
        JUP_MINT,
        6,
        [0.6, 0.7, 1.3, 1.2],
        OracleSetup::SwitchboardPull,
        JUP_ORACLE,
    )
}

/// Exact price with no confidence band.
pub fn sol_price(price: f64) -> OraclePrice {
    OraclePrice::fixed(price)
}

/// Price with a confidence band (capped at 5%).
pub fn price_with_conf(price: f64, confidence: f64) -> OraclePrice {
    OraclePrice::from_single(PriceWithConfidence::new(price, confidence, 0.05))
}

pub fn banks() -> BankMap {
    bank_map([sol_bank(), usdc_bank(), jup_bank()])
}

/// SOL at `sol`, USDC at $1, JUP at $1.
pub fn prices(sol: f64) -> PriceMap {
    PriceMap::from([
        (SOL_BANK, sol_price(sol)),
        (USDC_BANK, OraclePrice::fixed(1.0)),
        (JUP_BANK, OraclePrice::fixed(1.0)),
    ])
}

/// Active balance lending `ui_amount` tokens.
pub fn lending(bank: &Bank, ui_amount: f64) -> Balance {
    let mut balance = Balance::open(bank.address, 0);
    balance.asset_shares = bank.get_asset_shares(bank.from_ui(ui_amount));
    balance
}

/// Active balance borrowing `ui_amount` tokens.
pub fn borrowing(bank: &Bank, ui_amount: f64) -> Balance {
    let mut balance = Balance::open(bank.address, 0);
    balance.liability_shares = bank.get_liability_shares(bank.from_ui(ui_amount));
    balance
}

pub fn account(balances: Vec<Balance>) -> Account {
    Account::new(
        Pubkey::new_from_array([31u8; 32]),
        Pubkey::new_from_array([32u8; 32]),
        balances,
    )
}
