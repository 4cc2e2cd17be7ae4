//! Pending-instruction balance projection.
//!
//! Applies decoded deposit/borrow/repay/withdraw instructions, in order, to a
//! copy of an account's balance slots. Prices play no part here.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use solana_pubkey::Pubkey;
use std::collections::BTreeSet;
use tracing::trace;

use crate::account::{Balance, MAX_BALANCES};
use crate::bank::{Bank, BankMap};
use crate::error::{PlannerError, PlannerResult};

/// Kind of a lending instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceAction {
    Deposit,
    Borrow,
    Repay,
    Withdraw,
}

impl BalanceAction {
    /// Whether the instruction touches the asset side.
    pub fn is_asset_side(&self) -> bool {
        matches!(self, Self::Deposit | Self::Withdraw)
    }

    /// Whether the instruction can open a new position.
    pub fn opens_position(&self) -> bool {
        matches!(self, Self::Deposit | Self::Borrow)
    }
}

/// Instruction amount in native units of the bank's mint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InstructionAmount {
    Exact(f64),
    /// Repay or withdraw the whole side
    All,
}

/// A decoded instruction against one bank.
///
/// For integration banks, deposit and withdraw amounts are denominated in
/// the underlying token.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingInstruction {
    pub action: BalanceAction,
    #[serde_as(as = "DisplayFromStr")]
    pub bank: Pubkey,
    pub amount: InstructionAmount,
}

impl PendingInstruction {
    pub fn deposit(bank: Pubkey, amount: f64) -> Self {
        Self {
            action: BalanceAction::Deposit,
            bank,
            amount: InstructionAmount::Exact(amount),
        }
    }

    pub fn borrow(bank: Pubkey, amount: f64) -> Self {
        Self {
            action: BalanceAction::Borrow,
            bank,
            amount: InstructionAmount::Exact(amount),
        }
    }

    pub fn repay(bank: Pubkey, amount: f64) -> Self {
        Self {
            action: BalanceAction::Repay,
            bank,
            amount: InstructionAmount::Exact(amount),
        }
    }

    pub fn repay_all(bank: Pubkey) -> Self {
        Self {
            action: BalanceAction::Repay,
            bank,
            amount: InstructionAmount::All,
        }
    }

    pub fn withdraw(bank: Pubkey, amount: f64) -> Self {
        Self {
            action: BalanceAction::Withdraw,
            bank,
            amount: InstructionAmount::Exact(amount),
        }
    }

    pub fn withdraw_all(bank: Pubkey) -> Self {
        Self {
            action: BalanceAction::Withdraw,
            bank,
            amount: InstructionAmount::All,
        }
    }
}

/// Balances after projection, plus the banks whose sides were touched.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedBalances {
    pub balances: [Balance; MAX_BALANCES],
    pub impacted_asset_banks: BTreeSet<Pubkey>,
    pub impacted_liability_banks: BTreeSet<Pubkey>,
}

impl ProjectedBalances {
    /// Active balances after projection.
    pub fn active(&self) -> impl Iterator<Item = &Balance> {
        self.balances.iter().filter(|b| b.active)
    }
}

/// Project `instructions` onto `balances`.
///
/// Fails on capacity exhaustion (no free slot for a new position), on a
/// repay or withdraw against a bank with no projected-active balance, and on
/// an exact amount for a bank missing from the registry.
pub fn project_balances(
    balances: &[Balance; MAX_BALANCES],
    instructions: &[PendingInstruction],
    banks: &BankMap,
) -> PlannerResult<ProjectedBalances> {
    let mut projected = ProjectedBalances {
        balances: *balances,
        impacted_asset_banks: BTreeSet::new(),
        impacted_liability_banks: BTreeSet::new(),
    };

    for ix in instructions {
        apply_instruction(&mut projected.balances, ix, banks)?;
        if ix.action.is_asset_side() {
            projected.impacted_asset_banks.insert(ix.bank);
        } else {
            projected.impacted_liability_banks.insert(ix.bank);
        }
    }

    Ok(projected)
}

fn apply_instruction(
    balances: &mut [Balance; MAX_BALANCES],
    ix: &PendingInstruction,
    banks: &BankMap,
) -> PlannerResult<()> {
    let existing = balances
        .iter()
        .position(|b| b.active && b.bank_pk == ix.bank);

    let index = match (existing, ix.action.opens_position()) {
        (Some(i), _) => i,
        (None, true) => {
            let free = balances
                .iter()
                .position(|b| !b.active)
                .ok_or(PlannerError::NoInactiveBalance { bank: ix.bank })?;
            balances[free] = Balance::open(ix.bank, 0);
            free
        }
        (None, false) => {
            return Err(PlannerError::NoActiveBalance {
                bank: ix.bank,
                action: ix.action,
            })
        }
    };

    let balance = &mut balances[index];
    match ix.amount {
        InstructionAmount::All => match ix.action {
            BalanceAction::Withdraw => balance.asset_shares = 0.0,
            BalanceAction::Repay => balance.liability_shares = 0.0,
            BalanceAction::Deposit | BalanceAction::Borrow => {
                return Err(PlannerError::InvalidAmount {
                    bank: ix.bank,
                    action: ix.action,
                })
            }
        },
        InstructionAmount::Exact(amount) => {
            if !amount.is_finite() || amount < 0.0 {
                return Err(PlannerError::InvalidAmount {
                    bank: ix.bank,
                    action: ix.action,
                });
            }
            let bank = banks.get(&ix.bank).ok_or(PlannerError::BankNotFound(ix.bank))?;
            let shares = amount_to_shares(bank, ix.action, amount);
            match ix.action {
                BalanceAction::Deposit => balance.asset_shares += shares,
                BalanceAction::Borrow => balance.liability_shares += shares,
                BalanceAction::Withdraw => {
                    balance.asset_shares = (balance.asset_shares - shares).max(0.0)
                }
                BalanceAction::Repay => {
                    balance.liability_shares = (balance.liability_shares - shares).max(0.0)
                }
            }
        }
    }

    if !ix.action.opens_position() && balance.asset_shares == 0.0 && balance.liability_shares == 0.0 {
        trace!(bank = %ix.bank, slot = index, "Balance closed by projection");
        balance.deactivate();
    }

    Ok(())
}

fn amount_to_shares(bank: &Bank, action: BalanceAction, amount: f64) -> f64 {
    match action {
        BalanceAction::Deposit | BalanceAction::Withdraw => {
            bank.get_asset_shares(amount / bank.integration_multiplier())
        }
        BalanceAction::Borrow | BalanceAction::Repay => bank.get_liability_shares(amount),
    }
}
