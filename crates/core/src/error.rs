//! Fatal planner errors.
//!
//! Missing banks or prices during aggregation, blocked cranks and degenerate
//! liquidation prices are not errors: they are excluded, returned as
//! [`crate::CrankPlan::Blocked`], or reported as `None` respectively.

use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::projector::BalanceAction;

/// Errors that abort a planning call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    /// Every balance slot is active; the position cannot be opened.
    #[error("no inactive balance slot available to open a position in bank {bank}")]
    NoInactiveBalance { bank: Pubkey },

    /// A repay or withdraw targets a bank the account has no active balance in.
    #[error("{action:?} targets bank {bank} with no active balance")]
    NoActiveBalance { bank: Pubkey, action: BalanceAction },

    /// Deposits and borrows need an explicit amount; explicit amounts must be finite and non-negative.
    #[error("{action:?} on bank {bank} has an invalid amount")]
    InvalidAmount { bank: Pubkey, action: BalanceAction },

    /// The bank registry has no entry for an instruction's bank.
    #[error("bank {0} not found in registry")]
    BankNotFound(Pubkey),
}

/// Result alias for planner operations.
pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
