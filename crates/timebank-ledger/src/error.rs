//! Error taxonomy for ledger operations.
//!
//! Every error carries a stable machine-readable code (see
//! [`LedgerError::code`]) next to its human-readable message. Causes
//! wrap explicitly; storage faults pass through untouched so callers can
//! tell a business rejection from a broken backend.

use thiserror::Error;

use timebank_core::InvalidWeek;
use timebank_store::StoreError;

/// Result alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account already exists")]
    AccountExists,

    #[error("invalid account")]
    AccountNotFound,

    #[error(transparent)]
    InvalidWeek(#[from] InvalidWeek),

    #[error("minutes cannot be zero")]
    MissingMinutes,

    #[error("reason cannot be empty")]
    MissingReason,

    #[error("week has not been set up yet")]
    WeekMissing,

    /// A negative grant can never satisfy the balance invariant.
    #[error("can't grant less than zero minutes")]
    NegativeGrant,

    /// The new grant is smaller than what the week's changes already
    /// spent.
    #[error("granting {granted} minutes would put the total time for the week below zero")]
    GrantBelowSpent { granted: i64 },

    #[error("cannot take away {requested} minutes with only {remaining} minutes remaining")]
    InsufficientTime { requested: i64, remaining: i64 },

    /// A bounded CAS loop ran out of attempts. Callers may retry the
    /// whole operation.
    #[error("conflicting writes on {key}: gave up after {attempts} attempts")]
    ConcurrencyConflict { key: String, attempts: u32 },

    #[error("from or size parameters invalid")]
    ParamsInvalid,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// The stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountExists => "account-exists",
            Self::AccountNotFound => "account-not-found",
            Self::InvalidWeek(_) => "invalid-week",
            Self::MissingMinutes => "missing-minutes",
            Self::MissingReason => "missing-reason",
            Self::WeekMissing => "week-missing",
            Self::NegativeGrant | Self::GrantBelowSpent { .. } | Self::InsufficientTime { .. } => {
                "insufficient-time"
            }
            Self::ConcurrencyConflict { .. } => "concurrency-conflict",
            Self::ParamsInvalid => "params-invalid",
            Self::Store(_) => "store",
        }
    }
}
