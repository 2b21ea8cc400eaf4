//! Errors raised by the core types themselves.
//!
//! The full per-operation taxonomy (account-exists, insufficient-time,
//! concurrency-conflict, ...) lives in `timebank-ledger`; this crate only
//! owns the one failure its types can produce on their own.

use thiserror::Error;

/// A week specifier that does not match the `YYYY-Wnn` ISO-8601 week
/// pattern, or names a week the year does not have.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid week specifier: {0:?}")]
pub struct InvalidWeek(pub String);
