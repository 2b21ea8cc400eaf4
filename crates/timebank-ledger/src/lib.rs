//! # timebank-ledger
//!
//! The server-side ledger for per-account, per-week time balances.
//!
//! Three components, each owning its slice of the data model:
//! - [`AccountStore`] — account creation and existence
//! - [`WeekLedger`] — weekly balance records under the non-negative
//!   balance invariant, with optimistic concurrency
//! - [`ReasonTracker`] — bounded per-polarity reason logs and
//!   frequency-ranked queries over them
//!
//! All coordination happens through the store's conditional-write
//! primitives; there is no in-process shared mutable state and no held
//! lock. Conflicting writers retry with [`RetryPolicy`] and surface
//! `concurrency-conflict` when the budget runs out.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use timebank_store::{Key, StoreError};

pub mod accounts;
pub mod error;
pub mod reasons;
pub mod retry;
pub mod weeks;

pub use accounts::AccountStore;
pub use error::{LedgerError, Result};
pub use reasons::ReasonTracker;
pub use retry::RetryPolicy;
pub use weeks::WeekLedger;

/// Collection of account documents, keyed by account ID.
pub(crate) const ACCOUNTS: &str = "accounts";

/// Collection of week documents, keyed by (account ID, week ID).
pub(crate) const WEEKS: &str = "weeks";

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| LedgerError::Store(StoreError::Backend(format!("encode record: {e}"))))
}

pub(crate) fn decode<T: DeserializeOwned>(collection: &str, key: &Key, doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| {
        LedgerError::Store(StoreError::Malformed {
            collection: collection.to_string(),
            key: key.to_string(),
            message: e.to_string(),
        })
    })
}
