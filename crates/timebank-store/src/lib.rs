//! # timebank-store
//!
//! The document-store seam the ledger writes through.
//!
//! The backing store is modeled as a keyed document collection with
//! single-key conditional-write atomicity and nothing stronger: no
//! multi-key transactions, no server-side logic. Everything the ledger
//! needs is expressed through four primitives — get, put-if-absent,
//! conditional update, conditional append — where the conditional writes
//! carry [`Condition`] guards evaluated atomically against the stored
//! document.
//!
//! [`SqliteStore`] is the shipped backend (file-backed or in-memory). A
//! remote document store slots in behind the same trait.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage-layer failures. These are transport/backend faults, not
/// business errors; callers surface them as-is rather than retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("malformed document at {collection}/{key}: {message}")]
    Malformed {
        collection: String,
        key: String,
        message: String,
    },
}

/// Key of a document: a partition key plus an optional sort key, after
/// the hash+range layout of the original store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    pub partition: String,
    pub sort: Option<String>,
}

impl Key {
    /// A simple (partition-only) key.
    #[must_use]
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    /// A composite (partition + sort) key.
    #[must_use]
    pub fn composite(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}:{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}

/// Read consistency requested by the caller.
///
/// Local backends always return the latest committed document; the
/// distinction exists at the seam for eventually-consistent remote
/// stores, where CAS loops must read `Strong`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Eventual,
    Strong,
}

/// Outcome of a put-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    AlreadyExists,
}

/// Outcome of a guarded write. `ConditionFailed` covers both a guard
/// that evaluated false and a key that was not present — the caller's
/// re-read distinguishes the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    ConditionFailed,
}

/// A guard evaluated atomically against the stored document at write
/// time. All conditions on a write must hold for it to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The stored field equals the given value. Used as the CAS guard on
    /// version tokens and for whole-list rewrites.
    FieldEquals { field: String, value: Value },

    /// `base_field + Σ array_field[*].item_field >= min`, with a missing
    /// `base_field` contributing zero. This is the balance predicate:
    /// it lets an append (or grant change) re-verify affordability at
    /// the store, closing the read-then-write race window.
    SumAtLeast {
        base_field: Option<String>,
        array_field: String,
        item_field: String,
        min: i64,
    },
}

impl Condition {
    #[must_use]
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn sum_at_least(
        base_field: Option<&str>,
        array_field: impl Into<String>,
        item_field: impl Into<String>,
        min: i64,
    ) -> Self {
        Self::SumAtLeast {
            base_field: base_field.map(str::to_string),
            array_field: array_field.into(),
            item_field: item_field.into(),
            min,
        }
    }
}

/// A keyed document store with single-key conditional-write atomicity.
///
/// Documents are JSON objects. Field names passed to the guarded writes
/// are trusted (they come from crate-internal constants, never from
/// user input).
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if the key is absent.
    fn get(&self, collection: &str, key: &Key, mode: ReadMode) -> Result<Option<Value>>;

    /// Insert a document only if the key is not already present.
    fn put_if_absent(&self, collection: &str, key: &Key, doc: &Value) -> Result<PutOutcome>;

    /// Set top-level fields on an existing document, guarded by
    /// `conditions`. Applies atomically or not at all.
    fn conditional_update(
        &self,
        collection: &str,
        key: &Key,
        set: &[(&str, Value)],
        conditions: &[Condition],
    ) -> Result<WriteOutcome>;

    /// Append one item to a top-level array field of an existing
    /// document, guarded by `conditions` evaluated against the
    /// pre-append document. Applies atomically or not at all.
    fn conditional_append(
        &self,
        collection: &str,
        key: &Key,
        array_field: &str,
        item: &Value,
        conditions: &[Condition],
    ) -> Result<WriteOutcome>;
}
