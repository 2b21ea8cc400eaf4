//! Record types persisted in the document store.
//!
//! Field names on the wire are camelCase (`minutesGranted`, `updateID`,
//! ...) so documents written by this crate match the layout the rest of
//! the household tooling reads. The [`fields`] constants are the single
//! source of truth for those names wherever storage guards reference
//! them by string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How many entries each per-polarity reason log retains. Appends past
/// the cap evict from the front, oldest first.
pub const REASONS_TO_KEEP: usize = 100;

/// Persisted field names, shared with the storage guard expressions.
pub mod fields {
    pub const MINUTES_GRANTED: &str = "minutesGranted";
    pub const MINUTES_ADDED: &str = "minutesAdded";
    pub const CHANGES: &str = "changes";
    pub const UPDATE_ID: &str = "updateID";
    pub const RECENT_POSITIVE_REASONS: &str = "recentPositiveReasons";
    pub const RECENT_NEGATIVE_REASONS: &str = "recentNegativeReasons";

    /// The reason-log field for a polarity (`true` = grants/rewards,
    /// `false` = deductions/penalties).
    #[must_use]
    pub fn reasons(positive: bool) -> &'static str {
        if positive {
            RECENT_POSITIVE_REASONS
        } else {
            RECENT_NEGATIVE_REASONS
        }
    }
}

/// A tracked account (one child) with its two bounded reason logs.
///
/// Created once, never deleted. The reason lists are append-only and
/// independently capped at [`REASONS_TO_KEEP`] entries per polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "accountID")]
    pub account_id: String,

    #[serde(rename = "recentPositiveReasons")]
    pub recent_positive_reasons: Vec<String>,

    #[serde(rename = "recentNegativeReasons")]
    pub recent_negative_reasons: Vec<String>,
}

impl AccountRecord {
    /// A fresh account with empty reason logs.
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            recent_positive_reasons: Vec::new(),
            recent_negative_reasons: Vec::new(),
        }
    }

    /// The reason log for a polarity.
    #[must_use]
    pub fn reasons(&self, positive: bool) -> &[String] {
        if positive {
            &self.recent_positive_reasons
        } else {
            &self.recent_negative_reasons
        }
    }
}

/// One grant or deduction applied to a week. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// Minutes added (or, when negative, removed). Never zero.
    #[serde(rename = "minutesAdded")]
    pub minutes_added: i64,

    /// The reason for the addition or removal. Never empty.
    pub reason: String,

    /// When the change was recorded, UTC with millisecond precision.
    #[serde(with = "ts_millis")]
    pub time: DateTime<Utc>,
}

/// The weekly balance document — the unit of optimistic concurrency.
///
/// Invariant: `minutes_granted + Σ changes[i].minutes_added >= 0` at
/// every point a reader can observe the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekRecord {
    #[serde(rename = "accountID")]
    pub account_id: String,

    /// ISO-8601 week specifier (e.g. `"2018-W03"`).
    #[serde(rename = "weekID")]
    pub week_id: String,

    /// Minutes initially granted for the week. Never negative.
    #[serde(rename = "minutesGranted")]
    pub minutes_granted: i64,

    /// Changes applied this week, in application order.
    pub changes: Vec<TimeRecord>,

    /// Opaque version token, rotated on every successful mutation of
    /// `minutes_granted`. The CAS guard for concurrent writers.
    #[serde(rename = "updateID")]
    pub update_id: String,
}

impl WeekRecord {
    /// Minutes remaining: the grant plus every recorded change.
    /// Saturates at the `i64` bounds rather than wrapping.
    #[must_use]
    pub fn balance(&self) -> i64 {
        self.changes
            .iter()
            .fold(self.minutes_granted, |acc, c| acc.saturating_add(c.minutes_added))
    }
}

/// Serde adapter pinning timestamps to UTC ISO-8601 with millisecond
/// precision, the persisted wire format.
pub mod ts_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(de)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
