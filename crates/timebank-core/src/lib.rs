//! # timebank-core
//!
//! Core types for the timebank ledger: per-account, per-week time
//! balances for a household screen-time tracker.
//!
//! This crate defines the foundational types used across the other
//! timebank crates:
//! - [`AccountRecord`] — a tracked child/account with its reason logs
//! - [`WeekRecord`] — the weekly balance document (the CAS unit)
//! - [`TimeRecord`] — one immutable grant or deduction
//! - [`WeekId`] — validated ISO-8601 week specifier (`2018-W05`)
//! - [`InvalidWeek`] — the validation error the above can raise

pub mod error;
pub mod types;
pub mod week;

pub use error::InvalidWeek;
pub use types::{fields, AccountRecord, TimeRecord, WeekRecord, REASONS_TO_KEEP};
pub use week::WeekId;
