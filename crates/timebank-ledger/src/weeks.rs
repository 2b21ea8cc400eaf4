//! Weekly balance records under optimistic concurrency.
//!
//! The invariant this module exists to enforce: at every point a reader
//! can observe a week record, `minutes_granted + Σ minutes_added >= 0`.
//! Coordination is per (account, week) key and purely optimistic — a
//! conditional write carries the guards, and a lost race re-reads and
//! retries under the shared [`RetryPolicy`].
//!
//! Guard discipline:
//! - `set_week` rotates the `updateID` token and writes guarded on the
//!   observed token AND on `Σ changes >= -new_grant`, because an append
//!   landing between read and write does not rotate the token but can
//!   still sink the balance.
//! - `add_time` appends guarded on the store-evaluated predicate
//!   `minutes_granted + Σ changes >= -minutes`, so two concurrent
//!   deductions can never both squeeze through one remaining budget.
//!   Appends do not rotate `updateID`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use timebank_core::{fields, TimeRecord, WeekId, WeekRecord};
use timebank_store::{Condition, DocumentStore, Key, PutOutcome, ReadMode, WriteOutcome};

use crate::accounts::AccountStore;
use crate::error::{LedgerError, Result};
use crate::reasons::ReasonTracker;
use crate::retry::RetryPolicy;
use crate::{decode, encode, WEEKS};

/// Creates, updates, and reads week records.
pub struct WeekLedger {
    store: Arc<dyn DocumentStore>,
    accounts: AccountStore,
    reasons: ReasonTracker,
    policy: RetryPolicy,
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

impl WeekLedger {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self {
            accounts: AccountStore::new(Arc::clone(&store)),
            reasons: ReasonTracker::with_policy(Arc::clone(&store), policy.clone()),
            store,
            policy,
        }
    }

    /// Set the minutes granted for a week, creating the record on the
    /// first call for its key.
    ///
    /// # Errors
    ///
    /// `invalid-week`, `insufficient-time` (negative grant, or a grant
    /// below what the week already spent), `account-not-found`,
    /// `concurrency-conflict`.
    pub fn set_week(
        &self,
        account_id: &str,
        week_id: &str,
        minutes_granted: i64,
    ) -> Result<WeekRecord> {
        let week_id = WeekId::parse(week_id)?;
        if minutes_granted < 0 {
            return Err(LedgerError::NegativeGrant);
        }
        if !self.accounts.account_exists(account_id)? {
            return Err(LedgerError::AccountNotFound);
        }

        let key = Key::composite(account_id, week_id.to_string());

        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                self.policy.pause(attempt - 1);
            }

            // First ever set_week for this key: create the record.
            let fresh = WeekRecord {
                account_id: account_id.to_string(),
                week_id: week_id.to_string(),
                minutes_granted,
                changes: Vec::new(),
                update_id: new_token(),
            };
            if self.store.put_if_absent(WEEKS, &key, &encode(&fresh)?)? == PutOutcome::Created {
                return Ok(fresh);
            }

            // The week exists; CAS the new grant onto the current record.
            let Some(doc) = self.store.get(WEEKS, &key, ReadMode::Strong)? else {
                // Lost the record between put and read; go around again.
                continue;
            };
            let mut week: WeekRecord = decode(WEEKS, &key, doc)?;

            let spent = week
                .changes
                .iter()
                .fold(0i64, |acc, c| acc.saturating_add(c.minutes_added));
            if minutes_granted.saturating_add(spent) < 0 {
                return Err(LedgerError::GrantBelowSpent {
                    granted: minutes_granted,
                });
            }

            let token = new_token();
            let outcome = self.store.conditional_update(
                WEEKS,
                &key,
                &[
                    (fields::MINUTES_GRANTED, json!(minutes_granted)),
                    (fields::UPDATE_ID, json!(token)),
                ],
                &[
                    Condition::field_equals(fields::UPDATE_ID, week.update_id.clone()),
                    Condition::sum_at_least(
                        None,
                        fields::CHANGES,
                        fields::MINUTES_ADDED,
                        -minutes_granted,
                    ),
                ],
            )?;
            match outcome {
                WriteOutcome::Applied => {
                    week.minutes_granted = minutes_granted;
                    week.update_id = token;
                    return Ok(week);
                }
                WriteOutcome::ConditionFailed => {
                    tracing::debug!(account_id, week = %week_id, attempt, "set_week lost a race; retrying");
                }
            }
        }

        Err(LedgerError::ConcurrencyConflict {
            key: key.to_string(),
            attempts: self.policy.attempts,
        })
    }

    /// Apply a grant (`minutes > 0`) or deduction (`minutes < 0`) to a
    /// week, and record its reason.
    ///
    /// The reason forwarding to [`ReasonTracker`] is a side effect: its
    /// failure is logged as a warning and never unwinds the applied
    /// change.
    ///
    /// # Errors
    ///
    /// `invalid-week`, `missing-minutes`, `missing-reason`,
    /// `week-missing`, `insufficient-time`, `concurrency-conflict`.
    pub fn add_time(
        &self,
        account_id: &str,
        week_id: &str,
        minutes: i64,
        reason: &str,
    ) -> Result<WeekRecord> {
        let week_id = WeekId::parse(week_id)?;
        if minutes == 0 {
            return Err(LedgerError::MissingMinutes);
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::MissingReason);
        }

        let key = Key::composite(account_id, week_id.to_string());

        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                self.policy.pause(attempt - 1);
            }

            let Some(doc) = self.store.get(WEEKS, &key, ReadMode::Strong)? else {
                return Err(LedgerError::WeekMissing);
            };
            let mut week: WeekRecord = decode(WEEKS, &key, doc)?;

            let remaining = week.balance();
            if remaining.saturating_add(minutes) < 0 {
                return Err(LedgerError::InsufficientTime {
                    requested: minutes.saturating_neg(),
                    remaining,
                });
            }

            let change = TimeRecord {
                minutes_added: minutes,
                reason: reason.to_string(),
                time: Utc::now(),
            };
            let outcome = self.store.conditional_append(
                WEEKS,
                &key,
                fields::CHANGES,
                &encode(&change)?,
                &[Condition::sum_at_least(
                    Some(fields::MINUTES_GRANTED),
                    fields::CHANGES,
                    fields::MINUTES_ADDED,
                    minutes.saturating_neg(),
                )],
            )?;
            match outcome {
                WriteOutcome::Applied => {
                    if let Err(err) = self.reasons.add_reason(account_id, minutes > 0, reason) {
                        tracing::warn!(
                            account_id,
                            code = err.code(),
                            %err,
                            "time change applied but its reason could not be recorded"
                        );
                    }
                    week.changes.push(change);
                    return Ok(week);
                }
                WriteOutcome::ConditionFailed => {
                    // Either a racing write spent the budget or a racing
                    // grant change moved it. The re-read decides between
                    // insufficient-time and another attempt.
                    tracing::debug!(account_id, week = %week_id, attempt, "add_time lost a race; retrying");
                }
            }
        }

        Err(LedgerError::ConcurrencyConflict {
            key: key.to_string(),
            attempts: self.policy.attempts,
        })
    }

    /// Read a week record. `None` means "no record yet for this key",
    /// which is not a failure.
    ///
    /// # Errors
    ///
    /// `invalid-week`, plus storage faults.
    pub fn get_week(&self, account_id: &str, week_id: &str) -> Result<Option<WeekRecord>> {
        let week_id = WeekId::parse(week_id)?;
        let key = Key::composite(account_id, week_id.to_string());
        match self.store.get(WEEKS, &key, ReadMode::Eventual)? {
            None => Ok(None),
            Some(doc) => decode(WEEKS, &key, doc).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebank_store::SqliteStore;

    use crate::AccountStore;

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        ledger: WeekLedger,
        tracker: ReasonTracker,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let ledger = WeekLedger::new(Arc::clone(&store));
        let tracker = ReasonTracker::new(Arc::clone(&store));
        AccountStore::new(Arc::clone(&store))
            .create_account("kid-a")
            .unwrap();
        Fixture {
            store,
            ledger,
            tracker,
        }
    }

    #[test]
    fn first_set_week_creates_a_fresh_record() {
        let f = fixture();
        let week = f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        assert_eq!(week.minutes_granted, 300);
        assert!(week.changes.is_empty());
        assert_eq!(week.account_id, "kid-a");
        assert_eq!(week.week_id, "2018-W05");
    }

    #[test]
    fn set_week_rejects_malformed_week_ids() {
        let f = fixture();
        let err = f.ledger.set_week("kid-a", "2018-02-15", 0).unwrap_err();
        assert_eq!(err.code(), "invalid-week");
    }

    #[test]
    fn set_week_rejects_negative_grants() {
        let f = fixture();
        let err = f.ledger.set_week("kid-a", "2018-W05", -10).unwrap_err();
        assert_eq!(err.code(), "insufficient-time");
    }

    #[test]
    fn set_week_requires_an_account() {
        let f = fixture();
        let err = f.ledger.set_week("nobody", "2018-W05", 300).unwrap_err();
        assert_eq!(err.code(), "account-not-found");
    }

    #[test]
    fn repeat_set_week_replaces_the_grant_and_keeps_changes() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        f.ledger.add_time("kid-a", "2018-W05", -5, "TV").unwrap();

        let week = f.ledger.set_week("kid-a", "2018-W05", 200).unwrap();
        assert_eq!(week.minutes_granted, 200);
        assert_eq!(week.changes.len(), 1);

        let stored = f.ledger.get_week("kid-a", "2018-W05").unwrap().unwrap();
        assert_eq!(stored.minutes_granted, 200);
        assert_eq!(stored.balance(), 195);
    }

    #[test]
    fn successive_set_weeks_rotate_the_update_token() {
        let f = fixture();
        let first = f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        let second = f.ledger.set_week("kid-a", "2018-W05", 310).unwrap();
        assert_ne!(first.update_id, second.update_id);
    }

    #[test]
    fn set_week_cannot_undercut_what_was_already_spent() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        f.ledger
            .add_time("kid-a", "2018-W05", -250, "Marathon")
            .unwrap();

        // New grant of 100 would leave 100 - 250 = -150.
        let err = f.ledger.set_week("kid-a", "2018-W05", 100).unwrap_err();
        assert_eq!(err.code(), "insufficient-time");

        let stored = f.ledger.get_week("kid-a", "2018-W05").unwrap().unwrap();
        assert_eq!(stored.minutes_granted, 300);
    }

    #[test]
    fn add_time_validates_before_any_io() {
        let f = fixture();

        let err = f.ledger.add_time("kid-a", "bogus", -5, "TV").unwrap_err();
        assert_eq!(err.code(), "invalid-week");

        let err = f.ledger.add_time("kid-a", "2018-W05", 0, "TV").unwrap_err();
        assert_eq!(err.code(), "missing-minutes");

        let err = f.ledger.add_time("kid-a", "2018-W05", -5, "   ").unwrap_err();
        assert_eq!(err.code(), "missing-reason");
    }

    #[test]
    fn add_time_requires_the_week_to_exist() {
        let f = fixture();
        let err = f.ledger.add_time("kid-a", "2018-W05", -5, "TV").unwrap_err();
        assert_eq!(err.code(), "week-missing");
    }

    #[test]
    fn add_time_appends_and_returns_the_new_change() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();

        let week = f
            .ledger
            .add_time("kid-a", "2018-W05", -5, "Not listening")
            .unwrap();
        assert_eq!(week.changes.len(), 1);
        assert_eq!(week.changes[0].minutes_added, -5);
        assert_eq!(week.changes[0].reason, "Not listening");
        assert_eq!(week.balance(), 295);
    }

    #[test]
    fn add_time_trims_the_reason() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();

        let week = f
            .ledger
            .add_time("kid-a", "2018-W05", -5, "  Not listening  ")
            .unwrap();
        assert_eq!(week.changes[0].reason, "Not listening");
    }

    #[test]
    fn add_time_rejects_overdrafts() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        f.ledger
            .add_time("kid-a", "2018-W05", -5, "Not listening")
            .unwrap();

        let err = f.ledger.add_time("kid-a", "2018-W05", -301, "x").unwrap_err();
        assert_eq!(err.code(), "insufficient-time");
        assert!(err.to_string().contains("301"));
        assert!(err.to_string().contains("295"));

        let stored = f.ledger.get_week("kid-a", "2018-W05").unwrap().unwrap();
        assert_eq!(stored.changes.len(), 1);
        assert_eq!(stored.balance(), 295);
    }

    #[test]
    fn add_time_accepts_grants_beyond_the_weekly_one() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 60).unwrap();

        let week = f
            .ledger
            .add_time("kid-a", "2018-W05", 30, "Extra chores")
            .unwrap();
        assert_eq!(week.balance(), 90);
    }

    #[test]
    fn add_time_records_the_reason_with_its_polarity() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        f.ledger.add_time("kid-a", "2018-W05", -5, "TV").unwrap();
        f.ledger.add_time("kid-a", "2018-W05", 15, "Chores").unwrap();

        assert_eq!(
            f.tracker.recent_reasons("kid-a", false, 0, 10).unwrap(),
            vec!["TV"]
        );
        assert_eq!(
            f.tracker.recent_reasons("kid-a", true, 0, 10).unwrap(),
            vec!["Chores"]
        );
    }

    #[test]
    fn add_time_succeeds_even_when_the_reason_log_cannot() {
        let f = fixture();
        // A week document without a backing account: the append works,
        // the reason side effect has nowhere to go.
        let orphan = WeekRecord {
            account_id: "ghost".to_string(),
            week_id: "2018-W05".to_string(),
            minutes_granted: 100,
            changes: Vec::new(),
            update_id: new_token(),
        };
        f.store
            .put_if_absent(
                WEEKS,
                &Key::composite("ghost", "2018-W05"),
                &crate::encode(&orphan).unwrap(),
            )
            .unwrap();

        let week = f.ledger.add_time("ghost", "2018-W05", -10, "TV").unwrap();
        assert_eq!(week.balance(), 90);
    }

    #[test]
    fn add_time_survives_extreme_minute_values() {
        let f = fixture();
        f.ledger.set_week("kid-a", "2018-W05", 100).unwrap();

        // A deduction too large to negate still reads as an overdraft.
        let err = f
            .ledger
            .add_time("kid-a", "2018-W05", i64::MIN, "Everything")
            .unwrap_err();
        assert_eq!(err.code(), "insufficient-time");

        // A grant at the bound lands; the balance pins instead of wrapping.
        let week = f
            .ledger
            .add_time("kid-a", "2018-W05", i64::MAX, "Bonus")
            .unwrap();
        assert_eq!(week.balance(), i64::MAX);

        // The record stays writable afterwards.
        let week = f.ledger.set_week("kid-a", "2018-W05", 50).unwrap();
        assert_eq!(week.minutes_granted, 50);
    }

    #[test]
    fn get_week_distinguishes_absent_from_failure() {
        let f = fixture();
        assert!(f.ledger.get_week("kid-a", "2018-W05").unwrap().is_none());

        let err = f.ledger.get_week("kid-a", "not-a-week").unwrap_err();
        assert_eq!(err.code(), "invalid-week");
    }

    // The full scenario from the household tracker's acceptance notes.
    #[test]
    fn scenario_set_deduct_overdraw_and_bad_params() {
        let f = fixture();

        let week = f.ledger.set_week("kid-a", "2018-W05", 300).unwrap();
        assert_eq!(week.minutes_granted, 300);
        assert!(week.changes.is_empty());

        let week = f
            .ledger
            .add_time("kid-a", "2018-W05", -5, "Not listening")
            .unwrap();
        assert_eq!(week.changes.len(), 1);
        assert_eq!(week.changes[0].minutes_added, -5);

        let err = f.ledger.add_time("kid-a", "2018-W05", -301, "x").unwrap_err();
        assert_eq!(err.code(), "insufficient-time");

        let err = f.ledger.set_week("kid-a", "2018-02-15", 0).unwrap_err();
        assert_eq!(err.code(), "invalid-week");

        let err = f.tracker.recent_reasons("kid-a", false, 0, 0).unwrap_err();
        assert_eq!(err.code(), "params-invalid");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            // Rejected operations leave no trace; whatever subset lands,
            // the observable balance never dips below zero.
            #[test]
            fn random_sequences_never_observe_a_negative_balance(
                ops in proptest::collection::vec((any::<bool>(), -300i64..300), 1..12)
            ) {
                let f = fixture();
                f.ledger.set_week("kid-a", "2018-W05", 100).unwrap();

                for (is_grant, amount) in ops {
                    if is_grant {
                        let _ = f.ledger.set_week("kid-a", "2018-W05", amount.unsigned_abs() as i64);
                    } else {
                        let minutes = if amount == 0 { -1 } else { amount };
                        let _ = f.ledger.add_time("kid-a", "2018-W05", minutes, "Swap");
                    }
                    let week = f.ledger.get_week("kid-a", "2018-W05").unwrap().unwrap();
                    prop_assert!(week.balance() >= 0);
                }
            }
        }
    }
}
