//! Bounded reason logs and frequency-ranked queries over them.
//!
//! Each account carries two append-only lists of free-text reasons, one
//! per polarity (grants vs. deductions), capped at the most recent
//! [`REASONS_TO_KEEP`] entries. Appends rewrite the list under a guard
//! on the previously observed value, so concurrent appends serialize the
//! same way week mutations do.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use timebank_core::{fields, AccountRecord, REASONS_TO_KEEP};
use timebank_store::{Condition, DocumentStore, Key, ReadMode, WriteOutcome};

use crate::error::{LedgerError, Result};
use crate::retry::RetryPolicy;
use crate::{decode, ACCOUNTS};

/// Maintains the per-polarity reason logs on account documents.
pub struct ReasonTracker {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl ReasonTracker {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    #[must_use]
    pub fn with_policy(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Append a reason to the polarity's log, evicting from the front
    /// past the cap.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountNotFound`] if the account record is
    /// missing, or [`LedgerError::ConcurrencyConflict`] after the retry
    /// budget runs out.
    pub fn add_reason(&self, account_id: &str, positive: bool, reason: &str) -> Result<()> {
        let field = fields::reasons(positive);
        let key = Key::new(account_id);

        for attempt in 0..self.policy.attempts {
            if attempt > 0 {
                self.policy.pause(attempt - 1);
            }

            let Some(doc) = self.store.get(ACCOUNTS, &key, ReadMode::Strong)? else {
                return Err(LedgerError::AccountNotFound);
            };
            let account: AccountRecord = decode(ACCOUNTS, &key, doc)?;
            let observed = account.reasons(positive).to_vec();
            let updated = push_capped(observed.clone(), reason.to_string(), REASONS_TO_KEEP);

            let outcome = self.store.conditional_update(
                ACCOUNTS,
                &key,
                &[(field, json!(updated))],
                &[Condition::field_equals(field, json!(observed))],
            )?;
            match outcome {
                WriteOutcome::Applied => return Ok(()),
                WriteOutcome::ConditionFailed => {
                    tracing::debug!(account_id, positive, attempt, "reason log moved; retrying");
                }
            }
        }

        Err(LedgerError::ConcurrencyConflict {
            key: key.to_string(),
            attempts: self.policy.attempts,
        })
    }

    /// The page `[from, from + size)` of the polarity's reasons, ranked
    /// by descending occurrence count with ties broken by earliest first
    /// occurrence. Shorter than requested when the ranking runs out.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ParamsInvalid`] for a zero page size and
    /// [`LedgerError::AccountNotFound`] for a missing account.
    pub fn recent_reasons(
        &self,
        account_id: &str,
        positive: bool,
        from: usize,
        size: usize,
    ) -> Result<Vec<String>> {
        if size == 0 {
            return Err(LedgerError::ParamsInvalid);
        }

        let key = Key::new(account_id);
        let Some(doc) = self.store.get(ACCOUNTS, &key, ReadMode::Eventual)? else {
            return Err(LedgerError::AccountNotFound);
        };
        let account: AccountRecord = decode(ACCOUNTS, &key, doc)?;

        Ok(rank_by_frequency(account.reasons(positive))
            .into_iter()
            .skip(from)
            .take(size)
            .collect())
    }
}

/// Append, then trim from the front until the list fits the cap. Pure
/// transform so the rewrite is a single idempotent value.
fn push_capped(mut list: Vec<String>, item: String, cap: usize) -> Vec<String> {
    list.push(item);
    if list.len() > cap {
        let excess = list.len() - cap;
        list.drain(..excess);
    }
    list
}

/// Distinct reasons by descending count; ties break by first occurrence
/// in the raw list, so repeated calls over unchanged input agree.
fn rank_by_frequency(reasons: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, reason) in reasons.iter().enumerate() {
        let entry = counts.entry(reason).or_insert((0, index));
        entry.0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(reason, (count, first))| (reason, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().map(|(reason, ..)| reason.to_string()).collect()
}
