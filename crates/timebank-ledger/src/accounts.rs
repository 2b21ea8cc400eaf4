//! Account creation and existence checks.

use std::sync::Arc;

use timebank_core::AccountRecord;
use timebank_store::{DocumentStore, Key, PutOutcome, ReadMode};

use crate::error::{LedgerError, Result};
use crate::{encode, ACCOUNTS};

/// Creates and validates account documents. Accounts are created once,
/// with empty reason logs, and never deleted.
pub struct AccountStore {
    store: Arc<dyn DocumentStore>,
}

impl AccountStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a fresh account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AccountExists`] if the ID is already
    /// taken; the existing account is left untouched.
    pub fn create_account(&self, account_id: &str) -> Result<()> {
        let account = AccountRecord::new(account_id);
        match self
            .store
            .put_if_absent(ACCOUNTS, &Key::new(account_id), &encode(&account)?)?
        {
            PutOutcome::Created => Ok(()),
            PutOutcome::AlreadyExists => Err(LedgerError::AccountExists),
        }
    }

    /// Whether the account exists. Absence is a `false`, never an error.
    pub fn account_exists(&self, account_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get(ACCOUNTS, &Key::new(account_id), ReadMode::Eventual)?
            .is_some())
    }
}
