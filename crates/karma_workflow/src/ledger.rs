//! Karma Ledger - boundary trait and an in-memory backend.

use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use karma_ids::UserId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// Where karma deltas end up.
#[async_trait]
pub trait KarmaLedger: Send + Sync {
    /// Append a `+1`/`-1` entry for `user`.
    async fn record_delta(
        &self,
        user: UserId,
        amount: i64,
        reason: Option<String>,
    ) -> Result<(), LedgerError>;

    /// Sum of all entries for `user`.
    async fn total_for(&self, user: UserId) -> Result<i64, LedgerError>;

    /// Totals of every registered user.
    async fn totals_for_all(&self) -> Result<BTreeMap<UserId, i64>, LedgerError>;
}

/// A single ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub amount: i64,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Ledger kept in process memory.
///
/// Only registered users have an account; writes for anyone else fail with
/// [`LedgerError::UnknownUser`], as a sheet without a column for them would.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<BTreeMap<UserId, Vec<LedgerEntry>>>,
}

impl InMemoryLedger {
    pub fn new(users: impl IntoIterator<Item = UserId>) -> Self {
        let accounts = users.into_iter().map(|user| (user, Vec::new())).collect();
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    /// Open an account for `user` if there is none yet.
    pub fn register(&self, user: UserId) -> Result<(), LedgerError> {
        self.with_accounts(|accounts| {
            accounts.entry(user).or_default();
        })
    }

    /// Entries recorded for `user`, oldest first.
    pub fn entries_for(&self, user: UserId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.with_accounts(|accounts| accounts.get(&user).cloned())?
            .ok_or(LedgerError::UnknownUser(user))
    }

    fn with_accounts<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<UserId, Vec<LedgerEntry>>) -> T,
    ) -> Result<T, LedgerError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| LedgerError::backend("ledger lock poisoned"))?;
        Ok(f(&mut accounts))
    }
}

#[async_trait]
impl KarmaLedger for InMemoryLedger {
    async fn record_delta(
        &self,
        user: UserId,
        amount: i64,
        reason: Option<String>,
    ) -> Result<(), LedgerError> {
        self.with_accounts(|accounts| {
            let entries = accounts.get_mut(&user).ok_or(LedgerError::UnknownUser(user))?;
            entries.push(LedgerEntry {
                amount,
                reason,
                recorded_at: Utc::now(),
            });
            debug!(user = %user, amount, "Recorded karma delta");
            Ok(())
        })?
    }

    async fn total_for(&self, user: UserId) -> Result<i64, LedgerError> {
        self.with_accounts(|accounts| {
            accounts
                .get(&user)
                .map(|entries| entries.iter().map(|e| e.amount).sum())
                .ok_or(LedgerError::UnknownUser(user))
        })?
    }

    async fn totals_for_all(&self) -> Result<BTreeMap<UserId, i64>, LedgerError> {
        self.with_accounts(|accounts| {
            accounts
                .iter()
                .map(|(user, entries)| (*user, entries.iter().map(|e| e.amount).sum()))
                .collect()
        })
    }
}
