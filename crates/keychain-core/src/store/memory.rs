//! In-memory store backend
//!
//! Implements the full keychain contract without touching the OS. Useful for
//! tests and for callers that want credentials to vanish with the process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use super::table::{ItemTable, StoredItem};
use super::{RawRecord, SecureStore};
use crate::error::{KeychainError, Result};
use crate::query::CredentialQuery;
use crate::secret::Secret;

#[derive(Default)]
struct MemoryState {
    table: ItemTable,
    secrets: HashMap<Uuid, Secret>,
}

/// In-memory store backend
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// When set, records are returned without their secret
    deny_secrets: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store that refuses to release secret data
    pub fn set_deny_secret_access(&self, deny: bool) {
        self.deny_secrets.store(deny, Ordering::SeqCst);
    }

    /// Number of items currently held. Counts through a poisoned lock, since
    /// the table is never left half-written.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .table
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| KeychainError::unavailable("memory store lock poisoned"))
    }

    fn to_record(&self, state: &MemoryState, item: &StoredItem) -> RawRecord {
        let secret = if self.deny_secrets.load(Ordering::SeqCst) {
            None
        } else {
            state.secrets.get(&item.id).cloned()
        };

        RawRecord {
            class: item.class,
            attributes: item.attributes.clone(),
            secret,
        }
    }
}

impl SecureStore for MemoryStore {
    fn search(&self, query: &CredentialQuery) -> Result<Vec<RawRecord>> {
        let state = self.state()?;
        let records: Vec<RawRecord> = state
            .table
            .find(query)
            .into_iter()
            .map(|item| self.to_record(&state, item))
            .collect();

        debug!("Memory store search matched {} items", records.len());
        Ok(records)
    }

    fn add(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
        let mut state = self.state()?;
        let item = state.table.insert(query)?;
        state.secrets.insert(item.id, secret.clone());

        debug!("Memory store added {} item {}", item.class, item.id);
        Ok(self.to_record(&state, &item))
    }

    fn update(&self, query: &CredentialQuery, secret: &Secret) -> Result<RawRecord> {
        let mut state = self.state()?;
        let id = state.table.single(query)?.id;
        let item = state.table.touch(id)?;
        state.secrets.insert(id, secret.clone());

        debug!("Memory store updated item {}", id);
        Ok(self.to_record(&state, &item))
    }

    fn delete(&self, query: &CredentialQuery) -> Result<()> {
        let mut state = self.state()?;
        let id = state.table.single(query)?.id;
        state.table.remove(id);
        state.secrets.remove(&id);

        debug!("Memory store deleted item {}", id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "In-memory store"
    }
}
