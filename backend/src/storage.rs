//! # Storage
//!
//! The ledger persists everything as JSON blobs under a handful of string
//! keys. This module defines the key-value abstraction the domain layer
//! depends on and the implementations behind it:
//!
//! - [`DbConnection`]: SQLite `key_values` table, used by the running service
//! - [`MemoryStore`]: process-local map, used by tests and embedders
//!
//! Writes to different keys are independent; nothing here is transactional
//! across keys.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::db::DbConnection;

/// Store key for the transaction list
pub const TRANSACTIONS_KEY: &str = "@agent_finance_transactions";
/// Store key for the initial balance record
pub const INITIAL_BALANCE_KEY: &str = "@agent_finance_initial_balance";
/// Store key for the loan list
pub const LOANS_KEY: &str = "@agent_finance_loans";
/// Store key for the bounded backup history
pub const BACKUPS_KEY: &str = "@agent_finance_backups";

/// String-keyed blob storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the blob stored under `key`, if any
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous blob
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every listed key; missing keys are ignored
    async fn remove_items(&self, keys: &[&str]) -> Result<()>;
}

#[async_trait]
impl KeyValueStore for DbConnection {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        debug!("Reading key {}", key);
        self.get_value(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        debug!("Writing key {} ({} bytes)", key, value.len());
        self.put_value(key, value).await
    }

    async fn remove_items(&self, keys: &[&str]) -> Result<()> {
        let deleted = self.delete_values(keys).await?;
        debug!("Removed {} of {} keys", deleted, keys.len());
        Ok(())
    }
}

/// In-memory key-value store. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_items(&self, keys: &[&str]) -> Result<()> {
        let mut items = self.lock();
        for key in keys {
            items.remove(*key);
        }
        Ok(())
    }
}
