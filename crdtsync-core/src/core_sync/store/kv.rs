//! Key-value store collaborator
//!
//! The synchronizer persists snapshots through this interface: string keys,
//! structured (JSON) values, optional TTL.

use crate::clock::{Clock, SystemClock};
use crate::core_sync::model::Millis;
use crate::core_sync::store::errors::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Durable key-value storage
///
/// Implementations must replace values atomically: a reader never observes a
/// partially written value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a value, replacing any previous one. Expires after `ttl` if given.
    async fn store(&self, key: &str, value: Value, ttl: Option<Duration>) -> SyncResult<()>;

    /// `None` when the key is missing or expired
    async fn retrieve(&self, key: &str) -> SyncResult<Option<Value>>;

    /// Returns whether a value was removed
    async fn remove(&self, key: &str) -> SyncResult<bool>;

    /// Live keys starting with `prefix`, sorted
    async fn keys(&self, prefix: &str) -> SyncResult<Vec<String>>;
}

/// Value plus its absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredValue {
    pub value: Value,
    #[serde(default)]
    pub expires_at: Option<Millis>,
}

impl StoredValue {
    pub fn new(value: Value, ttl: Option<Duration>, now: Millis) -> Self {
        StoredValue {
            value,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl.as_millis() as u64)),
        }
    }

    pub fn is_expired(&self, now: Millis) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// In-memory store; TTL is checked on read
#[derive(Debug)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, StoredValue>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn store(&self, key: &str, value: Value, ttl: Option<Duration>) -> SyncResult<()> {
        let stored = StoredValue::new(value, ttl, self.clock.now_millis());
        self.values.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> SyncResult<Option<Value>> {
        let now = self.clock.now_millis();
        let mut values = self.values.write().await;
        match values.get(key) {
            Some(stored) if stored.is_expired(now) => {
                values.remove(key);
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.value.clone())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> SyncResult<bool> {
        Ok(self.values.write().await.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let now = self.clock.now_millis();
        let values = self.values.read().await;
        let mut keys: Vec<String> = values
            .iter()
            .filter(|(k, v)| k.starts_with(prefix) && !v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
