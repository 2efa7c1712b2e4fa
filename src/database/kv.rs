//! Asynchronous key-value substrate with a change-notification feed.
//!
//! The session store persists everything through [`KeyValueStore`]: a
//! dictionary of top-level JSON values that is durable once `set` returns.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

use crate::types::errors::StoreError;

/// Partial record of top-level keys to values.
pub type StorageMap = Map<String, Value>;

/// Capacity of the change feed. Slow observers see `Lagged` rather than blocking writers.
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// One key's transition, published after the write is durable.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the present subset of `keys`. Missing keys are simply absent.
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StoreError>;

    /// Writes every entry of `items`, returning once durable.
    async fn set(&self, items: StorageMap) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Subscribes to changes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Publishes a change unless the value is unchanged. Send errors mean no subscribers.
pub(crate) fn publish(
    feed: &broadcast::Sender<StorageChange>,
    key: &str,
    old_value: Option<Value>,
    new_value: Option<Value>,
) {
    if old_value == new_value {
        return;
    }
    let _ = feed.send(StorageChange {
        key: key.to_string(),
        old_value,
        new_value,
    });
}

/// Process-local store used by tests and ephemeral runs.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    feed: broadcast::Sender<StorageChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            feed,
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
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StoreError> {
        let entries = self.entries.lock().await;
        let mut out = StorageMap::new();
        for key in keys {
            if let Some(value) = entries.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }
        Ok(out)
    }

    async fn set(&self, items: StorageMap) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for (key, value) in items {
            let old = entries.insert(key.clone(), value.clone());
            publish(&self.feed, &key, old, Some(value));
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            if let Some(old) = entries.remove(*key) {
                publish(&self.feed, key, Some(old), None);
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
