//! Durable [`KeyValueStore`] backed by the `kv_store` SQLite table.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task;

use super::connection::Database;
use super::kv::{publish, KeyValueStore, StorageChange, StorageMap, CHANGE_FEED_CAPACITY};
use crate::types::errors::StoreError;

/// Statements run on tokio's blocking pool, one at a time behind the connection lock.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    feed: broadcast::Sender<StorageChange>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(db)),
            feed,
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Runs `op` against the connection off the async runtime.
    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut db = db
                .lock()
                .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))?;
            op(&mut db)
        })
        .await
        .map_err(|e| StoreError::Database(format!("store task failed: {}", e)))?
    }

    fn read_value(db: &Database, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = db
            .connection()
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn get_blocking(db: &Database, keys: &[String]) -> Result<StorageMap, StoreError> {
        let mut out = StorageMap::new();
        for key in keys {
            if let Some(value) = Self::read_value(db, key)? {
                out.insert(key.clone(), value);
            }
        }
        Ok(out)
    }

    /// Writes all items in one transaction, then returns the previous values for notification.
    fn set_blocking(db: &mut Database, items: &StorageMap) -> Result<Vec<(String, Option<Value>)>, StoreError> {
        let mut previous = Vec::with_capacity(items.len());
        for key in items.keys() {
            previous.push((key.clone(), Self::read_value(db, key)?));
        }

        let now = Self::now();
        let tx = db.connection_mut().transaction()?;
        for (key, value) in items {
            let text = serde_json::to_string(value)?;
            tx.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, text, now],
            )?;
        }
        tx.commit()?;
        Ok(previous)
    }

    fn remove_blocking(db: &Database, keys: &[String]) -> Result<Vec<(String, Value)>, StoreError> {
        let mut removed = Vec::new();
        for key in keys {
            if let Some(old) = Self::read_value(db, key)? {
                db.connection()
                    .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                removed.push((key.clone(), old));
            }
        }
        Ok(removed)
    }
}

fn owned_keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| (*k).to_string()).collect()
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<StorageMap, StoreError> {
        let keys = owned_keys(keys);
        self.run(move |db| Self::get_blocking(db, &keys)).await
    }

    async fn set(&self, items: StorageMap) -> Result<(), StoreError> {
        let (previous, items) = self
            .run(move |db| Self::set_blocking(db, &items).map(|previous| (previous, items)))
            .await?;
        for (key, old) in previous {
            let new_value = items.get(&key).cloned();
            publish(&self.feed, &key, old, new_value);
        }
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), StoreError> {
        let keys = owned_keys(keys);
        for (key, old) in self.run(move |db| Self::remove_blocking(db, &keys)).await? {
            publish(&self.feed, &key, Some(old), None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.feed.subscribe()
    }
}
