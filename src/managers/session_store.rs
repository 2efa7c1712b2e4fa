//! Session Store for TabKeeper.
//!
//! Typed accessors over the key-value substrate. Owns the persisted layout:
//!
//! ```text
//! folders:            { <folder>: { sessions: { <session>: [TabRecord] } } }
//! activeSession:      { folder, session }
//! lastActiveTabIndex: <integer>
//! ```
//!
//! Every read-modify-write goes through a [`StoreTxn`], which serializes writers
//! inside this process so interleaved event handlers and commands cannot lose
//! each other's updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::database::kv::{KeyValueStore, StorageMap};
use crate::types::errors::{SessionError, StoreError};
use crate::types::session::{ActiveSessionPointer, Folder, Folders, Session};
use crate::types::tab::TabRecord;

pub const FOLDERS_KEY: &str = "folders";
pub const ACTIVE_SESSION_KEY: &str = "activeSession";
pub const LAST_ACTIVE_TAB_INDEX_KEY: &str = "lastActiveTabIndex";

#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

/// Exclusive read-modify-write window over the store.
pub struct StoreTxn<'a> {
    kv: &'a dyn KeyValueStore,
    _guard: MutexGuard<'a, ()>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying substrate, e.g. to subscribe to its change feed.
    pub fn substrate(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Waits for the in-flight writer, if any, and holds off all others until dropped.
    pub async fn transaction(&self) -> StoreTxn<'_> {
        let guard = self.write_lock.lock().await;
        StoreTxn {
            kv: self.kv.as_ref(),
            _guard: guard,
        }
    }

    /// Returns once every write that started before this call has finished.
    pub async fn write_barrier(&self) {
        drop(self.write_lock.lock().await);
    }

    pub async fn get_all_folders(&self) -> Result<Folders, StoreError> {
        read_folders(self.kv.as_ref()).await
    }

    pub async fn get_folders(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.get_all_folders().await?.into_keys().collect())
    }

    /// Creates the folder if absent. Existing folders are left untouched.
    pub async fn create_folder(&self, name: &str) -> Result<(), StoreError> {
        let txn = self.transaction().await;
        let mut folders = txn.folders().await?;
        if folders.contains_key(name) {
            return Ok(());
        }
        folders.insert(name.to_string(), Folder::default());
        txn.save_folders(&folders).await?;
        debug!(folder = name, "folder created");
        Ok(())
    }

    /// Upserts a full record list, creating the folder when needed.
    pub async fn save_session(
        &self,
        folder: &str,
        session: &str,
        tabs: Vec<TabRecord>,
    ) -> Result<(), StoreError> {
        let txn = self.transaction().await;
        let mut folders = txn.folders().await?;
        folders
            .entry(folder.to_string())
            .or_default()
            .sessions
            .insert(session.to_string(), tabs);
        txn.save_folders(&folders).await
    }

    /// Sessions in `folder`, or an empty map when the folder is absent.
    pub async fn get_sessions_in_folder(
        &self,
        folder: &str,
    ) -> Result<BTreeMap<String, Session>, StoreError> {
        let mut folders = self.get_all_folders().await?;
        Ok(folders.remove(folder).map(|f| f.sessions).unwrap_or_default())
    }

    pub async fn get_session(&self, folder: &str, session: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.get_sessions_in_folder(folder).await?.remove(session))
    }

    /// Removes a session unless it is the active one.
    pub async fn delete_session(&self, folder: &str, session: &str) -> Result<(), SessionError> {
        let txn = self.transaction().await;
        if let Some(active) = txn.active_session().await? {
            if active.targets(folder, session) {
                return Err(SessionError::ActiveTargetBlocked {
                    folder: folder.to_string(),
                    session: Some(session.to_string()),
                });
            }
        }

        let mut folders = txn.folders().await?;
        let removed = folders
            .get_mut(folder)
            .and_then(|f| f.sessions.remove(session))
            .is_some();
        if removed {
            txn.save_folders(&folders).await?;
            debug!(folder, session, "session deleted");
        }
        Ok(())
    }

    /// Removes a folder unless the active session lives in it.
    pub async fn delete_folder(&self, folder: &str) -> Result<(), SessionError> {
        let txn = self.transaction().await;
        if let Some(active) = txn.active_session().await? {
            if active.folder == folder {
                return Err(SessionError::ActiveTargetBlocked {
                    folder: folder.to_string(),
                    session: None,
                });
            }
        }

        let mut folders = txn.folders().await?;
        if folders.remove(folder).is_some() {
            txn.save_folders(&folders).await?;
            debug!(folder, "folder deleted");
        }
        Ok(())
    }

    /// Overwrites the active session pointer.
    pub async fn set_active_session(&self, folder: &str, session: &str) -> Result<(), StoreError> {
        let txn = self.transaction().await;
        txn.set_active_session(&ActiveSessionPointer::new(folder, session))
            .await
    }

    pub async fn get_active_session(&self) -> Result<Option<ActiveSessionPointer>, StoreError> {
        read_active_session(self.kv.as_ref()).await
    }

    pub async fn get_last_active_tab_index(&self) -> Result<Option<usize>, StoreError> {
        let data = self.kv.get(&[LAST_ACTIVE_TAB_INDEX_KEY]).await?;
        Ok(data
            .get(LAST_ACTIVE_TAB_INDEX_KEY)
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok()))
    }

    pub async fn set_last_active_tab_index(&self, index: usize) -> Result<(), StoreError> {
        let txn = self.transaction().await;
        txn.set_last_active_tab_index(index).await
    }
}

impl StoreTxn<'_> {
    pub async fn folders(&self) -> Result<Folders, StoreError> {
        read_folders(self.kv).await
    }

    pub async fn save_folders(&self, folders: &Folders) -> Result<(), StoreError> {
        let mut items = StorageMap::new();
        items.insert(FOLDERS_KEY.to_string(), serde_json::to_value(folders)?);
        self.kv.set(items).await
    }

    pub async fn active_session(&self) -> Result<Option<ActiveSessionPointer>, StoreError> {
        read_active_session(self.kv).await
    }

    pub async fn set_active_session(&self, pointer: &ActiveSessionPointer) -> Result<(), StoreError> {
        let mut items = StorageMap::new();
        items.insert(ACTIVE_SESSION_KEY.to_string(), serde_json::to_value(pointer)?);
        self.kv.set(items).await
    }

    pub async fn set_last_active_tab_index(&self, index: usize) -> Result<(), StoreError> {
        let mut items = StorageMap::new();
        items.insert(LAST_ACTIVE_TAB_INDEX_KEY.to_string(), Value::from(index as u64));
        self.kv.set(items).await
    }

    /// Loads the folders together with the active pointer, when that pointer resolves
    /// to an existing session. A dangling pointer reads as "no session".
    pub async fn active_folders(&self) -> Result<Option<(ActiveSessionPointer, Folders)>, StoreError> {
        let Some(active) = self.active_session().await? else {
            return Ok(None);
        };
        let folders = self.folders().await?;
        let exists = folders
            .get(&active.folder)
            .is_some_and(|f| f.sessions.contains_key(&active.session));
        if !exists {
            return Ok(None);
        }
        Ok(Some((active, folders)))
    }
}

async fn read_folders(kv: &dyn KeyValueStore) -> Result<Folders, StoreError> {
    let data = kv.get(&[FOLDERS_KEY]).await?;
    match data.get(FOLDERS_KEY) {
        Some(Value::Null) | None => Ok(Folders::new()),
        Some(value) => Ok(serde_json::from_value(value.clone())?),
    }
}

async fn read_active_session(kv: &dyn KeyValueStore) -> Result<Option<ActiveSessionPointer>, StoreError> {
    let data = kv.get(&[ACTIVE_SESSION_KEY]).await?;
    let Some(value) = data.get(ACTIVE_SESSION_KEY) else {
        return Ok(None);
    };
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match (field("folder"), field("session")) {
        (Some(folder), Some(session)) => Ok(Some(ActiveSessionPointer { folder, session })),
        _ => Ok(None),
    }
}

/// Looks up the active session's records inside a loaded folder map.
pub fn session_mut<'f>(folders: &'f mut Folders, pointer: &ActiveSessionPointer) -> Option<&'f mut Session> {
    folders
        .get_mut(&pointer.folder)
        .and_then(|f| f.sessions.get_mut(&pointer.session))
}
