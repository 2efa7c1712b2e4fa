//! Unit tests for the SessionStore: folder/session CRUD, the active pointer
//! and the activation index, over an in-memory substrate.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use tabkeeper::database::{KeyValueStore, MemoryStore, SqliteStore, StorageMap};
use tabkeeper::managers::session_store::{
    SessionStore, ACTIVE_SESSION_KEY, FOLDERS_KEY, LAST_ACTIVE_TAB_INDEX_KEY,
};
use tabkeeper::types::errors::SessionError;
use tabkeeper::types::session::ActiveSessionPointer;
use tabkeeper::types::tab::TabRecord;

fn setup() -> (SessionStore, Arc<dyn KeyValueStore>) {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    (SessionStore::new(Arc::clone(&kv)), kv)
}

fn record(id: i64, url: &str) -> TabRecord {
    TabRecord {
        id: Some(id),
        ..TabRecord::unbound(url, url)
    }
}

async fn put_raw(kv: &Arc<dyn KeyValueStore>, key: &str, value: serde_json::Value) {
    let mut items = StorageMap::new();
    items.insert(key.to_string(), value);
    kv.set(items).await.unwrap();
}

// ─── Folders ───

#[tokio::test]
async fn test_create_folder_is_idempotent() {
    let (store, _kv) = setup();
    store.create_folder("work").await.unwrap();
    store
        .save_session("work", "monday", vec![record(1, "https://a.dev")])
        .await
        .unwrap();

    store.create_folder("work").await.unwrap();

    let sessions = store.get_sessions_in_folder("work").await.unwrap();
    assert_eq!(sessions.len(), 1, "re-creating a folder must not clear it");
    assert_eq!(store.get_folders().await.unwrap(), vec!["work".to_string()]);
}

#[tokio::test]
async fn test_missing_folder_reads_as_empty() {
    let (store, _kv) = setup();
    assert!(store.get_sessions_in_folder("nowhere").await.unwrap().is_empty());
    assert_eq!(store.get_session("nowhere", "x").await.unwrap(), None);
    assert!(store.get_all_folders().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_save_session_creates_folder_and_upserts() {
    let (store, _kv) = setup();
    store
        .save_session("work", "monday", vec![record(1, "https://a.dev")])
        .await
        .unwrap();
    store
        .save_session(
            "work",
            "monday",
            vec![record(2, "https://b.dev"), record(3, "https://c.dev")],
        )
        .await
        .unwrap();

    let session = store.get_session("work", "monday").await.unwrap().unwrap();
    assert_eq!(session.len(), 2);
    assert_eq!(session[0].url, "https://b.dev");
}

#[tokio::test]
async fn test_stored_records_normalize_missing_fields() {
    let (store, kv) = setup();
    put_raw(
        &kv,
        FOLDERS_KEY,
        json!({"work": {"sessions": {"s": [{"url": "https://a.dev"}, {}]}}, "empty": {}}),
    )
    .await;

    let session = store.get_session("work", "s").await.unwrap().unwrap();
    assert_eq!(session[0], TabRecord::unbound("https://a.dev", ""));
    assert_eq!(session[1], TabRecord::default());
    assert!(store.get_sessions_in_folder("empty").await.unwrap().is_empty());
}

// ─── Active pointer ───

#[tokio::test]
async fn test_active_session_round_trip_and_overwrite() {
    let (store, _kv) = setup();
    assert_eq!(store.get_active_session().await.unwrap(), None);

    store.set_active_session("work", "monday").await.unwrap();
    store.set_active_session("home", "sunday").await.unwrap();

    assert_eq!(
        store.get_active_session().await.unwrap(),
        Some(ActiveSessionPointer::new("home", "sunday"))
    );
}

#[tokio::test]
async fn test_active_session_with_empty_field_reads_as_none() {
    let (store, kv) = setup();
    put_raw(&kv, ACTIVE_SESSION_KEY, json!({"folder": "work", "session": ""})).await;
    assert_eq!(store.get_active_session().await.unwrap(), None);

    put_raw(&kv, ACTIVE_SESSION_KEY, json!({"folder": "work"})).await;
    assert_eq!(store.get_active_session().await.unwrap(), None);
}

// ─── Deletes ───

#[tokio::test]
async fn test_delete_inactive_session_and_folder() {
    let (store, _kv) = setup();
    store.save_session("work", "a", vec![]).await.unwrap();
    store.save_session("work", "b", vec![]).await.unwrap();
    store.save_session("old", "x", vec![]).await.unwrap();
    store.set_active_session("work", "a").await.unwrap();

    store.delete_session("work", "b").await.unwrap();
    store.delete_folder("old").await.unwrap();

    let folders = store.get_all_folders().await.unwrap();
    assert_eq!(folders.keys().collect::<Vec<_>>(), vec!["work"]);
    assert!(folders["work"].sessions.contains_key("a"));
    assert!(!folders["work"].sessions.contains_key("b"));
}

#[tokio::test]
async fn test_delete_active_targets_is_blocked() {
    let (store, _kv) = setup();
    store.save_session("work", "a", vec![record(1, "https://a.dev")]).await.unwrap();
    store.save_session("work", "b", vec![]).await.unwrap();
    store.set_active_session("work", "a").await.unwrap();
    let before = store.get_all_folders().await.unwrap();

    let err = store.delete_session("work", "a").await.unwrap_err();
    assert_eq!(err.code(), "ACTIVE_SESSION_DELETE_BLOCKED");
    let err = store.delete_folder("work").await.unwrap_err();
    assert!(matches!(err, SessionError::ActiveTargetBlocked { session: None, .. }));

    assert_eq!(store.get_all_folders().await.unwrap(), before);
    assert_eq!(
        store.get_active_session().await.unwrap(),
        Some(ActiveSessionPointer::new("work", "a"))
    );
}

#[tokio::test]
async fn test_delete_missing_targets_succeeds() {
    let (store, _kv) = setup();
    store.delete_session("ghost", "none").await.unwrap();
    store.delete_folder("ghost").await.unwrap();
}

// ─── Activation index ───

#[tokio::test]
async fn test_last_active_tab_index_round_trip() {
    let (store, _kv) = setup();
    assert_eq!(store.get_last_active_tab_index().await.unwrap(), None);
    store.set_last_active_tab_index(4).await.unwrap();
    assert_eq!(store.get_last_active_tab_index().await.unwrap(), Some(4));
}

#[tokio::test]
async fn test_unusable_last_active_tab_index_reads_as_none() {
    let (store, kv) = setup();
    let mut cases = vec![json!(-1), json!("2"), json!(1.5)];
    if usize::BITS < 64 {
        cases.push(json!(u64::MAX));
    }
    for value in cases {
        let mut items = StorageMap::new();
        items.insert(LAST_ACTIVE_TAB_INDEX_KEY.to_string(), value.clone());
        kv.set(items).await.unwrap();
        assert_eq!(store.get_last_active_tab_index().await.unwrap(), None, "stored {}", value);
    }
}

// ─── Transactions ───

#[tokio::test]
async fn test_dangling_pointer_reads_as_no_active_session() {
    let (store, _kv) = setup();
    store.set_active_session("work", "gone").await.unwrap();

    let txn = store.transaction().await;
    assert!(txn.active_folders().await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_saves_do_not_lose_updates() {
    let (store, _kv) = setup();
    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .save_session("work", &format!("s{}", i), vec![])
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get_sessions_in_folder("work").await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_store_over_sqlite_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tabkeeper.db");
    {
        let store = SessionStore::new(Arc::new(SqliteStore::open(&path).unwrap()));
        store
            .save_session("work", "monday", vec![record(1, "https://a.dev")])
            .await
            .unwrap();
        store.set_active_session("work", "monday").await.unwrap();
    }

    let store = SessionStore::new(Arc::new(SqliteStore::open(&path).unwrap()));
    assert_eq!(
        store.get_active_session().await.unwrap(),
        Some(ActiveSessionPointer::new("work", "monday"))
    );
    assert_eq!(store.get_session("work", "monday").await.unwrap().unwrap().len(), 1);
}
