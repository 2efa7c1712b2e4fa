//! TabKeeper persistence substrate.
//!
//! An asynchronous key-value store with a change feed, in two flavours:
//! [`SqliteStore`] for durable state and [`MemoryStore`] for tests.
//!
//! # Usage
//!
//! ```no_run
//! use tabkeeper::database::{KeyValueStore, SqliteStore};
//!
//! let store = SqliteStore::open("tabkeeper.db").expect("failed to open store");
//! let mut feed = store.subscribe();
//! ```

pub mod connection;
pub mod kv;
pub mod migrations;
pub mod sqlite_store;

pub use connection::Database;
pub use kv::{KeyValueStore, MemoryStore, StorageChange, StorageMap};
pub use sqlite_store::SqliteStore;
