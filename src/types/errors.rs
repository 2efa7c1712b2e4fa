use thiserror::Error;

use super::tab::{TabHandle, WindowId};

// === StoreError ===

/// Failures of the key-value persistence substrate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite backend rejected a statement.
    #[error("Store database error: {0}")]
    Database(String),
    /// A stored value could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

// === SessionError ===

/// Errors raised by folder/session commands on the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The target of a delete is the active session (or the folder holding it).
    #[error("Cannot delete active target: {folder}/{}", .session.as_deref().unwrap_or("*"))]
    ActiveTargetBlocked {
        folder: String,
        session: Option<String>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Stable code reported to the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::ActiveTargetBlocked { session: Some(_), .. } => {
                "ACTIVE_SESSION_DELETE_BLOCKED"
            }
            SessionError::ActiveTargetBlocked { session: None, .. } => "ACTIVE_FOLDER_DELETE_BLOCKED",
            SessionError::Store(_) => "STORE_ERROR",
        }
    }
}

// === HostError ===

/// A tab platform call was rejected by the browser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Tab not found: {0}")]
    TabNotFound(TabHandle),
    #[error("Window not found: {0}")]
    WindowNotFound(WindowId),
    #[error("No current window")]
    NoCurrentWindow,
    #[error("Host rejected call: {0}")]
    Rejected(String),
    /// The host did not answer a bridged call in time.
    #[error("Host call timed out after {0} ms")]
    Timeout(u64),
    /// The channel to the host is gone.
    #[error("Host disconnected")]
    Disconnected,
}

// === ReconcileError ===

/// Failures while applying one tab event to the active session.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Host(#[from] HostError),
}

// === RestoreError ===

/// Failures that stop a restore or create-and-switch before it reaches the window.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Another restore holds the suspension gate.
    #[error("A restore is already in progress")]
    AlreadyRestoring,
    /// A new session was requested under a name that is already stored.
    #[error("Session already exists: {folder}/{session}")]
    SessionExists { folder: String, session: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl RestoreError {
    pub fn code(&self) -> &'static str {
        match self {
            RestoreError::AlreadyRestoring => "RESTORE_IN_PROGRESS",
            RestoreError::SessionExists { .. } => "SESSION_ALREADY_EXISTS",
            RestoreError::Store(_) => "STORE_ERROR",
            RestoreError::Host(_) => "HOST_ERROR",
        }
    }
}

// === CommandError ===

/// Errors at the command boundary between the presentation layer and the engine.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No response was produced within the command timeout.
    #[error("Command timed out after {0} ms")]
    Timeout(u64),
    /// The message could not be decoded into a known command.
    #[error("Invalid command message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Host(#[from] HostError),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Timeout(_) => "TIMEOUT",
            CommandError::InvalidMessage(_) => "INVALID_MESSAGE",
            CommandError::Session(e) => e.code(),
            CommandError::Restore(e) => e.code(),
            CommandError::Store(_) => "STORE_ERROR",
            CommandError::Host(_) => "HOST_ERROR",
        }
    }
}

// === SettingsError ===

/// Errors related to loading and saving engine settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// File system error when reading or writing the settings file.
    #[error("Settings IO error: {0}")]
    IoError(String),
    /// Settings could not be parsed or serialized.
    #[error("Settings serialization error: {0}")]
    SerializationError(String),
    /// The requested setting key does not exist.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The value does not fit the setting's type.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}
