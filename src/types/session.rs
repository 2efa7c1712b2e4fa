use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::tab::TabRecord;

/// Ordered tab records. Order is tab position at save/restore time.
pub type Session = Vec<TabRecord>;

/// All folders keyed by name, as persisted under the `folders` key.
pub type Folders = BTreeMap<String, Folder>;

/// A named group of sessions. May be empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Folder {
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
}

/// Names the single session mirrored against live tabs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActiveSessionPointer {
    pub folder: String,
    pub session: String,
}

impl ActiveSessionPointer {
    pub fn new(folder: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            session: session.into(),
        }
    }

    pub fn targets(&self, folder: &str, session: &str) -> bool {
        self.folder == folder && self.session == session
    }
}
