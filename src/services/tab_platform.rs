//! The browser's window/tab management surface, as seen by the engine.

use async_trait::async_trait;

use crate::types::errors::HostError;
use crate::types::tab::{CreateProperties, LiveTab, TabHandle, TabQuery, UpdateProperties, WindowId};

/// Host tab API. Every call may be rejected, e.g. when the tab is already gone.
///
/// `HostBridge` forwards calls to the client of `tabkeeper-rpc`; `SimulatedBrowser`
/// is the in-process host used by tests and `--simulated` runs.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// Tabs matching `query`, in window order.
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<LiveTab>, HostError>;

    async fn get_tab(&self, tab_id: TabHandle) -> Result<LiveTab, HostError>;

    async fn create_tab(&self, props: CreateProperties) -> Result<LiveTab, HostError>;

    async fn update_tab(&self, tab_id: TabHandle, props: UpdateProperties) -> Result<LiveTab, HostError>;

    async fn move_tab(&self, tab_id: TabHandle, index: usize) -> Result<LiveTab, HostError>;

    async fn remove_tabs(&self, tab_ids: &[TabHandle]) -> Result<(), HostError>;

    /// The window commands and restores operate on.
    async fn get_current_window(&self) -> Result<WindowId, HostError>;
}
