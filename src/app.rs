//! App Core for TabKeeper.
//!
//! Wires the session store, reconciler and restore orchestrator around one
//! key-value substrate and one tab platform, and runs the startup restore.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::database::kv::KeyValueStore;
use crate::database::sqlite_store::SqliteStore;
use crate::managers::session_store::SessionStore;
use crate::services::reconciler::Reconciler;
use crate::services::restore::{RestoreOrchestrator, RestoreOutcome};
use crate::services::restore_gate::RestoreGate;
use crate::services::tab_platform::TabPlatform;
use crate::types::errors::{CommandError, RestoreError, StoreError};
use crate::types::settings::EngineSettings;
use crate::types::tab::{favicon_fallback, TabEvent, TabQuery, TabRecord};

/// Central struct holding the engine's components.
pub struct App {
    pub settings: Arc<EngineSettings>,
    pub store: SessionStore,
    pub platform: Arc<dyn TabPlatform>,
    pub reconciler: Arc<Reconciler>,
    pub orchestrator: RestoreOrchestrator,
    startup_restore_ran: AtomicBool,
}

impl App {
    pub fn new(kv: Arc<dyn KeyValueStore>, platform: Arc<dyn TabPlatform>, settings: EngineSettings) -> Self {
        let settings = Arc::new(settings);
        let store = SessionStore::new(kv);
        let gate = RestoreGate::new(Duration::from_millis(settings.restore_settle_ms));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::clone(&platform),
            gate.clone(),
            Arc::clone(&settings),
        ));
        let orchestrator = RestoreOrchestrator::new(store.clone(), Arc::clone(&platform), gate, Arc::clone(&settings));

        Self {
            settings,
            store,
            platform,
            reconciler,
            orchestrator,
            startup_restore_ran: AtomicBool::new(false),
        }
    }

    /// Opens the SQLite-backed store at `db_path`.
    pub fn open<P: AsRef<Path>>(
        db_path: P,
        platform: Arc<dyn TabPlatform>,
        settings: EngineSettings,
    ) -> Result<Self, StoreError> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
        Ok(Self::new(kv, platform, settings))
    }

    /// Starts mirroring the given tab event feed into the active session.
    pub fn attach_event_feed(&self, events: mpsc::UnboundedReceiver<TabEvent>) -> JoinHandle<()> {
        Arc::clone(&self.reconciler).spawn_event_loop(events)
    }

    /// Startup sequence: ensure the default folder, wait for the browser to
    /// settle, then restore the last active session.
    pub async fn startup(&self) -> Result<Option<RestoreOutcome>, RestoreError> {
        if let Err(e) = self.store.create_folder(&self.settings.default_folder).await {
            warn!(folder = %self.settings.default_folder, error = %e, "could not ensure default folder");
        }
        tokio::time::sleep(Duration::from_millis(self.settings.startup_restore_delay_ms)).await;
        self.try_restore_last_session().await
    }

    /// Restores the active session once per process. Later calls return `None`.
    pub async fn try_restore_last_session(&self) -> Result<Option<RestoreOutcome>, RestoreError> {
        if self.startup_restore_ran.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        let Some(active) = self.store.get_active_session().await? else {
            return Ok(None);
        };
        info!(folder = %active.folder, session = %active.session, "restoring last session");
        self.orchestrator
            .restore(&active.folder, &active.session, true)
            .await
            .map(Some)
    }

    /// Snapshots the current window into `(folder, session)`. Returns the record count.
    pub async fn save_current_session(&self, folder: &str, session: &str) -> Result<usize, CommandError> {
        let window_id = self.platform.get_current_window().await?;
        let tabs = self.platform.query_tabs(&TabQuery::window(window_id)).await?;
        let records: Vec<TabRecord> = tabs
            .iter()
            .map(|tab| {
                let mut record = TabRecord::from(tab);
                if record.favicon.is_empty() {
                    record.favicon = favicon_fallback(&self.settings.favicon_service, &tab.url);
                }
                record
            })
            .collect();
        let count = records.len();
        self.store.save_session(folder, session, records).await?;
        info!(folder, session, tabs = count, "session saved from window");
        Ok(count)
    }
}
