//! Reconciliation Engine for TabKeeper.
//!
//! Mirrors live tab activity into the active session. Each event kind is
//! filtered on its own terms (restore in progress, internal pages, other
//! windows, interim updates), then matched against the stored records and
//! applied in one store transaction. Sessions that are not active are never
//! touched.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::managers::session_store::{session_mut, SessionStore};
use crate::managers::tab_matcher::{find_record_index, EventSource, Observation};
use crate::services::restore_gate::RestoreGate;
use crate::services::tab_platform::TabPlatform;
use crate::types::errors::{HostError, ReconcileError};
use crate::types::session::Session;
use crate::types::settings::EngineSettings;
use crate::types::tab::{ChangeInfo, LiveTab, TabEvent, TabHandle, TabRecord, WindowId};

/// Why an event was dropped before reaching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    Restoring,
    Placeholder,
    OtherWindow,
    InterimUpdate,
}

/// What one event did to the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Suppressed(SuppressReason),
    NoActiveSession,
    Appended { index: usize },
    Updated { index: usize },
    Removed { count: usize },
    Unchanged,
}

impl ReconcileOutcome {
    fn writes(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Appended { .. } | ReconcileOutcome::Updated { .. } | ReconcileOutcome::Removed { .. }
        )
    }
}

pub struct Reconciler {
    store: SessionStore,
    platform: Arc<dyn TabPlatform>,
    gate: RestoreGate,
    settings: Arc<EngineSettings>,
    current_window: Mutex<Option<WindowId>>,
}

impl Reconciler {
    pub fn new(
        store: SessionStore,
        platform: Arc<dyn TabPlatform>,
        gate: RestoreGate,
        settings: Arc<EngineSettings>,
    ) -> Self {
        Self {
            store,
            platform,
            gate,
            settings,
            current_window: Mutex::new(None),
        }
    }

    /// Pins the window whose events are mirrored. `None` re-reads it from the host on the next event.
    pub fn set_current_window(&self, window_id: Option<WindowId>) {
        if let Ok(mut current) = self.current_window.lock() {
            *current = window_id;
        }
    }

    /// Consumes the tab event feed serially until every sender is dropped.
    pub fn spawn_event_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TabEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let kind = event.kind();
                match self.handle_event(event).await {
                    Ok(outcome) => trace!(kind, ?outcome, "tab event reconciled"),
                    Err(e) => warn!(kind, error = %e, "autosave failed"),
                }
            }
            debug!("tab event feed closed");
        })
    }

    pub async fn handle_event(&self, event: TabEvent) -> Result<ReconcileOutcome, ReconcileError> {
        if self.gate.is_restoring() {
            return Ok(ReconcileOutcome::Suppressed(SuppressReason::Restoring));
        }
        match event {
            TabEvent::Created { tab } => self.on_created(tab).await,
            TabEvent::Activated { tab_id, window_id } => self.on_activated(tab_id, window_id).await,
            TabEvent::Updated { change, tab, .. } => self.on_updated(change, tab).await,
            TabEvent::Removed { tab_id, .. } => self.on_removed(tab_id).await,
        }
    }

    async fn on_created(&self, tab: LiveTab) -> Result<ReconcileOutcome, ReconcileError> {
        if let Some(reason) = self.screen(&tab).await? {
            return Ok(ReconcileOutcome::Suppressed(reason));
        }
        self.apply(move |records| {
            match find_record_index(records, Observation::from(&tab), EventSource::Created) {
                Some(m) => {
                    let record = &mut records[m.index];
                    record.id = Some(tab.id);
                    if !tab.url.is_empty() {
                        record.url = tab.url.clone();
                    }
                    (ReconcileOutcome::Updated { index: m.index }, None)
                }
                None => (append(records, &tab), None),
            }
        })
        .await
    }

    /// The only path that moves `lastActiveTabIndex`.
    async fn on_activated(&self, tab_id: TabHandle, window_id: WindowId) -> Result<ReconcileOutcome, ReconcileError> {
        if !self.is_current_window(window_id).await? {
            return Ok(ReconcileOutcome::Suppressed(SuppressReason::OtherWindow));
        }
        let tab = self.platform.get_tab(tab_id).await?;
        if self.settings.is_placeholder_url(&tab.url) {
            return Ok(ReconcileOutcome::Suppressed(SuppressReason::Placeholder));
        }
        self.apply(move |records| {
            let (outcome, index) =
                match find_record_index(records, Observation::from(&tab), EventSource::Activated) {
                    Some(m) => {
                        records[m.index].id = Some(tab.id);
                        (ReconcileOutcome::Updated { index: m.index }, m.index)
                    }
                    None => {
                        records.push(TabRecord::from(&tab));
                        let index = records.len() - 1;
                        (ReconcileOutcome::Appended { index }, index)
                    }
                };
            mark_active(records, index);
            (outcome, Some(index))
        })
        .await
    }

    async fn on_updated(&self, change: ChangeInfo, tab: LiveTab) -> Result<ReconcileOutcome, ReconcileError> {
        if !change.is_meaningful() {
            return Ok(ReconcileOutcome::Suppressed(SuppressReason::InterimUpdate));
        }
        if let Some(reason) = self.screen(&tab).await? {
            return Ok(ReconcileOutcome::Suppressed(reason));
        }
        self.apply(move |records| {
            let Some(m) = find_record_index(records, Observation::from(&tab), EventSource::Updated) else {
                return (append(records, &tab), None);
            };
            let record = &mut records[m.index];
            if let Some(url) = change.url.as_ref().filter(|u| !u.is_empty()) {
                record.url = url.clone();
            }
            if let Some(title) = change.title.as_ref().filter(|t| !t.is_empty()) {
                record.title = title.clone();
            }
            if let Some(favicon) = change.fav_icon_url.as_ref().filter(|f| !f.is_empty()) {
                record.favicon = favicon.clone();
            }
            record.id = Some(tab.id);
            if change.is_complete() {
                if tab.active {
                    mark_active(records, m.index);
                } else {
                    record.active = false;
                }
            }
            (ReconcileOutcome::Updated { index: m.index }, None)
        })
        .await
    }

    /// Identity-exact: records sharing the closed tab's URL are left alone.
    async fn on_removed(&self, tab_id: TabHandle) -> Result<ReconcileOutcome, ReconcileError> {
        self.apply(move |records| {
            let before = records.len();
            records.retain(|r| r.id != Some(tab_id));
            match before - records.len() {
                0 => (ReconcileOutcome::Unchanged, None),
                count => (ReconcileOutcome::Removed { count }, None),
            }
        })
        .await
    }

    /// Shared filters for events that carry a full tab.
    async fn screen(&self, tab: &LiveTab) -> Result<Option<SuppressReason>, HostError> {
        if self.settings.is_placeholder_url(&tab.url) {
            return Ok(Some(SuppressReason::Placeholder));
        }
        if !self.is_current_window(tab.window_id).await? {
            return Ok(Some(SuppressReason::OtherWindow));
        }
        Ok(None)
    }

    async fn is_current_window(&self, window_id: WindowId) -> Result<bool, HostError> {
        let cached = self.current_window.lock().ok().and_then(|w| *w);
        let current = match cached {
            Some(id) => id,
            None => {
                let id = self.platform.get_current_window().await?;
                self.set_current_window(Some(id));
                id
            }
        };
        Ok(current == window_id)
    }

    /// Runs `mutate` on the active session's records inside one store transaction.
    ///
    /// The restore gate is checked again under the transaction: the orchestrator
    /// closes the gate and then waits on the same lock, so no write that starts
    /// after a restore begins can land.
    async fn apply<F>(&self, mutate: F) -> Result<ReconcileOutcome, ReconcileError>
    where
        F: FnOnce(&mut Session) -> (ReconcileOutcome, Option<usize>) + Send,
    {
        let txn = self.store.transaction().await;
        if self.gate.is_restoring() {
            return Ok(ReconcileOutcome::Suppressed(SuppressReason::Restoring));
        }
        let Some((pointer, mut folders)) = txn.active_folders().await? else {
            return Ok(ReconcileOutcome::NoActiveSession);
        };
        let Some(records) = session_mut(&mut folders, &pointer) else {
            return Ok(ReconcileOutcome::NoActiveSession);
        };

        let (outcome, last_active) = mutate(records);
        if outcome.writes() {
            txn.save_folders(&folders).await?;
        }
        if let Some(index) = last_active {
            txn.set_last_active_tab_index(index).await?;
        }
        debug!(folder = %pointer.folder, session = %pointer.session, ?outcome, "active session updated");
        Ok(outcome)
    }
}

fn append(records: &mut Session, tab: &LiveTab) -> ReconcileOutcome {
    records.push(TabRecord::from(tab));
    let index = records.len() - 1;
    if tab.active {
        mark_active(records, index);
    }
    ReconcileOutcome::Appended { index }
}

/// Keeps at most one record flagged active.
fn mark_active(records: &mut Session, index: usize) {
    for (i, record) in records.iter_mut().enumerate() {
        record.active = i == index;
    }
}
