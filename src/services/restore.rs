//! Restore Orchestrator for TabKeeper.
//!
//! Replaces a window's tabs with a stored session:
//!
//! 1. no-op when the session is already active (unless forced)
//! 2. close the restore gate so the reconciler ignores the churn
//! 3. load the stored records
//! 4. establish the anchor tab, then close every other tab
//! 5. recreate the session's tabs in order, rebinding records to the new handles
//! 6. focus the remembered tab and point the active session at the restored one
//!
//! Host-call failures past step 3 are logged and skipped; the gate reopens on
//! every exit path when the guard drops.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::managers::session_store::SessionStore;
use crate::managers::tab_matcher::{find_record_index, EventSource, Observation};
use crate::services::restore_gate::RestoreGate;
use crate::services::tab_platform::TabPlatform;
use crate::types::errors::RestoreError;
use crate::types::session::Session;
use crate::types::settings::{AnchorMode, EngineSettings};
use crate::types::tab::{CreateProperties, LiveTab, TabHandle, TabQuery, UpdateProperties, WindowId};

/// Result of a `restore` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The session was already active and `force` was not set.
    AlreadyActive,
    Restored(RestoreReport),
}

/// What a completed restore did to the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub window_id: WindowId,
    pub anchor_tab: Option<TabHandle>,
    /// Handles of the session's tabs, in record order.
    pub tabs: Vec<TabHandle>,
    /// Records dropped because their URL is empty or an internal page.
    pub skipped: usize,
    /// Host calls that were rejected along the way.
    pub failures: usize,
    /// Position within `tabs` that received focus.
    pub focused_index: Option<usize>,
}

impl RestoreReport {
    pub fn is_partial(&self) -> bool {
        self.failures > 0
    }
}

/// Result of `create_and_switch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchReport {
    pub window_id: WindowId,
    pub anchor_tab: Option<TabHandle>,
    pub failures: usize,
}

pub struct RestoreOrchestrator {
    store: SessionStore,
    platform: Arc<dyn TabPlatform>,
    gate: RestoreGate,
    settings: Arc<EngineSettings>,
}

impl RestoreOrchestrator {
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
        }
    }

    pub fn gate(&self) -> &RestoreGate {
        &self.gate
    }

    /// Tears down the current window and rebuilds it from `(folder, session)`.
    pub async fn restore(&self, folder: &str, session: &str, force: bool) -> Result<RestoreOutcome, RestoreError> {
        if !force && self.is_active(folder, session).await? {
            info!(folder, session, "session already active, restore skipped");
            return Ok(RestoreOutcome::AlreadyActive);
        }

        let Some(_guard) = self.gate.try_acquire() else {
            warn!(folder, session, "restore requested while another restore is running");
            return Err(RestoreError::AlreadyRestoring);
        };
        self.store.write_barrier().await;

        let restore_id = Uuid::new_v4();
        info!(%restore_id, folder, session, force, "restore started");

        let stored = self.store.get_session(folder, session).await?;
        let existed = stored.is_some();
        let stored = stored.unwrap_or_default();
        let window_id = self.platform.get_current_window().await?;
        let mut report = RestoreReport {
            window_id,
            ..RestoreReport::default()
        };

        let existing = self.window_tabs(window_id, &mut report.failures).await;
        report.anchor_tab = self.establish_anchor(window_id, &existing, &mut report.failures).await;
        self.close_all_but(&existing, report.anchor_tab, &mut report.failures).await;

        let (mut records, skipped): (Session, Session) = stored
            .into_iter()
            .partition(|r| self.settings.is_restorable_url(&r.url));
        report.skipped = skipped.len();

        if records.is_empty() {
            self.open_placeholder(window_id, report.anchor_tab, &mut report.failures)
                .await;
            // An absent session becomes an empty one so the pointer never dangles.
            if !existed {
                if let Err(e) = self.store.save_session(folder, session, Session::new()).await {
                    warn!(%restore_id, error = %e, "could not create empty session");
                    report.failures += 1;
                }
            }
        } else {
            for record in records.iter_mut() {
                record.id = None;
                record.active = false;
            }
            let mut reuse_anchor = match self.settings.anchor {
                AnchorMode::FirstTab => report.anchor_tab,
                AnchorMode::HomeTab => None,
            };
            let mut opened: Vec<LiveTab> = Vec::with_capacity(records.len());
            for record in &records {
                let result = match reuse_anchor.take() {
                    Some(anchor) => {
                        self.platform
                            .update_tab(anchor, UpdateProperties::navigate(record.url.clone()))
                            .await
                    }
                    None => {
                        self.platform
                            .create_tab(CreateProperties::background(record.url.clone(), window_id))
                            .await
                    }
                };
                match result {
                    Ok(mut tab) => {
                        // The host may report a redirected or pending URL; bind by what was requested.
                        tab.url = record.url.clone();
                        opened.push(tab);
                    }
                    Err(e) => {
                        warn!(%restore_id, url = %record.url, error = %e, "tab creation rejected");
                        report.failures += 1;
                    }
                }
            }

            for tab in &opened {
                if let Some(m) = find_record_index(&records, Observation::from(tab), EventSource::RestoreRebind) {
                    records[m.index].id = Some(tab.id);
                }
            }
            report.tabs = opened.iter().map(|t| t.id).collect();

            if !opened.is_empty() {
                let remembered = match self.store.get_last_active_tab_index().await {
                    Ok(index) => index.unwrap_or(0),
                    Err(e) => {
                        warn!(%restore_id, error = %e, "could not read last active index");
                        0
                    }
                };
                let focus = remembered.min(opened.len() - 1);
                let focus_id = opened[focus].id;
                match self.platform.update_tab(focus_id, UpdateProperties::focus()).await {
                    Ok(_) => report.focused_index = Some(focus),
                    Err(e) => {
                        warn!(%restore_id, tab_id = focus_id, error = %e, "could not focus restored tab");
                        report.failures += 1;
                    }
                }
                if let Some(record) = records.iter_mut().find(|r| r.id == Some(focus_id)) {
                    record.active = true;
                }
            }

            if let Err(e) = self.store.save_session(folder, session, records).await {
                warn!(%restore_id, error = %e, "could not persist restored bindings");
                report.failures += 1;
            }
        }

        self.store.set_active_session(folder, session).await?;
        info!(
            %restore_id,
            folder,
            session,
            tabs = report.tabs.len(),
            skipped = report.skipped,
            failures = report.failures,
            "restore finished"
        );
        Ok(RestoreOutcome::Restored(report))
    }

    /// Clears the window down to one placeholder tab and makes a new empty
    /// session `(folder, session)` active.
    ///
    /// An existing session of that name is left alone and the call fails with
    /// [`RestoreError::SessionExists`] before the window is touched.
    pub async fn create_and_switch(&self, folder: &str, session: &str) -> Result<SwitchReport, RestoreError> {
        if self.store.get_session(folder, session).await?.is_some() {
            warn!(folder, session, "switch target already exists");
            return Err(RestoreError::SessionExists {
                folder: folder.to_string(),
                session: session.to_string(),
            });
        }
        let Some(_guard) = self.gate.try_acquire() else {
            warn!(folder, session, "switch requested while a restore is running");
            return Err(RestoreError::AlreadyRestoring);
        };
        self.store.write_barrier().await;

        let window_id = self.platform.get_current_window().await?;
        let mut failures = 0;
        let existing = self.window_tabs(window_id, &mut failures).await;
        let anchor = self.establish_anchor(window_id, &existing, &mut failures).await;
        self.close_all_but(&existing, anchor, &mut failures).await;
        let placeholder = self.open_placeholder(window_id, anchor, &mut failures).await;

        self.store.save_session(folder, session, Session::new()).await?;
        self.store.set_active_session(folder, session).await?;
        info!(folder, session, failures, "switched to new session");

        let anchor_tab = match self.settings.anchor {
            AnchorMode::HomeTab => anchor.or(placeholder),
            AnchorMode::FirstTab => placeholder.or(anchor),
        };
        Ok(SwitchReport {
            window_id,
            anchor_tab,
            failures,
        })
    }

    /// Whether `(folder, session)` is the active session.
    pub async fn is_active(&self, folder: &str, session: &str) -> Result<bool, RestoreError> {
        Ok(self
            .store
            .get_active_session()
            .await?
            .is_some_and(|p| p.targets(folder, session)))
    }

    async fn window_tabs(&self, window_id: WindowId, failures: &mut usize) -> Vec<LiveTab> {
        match self.platform.query_tabs(&TabQuery::window(window_id)).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(window_id, error = %e, "could not list window tabs");
                *failures += 1;
                Vec::new()
            }
        }
    }

    /// Picks the tab that survives the teardown.
    async fn establish_anchor(&self, window_id: WindowId, existing: &[LiveTab], failures: &mut usize) -> Option<TabHandle> {
        match self.settings.anchor {
            AnchorMode::FirstTab => existing.first().map(|t| t.id),
            AnchorMode::HomeTab => {
                let home_url = self.settings.home_tab_url.as_str();
                let found = existing.iter().find(|t| t.url.starts_with(home_url)).map(|t| t.id);
                let home = match found {
                    Some(id) => id,
                    None => {
                        let props = CreateProperties {
                            url: home_url.to_string(),
                            window_id,
                            active: false,
                            index: Some(0),
                            pinned: true,
                        };
                        match self.platform.create_tab(props).await {
                            Ok(tab) => tab.id,
                            Err(e) => {
                                warn!(window_id, error = %e, "could not create home tab");
                                *failures += 1;
                                return None;
                            }
                        }
                    }
                };
                let pin = UpdateProperties {
                    pinned: Some(true),
                    ..UpdateProperties::default()
                };
                if let Err(e) = self.platform.update_tab(home, pin).await {
                    warn!(tab_id = home, error = %e, "could not pin home tab");
                    *failures += 1;
                }
                if let Err(e) = self.platform.move_tab(home, 0).await {
                    warn!(tab_id = home, error = %e, "could not move home tab");
                    *failures += 1;
                }
                Some(home)
            }
        }
    }

    async fn close_all_but(&self, existing: &[LiveTab], keep: Option<TabHandle>, failures: &mut usize) {
        let doomed: Vec<TabHandle> = existing
            .iter()
            .map(|t| t.id)
            .filter(|id| Some(*id) != keep)
            .collect();
        if doomed.is_empty() {
            return;
        }
        if let Err(e) = self.platform.remove_tabs(&doomed).await {
            warn!(count = doomed.len(), error = %e, "could not close existing tabs");
            *failures += 1;
        }
    }

    /// Leaves the window on a new-tab page, reusing the first-tab anchor when there is one.
    async fn open_placeholder(&self, window_id: WindowId, anchor: Option<TabHandle>, failures: &mut usize) -> Option<TabHandle> {
        let new_tab_url = self.settings.new_tab_url.clone();
        let result = match (self.settings.anchor, anchor) {
            (AnchorMode::FirstTab, Some(anchor)) => {
                let props = UpdateProperties {
                    url: Some(new_tab_url),
                    active: Some(true),
                    pinned: None,
                };
                self.platform.update_tab(anchor, props).await
            }
            _ => {
                let props = CreateProperties {
                    active: true,
                    ..CreateProperties::background(new_tab_url, window_id)
                };
                self.platform.create_tab(props).await
            }
        };
        match result {
            Ok(tab) => Some(tab.id),
            Err(e) => {
                warn!(window_id, error = %e, "could not open placeholder tab");
                *failures += 1;
                None
            }
        }
    }
}
