//! In-process browser: windows, ordered tabs and a tab event feed.
//!
//! Backs the RPC harness and the test suite. Every platform call is recorded so
//! callers can assert on what the engine asked the host to do.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::services::tab_platform::TabPlatform;
use crate::types::errors::HostError;
use crate::types::tab::{
    ChangeInfo, CreateProperties, LiveTab, TabEvent, TabHandle, TabQuery, TabStatus, UpdateProperties,
    WindowId,
};

/// A platform call as received by the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Query(Option<WindowId>),
    Get(TabHandle),
    Create(String),
    Update(TabHandle),
    Move(TabHandle, usize),
    Remove(Vec<TabHandle>),
    CurrentWindow,
}

#[derive(Debug, Clone)]
struct SimTab {
    id: TabHandle,
    window_id: WindowId,
    url: String,
    title: String,
    fav_icon_url: Option<String>,
    pinned: bool,
    status: TabStatus,
}

#[derive(Debug, Default)]
struct SimWindow {
    tab_order: Vec<TabHandle>,
    active_tab: Option<TabHandle>,
}

#[derive(Default)]
struct BrowserState {
    next_tab_id: TabHandle,
    next_window_id: WindowId,
    tabs: HashMap<TabHandle, SimTab>,
    windows: HashMap<WindowId, SimWindow>,
    current_window: Option<WindowId>,
    subscribers: Vec<mpsc::UnboundedSender<TabEvent>>,
    calls: Vec<HostCall>,
    rejected_urls: HashSet<String>,
}

impl BrowserState {
    fn emit(&mut self, event: TabEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn live(&self, tab_id: TabHandle) -> Result<LiveTab, HostError> {
        let tab = self.tabs.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        let window = self
            .windows
            .get(&tab.window_id)
            .ok_or(HostError::WindowNotFound(tab.window_id))?;
        Ok(LiveTab {
            id: tab.id,
            window_id: tab.window_id,
            index: window.tab_order.iter().position(|id| *id == tab_id).unwrap_or(0),
            url: tab.url.clone(),
            title: tab.title.clone(),
            fav_icon_url: tab.fav_icon_url.clone(),
            active: window.active_tab == Some(tab_id),
            pinned: tab.pinned,
            status: Some(tab.status),
        })
    }

    fn window_mut(&mut self, window_id: WindowId) -> Result<&mut SimWindow, HostError> {
        self.windows
            .get_mut(&window_id)
            .ok_or(HostError::WindowNotFound(window_id))
    }

    /// Inserts a tab without emitting events.
    fn insert_tab(&mut self, props: &CreateProperties) -> Result<TabHandle, HostError> {
        self.next_tab_id += 1;
        let id = self.next_tab_id;
        let window = self.window_mut(props.window_id)?;
        let at = props.index.unwrap_or(window.tab_order.len()).min(window.tab_order.len());
        window.tab_order.insert(at, id);
        if props.active || window.active_tab.is_none() {
            window.active_tab = Some(id);
        }
        self.tabs.insert(
            id,
            SimTab {
                id,
                window_id: props.window_id,
                url: props.url.clone(),
                title: props.url.clone(),
                fav_icon_url: None,
                pinned: props.pinned,
                status: TabStatus::Complete,
            },
        );
        Ok(id)
    }

    fn finish_load(&mut self, tab_id: TabHandle) -> Result<(), HostError> {
        let tab = self.live(tab_id)?;
        self.emit(TabEvent::Updated {
            tab_id,
            change: ChangeInfo {
                status: Some(TabStatus::Complete),
                title: Some(tab.title.clone()),
                ..ChangeInfo::default()
            },
            tab,
        });
        Ok(())
    }

    fn activate(&mut self, tab_id: TabHandle) -> Result<(), HostError> {
        let window_id = self.tabs.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?.window_id;
        let window = self.window_mut(window_id)?;
        if window.active_tab == Some(tab_id) {
            return Ok(());
        }
        window.active_tab = Some(tab_id);
        self.emit(TabEvent::Activated { tab_id, window_id });
        Ok(())
    }
}

pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrowserState::default()),
        }
    }

    /// A browser with one focused window holding `urls`, the first one active.
    pub fn with_window(urls: &[&str]) -> (Self, WindowId) {
        let browser = Self::new();
        let window_id = browser.open_window(urls);
        (browser, window_id)
    }

    fn state(&self) -> Result<MutexGuard<'_, BrowserState>, HostError> {
        self.state
            .lock()
            .map_err(|e| HostError::Rejected(format!("browser state poisoned: {}", e)))
    }

    /// Opens a window seeded with `urls` and focuses it. Seeding emits no events.
    pub fn open_window(&self, urls: &[&str]) -> WindowId {
        let Ok(mut state) = self.state() else {
            return 0;
        };
        state.next_window_id += 1;
        let window_id = state.next_window_id;
        state.windows.insert(window_id, SimWindow::default());
        state.current_window = Some(window_id);
        for url in urls {
            let _ = state.insert_tab(&CreateProperties::background(*url, window_id));
        }
        window_id
    }

    pub fn focus_window(&self, window_id: WindowId) {
        if let Ok(mut state) = self.state() {
            if state.windows.contains_key(&window_id) {
                state.current_window = Some(window_id);
            }
        }
    }

    /// Receives every tab event emitted after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TabEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.state() {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Makes every later `create_tab` for `url` fail.
    pub fn reject_url(&self, url: &str) {
        if let Ok(mut state) = self.state() {
            state.rejected_urls.insert(url.to_string());
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state() {
            state.calls.clear();
        }
    }

    /// Snapshot of a window's tabs in order.
    pub fn tabs_in(&self, window_id: WindowId) -> Vec<LiveTab> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        state
            .windows
            .get(&window_id)
            .map(|w| w.tab_order.iter().filter_map(|id| state.live(*id).ok()).collect())
            .unwrap_or_default()
    }

    /// User navigation inside a tab: a loading update with the new URL, then a
    /// completed load carrying the page title.
    pub fn navigate(&self, tab_id: TabHandle, url: &str, title: &str) -> Result<(), HostError> {
        let mut state = self.state()?;
        let tab = state.tabs.get_mut(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        tab.url = url.to_string();
        tab.title = title.to_string();
        tab.status = TabStatus::Loading;
        let snapshot = state.live(tab_id)?;
        state.emit(TabEvent::Updated {
            tab_id,
            change: ChangeInfo {
                status: Some(TabStatus::Loading),
                url: Some(url.to_string()),
                ..ChangeInfo::default()
            },
            tab: snapshot,
        });
        if let Some(tab) = state.tabs.get_mut(&tab_id) {
            tab.status = TabStatus::Complete;
        }
        state.finish_load(tab_id)
    }

    /// A favicon arriving after the page load.
    pub fn set_favicon(&self, tab_id: TabHandle, favicon: &str) -> Result<(), HostError> {
        let mut state = self.state()?;
        let tab = state.tabs.get_mut(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        tab.fav_icon_url = Some(favicon.to_string());
        let snapshot = state.live(tab_id)?;
        state.emit(TabEvent::Updated {
            tab_id,
            change: ChangeInfo {
                fav_icon_url: Some(favicon.to_string()),
                ..ChangeInfo::default()
            },
            tab: snapshot,
        });
        Ok(())
    }
}

impl Default for SimulatedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TabPlatform for SimulatedBrowser {
    async fn query_tabs(&self, query: &TabQuery) -> Result<Vec<LiveTab>, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Query(query.window_id));
        let mut window_ids: Vec<WindowId> = match query.window_id {
            Some(id) => vec![id],
            None => state.windows.keys().copied().collect(),
        };
        window_ids.sort_unstable();

        let mut out = Vec::new();
        for window_id in window_ids {
            let Some(window) = state.windows.get(&window_id) else {
                continue;
            };
            for tab_id in &window.tab_order {
                let tab = state.live(*tab_id)?;
                if query.active.map_or(true, |active| tab.active == active) {
                    out.push(tab);
                }
            }
        }
        Ok(out)
    }

    async fn get_tab(&self, tab_id: TabHandle) -> Result<LiveTab, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Get(tab_id));
        state.live(tab_id)
    }

    async fn create_tab(&self, props: CreateProperties) -> Result<LiveTab, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Create(props.url.clone()));
        if state.rejected_urls.contains(&props.url) {
            return Err(HostError::Rejected(format!("cannot open {}", props.url)));
        }

        let previous_active = state.windows.get(&props.window_id).and_then(|w| w.active_tab);
        let id = state.insert_tab(&props)?;
        let tab = state.live(id)?;
        state.emit(TabEvent::Created { tab: tab.clone() });
        if tab.active && previous_active != Some(id) {
            state.emit(TabEvent::Activated {
                tab_id: id,
                window_id: props.window_id,
            });
        }
        state.finish_load(id)?;
        Ok(tab)
    }

    async fn update_tab(&self, tab_id: TabHandle, props: UpdateProperties) -> Result<LiveTab, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Update(tab_id));
        let tab = state.tabs.get_mut(&tab_id).ok_or(HostError::TabNotFound(tab_id))?;
        if let Some(pinned) = props.pinned {
            tab.pinned = pinned;
        }
        if let Some(url) = props.url.as_ref() {
            tab.url = url.clone();
            tab.title = url.clone();
            let snapshot = state.live(tab_id)?;
            state.emit(TabEvent::Updated {
                tab_id,
                change: ChangeInfo {
                    status: Some(TabStatus::Loading),
                    url: Some(url.clone()),
                    ..ChangeInfo::default()
                },
                tab: snapshot,
            });
        }
        if props.active == Some(true) {
            state.activate(tab_id)?;
        }
        if props.url.is_some() {
            state.finish_load(tab_id)?;
        }
        state.live(tab_id)
    }

    async fn move_tab(&self, tab_id: TabHandle, index: usize) -> Result<LiveTab, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Move(tab_id, index));
        let window_id = state.tabs.get(&tab_id).ok_or(HostError::TabNotFound(tab_id))?.window_id;
        let window = state.window_mut(window_id)?;
        if let Some(from) = window.tab_order.iter().position(|id| *id == tab_id) {
            let id = window.tab_order.remove(from);
            let to = index.min(window.tab_order.len());
            window.tab_order.insert(to, id);
        }
        state.live(tab_id)
    }

    /// Removes tabs; a removed active tab hands focus to its nearest neighbour.
    async fn remove_tabs(&self, tab_ids: &[TabHandle]) -> Result<(), HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::Remove(tab_ids.to_vec()));
        if let Some(missing) = tab_ids.iter().find(|id| !state.tabs.contains_key(*id)) {
            return Err(HostError::TabNotFound(*missing));
        }

        for tab_id in tab_ids {
            let Some(tab) = state.tabs.remove(tab_id) else {
                continue;
            };
            let window = state.window_mut(tab.window_id)?;
            let Some(order_idx) = window.tab_order.iter().position(|id| id == tab_id) else {
                continue;
            };
            window.tab_order.remove(order_idx);
            let successor = if window.active_tab == Some(*tab_id) {
                window.active_tab = None;
                let next = order_idx.min(window.tab_order.len().saturating_sub(1));
                window.tab_order.get(next).copied()
            } else {
                None
            };
            state.emit(TabEvent::Removed {
                tab_id: *tab_id,
                window_id: Some(tab.window_id),
            });
            if let Some(next) = successor {
                state.activate(next)?;
            }
        }
        Ok(())
    }

    async fn get_current_window(&self) -> Result<WindowId, HostError> {
        let mut state = self.state()?;
        state.calls.push(HostCall::CurrentWindow);
        state.current_window.ok_or(HostError::NoCurrentWindow)
    }
}
