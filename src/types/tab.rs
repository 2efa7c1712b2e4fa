use serde::{Deserialize, Serialize};
use url::Url;

/// Numeric handle the browser assigns to a live tab. Reassigned across restarts and restores.
pub type TabHandle = i64;

/// Numeric handle of a browser window.
pub type WindowId = i64;

/// Persisted descriptor of one tab inside a session.
///
/// `id` is a weak reference to a live tab: it is rebound whenever the tab is observed
/// again and is `None` for records that have not been matched to a running tab yet.
/// `url` and `title` are the durable identity once `id` cannot be trusted.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TabRecord {
    #[serde(default)]
    pub id: Option<TabHandle>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "favIconUrl")]
    pub favicon: String,
    #[serde(default)]
    pub active: bool,
}

impl TabRecord {
    /// A record with no live binding yet.
    pub fn unbound(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: title.into(),
            favicon: String::new(),
            active: false,
        }
    }
}

impl From<&LiveTab> for TabRecord {
    fn from(tab: &LiveTab) -> Self {
        Self {
            id: Some(tab.id),
            url: tab.url.clone(),
            title: tab.title.clone(),
            favicon: tab.fav_icon_url.clone().unwrap_or_default(),
            active: tab.active,
        }
    }
}

/// Loading state reported by the browser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

/// A tab as reported by the browser at the moment of observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveTab {
    pub id: TabHandle,
    pub window_id: WindowId,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub status: Option<TabStatus>,
}

/// Delta carried by a tab update notification. Only present fields changed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TabStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

impl ChangeInfo {
    /// True when the load finished.
    pub fn is_complete(&self) -> bool {
        self.status == Some(TabStatus::Complete)
    }

    /// Interim updates (favicon still loading, status flips) carry nothing worth persisting.
    pub fn is_meaningful(&self) -> bool {
        self.is_complete()
            || self.url.as_deref().is_some_and(|u| !u.is_empty())
            || self.title.as_deref().is_some_and(|t| !t.is_empty())
            || self.fav_icon_url.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// One notification from the browser's tab event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TabEvent {
    Created {
        tab: LiveTab,
    },
    Activated {
        tab_id: TabHandle,
        window_id: WindowId,
    },
    Updated {
        tab_id: TabHandle,
        change: ChangeInfo,
        tab: LiveTab,
    },
    Removed {
        tab_id: TabHandle,
        #[serde(default)]
        window_id: Option<WindowId>,
    },
}

impl TabEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TabEvent::Created { .. } => "created",
            TabEvent::Activated { .. } => "activated",
            TabEvent::Updated { .. } => "updated",
            TabEvent::Removed { .. } => "removed",
        }
    }
}

/// Filter for `query_tabs`. `None` fields match anything.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl TabQuery {
    pub fn window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            active: None,
        }
    }
}

/// Arguments for creating a tab.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateProperties {
    pub url: String,
    pub window_id: WindowId,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub pinned: bool,
}

impl CreateProperties {
    pub fn background(url: impl Into<String>, window_id: WindowId) -> Self {
        Self {
            url: url.into(),
            window_id,
            active: false,
            index: None,
            pinned: false,
        }
    }
}

/// Fields to change on an existing tab. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

impl UpdateProperties {
    pub fn focus() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// Serialized origin (`scheme://host[:port]`) of a URL.
///
/// Userinfo, default ports, path, query and fragment are dropped. URLs without a
/// tuple origin (`chrome://`, `about:`, `data:`, unparseable input) yield `None`.
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Favicon URL for a page via a favicon service, or empty when the URL has no web origin.
pub fn favicon_fallback(service_prefix: &str, url: &str) -> String {
    match origin_of(url) {
        Some(origin) => format!("{}{}", service_prefix, origin),
        None => String::new(),
    }
}
