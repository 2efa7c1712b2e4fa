use serde::{Deserialize, Serialize};

/// How the restore procedure picks the one tab it keeps across a teardown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// Repurpose the first existing tab as the first restored tab.
    #[default]
    FirstTab,
    /// Keep a pinned home tab at position 0, creating it when absent.
    HomeTab,
}

/// Runtime configuration for the sync and restore engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub restore_settle_ms: u64,
    pub startup_restore_delay_ms: u64,
    pub command_timeout_ms: u64,
    /// How long a bridged host call waits for the client's reply.
    pub host_call_timeout_ms: u64,
    pub placeholder_prefixes: Vec<String>,
    pub new_tab_url: String,
    pub anchor: AnchorMode,
    pub home_tab_url: String,
    pub default_folder: String,
    pub favicon_service: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            restore_settle_ms: 500,
            startup_restore_delay_ms: 500,
            command_timeout_ms: 5000,
            host_call_timeout_ms: 3000,
            placeholder_prefixes: vec![
                "chrome://".to_string(),
                "chrome-extension://".to_string(),
                "edge://".to_string(),
                "about:".to_string(),
            ],
            new_tab_url: "chrome://newtab/".to_string(),
            anchor: AnchorMode::FirstTab,
            home_tab_url: "chrome-extension://tabkeeper/home.html".to_string(),
            default_folder: "default".to_string(),
            favicon_service: "https://www.google.com/s2/favicons?sz=32&domain_url=".to_string(),
        }
    }
}

impl EngineSettings {
    /// Internal pages (new tab, extension pages, `about:blank`) carry no user intent.
    pub fn is_placeholder_url(&self, url: &str) -> bool {
        self.placeholder_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && url.starts_with(prefix.as_str()))
    }

    /// True for URLs a restore should recreate.
    pub fn is_restorable_url(&self, url: &str) -> bool {
        !url.is_empty() && !self.is_placeholder_url(url)
    }
}
