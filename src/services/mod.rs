// TabKeeper services
// Event reconciliation, restore orchestration, the tab platform seam and its hosts, configuration.

pub mod host_bridge;
pub mod reconciler;
pub mod restore;
pub mod restore_gate;
pub mod settings_engine;
pub mod simulated_browser;
pub mod tab_platform;
