// TabKeeper platform paths
// Config and data directories per OS, with environment overrides.
//
// Uses `cfg(target_os)` to pick the platform convention at compile time.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "tabkeeper";

/// Directory holding `settings.json`.
///
/// - `$TABKEEPER_CONFIG_DIR` when set
/// - **Linux**: `$XDG_CONFIG_HOME/tabkeeper` or `~/.config/tabkeeper`
/// - **macOS**: `~/Library/Application Support/TabKeeper`
/// - **Windows**: `%APPDATA%/TabKeeper`
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = env::var("TABKEEPER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    os_dir("XDG_CONFIG_HOME", &[".config"])
}

/// Directory holding the session database.
///
/// - `$TABKEEPER_DATA_DIR` when set
/// - **Linux**: `$XDG_DATA_HOME/tabkeeper` or `~/.local/share/tabkeeper`
/// - **macOS** / **Windows**: same as the config directory
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("TABKEEPER_DATA_DIR") {
        return PathBuf::from(dir);
    }
    os_dir("XDG_DATA_HOME", &[".local", "share"])
}

fn home_dir() -> PathBuf {
    let var = if cfg!(target_os = "windows") { "USERPROFILE" } else { "HOME" };
    env::var(var).map(PathBuf::from).unwrap_or_else(|_| env::temp_dir())
}

#[cfg(target_os = "linux")]
fn os_dir(xdg_var: &str, fallback: &[&str]) -> PathBuf {
    if let Ok(xdg) = env::var(xdg_var) {
        return PathBuf::from(xdg).join(APP_DIR);
    }
    fallback
        .iter()
        .fold(home_dir(), |path, part| path.join(part))
        .join(APP_DIR)
}

#[cfg(target_os = "macos")]
fn os_dir(_xdg_var: &str, _fallback: &[&str]) -> PathBuf {
    home_dir()
        .join("Library")
        .join("Application Support")
        .join("TabKeeper")
}

#[cfg(target_os = "windows")]
fn os_dir(_xdg_var: &str, _fallback: &[&str]) -> PathBuf {
    env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
        .join("TabKeeper")
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn os_dir(_xdg_var: &str, fallback: &[&str]) -> PathBuf {
    fallback
        .iter()
        .fold(home_dir(), |path, part| path.join(part))
        .join(APP_DIR)
}
