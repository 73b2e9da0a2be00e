// ABOUTME: Standardized paths for config and data storage
// ABOUTME: Uses ~/.config/relaybot for config and ~/.local/share/relaybot for data

use directories::BaseDirs;
use std::path::PathBuf;

/// Get the home directory
fn home_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the config directory path: ~/.config/relaybot/
pub fn config_dir() -> PathBuf {
    home_dir().join(".config").join("relaybot")
}

/// Get the default config file path: ~/.config/relaybot/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the data directory path: ~/.local/share/relaybot/
/// Falls back to ./data if home directory unavailable
pub fn data_dir() -> PathBuf {
    let home = home_dir();
    if home == PathBuf::from(".") {
        PathBuf::from("./data")
    } else {
        home.join(".local").join("share").join("relaybot")
    }
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
pub fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        } else {
            tracing::warn!(
                path = %path,
                "Failed to expand tilde in path: could not determine home directory"
            );
        }
    } else if path == "~" {
        if let Some(base_dirs) = BaseDirs::new() {
            return base_dirs.home_dir().to_string_lossy().to_string();
        } else {
            tracing::warn!("Failed to expand tilde: could not determine home directory");
        }
    }
    path.to_string()
}
