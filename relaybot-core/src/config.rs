// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and collects per-handler environment sections
use crate::paths::{self, expand_tilde};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RELAYBOT_CONFIG";

/// Key/value pairs of one `[handlers.<name>]` table
pub type HandlerSection = BTreeMap<String, toml::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    /// Per-handler environment overlays, keyed by handler file name
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerSection>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Homeserver base URL, e.g. https://matrix.example.org
    pub base_url: String,
    /// Full Matrix user ID of the bot account
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Where the Matrix state store lives
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// Working directory for handler processes
    #[serde(default = "default_run_path")]
    pub run_path: String,
    /// Directory scanned for handler executables
    #[serde(default = "default_scripts_path")]
    pub scripts_path: String,
    /// Regex an inviter's user ID must match before the bot joins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inviter: Option<String>,
    /// When set, only handlers named here are registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_scripts: Option<Vec<String>>,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Address for the Prometheus listener, e.g. 127.0.0.1:9100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_addr: Option<String>,
}

// Custom Debug impl to redact sensitive fields
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("device_id", &self.device_id)
            .field("data_path", &self.data_path)
            .field("run_path", &self.run_path)
            .field("scripts_path", &self.scripts_path)
            .field("inviter", &self.inviter)
            .field("enabled_scripts", &self.enabled_scripts)
            .field("pacing_ms", &self.pacing_ms)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("metrics_addr", &self.metrics_addr)
            .finish()
    }
}

fn default_device_id() -> String {
    "relaybot".to_string()
}

fn default_data_path() -> String {
    paths::data_dir().to_string_lossy().to_string()
}

fn default_run_path() -> String {
    "./run".to_string()
}

fn default_scripts_path() -> String {
    "./scripts".to_string()
}

fn default_pacing_ms() -> u64 {
    100
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

/// Resolve a configured path: expand ~, then anchor relative paths at `base`
fn resolve_path(path: &str, base: &Path) -> String {
    let expanded = PathBuf::from(expand_tilde(path));
    if expanded.is_absolute() {
        expanded.to_string_lossy().to_string()
    } else {
        base.join(expanded).to_string_lossy().to_string()
    }
}

/// Render a TOML value the way a handler will see it in its environment
fn value_to_env(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. the explicit path (from --config)
    /// 2. RELAYBOT_CONFIG env var
    /// 3. ./config.toml
    /// 4. ~/.config/relaybot/config.toml
    fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from file with environment variable overrides.
    /// A missing file or missing required key is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let Some(config_path) = Self::find_config_file(explicit) else {
            anyhow::bail!(
                "No config file found. Pass --config, set {}, or create {}",
                CONFIG_PATH_ENV,
                paths::config_file().display()
            );
        };

        tracing::debug!(path = %config_path.display(), "Loading configuration from file");

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let base_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::from_toml_str(&content, &base_dir)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    /// Parse, apply env overrides, resolve paths relative to `base_dir`, validate
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.apply_env_overrides();

        config.bot.data_path = resolve_path(&config.bot.data_path, base_dir);
        config.bot.run_path = resolve_path(&config.bot.run_path, base_dir);
        config.bot.scripts_path = resolve_path(&config.bot.scripts_path, base_dir);

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RELAYBOT_BASE_URL") {
            self.bot.base_url = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_USER_ID") {
            self.bot.user_id = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_TOKEN") {
            self.bot.token = Some(val);
        }
        if let Ok(val) = std::env::var("RELAYBOT_PASSWORD") {
            self.bot.password = Some(val);
        }
        if let Ok(val) = std::env::var("RELAYBOT_SCRIPTS_PATH") {
            self.bot.scripts_path = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_RUN_PATH") {
            self.bot.run_path = val;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bot.base_url.trim().is_empty() {
            anyhow::bail!("bot.base_url is required");
        }
        if self.bot.user_id.trim().is_empty() {
            anyhow::bail!("bot.user_id is required");
        }
        if self.bot.token.is_none() && self.bot.password.is_none() {
            anyhow::bail!("Either bot.token or bot.password is required");
        }
        if let Some(ref inviter) = self.bot.inviter {
            regex::Regex::new(inviter)
                .with_context(|| format!("bot.inviter is not a valid regex: {}", inviter))?;
        }
        if self.reconnect_delay() <= self.pacing() {
            anyhow::bail!(
                "bot.reconnect_delay_secs ({}s) must be longer than bot.pacing_ms ({}ms)",
                self.bot.reconnect_delay_secs,
                self.bot.pacing_ms
            );
        }
        Ok(())
    }

    /// Delay inserted after every handler run and every sent fragment
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.bot.pacing_ms)
    }

    /// Fixed wait between connection attempts
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.bot.reconnect_delay_secs)
    }

    /// Key/value overlay for the handler called `name`, values stringified
    pub fn handler_env(&self, name: &str) -> Vec<(String, String)> {
        self.handlers
            .get(name)
            .map(|section| {
                section
                    .iter()
                    .map(|(key, value)| (key.clone(), value_to_env(value)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const MINIMAL: &str = r#"
[bot]
base_url = "https://matrix.example.org"
user_id = "@bot:example.org"
token = "secret"
"#;

    #[test]
    #[serial]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml_str(MINIMAL, Path::new("/etc/relaybot")).unwrap();
        assert_eq!(config.bot.device_id, "relaybot");
        assert_eq!(config.bot.pacing_ms, 100);
        assert_eq!(config.bot.reconnect_delay_secs, 5);
        assert!(config.handlers.is_empty());
        assert!(config.bot.enabled_scripts.is_none());
    }

    #[test]
    #[serial]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Config::from_toml_str(MINIMAL, Path::new("/etc/relaybot")).unwrap();
        assert_eq!(config.bot.scripts_path, "/etc/relaybot/./scripts");
        assert_eq!(config.bot.run_path, "/etc/relaybot/./run");
    }

    #[test]
    #[serial]
    fn test_absolute_paths_are_kept() {
        let content = format!("{}scripts_path = \"/srv/handlers\"\n", MINIMAL);
        let config = Config::from_toml_str(&content, Path::new("/etc/relaybot")).unwrap();
        assert_eq!(config.bot.scripts_path, "/srv/handlers");
    }

    #[test]
    #[serial]
    fn test_missing_credentials_rejected() {
        let content = r#"
[bot]
base_url = "https://matrix.example.org"
user_id = "@bot:example.org"
"#;
        let err = Config::from_toml_str(content, Path::new(".")).unwrap_err();
        assert!(format!("{:#}", err).contains("token"));
    }

    #[test]
    #[serial]
    fn test_missing_base_url_rejected() {
        let content = r#"
[bot]
user_id = "@bot:example.org"
token = "secret"
"#;
        assert!(Config::from_toml_str(content, Path::new(".")).is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_inviter_rejected() {
        let content = format!("{}inviter = \"(unclosed\"\n", MINIMAL);
        assert!(Config::from_toml_str(&content, Path::new(".")).is_err());
    }

    #[test]
    #[serial]
    fn test_reconnect_delay_must_exceed_pacing() {
        let content = format!("{}pacing_ms = 6000\n", MINIMAL);
        assert!(Config::from_toml_str(&content, Path::new(".")).is_err());
    }

    #[test]
    #[serial]
    fn test_huge_reconnect_delay_is_accepted() {
        let content = format!("{}reconnect_delay_secs = 18446744073709552\n", MINIMAL);
        let config = Config::from_toml_str(&content, Path::new(".")).unwrap();
        assert!(config.reconnect_delay() > config.pacing());
    }

    #[test]
    #[serial]
    fn test_handler_env_stringifies_values() {
        let content = format!(
            "{}\n[handlers.weather]\ncity = \"Vienna\"\nretries = 3\nverbose = true\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&content, Path::new(".")).unwrap();
        let env = config.handler_env("weather");
        assert_eq!(
            env,
            vec![
                ("city".to_string(), "Vienna".to_string()),
                ("retries".to_string(), "3".to_string()),
                ("verbose".to_string(), "true".to_string()),
            ]
        );
        assert!(config.handler_env("unknown").is_empty());
    }

    #[test]
    #[serial]
    fn test_env_override_replaces_token() {
        std::env::set_var("RELAYBOT_TOKEN", "from-env");
        let config = Config::from_toml_str(MINIMAL, Path::new(".")).unwrap();
        std::env::remove_var("RELAYBOT_TOKEN");
        assert_eq!(config.bot.token.as_deref(), Some("from-env"));
    }

    #[test]
    #[serial]
    fn test_debug_redacts_secrets() {
        let config = Config::from_toml_str(MINIMAL, Path::new(".")).unwrap();
        let rendered = format!("{:?}", config.bot);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("secret"));
    }
}
