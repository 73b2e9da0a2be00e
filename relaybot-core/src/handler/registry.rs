// ABOUTME: Handler discovery - probes executables in the scripts directory for routing patterns
// ABOUTME: Registry snapshots are rebuilt off to the side and swapped in on reload

use super::{HandlerProfile, DESCRIBE_ENV, ENV_PREFIX};
use crate::config::Config;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

/// Upper bound on how long a handler may take to describe itself
pub const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered, immutable set of handlers
#[derive(Debug, Clone, Default)]
pub struct Registry {
    handlers: Vec<HandlerProfile>,
}

impl Registry {
    pub fn new(handlers: Vec<HandlerProfile>) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &[HandlerProfile] {
        &self.handlers
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(HandlerProfile::name).collect()
    }
}

/// Everything discovery needs: where to look, what is enabled, and config overlays
#[derive(Debug, Clone)]
pub struct HandlerSource {
    pub scripts_dir: PathBuf,
    pub run_dir: PathBuf,
    pub enabled: Option<Vec<String>>,
    pub sections: BTreeMap<String, Vec<(String, String)>>,
}

impl HandlerSource {
    pub fn new(scripts_dir: impl Into<PathBuf>, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            run_dir: run_dir.into(),
            enabled: None,
            sections: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let sections = config
            .handlers
            .keys()
            .map(|name| (name.clone(), config.handler_env(name)))
            .collect();
        Self {
            scripts_dir: PathBuf::from(&config.bot.scripts_path),
            run_dir: PathBuf::from(&config.bot.run_path),
            enabled: config.bot.enabled_scripts.clone(),
            sections,
        }
    }

    pub fn with_enabled(mut self, enabled: Vec<String>) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_section(mut self, name: &str, pairs: Vec<(String, String)>) -> Self {
        self.sections.insert(name.to_string(), pairs);
        self
    }

    /// Probe every entry of the scripts directory and build a registry.
    /// Only an unreadable scripts directory is an error; individual handlers
    /// that fail to describe themselves are logged and skipped.
    pub async fn discover(&self) -> Result<Registry> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.scripts_dir).await.with_context(|| {
            format!(
                "Failed to read handler directory {}",
                self.scripts_dir.display()
            )
        })?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read handler directory entry")?
        {
            entries.push(entry.path());
        }
        entries.sort();

        let base_env = process_env();
        let mut handlers = Vec::new();

        for path in entries {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            if let Some(ref enabled) = self.enabled {
                if !enabled.iter().any(|e| e == &name) {
                    tracing::debug!(handler = %name, "Handler is not enabled");
                    continue;
                }
            }

            if !is_runnable(&path) {
                tracing::debug!(handler = %name, "Handler is not an executable file");
                continue;
            }

            let path = std::fs::canonicalize(&path).unwrap_or(path);

            match self.build_profile(&name, &path, &base_env).await {
                Ok(Some(profile)) => {
                    tracing::info!(handler = %name, pattern = %profile.pattern(), "Registered handler");
                    handlers.push(profile);
                }
                Ok(None) => {
                    tracing::debug!(handler = %name, "Handler has no pattern");
                }
                Err(e) => {
                    tracing::warn!(handler = %name, error = %format!("{:#}", e), "Skipping handler");
                }
            }
        }

        Ok(Registry::new(handlers))
    }

    async fn build_profile(
        &self,
        name: &str,
        path: &Path,
        base_env: &BTreeMap<String, String>,
    ) -> Result<Option<HandlerProfile>> {
        let Some(pattern) = describe(path, &self.run_dir, base_env).await? else {
            return Ok(None);
        };

        let mut environment = base_env.clone();
        if let Some(pairs) = self.sections.get(name) {
            for (key, value) in pairs {
                tracing::debug!(handler = %name, key = %key, "Adding config key to handler environment");
                environment.insert(format!("{}{}", ENV_PREFIX, key), value.clone());
            }
        }

        HandlerProfile::new(name, path, &pattern, environment).map(Some)
    }
}

/// Prefix of the bot's own settings; these never reach handlers
pub const BOT_ENV_PREFIX: &str = "RELAYBOT_";

/// The current process environment without the describe marker or any
/// `RELAYBOT_*` setting. Entries that are not valid UTF-8 are skipped.
fn process_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .filter(|(k, _)| k != DESCRIBE_ENV && !k.starts_with(BOT_ENV_PREFIX))
        .collect()
}

/// Regular file the effective user may read and execute
#[cfg(unix)]
fn is_runnable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    path.is_file() && access(path, AccessFlags::R_OK | AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_runnable(path: &Path) -> bool {
    path.is_file()
}

/// Run a handler in describe mode and return the first line of its output
async fn describe(
    path: &Path,
    run_dir: &Path,
    base_env: &BTreeMap<String, String>,
) -> Result<Option<String>> {
    let child = Command::new(path)
        .env_clear()
        .envs(base_env)
        .env(DESCRIBE_ENV, "1")
        .current_dir(run_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(DESCRIBE_TIMEOUT, child)
        .await
        .context("Handler did not describe itself in time")?
        .context("Failed to run handler in describe mode")?;

    if !output.stderr.is_empty() {
        tracing::debug!(
            path = %path.display(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Handler wrote to stderr while describing"
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .trim()
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string))
}

/// A registry snapshot that can be rebuilt and swapped while dispatch is running
pub struct SharedRegistry {
    source: HandlerSource,
    current: RwLock<Arc<Registry>>,
}

impl SharedRegistry {
    pub fn new(source: HandlerSource, registry: Registry) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// Discover handlers once and wrap the result
    pub async fn load(source: HandlerSource) -> Result<Self> {
        let registry = source.discover().await?;
        Ok(Self::new(source, registry))
    }

    /// The registry as of now; later reloads do not affect it
    pub async fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&*self.current.read().await)
    }

    /// Rebuild from disk and swap in the new registry. On error the old one stays.
    pub async fn reload(&self) -> Result<usize> {
        let registry = self.source.discover().await?;
        let count = registry.len();
        *self.current.write().await = Arc::new(registry);
        tracing::info!(handlers = count, "Handler registry reloaded");
        Ok(count)
    }
}
