// ABOUTME: Handler profiles - immutable description of one discovered handler program
// ABOUTME: Submodules implement discovery, access control, routing, execution, and output splitting

pub mod access;
pub mod executor;
pub mod output;
pub mod registry;
pub mod router;

pub use access::AccessFilter;
pub use executor::{Executor, HandlerResult};
pub use output::{split, FormatFlags, OutboundFragment, OutputFormat};
pub use registry::{HandlerSource, Registry, SharedRegistry};
pub use router::route;

use crate::traits::InboundMessage;
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Set while a handler is run for self-description; never present on normal runs
pub const DESCRIBE_ENV: &str = "CONFIG";

/// Prefix for handler-scoped keys taken from the handler's config section
pub const ENV_PREFIX: &str = "__";

/// Per-message keys injected into every invocation
pub const ROOM_ID_ENV: &str = "__room_id";
pub const SENDER_ENV: &str = "__sender";

/// Reserved keys the engine itself interprets
pub const ALLOW_ENV: &str = "__allow";
pub const DENY_ENV: &str = "__deny";
/// Older spellings of the allow/deny keys, still honored
pub const WHITELIST_ENV: &str = "__whitelist";
pub const BLACKLIST_ENV: &str = "__blacklist";
pub const FORMAT_ENV: &str = "__format";

/// Immutable execution profile of one handler, built once at discovery
#[derive(Clone)]
pub struct HandlerProfile {
    name: String,
    path: PathBuf,
    pattern: Regex,
    environment: BTreeMap<String, String>,
    access: AccessFilter,
    format: OutputFormat,
}

impl HandlerProfile {
    /// Build a profile from a routing pattern and an environment template.
    /// Fails if the routing pattern or a reserved access pattern is not a valid regex.
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        pattern: &str,
        environment: BTreeMap<String, String>,
    ) -> Result<Self> {
        let name = name.into();
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Handler {} published an invalid pattern", name))?;
        let access = AccessFilter::from_env(&environment)
            .with_context(|| format!("Handler {} has an invalid access pattern", name))?;

        let format = match environment.get(FORMAT_ENV) {
            None => OutputFormat::Text,
            Some(value) => OutputFormat::from_config(value).unwrap_or_else(|| {
                tracing::warn!(
                    handler = %name,
                    format = %value,
                    "Unknown output format, falling back to text"
                );
                OutputFormat::Text
            }),
        };

        Ok(Self {
            name,
            path: path.into(),
            pattern,
            environment,
            access,
            format,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The routing pattern as published by the handler
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Case-insensitive search of the pattern anywhere in `body`
    pub fn matches(&self, body: &str) -> bool {
        self.pattern.is_match(body)
    }

    pub fn access(&self) -> &AccessFilter {
        &self.access
    }

    /// Output format the handler's config section asked for
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// The immutable environment template
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Fresh copy of the template with the per-message keys added
    pub fn invocation_env(&self, message: &InboundMessage) -> BTreeMap<String, String> {
        let mut env = self.environment.clone();
        env.insert(ROOM_ID_ENV.to_string(), message.room_id.clone());
        env.insert(SENDER_ENV.to_string(), message.sender.clone());
        env
    }
}

// Environment templates carry secrets from config sections, so only key counts are shown
impl fmt::Debug for HandlerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerProfile")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("pattern", &self.pattern.as_str())
            .field("env_keys", &self.environment.len())
            .field("access", &self.access)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_pattern_is_case_insensitive_search() {
        let profile = HandlerProfile::new("ping", "/bin/ping", "^!ping", BTreeMap::new()).unwrap();
        assert!(profile.matches("!PING now"));
        assert!(!profile.matches("say !ping"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(HandlerProfile::new("bad", "/bin/bad", "(", BTreeMap::new()).is_err());
    }

    #[test]
    fn test_invalid_allow_pattern_rejected() {
        let env = env(&[(ALLOW_ENV, "[")]);
        assert!(HandlerProfile::new("bad", "/bin/bad", "x", env).is_err());
    }

    #[test]
    fn test_format_read_from_template() {
        let profile =
            HandlerProfile::new("c", "/bin/c", "x", env(&[(FORMAT_ENV, "code")])).unwrap();
        assert_eq!(profile.format(), OutputFormat::Code);

        let profile =
            HandlerProfile::new("u", "/bin/u", "x", env(&[(FORMAT_ENV, "markdown")])).unwrap();
        assert_eq!(profile.format(), OutputFormat::Text);
    }

    #[test]
    fn test_invocation_env_is_a_fresh_copy() {
        let profile =
            HandlerProfile::new("echo", "/bin/echo", "x", env(&[("__city", "Vienna")])).unwrap();

        let first = profile.invocation_env(&InboundMessage::new("!a:x", "@alice:x", "hi"));
        let second = profile.invocation_env(&InboundMessage::new("!b:x", "@bob:x", "hi"));

        assert_eq!(first.get(ROOM_ID_ENV).map(String::as_str), Some("!a:x"));
        assert_eq!(second.get(SENDER_ENV).map(String::as_str), Some("@bob:x"));
        assert_eq!(first.get("__city").map(String::as_str), Some("Vienna"));
        assert!(!profile.environment().contains_key(ROOM_ID_ENV));
        assert!(!profile.environment().contains_key(SENDER_ENV));
    }

    #[test]
    fn test_debug_hides_environment_values() {
        let profile =
            HandlerProfile::new("k", "/bin/k", "x", env(&[("__api_key", "hunter2")])).unwrap();
        assert!(!format!("{:?}", profile).contains("hunter2"));
    }
}
