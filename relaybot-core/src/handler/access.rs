// ABOUTME: Per-handler allow/deny gate evaluated against the room+sender identity string
// ABOUTME: Patterns come from the reserved __allow/__deny keys, or __whitelist/__blacklist

use super::{ALLOW_ENV, BLACKLIST_ENV, DENY_ENV, WHITELIST_ENV};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Optional allow and deny patterns; either, both, or neither may be set
#[derive(Debug, Clone, Default)]
pub struct AccessFilter {
    allow: Option<Regex>,
    deny: Option<Regex>,
}

impl AccessFilter {
    pub fn new(allow: Option<&str>, deny: Option<&str>) -> Result<Self> {
        let allow = allow
            .map(|p| Regex::new(p).with_context(|| format!("Invalid allow pattern: {}", p)))
            .transpose()?;
        let deny = deny
            .map(|p| Regex::new(p).with_context(|| format!("Invalid deny pattern: {}", p)))
            .transpose()?;
        Ok(Self { allow, deny })
    }

    /// Read the reserved keys out of a handler's environment template.
    /// Setting both spellings of the same key is rejected rather than guessed.
    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Self> {
        Self::new(
            reserved(env, ALLOW_ENV, WHITELIST_ENV)?,
            reserved(env, DENY_ENV, BLACKLIST_ENV)?,
        )
    }

    /// Case-sensitive search of both patterns in `identity`.
    /// A set allow pattern must match; a set deny pattern must not.
    pub fn is_allowed(&self, identity: &str) -> bool {
        if let Some(ref allow) = self.allow {
            if !allow.is_match(identity) {
                return false;
            }
        }
        if let Some(ref deny) = self.deny {
            if deny.is_match(identity) {
                return false;
            }
        }
        true
    }
}

fn reserved<'a>(
    env: &'a BTreeMap<String, String>,
    key: &str,
    alias: &str,
) -> Result<Option<&'a str>> {
    match (env.get(key), env.get(alias)) {
        (Some(_), Some(_)) => anyhow::bail!("Both {} and {} are set", key, alias),
        (value, alias_value) => Ok(value.or(alias_value).map(String::as_str)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_patterns_allows_everyone() {
        let filter = AccessFilter::default();
        assert!(filter.is_allowed("!room:x@anyone:x"));
    }

    #[test]
    fn test_allow_pattern_gates_identity() {
        let filter = AccessFilter::new(Some("^!room1"), Some("user2")).unwrap();
        assert!(!filter.is_allowed("!room2@user1"));

        let filter = AccessFilter::new(Some("^!room1"), None).unwrap();
        assert!(filter.is_allowed("!room1@user2"));
        assert!(!filter.is_allowed("!room2@user1"));
    }

    #[test]
    fn test_deny_pattern_blocks_match() {
        let filter = AccessFilter::new(None, Some("@spammer:")).unwrap();
        assert!(!filter.is_allowed("!room:x@spammer:x"));
        assert!(filter.is_allowed("!room:x@friend:x"));
    }

    #[test]
    fn test_deny_checked_after_allow() {
        let filter = AccessFilter::new(Some("^!room1"), Some("@mallory")).unwrap();
        assert!(filter.is_allowed("!room1@alice"));
        assert!(!filter.is_allowed("!room1@mallory"));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let filter = AccessFilter::new(Some("^!Room1"), None).unwrap();
        assert!(!filter.is_allowed("!room1@alice"));
    }

    #[test]
    fn test_concatenation_is_ambiguous() {
        // "!room1" + "2user" and "!room12" + "user" produce the same identity
        let filter = AccessFilter::new(Some("^!room12"), None).unwrap();
        assert!(filter.is_allowed("!room12user"));
    }

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_whitelist_key_gates_like_allow() {
        let filter = AccessFilter::from_env(&env(&[(WHITELIST_ENV, "^!staff:")])).unwrap();
        assert!(filter.is_allowed("!staff:x@alice:x"));
        assert!(!filter.is_allowed("!public:x@mallory:x"));
    }

    #[test]
    fn test_blacklist_key_blocks_like_deny() {
        let filter = AccessFilter::from_env(&env(&[(BLACKLIST_ENV, "@mallory:")])).unwrap();
        assert!(!filter.is_allowed("!public:x@mallory:x"));
        assert!(filter.is_allowed("!public:x@alice:x"));
    }

    #[test]
    fn test_both_spellings_rejected() {
        let both = env(&[(ALLOW_ENV, "^!a"), (WHITELIST_ENV, "^!b")]);
        assert!(AccessFilter::from_env(&both).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(AccessFilter::new(Some("("), None).is_err());
        assert!(AccessFilter::new(None, Some("[")).is_err());
    }
}
