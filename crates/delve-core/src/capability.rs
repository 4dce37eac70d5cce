//! Capability profile: which tool groups a turn may use.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::warn;

use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGroup {
    WebSearch,
    Crawl,
    Browser,
    SandboxBrowser,
    CodeExecution,
    ExternalTools,
}

/// Every accepted profile key and the group it selects.
const GROUP_KEYS: &[(&str, ToolGroup)] = &[
    ("web_search", ToolGroup::WebSearch),
    ("crawl", ToolGroup::Crawl),
    ("browser", ToolGroup::Browser),
    ("sandbox_browser", ToolGroup::SandboxBrowser),
    ("code_execution", ToolGroup::CodeExecution),
    ("python", ToolGroup::CodeExecution),
    ("external_tools", ToolGroup::ExternalTools),
];

impl ToolGroup {
    pub const ALL: [ToolGroup; 6] = [
        ToolGroup::WebSearch,
        ToolGroup::Crawl,
        ToolGroup::Browser,
        ToolGroup::SandboxBrowser,
        ToolGroup::CodeExecution,
        ToolGroup::ExternalTools,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ToolGroup::WebSearch => "web_search",
            ToolGroup::Crawl => "crawl",
            ToolGroup::Browser => "browser",
            ToolGroup::SandboxBrowser => "sandbox_browser",
            ToolGroup::CodeExecution => "code_execution",
            ToolGroup::ExternalTools => "external_tools",
        }
    }

    pub fn default_enabled(self) -> bool {
        match self {
            ToolGroup::WebSearch | ToolGroup::Crawl | ToolGroup::ExternalTools => true,
            ToolGroup::Browser | ToolGroup::SandboxBrowser | ToolGroup::CodeExecution => false,
        }
    }

    /// Resolve a profile key (case-insensitive) to its group.
    pub fn resolve(key: &str) -> Result<Self, ToolError> {
        let normalized = key.trim().to_ascii_lowercase();
        GROUP_KEYS
            .iter()
            .find(|(k, _)| *k == normalized)
            .map(|(_, group)| *group)
            .ok_or_else(|| ToolError::UnknownToolGroup(key.to_string()))
    }
}

impl fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-turn tool-group flags. Groups without an explicit flag use
/// [`ToolGroup::default_enabled`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "HashMap<String, bool>")]
pub struct CapabilityProfile {
    flags: BTreeMap<ToolGroup, bool>,
}

impl CapabilityProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, group: ToolGroup, enabled: bool) -> Self {
        self.flags.insert(group, enabled);
        self
    }

    /// Build a profile from raw key/flag pairs, returning the keys that did
    /// not resolve alongside it.
    pub fn parse_flags<I, K>(flags: I) -> (Self, Vec<ToolError>)
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let mut profile = Self::default();
        let mut unknown = Vec::new();
        for (key, enabled) in flags {
            match ToolGroup::resolve(key.as_ref()) {
                Ok(group) => {
                    profile.flags.insert(group, enabled);
                }
                Err(e) => unknown.push(e),
            }
        }
        (profile, unknown)
    }

    /// Like [`parse_flags`](Self::parse_flags) but logs and drops unknown keys.
    pub fn from_flags<I, K>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: AsRef<str>,
    {
        let (profile, unknown) = Self::parse_flags(flags);
        for err in unknown {
            warn!("Ignoring capability flag: {}", err);
        }
        profile
    }

    /// `overrides` wins for every group it sets explicitly.
    pub fn layered(&self, overrides: &CapabilityProfile) -> CapabilityProfile {
        let mut flags = self.flags.clone();
        flags.extend(overrides.flags.iter().map(|(g, e)| (*g, *e)));
        CapabilityProfile { flags }
    }

    pub fn is_enabled(&self, group: ToolGroup) -> bool {
        self.flags
            .get(&group)
            .copied()
            .unwrap_or_else(|| group.default_enabled())
    }

    /// The single browser family to register, if any. The sandboxed browser
    /// takes precedence when both are enabled.
    pub fn browser_family(&self) -> Option<ToolGroup> {
        if self.is_enabled(ToolGroup::SandboxBrowser) {
            Some(ToolGroup::SandboxBrowser)
        } else if self.is_enabled(ToolGroup::Browser) {
            Some(ToolGroup::Browser)
        } else {
            None
        }
    }

    /// Groups that contribute tools, in registration order.
    pub fn effective_groups(&self) -> Vec<ToolGroup> {
        let family = self.browser_family();
        ToolGroup::ALL
            .into_iter()
            .filter(|group| match group {
                ToolGroup::Browser | ToolGroup::SandboxBrowser => Some(*group) == family,
                _ => self.is_enabled(*group),
            })
            .collect()
    }
}

impl From<HashMap<String, bool>> for CapabilityProfile {
    fn from(flags: HashMap<String, bool>) -> Self {
        Self::from_flags(flags)
    }
}

impl From<&BTreeMap<String, bool>> for CapabilityProfile {
    fn from(flags: &BTreeMap<String, bool>) -> Self {
        Self::from_flags(flags.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let profile = CapabilityProfile::default();
        assert!(profile.is_enabled(ToolGroup::WebSearch));
        assert!(profile.is_enabled(ToolGroup::Crawl));
        assert!(profile.is_enabled(ToolGroup::ExternalTools));
        assert!(!profile.is_enabled(ToolGroup::Browser));
        assert!(!profile.is_enabled(ToolGroup::SandboxBrowser));
        assert!(!profile.is_enabled(ToolGroup::CodeExecution));
        assert_eq!(profile.browser_family(), None);
    }

    #[test]
    fn test_python_alias_resolves_to_code_execution() {
        assert_eq!(ToolGroup::resolve("python").unwrap(), ToolGroup::CodeExecution);
        assert_eq!(ToolGroup::resolve(" Python ").unwrap(), ToolGroup::CodeExecution);
    }

    #[test]
    fn test_unknown_key_is_reported_and_ignored() {
        let (profile, unknown) =
            CapabilityProfile::parse_flags([("telepathy", true), ("browser", true)]);
        assert_eq!(
            unknown,
            vec![ToolError::UnknownToolGroup("telepathy".to_string())]
        );
        assert!(profile.is_enabled(ToolGroup::Browser));
    }

    #[test]
    fn test_sandbox_takes_precedence_over_lightweight() {
        let profile = CapabilityProfile::new()
            .with(ToolGroup::Browser, true)
            .with(ToolGroup::SandboxBrowser, true);
        assert_eq!(profile.browser_family(), Some(ToolGroup::SandboxBrowser));
        let groups = profile.effective_groups();
        assert!(groups.contains(&ToolGroup::SandboxBrowser));
        assert!(!groups.contains(&ToolGroup::Browser));
    }

    #[test]
    fn test_layered_overrides_win() {
        let base = CapabilityProfile::new()
            .with(ToolGroup::Browser, true)
            .with(ToolGroup::WebSearch, false);
        let overrides = CapabilityProfile::new().with(ToolGroup::WebSearch, true);
        let merged = base.layered(&overrides);
        assert!(merged.is_enabled(ToolGroup::Browser));
        assert!(merged.is_enabled(ToolGroup::WebSearch));
    }

    #[test]
    fn test_deserialize_from_json_map() {
        let profile: CapabilityProfile =
            serde_json::from_str(r#"{"crawl": false, "python": true, "bogus": true}"#).unwrap();
        assert!(!profile.is_enabled(ToolGroup::Crawl));
        assert!(profile.is_enabled(ToolGroup::CodeExecution));
    }
}
