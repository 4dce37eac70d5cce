//! Web search with ordered fallback across engines.
//!
//! A preference list names engines (canonical ids or aliases). The selector
//! walks it in order, skips names it cannot resolve, and returns the first
//! engine's non-empty results. Engine failures are logged with credentials
//! scrubbed and the next engine is tried. Running out of engines is not an
//! error: the outcome is simply empty.

pub mod engines;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ToolError};
use crate::redact::Redactor;

pub use engines::{
    engines_from_config, BingEngine, BraveEngine, GoogleCseEngine, SearxngEngine, TavilyEngine,
};

/// Canonical ids of every engine this crate can talk to
pub const KNOWN_ENGINES: &[&str] = &["google_cse", "bing", "brave", "tavily", "searxng"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
    pub engine: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub engine_used: Option<String>,
    pub results: Vec<SearchHit>,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Canonical engine id
    fn id(&self) -> &str;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>>;
}

pub struct SearchFallbackSelector {
    engines: HashMap<String, Arc<dyn SearchEngine>>,
    aliases: HashMap<String, String>,
    default_preference: Vec<String>,
    timeout: Duration,
    redactor: Redactor,
}

impl SearchFallbackSelector {
    pub fn new(
        engines: Vec<Arc<dyn SearchEngine>>,
        aliases: &BTreeMap<String, String>,
        redactor: Redactor,
    ) -> Self {
        Self {
            engines: engines
                .into_iter()
                .map(|e| (e.id().to_string(), e))
                .collect(),
            aliases: aliases
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_ascii_lowercase()))
                .collect(),
            default_preference: KNOWN_ENGINES.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(15),
            redactor,
        }
    }

    pub fn with_default_preference(mut self, preference: Vec<String>) -> Self {
        self.default_preference = preference;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn default_preference(&self) -> &[String] {
        &self.default_preference
    }

    /// Canonical ids of configured engines, sorted
    pub fn configured_engines(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Map a preference name through the alias table to a canonical id.
    pub fn canonical_name(&self, name: &str) -> String {
        let normalized = name.trim().to_ascii_lowercase();
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }

    /// Resolve a preference list into configured engines, in order and
    /// without duplicates. Unknown and unconfigured names are skipped.
    pub fn resolve(&self, preference: &[String]) -> Vec<Arc<dyn SearchEngine>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for name in preference {
            let canonical = self.canonical_name(name);
            if !seen.insert(canonical.clone()) {
                continue;
            }
            match self.engines.get(&canonical) {
                Some(engine) => resolved.push(engine.clone()),
                None if KNOWN_ENGINES.contains(&canonical.as_str()) => {
                    debug!(engine = %canonical, "Search engine not configured, skipping")
                }
                None => warn!(engine = %name, "Unknown search engine, skipping"),
            }
        }
        resolved
    }

    /// Search using `preference`, or the configured default order when it
    /// is empty. Only cancellation is an error.
    pub async fn search(
        &self,
        preference: &[String],
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let preference = if preference.is_empty() {
            &self.default_preference[..]
        } else {
            preference
        };

        for engine in self.resolve(preference) {
            if cancel.is_cancelled() {
                return Err(ToolError::Cancelled("turn cancelled".to_string()));
            }
            let id = engine.id().to_string();
            let attempt = tokio::time::timeout(self.timeout, engine.search(query));
            let result = tokio::select! {
                r = attempt => r,
                _ = cancel.cancelled() => return Err(ToolError::Cancelled("turn cancelled".to_string())),
            };

            match result {
                Ok(Ok(hits)) if !hits.is_empty() => {
                    info!(engine = %id, results = hits.len(), "Search succeeded");
                    return Ok(SearchOutcome {
                        engine_used: Some(id),
                        results: hits.into_iter().take(query.max_results).collect(),
                    });
                }
                Ok(Ok(_)) => debug!(engine = %id, "Search returned no results, trying next"),
                Ok(Err(e)) => warn!(
                    engine = %id,
                    error = %self.redactor.redact(&e.to_string()),
                    "Search engine failed, trying next"
                ),
                Err(_) => warn!(
                    engine = %id,
                    error = %ToolError::timeout(format!("{} search", id), self.timeout),
                    "Search engine timed out, trying next"
                ),
            }
        }

        info!("All search engines exhausted");
        Ok(SearchOutcome::empty())
    }
}
