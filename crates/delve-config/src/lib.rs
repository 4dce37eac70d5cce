use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capabilities: CapabilitiesConfig,
    pub search: SearchConfig,
    pub browser: BrowserConfig,
    pub sandbox: SandboxConfig,
    pub execution: ExecutionConfig,
    pub turn: TurnConfig,
}

/// Default capability profile applied when a request does not override a group.
///
/// Keys are tool-group names (`web_search`, `crawl`, `browser`, ...). Groups not
/// listed keep their built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitiesConfig {
    pub groups: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Engine preference, most preferred first. Aliases are allowed.
    pub engines: Vec<String>,
    /// Alias -> canonical engine id
    pub aliases: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub max_results: usize,
    pub google_cse: Option<GoogleCseConfig>,
    pub bing: Option<ApiKeyConfig>,
    pub brave: Option<ApiKeyConfig>,
    pub tavily: Option<ApiKeyConfig>,
    pub searxng: Option<SearxngConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleCseConfig {
    pub api_key: String,
    pub cx: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub api_key: String,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearxngConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Hard cap on bytes read from a response body
    pub max_bytes: usize,
    /// Maximum decoded text kept per page; longer text is truncated with a marker
    pub max_text_chars: usize,
    pub max_links: usize,
    pub max_history: usize,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub idle_eviction_secs: u64,
}

/// Where sandboxed browsers are provisioned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SandboxProviderKind {
    /// Spawn a local chromedriver process per sandbox
    #[default]
    Local,
    /// Provision through a remote sandbox HTTP API
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub provider: SandboxProviderKind,
    pub chromedriver_binary: Option<String>,
    /// Optional path to Chrome binary (e.g., Chrome for Testing)
    pub chrome_binary: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub provision_timeout_secs: u64,
    pub action_timeout_secs: u64,
    pub idle_eviction_secs: u64,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub python_binary: String,
    pub timeout_secs: u64,
    pub max_output_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Upper bound on model/tool round trips within one turn
    pub max_tool_rounds: usize,
    /// How long shutdown waits for in-flight turns to unwind
    pub shutdown_grace_secs: u64,
    /// Interval between idle-session eviction sweeps
    pub reaper_interval_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("google".to_string(), "google_cse".to_string());
        aliases.insert("bing_search".to_string(), "bing".to_string());
        aliases.insert("brave_search".to_string(), "brave".to_string());
        aliases.insert("searx".to_string(), "searxng".to_string());

        Self {
            engines: vec![
                "google".to_string(),
                "bing".to_string(),
                "brave".to_string(),
                "tavily".to_string(),
                "searxng".to_string(),
            ],
            aliases,
            timeout_secs: 15,
            max_results: 8,
            google_cse: None,
            bing: None,
            brave: None,
            tavily: None,
            searxng: None,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            max_text_chars: 20_000,
            max_links: 200,
            max_history: 50,
            fetch_timeout_secs: 20,
            user_agent: format!("delve/{}", env!("CARGO_PKG_VERSION")),
            idle_eviction_secs: 30 * 60,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::Local,
            chromedriver_binary: None,
            chrome_binary: None,
            endpoint: None,
            api_key: None,
            provision_timeout_secs: 60,
            action_timeout_secs: 30,
            idle_eviction_secs: 10 * 60,
            window_width: 1280,
            window_height: 800,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python_binary: "python3".to_string(),
            timeout_secs: 30,
            max_output_chars: 10_000,
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 25,
            shutdown_grace_secs: 10,
            reaper_interval_secs: 60,
        }
    }
}

/// Read an env var, treating blank values as unset.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("./delve.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("delve").join("config.toml"));
    }
    paths.push(PathBuf::from(shellexpand::tilde("~/.delve.toml").as_ref()));
    paths
}

impl Config {
    /// Load configuration from an explicit path or the first default location
    /// that exists, then apply credential overrides from the environment.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = match config_path {
            Some(p) => {
                let expanded = PathBuf::from(shellexpand::tilde(p).as_ref());
                if !expanded.exists() {
                    anyhow::bail!("Config file not found: {}", expanded.display());
                }
                Some(expanded)
            }
            None => default_config_paths().into_iter().find(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Fill in credentials from `DELVE_*` environment variables.
    ///
    /// Env values win over file values so secrets can stay out of config files.
    pub fn apply_env_overrides(&mut self) {
        let google_key = env_value("DELVE_GOOGLE_API_KEY");
        let google_cx = env_value("DELVE_GOOGLE_CX");
        match (&mut self.search.google_cse, google_key, google_cx) {
            (Some(cfg), key, cx) => {
                if let Some(key) = key {
                    cfg.api_key = key;
                }
                if let Some(cx) = cx {
                    cfg.cx = cx;
                }
            }
            (None, Some(api_key), Some(cx)) => {
                self.search.google_cse = Some(GoogleCseConfig {
                    api_key,
                    cx,
                    endpoint: None,
                });
            }
            _ => {}
        }

        apply_key_override(&mut self.search.bing, "DELVE_BING_API_KEY");
        apply_key_override(&mut self.search.brave, "DELVE_BRAVE_API_KEY");
        apply_key_override(&mut self.search.tavily, "DELVE_TAVILY_API_KEY");

        if let Some(endpoint) = env_value("DELVE_SEARXNG_ENDPOINT") {
            self.search.searxng = Some(SearxngConfig { endpoint });
        }
        if let Some(key) = env_value("DELVE_SANDBOX_API_KEY") {
            self.sandbox.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.timeout_secs == 0 {
            anyhow::bail!("search.timeout_secs must be greater than zero");
        }
        if self.browser.fetch_timeout_secs == 0 {
            anyhow::bail!("browser.fetch_timeout_secs must be greater than zero");
        }
        if self.sandbox.provision_timeout_secs == 0 || self.sandbox.action_timeout_secs == 0 {
            anyhow::bail!("sandbox timeouts must be greater than zero");
        }
        if self.execution.timeout_secs == 0 {
            anyhow::bail!("execution.timeout_secs must be greater than zero");
        }
        if self.sandbox.provider == SandboxProviderKind::Remote && self.sandbox.endpoint.is_none() {
            anyhow::bail!("sandbox.provider = \"remote\" requires sandbox.endpoint");
        }
        Ok(())
    }

    /// Every configured credential, for scrubbing error messages and logs.
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if let Some(google) = &self.search.google_cse {
            secrets.push(google.api_key.clone());
        }
        for cfg in [&self.search.bing, &self.search.brave, &self.search.tavily]
            .into_iter()
            .flatten()
        {
            secrets.push(cfg.api_key.clone());
        }
        if let Some(key) = &self.sandbox.api_key {
            secrets.push(key.clone());
        }
        secrets.retain(|s| !s.trim().is_empty());
        secrets
    }
}

fn apply_key_override(slot: &mut Option<ApiKeyConfig>, var: &str) {
    if let Some(api_key) = env_value(var) {
        match slot {
            Some(cfg) => cfg.api_key = api_key,
            None => {
                *slot = Some(ApiKeyConfig {
                    api_key,
                    endpoint: None,
                })
            }
        }
    }
}
