//! Process-wide state shared by every turn: the cancellation registry, the
//! browser session arenas, the search selector and the external tool source.

use anyhow::{Context, Result};
use delve_browser::{
    BrowserLauncher, ChromeLauncher, LocalDriverSandbox, RemoteSandbox, SandboxProvider,
};
use delve_config::{Config, SandboxProviderKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancellation::{ActiveTaskSnapshot, CancellationManager};
use crate::capability::CapabilityProfile;
use crate::code_runner::PythonRunner;
use crate::external::{ExternalToolRegistry, NoExternalTools};
use crate::fetch::{HttpPageFetcher, PageFetcher};
use crate::light_browser::LightBrowserSettings;
use crate::redact::Redactor;
use crate::registry::{ToolRegistryBuilder, ToolSet};
use crate::sandbox_session::SandboxSettings;
use crate::search::{engines_from_config, SearchEngine, SearchFallbackSelector};
use crate::session_store::{EvictionReport, SessionStores};
use crate::turn::Turn;
use crate::ThreadId;

const SHUTDOWN_REASON: &str = "shutting down";

pub struct Runtime {
    config: Config,
    cancellation: CancellationManager,
    sessions: SessionStores,
    search: SearchFallbackSelector,
    fetcher: Arc<dyn PageFetcher>,
    light_settings: LightBrowserSettings,
    python: PythonRunner,
    external: Arc<dyn ExternalToolRegistry>,
    redactor: Redactor,
    default_profile: CapabilityProfile,
    shutdown: CancellationToken,
}

/// Builds a [`Runtime`] from configuration. Collaborators not injected
/// explicitly are derived from the config.
pub struct RuntimeBuilder {
    config: Config,
    fetcher: Option<Arc<dyn PageFetcher>>,
    engines: Option<Vec<Arc<dyn SearchEngine>>>,
    provider: Option<Arc<dyn SandboxProvider>>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    external: Option<Arc<dyn ExternalToolRegistry>>,
}

impl RuntimeBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
            engines: None,
            provider: None,
            launcher: None,
            external: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn search_engines(mut self, engines: Vec<Arc<dyn SearchEngine>>) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn sandbox_provider(mut self, provider: Arc<dyn SandboxProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn browser_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn external_tools(mut self, external: Arc<dyn ExternalToolRegistry>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn build(self) -> Result<Runtime> {
        let config = self.config;
        config.validate()?;

        let fetcher: Arc<dyn PageFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpPageFetcher::new(&config.browser).context("Failed to build HTTP fetcher")?),
        };

        let engines = match self.engines {
            Some(engines) => engines,
            None => {
                let client = reqwest::Client::builder()
                    .user_agent(config.browser.user_agent.clone())
                    .build()
                    .context("Failed to build search HTTP client")?;
                engines_from_config(&config.search, client)
            }
        };

        let provider = match self.provider {
            Some(provider) => provider,
            None => sandbox_provider_from_config(&config)?,
        };

        let launcher: Arc<dyn BrowserLauncher> = match self.launcher {
            Some(launcher) => launcher,
            None => Arc::new(
                ChromeLauncher::new()
                    .with_binary(config.sandbox.chrome_binary.clone())
                    .with_window_size(config.sandbox.window_width, config.sandbox.window_height)
                    .with_connect_timeout(Duration::from_secs(config.sandbox.provision_timeout_secs)),
            ),
        };

        let redactor = Redactor::new(config.secrets());
        let search = SearchFallbackSelector::new(engines, &config.search.aliases, redactor.clone())
            .with_default_preference(config.search.engines.clone())
            .with_timeout(Duration::from_secs(config.search.timeout_secs));
        info!(
            engines = ?search.configured_engines(),
            sandbox = provider.name(),
            "Runtime initialised"
        );

        let light_settings = LightBrowserSettings::from(&config.browser);
        let sessions = SessionStores::new(
            fetcher.clone(),
            light_settings.clone(),
            provider,
            launcher,
            SandboxSettings::from(&config.sandbox),
        );

        Ok(Runtime {
            cancellation: CancellationManager::new(),
            sessions,
            search,
            fetcher,
            light_settings,
            python: PythonRunner::from(&config.execution),
            external: self.external.unwrap_or_else(|| Arc::new(NoExternalTools)),
            redactor,
            default_profile: CapabilityProfile::from(&config.capabilities.groups),
            shutdown: CancellationToken::new(),
            config,
        })
    }
}

fn sandbox_provider_from_config(config: &Config) -> Result<Arc<dyn SandboxProvider>> {
    let sandbox = &config.sandbox;
    let timeout = Duration::from_secs(sandbox.provision_timeout_secs);
    Ok(match sandbox.provider {
        SandboxProviderKind::Local => Arc::new(
            LocalDriverSandbox::new(sandbox.chromedriver_binary.clone()).with_startup_timeout(timeout),
        ),
        SandboxProviderKind::Remote => {
            let endpoint = sandbox
                .endpoint
                .clone()
                .context("sandbox.endpoint is required for the remote provider")?;
            Arc::new(RemoteSandbox::new(endpoint, sandbox.api_key.clone()).with_timeout(timeout))
        }
    })
}

impl Runtime {
    pub fn from_config(config: Config) -> Result<Self> {
        RuntimeBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationManager {
        &self.cancellation
    }

    pub fn sessions(&self) -> &SessionStores {
        &self.sessions
    }

    pub fn search(&self) -> &SearchFallbackSelector {
        &self.search
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    pub fn light_settings(&self) -> &LightBrowserSettings {
        &self.light_settings
    }

    pub fn python(&self) -> &PythonRunner {
        &self.python
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Profile applied when a request carries no overrides
    pub fn default_profile(&self) -> &CapabilityProfile {
        &self.default_profile
    }

    /// Tool set for `thread_id` under `profile`, without registering a turn.
    pub fn build_tools(&self, profile: &CapabilityProfile, thread_id: &ThreadId) -> ToolSet {
        ToolRegistryBuilder::new(self.external.as_ref()).build(profile, thread_id)
    }

    /// Start a turn: register it for cancellation, then build its tools from
    /// the default profile with `overrides` layered on top. A turn still
    /// running on the same thread is superseded.
    pub fn begin_turn(self: &Arc<Self>, thread_id: &ThreadId, overrides: &CapabilityProfile) -> Turn {
        let guard = self.cancellation.begin(thread_id);
        let profile = self.default_profile.layered(overrides);
        let tools = self.build_tools(&profile, thread_id);
        info!(
            thread_id = %thread_id,
            task_id = guard.handle().task_id(),
            tools = tools.len(),
            "Turn started"
        );
        Turn::new(Arc::clone(self), guard, tools)
    }

    pub fn cancel(&self, thread_id: &ThreadId, reason: Option<&str>) -> bool {
        self.cancellation.cancel(thread_id, reason)
    }

    pub fn cancel_all(&self, reason: Option<&str>) -> usize {
        self.cancellation.cancel_all(reason)
    }

    pub fn active_tasks(&self) -> Vec<ActiveTaskSnapshot> {
        self.cancellation.get_active_tasks()
    }

    /// Forget every session of a conversation that has ended.
    pub async fn release_thread(&self, thread_id: &ThreadId) {
        self.sessions.release_thread(thread_id).await;
    }

    pub async fn evict_idle(&self) -> EvictionReport {
        self.sessions.evict_idle(Instant::now()).await
    }

    /// Run idle eviction every `interval` until shutdown or until the
    /// runtime is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let runtime = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(live) = runtime.upgrade() else { break };
                        let report = live.evict_idle().await;
                        if !report.is_empty() {
                            debug!(?report, "Reaper sweep");
                        }
                    }
                }
            }
            debug!("Session reaper stopped");
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every turn, wait up to the configured grace period for them to
    /// unwind, then tear down all sandboxed sessions. Returns the number of
    /// turns still registered when the grace period ran out.
    pub async fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        let grace = Duration::from_secs(self.config.turn.shutdown_grace_secs);
        let remaining = self.cancellation.shutdown(SHUTDOWN_REASON, grace).await;
        let closed = self.sessions.teardown_all().await;
        info!(remaining, sandboxes = closed, "Runtime shut down");
        remaining
    }
}
