//! Sandboxed, script-capable browser session for one conversation thread.
//!
//! The session owns at most one sandbox, one browser and one page. Nothing is
//! provisioned until a tool first needs the page; after that every action
//! reuses it. `reset` tears the three resources down in reverse order and
//! returns the session to its initial state, while `close` retires it for
//! good. All operations on a session are serialised through one async lock.

use base64::Engine as _;
use delve_browser::{
    webdriver_key, BrowserHandle, BrowserLauncher, PageHandle, SandboxInstance, SandboxProvider,
    ScrollDirection,
};
use delve_config::SandboxConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{with_timeout, Result, ToolError};
use crate::extract::{self, Link};
use crate::light_browser::DEFAULT_EXCERPT_CHARS;
use crate::ThreadId;

const MAX_SNAPSHOT_LINKS: usize = 50;

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub provision_timeout: Duration,
    pub action_timeout: Duration,
    pub idle_timeout: Duration,
}

impl From<&SandboxConfig> for SandboxSettings {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            provision_timeout: Duration::from_secs(config.provision_timeout_secs),
            action_timeout: Duration::from_secs(config.action_timeout_secs),
            idle_timeout: Duration::from_secs(config.idle_eviction_secs),
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickTarget {
    Selector(String),
    Text(String),
}

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxPhase {
    Uninitialized,
    Ready,
    TornDown,
}

/// Result of a sandbox browser action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSnapshot {
    pub url: String,
    pub title: String,
    pub text_excerpt: String,
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_base64: Option<String>,
}

struct SandboxResources {
    instance: SandboxInstance,
    browser: Box<dyn BrowserHandle>,
    page: Box<dyn PageHandle>,
}

enum SandboxState {
    Uninitialized,
    Ready(SandboxResources),
    TornDown,
}

impl SandboxState {
    fn phase(&self) -> SandboxPhase {
        match self {
            SandboxState::Uninitialized => SandboxPhase::Uninitialized,
            SandboxState::Ready(_) => SandboxPhase::Ready,
            SandboxState::TornDown => SandboxPhase::TornDown,
        }
    }
}

pub struct SandboxBrowserSession {
    thread_id: ThreadId,
    provider: Arc<dyn SandboxProvider>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: SandboxSettings,
    state: Mutex<SandboxState>,
    last_used: StdMutex<Instant>,
    provisions: AtomicU64,
}

fn cancelled() -> ToolError {
    ToolError::Cancelled("turn cancelled".to_string())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    Ok(())
}

fn browser_error(e: anyhow::Error) -> ToolError {
    ToolError::Browser(format!("{:#}", e))
}

impl SandboxBrowserSession {
    pub fn new(
        thread_id: ThreadId,
        provider: Arc<dyn SandboxProvider>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: SandboxSettings,
    ) -> Self {
        Self {
            thread_id,
            provider,
            launcher,
            settings,
            state: Mutex::new(SandboxState::Uninitialized),
            last_used: StdMutex::new(Instant::now()),
            provisions: AtomicU64::new(0),
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// How many times a sandbox has been provisioned for this session
    pub fn provision_count(&self) -> u64 {
        self.provisions.load(Ordering::Relaxed)
    }

    pub async fn phase(&self) -> SandboxPhase {
        self.state.lock().await.phase()
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used()) > self.settings.idle_timeout
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Wait for the session lock unless the turn is cancelled first.
    async fn lock(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, SandboxState>> {
        check_cancelled(cancel)?;
        tokio::select! {
            guard = self.state.lock() => {
                self.touch();
                Ok(guard)
            }
            _ = cancel.cancelled() => Err(cancelled()),
        }
    }

    /// Provision sandbox, browser and page, releasing whatever was acquired
    /// if a later step fails or the turn is cancelled between steps.
    async fn provision(&self, cancel: &CancellationToken) -> Result<SandboxResources> {
        let timeout = self.settings.provision_timeout;
        info!(
            thread_id = %self.thread_id,
            provider = self.provider.name(),
            "Provisioning sandboxed browser"
        );

        // Runs to completion so the instance is always known to terminate
        let instance = match tokio::time::timeout(timeout, self.provider.provision()).await {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => return Err(ToolError::SandboxProvision(format!("{:#}", e))),
            Err(_) => {
                return Err(ToolError::SandboxProvision(format!(
                    "sandbox not ready after {}s",
                    timeout.as_secs()
                )))
            }
        };
        if cancel.is_cancelled() {
            self.terminate_instance(&instance).await;
            return Err(cancelled());
        }

        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = tokio::time::timeout(timeout, self.launcher.launch(&instance.webdriver_url)) => Some(outcome),
        };
        let browser = match launched {
            Some(Ok(Ok(browser))) => browser,
            Some(Ok(Err(e))) => {
                self.terminate_instance(&instance).await;
                return Err(ToolError::SandboxProvision(format!("browser launch failed: {:#}", e)));
            }
            Some(Err(_)) => {
                self.terminate_instance(&instance).await;
                return Err(ToolError::SandboxProvision(format!(
                    "browser launch timed out after {}s",
                    timeout.as_secs()
                )));
            }
            None => {
                self.terminate_instance(&instance).await;
                return Err(cancelled());
            }
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = tokio::time::timeout(timeout, browser.new_page()) => Some(outcome),
        };
        let page = match opened {
            Some(Ok(Ok(page))) => page,
            outcome => {
                self.quit_browser(browser.as_ref()).await;
                self.terminate_instance(&instance).await;
                let reason = match outcome {
                    Some(Ok(Err(e))) => format!("{:#}", e),
                    Some(_) => format!("timed out after {}s", timeout.as_secs()),
                    None => return Err(cancelled()),
                };
                return Err(ToolError::SandboxProvision(format!("could not open page: {}", reason)));
            }
        };

        self.provisions.fetch_add(1, Ordering::Relaxed);
        debug!(
            thread_id = %self.thread_id,
            sandbox = %instance.id,
            page = page.id(),
            "Sandboxed browser ready"
        );
        Ok(SandboxResources {
            instance,
            browser,
            page,
        })
    }

    async fn ensure_ready<'s>(
        &self,
        state: &'s mut SandboxState,
        cancel: &CancellationToken,
    ) -> Result<&'s SandboxResources> {
        if matches!(state, SandboxState::Uninitialized) {
            let resources = self.provision(cancel).await?;
            *state = SandboxState::Ready(resources);
        }
        match state {
            SandboxState::Ready(resources) => Ok(resources),
            SandboxState::TornDown => Err(ToolError::SessionClosed),
            SandboxState::Uninitialized => Err(ToolError::SandboxProvision(
                "sandbox was not provisioned".to_string(),
            )),
        }
    }

    fn ready(state: &SandboxState) -> Result<&SandboxResources> {
        match state {
            SandboxState::Ready(resources) => Ok(resources),
            SandboxState::Uninitialized => Err(ToolError::NoActivePage),
            SandboxState::TornDown => Err(ToolError::SessionClosed),
        }
    }

    /// Run one WebDriver command under the action timeout, giving up as
    /// soon as the turn is cancelled.
    async fn act<T, F>(&self, operation: &str, cancel: &CancellationToken, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(thread_id = %self.thread_id, operation, "Sandbox action cancelled");
                Err(cancelled())
            }
            result = with_timeout(operation, self.settings.action_timeout, async {
                fut.await.map_err(browser_error)
            }) => result,
        }
    }

    async fn snapshot(
        &self,
        page: &dyn PageHandle,
        with_screenshot: bool,
        cancel: &CancellationToken,
    ) -> Result<SandboxSnapshot> {
        let url = self.act("current_url", cancel, page.current_url()).await?;
        let title = self.act("title", cancel, page.title()).await?;
        let text = self.act("extract_text", cancel, page.text()).await?;
        let links = self
            .act("links", cancel, page.links())
            .await?
            .into_iter()
            .take(MAX_SNAPSHOT_LINKS)
            .enumerate()
            .map(|(index, link)| Link {
                index,
                url: link.url,
                text: link.text,
            })
            .collect();
        let screenshot_base64 = if with_screenshot {
            let png = self.act("screenshot", cancel, page.screenshot()).await?;
            Some(base64::engine::general_purpose::STANDARD.encode(png))
        } else {
            None
        };
        Ok(SandboxSnapshot {
            url,
            title,
            text_excerpt: extract::truncate_chars(text.trim(), DEFAULT_EXCERPT_CHARS).0,
            links,
            screenshot_base64,
        })
    }

    /// Return the live page's id, provisioning everything on first use.
    /// Repeated calls return the same page.
    pub async fn get_page(&self, cancel: &CancellationToken) -> Result<String> {
        let mut state = self.lock(cancel).await?;
        let resources = self.ensure_ready(&mut state, cancel).await?;
        Ok(resources.page.id().to_string())
    }

    pub async fn navigate(&self, url: &str, cancel: &CancellationToken) -> Result<SandboxSnapshot> {
        let mut state = self.lock(cancel).await?;
        let resources = self.ensure_ready(&mut state, cancel).await?;
        check_cancelled(cancel)?;
        let page = resources.page.as_ref();
        self.act("navigate", cancel, page.goto(url)).await?;
        debug!(thread_id = %self.thread_id, url, "Sandboxed browser navigated");
        self.snapshot(page, true, cancel).await
    }

    pub async fn click(&self, target: &ClickTarget, cancel: &CancellationToken) -> Result<SandboxSnapshot> {
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        match target {
            ClickTarget::Selector(selector) => self.act("click", cancel, page.click_selector(selector)).await?,
            ClickTarget::Text(text) => self.act("click", cancel, page.click_text(text)).await?,
        }
        self.snapshot(page, true, cancel).await
    }

    pub async fn type_text(
        &self,
        text: &str,
        selector: Option<&str>,
        press_enter: bool,
        cancel: &CancellationToken,
    ) -> Result<SandboxSnapshot> {
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        self.act("type", cancel, page.type_text(selector, text, press_enter)).await?;
        self.snapshot(page, true, cancel).await
    }

    pub async fn press(&self, key: &str, cancel: &CancellationToken) -> Result<SandboxSnapshot> {
        if webdriver_key(key).is_none() {
            return Err(ToolError::InvalidArguments(format!("unknown key '{}'", key)));
        }
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        self.act("press", cancel, page.press_key(key)).await?;
        self.snapshot(page, true, cancel).await
    }

    pub async fn scroll(
        &self,
        direction: ScrollDirection,
        pixels: u32,
        cancel: &CancellationToken,
    ) -> Result<SandboxSnapshot> {
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        self.act("scroll", cancel, page.scroll(direction, pixels)).await?;
        self.snapshot(page, true, cancel).await
    }

    pub async fn extract_text(&self, max_chars: Option<usize>, cancel: &CancellationToken) -> Result<String> {
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        let text = self.act("extract_text", cancel, page.text()).await?;
        Ok(match max_chars {
            Some(max) => extract::truncate_chars(text.trim(), max).0,
            None => text.trim().to_string(),
        })
    }

    /// PNG screenshot of the current page, base64-encoded
    pub async fn screenshot(&self, cancel: &CancellationToken) -> Result<String> {
        let state = self.lock(cancel).await?;
        let page = Self::ready(&state)?.page.as_ref();
        check_cancelled(cancel)?;
        let png = self.act("screenshot", cancel, page.screenshot()).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png))
    }

    /// Tear down page, browser and sandbox and return to the initial state.
    /// Waits for any in-flight action; never fails.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.reset_locked(&mut state).await;
    }

    /// Reset only if `still_owner` holds once the session lock is taken.
    /// Returns whether the reset ran.
    pub async fn reset_if<P>(&self, still_owner: P) -> bool
    where
        P: FnOnce() -> bool,
    {
        let mut state = self.state.lock().await;
        if !still_owner() {
            debug!(thread_id = %self.thread_id, "Sandbox changed owner, skipping reset");
            return false;
        }
        self.reset_locked(&mut state).await;
        true
    }

    async fn reset_locked(&self, state: &mut SandboxState) {
        match std::mem::replace(state, SandboxState::Uninitialized) {
            SandboxState::Ready(resources) => self.teardown(resources).await,
            SandboxState::Uninitialized => {
                debug!(thread_id = %self.thread_id, "Sandbox reset with nothing provisioned")
            }
            // A closed session stays closed
            SandboxState::TornDown => *state = SandboxState::TornDown,
        }
    }

    /// Release everything and retire the session. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let SandboxState::Ready(resources) = std::mem::replace(&mut *state, SandboxState::TornDown) {
            self.teardown(resources).await;
        }
    }

    async fn teardown(&self, resources: SandboxResources) {
        let SandboxResources {
            instance,
            browser,
            page,
        } = resources;
        let limit = self.settings.action_timeout;

        match tokio::time::timeout(limit, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(thread_id = %self.thread_id, "Page already gone: {:#}", e),
            Err(_) => debug!(thread_id = %self.thread_id, "Timed out closing page"),
        }
        self.quit_browser(browser.as_ref()).await;
        self.terminate_instance(&instance).await;
        info!(thread_id = %self.thread_id, sandbox = %instance.id, "Sandboxed browser torn down");
    }

    async fn quit_browser(&self, browser: &dyn BrowserHandle) {
        match tokio::time::timeout(self.settings.action_timeout, browser.quit()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(thread_id = %self.thread_id, "Browser already gone: {:#}", e),
            Err(_) => debug!(thread_id = %self.thread_id, "Timed out quitting browser"),
        }
    }

    async fn terminate_instance(&self, instance: &SandboxInstance) {
        match tokio::time::timeout(self.settings.provision_timeout, self.provider.terminate(instance)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                thread_id = %self.thread_id,
                sandbox = %instance.id,
                "Failed to terminate sandbox: {:#}",
                e
            ),
            Err(_) => warn!(
                thread_id = %self.thread_id,
                sandbox = %instance.id,
                "Timed out terminating sandbox"
            ),
        }
    }
}
