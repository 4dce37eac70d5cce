//! Per-thread session arenas.
//!
//! The map lock is only held to look sessions up or swap them in and out;
//! work on a session happens under that session's own lock.

use delve_browser::{BrowserLauncher, SandboxProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::info;

use crate::fetch::PageFetcher;
use crate::light_browser::{LightBrowserSession, LightBrowserSettings};
use crate::sandbox_session::{SandboxBrowserSession, SandboxSettings};
use crate::ThreadId;

pub struct SessionStore<S> {
    sessions: Mutex<HashMap<ThreadId, Arc<S>>>,
}

impl<S> Default for SessionStore<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl<S> SessionStore<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ThreadId, Arc<S>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, thread_id: &ThreadId) -> Option<Arc<S>> {
        self.sessions().get(thread_id).cloned()
    }

    pub fn get_or_create<F>(&self, thread_id: &ThreadId, create: F) -> Arc<S>
    where
        F: FnOnce() -> S,
    {
        self.sessions()
            .entry(thread_id.clone())
            .or_insert_with(|| Arc::new(create()))
            .clone()
    }

    pub fn remove(&self, thread_id: &ThreadId) -> Option<Arc<S>> {
        self.sessions().remove(thread_id)
    }

    /// Remove and return every session matching `predicate`.
    pub fn remove_where<P>(&self, mut predicate: P) -> Vec<(ThreadId, Arc<S>)>
    where
        P: FnMut(&S) -> bool,
    {
        let mut sessions = self.sessions();
        let matching: Vec<ThreadId> = sessions
            .iter()
            .filter(|(_, s)| predicate(s))
            .map(|(t, _)| t.clone())
            .collect();
        matching
            .into_iter()
            .filter_map(|t| sessions.remove(&t).map(|s| (t, s)))
            .collect()
    }

    pub fn drain(&self) -> Vec<(ThreadId, Arc<S>)> {
        self.sessions().drain().collect()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        let mut threads: Vec<ThreadId> = self.sessions().keys().cloned().collect();
        threads.sort();
        threads
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What one eviction sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub light: Vec<ThreadId>,
    pub sandbox: Vec<ThreadId>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.light.is_empty() && self.sandbox.is_empty()
    }
}

/// Both browser session arenas plus what is needed to create sessions
pub struct SessionStores {
    light: SessionStore<LightBrowserSession>,
    sandbox: SessionStore<SandboxBrowserSession>,
    fetcher: Arc<dyn PageFetcher>,
    light_settings: LightBrowserSettings,
    provider: Arc<dyn SandboxProvider>,
    launcher: Arc<dyn BrowserLauncher>,
    sandbox_settings: SandboxSettings,
}

impl SessionStores {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        light_settings: LightBrowserSettings,
        provider: Arc<dyn SandboxProvider>,
        launcher: Arc<dyn BrowserLauncher>,
        sandbox_settings: SandboxSettings,
    ) -> Self {
        Self {
            light: SessionStore::new(),
            sandbox: SessionStore::new(),
            fetcher,
            light_settings,
            provider,
            launcher,
            sandbox_settings,
        }
    }

    pub fn light(&self, thread_id: &ThreadId) -> Option<Arc<LightBrowserSession>> {
        self.light.get(thread_id)
    }

    pub fn light_or_create(&self, thread_id: &ThreadId) -> Arc<LightBrowserSession> {
        self.light.get_or_create(thread_id, || {
            LightBrowserSession::new(
                thread_id.clone(),
                self.fetcher.clone(),
                self.light_settings.clone(),
            )
        })
    }

    pub fn sandbox(&self, thread_id: &ThreadId) -> Option<Arc<SandboxBrowserSession>> {
        self.sandbox.get(thread_id)
    }

    /// Creating the session object is cheap; nothing is provisioned until
    /// the session is first used.
    pub fn sandbox_or_create(&self, thread_id: &ThreadId) -> Arc<SandboxBrowserSession> {
        self.sandbox.get_or_create(thread_id, || {
            SandboxBrowserSession::new(
                thread_id.clone(),
                self.provider.clone(),
                self.launcher.clone(),
                self.sandbox_settings.clone(),
            )
        })
    }

    pub fn light_sessions(&self) -> &SessionStore<LightBrowserSession> {
        &self.light
    }

    pub fn sandbox_sessions(&self) -> &SessionStore<SandboxBrowserSession> {
        &self.sandbox
    }

    /// Tear down the sandboxed session of one thread, if it has one.
    /// The session object stays registered and can provision again.
    pub async fn reset_sandbox(&self, thread_id: &ThreadId) -> bool {
        match self.sandbox.get(thread_id) {
            Some(session) => {
                session.reset().await;
                true
            }
            None => false,
        }
    }

    /// Like `reset_sandbox`, but `still_owner` is checked again under the
    /// session lock and the reset is skipped when it no longer holds.
    pub async fn reset_sandbox_if<P>(&self, thread_id: &ThreadId, still_owner: P) -> bool
    where
        P: FnOnce() -> bool,
    {
        match self.sandbox.get(thread_id) {
            Some(session) => session.reset_if(still_owner).await,
            None => false,
        }
    }

    /// Drop every session of a thread whose conversation has ended
    pub async fn release_thread(&self, thread_id: &ThreadId) {
        self.light.remove(thread_id);
        if let Some(session) = self.sandbox.remove(thread_id) {
            session.close().await;
        }
    }

    /// Evict sessions idle as of `now`. Sandboxed sessions are closed, which
    /// releases their sandbox, browser and page.
    pub async fn evict_idle(&self, now: Instant) -> EvictionReport {
        let light: Vec<ThreadId> = self
            .light
            .remove_where(|s| s.is_idle(now))
            .into_iter()
            .map(|(t, _)| t)
            .collect();

        let mut sandbox = Vec::new();
        for (thread_id, session) in self.sandbox.remove_where(|s| s.is_idle(now)) {
            session.close().await;
            sandbox.push(thread_id);
        }

        if !light.is_empty() || !sandbox.is_empty() {
            info!(
                light = light.len(),
                sandbox = sandbox.len(),
                "Evicted idle browser sessions"
            );
        }
        EvictionReport { light, sandbox }
    }

    /// Close every sandboxed session and forget all lightweight ones
    pub async fn teardown_all(&self) -> usize {
        self.light.drain();
        let sessions = self.sandbox.drain();
        let count = sessions.len();
        for (_, session) in sessions {
            session.close().await;
        }
        count
    }
}
