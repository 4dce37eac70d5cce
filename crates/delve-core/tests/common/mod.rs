//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use delve_browser::{
    BrowserHandle, BrowserLauncher, PageHandle, PageLink, SandboxInstance, SandboxProvider,
    ScrollDirection,
};
use delve_config::Config;
use delve_core::fetch::{FetchedDocument, PageFetcher};
use delve_core::search::{SearchEngine, SearchHit, SearchQuery};
use delve_core::{Runtime, ToolError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle counters shared by a fake provider, its browsers and pages
#[derive(Debug, Default)]
pub struct Counters {
    pub provisions: AtomicUsize,
    pub terminations: AtomicUsize,
    pub launches: AtomicUsize,
    pub quits: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Provisioned sandboxes not yet terminated
    pub fn live_sandboxes(&self) -> usize {
        Self::get(&self.provisions) - Self::get(&self.terminations)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailAt {
    #[default]
    Nowhere,
    Provision,
    Launch,
    NewPage,
}

pub struct FakeProvider {
    pub counters: Arc<Counters>,
    fail_at: FailAt,
    delay: Duration,
}

impl FakeProvider {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            fail_at: FailAt::Nowhere,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn provision(&self) -> Result<SandboxInstance> {
        tokio::time::sleep(self.delay).await;
        if self.fail_at == FailAt::Provision {
            bail!("no capacity");
        }
        let n = self.counters.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(SandboxInstance {
            id: format!("sbx-{}", n),
            webdriver_url: format!("http://sandbox-{}.test", n),
        })
    }

    async fn terminate(&self, _instance: &SandboxInstance) -> Result<()> {
        self.counters.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    counters: Arc<Counters>,
    fail_at: FailAt,
    action_delay: Duration,
}

impl FakeLauncher {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            fail_at: FailAt::Nowhere,
            action_delay: Duration::ZERO,
        }
    }

    pub fn failing_at(mut self, fail_at: FailAt) -> Self {
        self.fail_at = fail_at;
        self
    }

    /// How long every page action takes
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = delay;
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _webdriver_url: &str) -> Result<Box<dyn BrowserHandle>> {
        if self.fail_at == FailAt::Launch {
            bail!("chrome crashed on start");
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            counters: self.counters.clone(),
            fail_new_page: self.fail_at == FailAt::NewPage,
            action_delay: self.action_delay,
        }))
    }
}

struct FakeBrowser {
    counters: Arc<Counters>,
    fail_new_page: bool,
    action_delay: Duration,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>> {
        if self.fail_new_page {
            bail!("target window already closed");
        }
        let n = self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            id: format!("page-{}", n),
            counters: self.counters.clone(),
            url: Mutex::new("about:blank".to_string()),
            scroll_y: Mutex::new(0),
            typed: Mutex::new(String::new()),
            action_delay: self.action_delay,
        }))
    }

    async fn quit(&self) -> Result<()> {
        self.counters.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Page whose content is derived from its URL
struct FakePage {
    id: String,
    counters: Arc<Counters>,
    url: Mutex<String>,
    scroll_y: Mutex<i64>,
    typed: Mutex<String>,
    action_delay: Duration,
}

impl FakePage {
    async fn act(&self) {
        self.counters.enter();
        tokio::time::sleep(self.action_delay).await;
        self.counters.leave();
    }

    fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageHandle for FakePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.act().await;
        if url.contains("unreachable") {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url())
    }

    async fn title(&self) -> Result<String> {
        Ok(format!("Title of {}", self.url()))
    }

    async fn click_selector(&self, selector: &str) -> Result<()> {
        self.act().await;
        if selector == "#missing" {
            bail!("no such element: {}", selector);
        }
        let clicked = format!("{}#clicked", self.url());
        *self.url.lock().unwrap() = clicked;
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<()> {
        self.click_selector(text).await
    }

    async fn type_text(&self, _selector: Option<&str>, text: &str, _submit: bool) -> Result<()> {
        self.act().await;
        self.typed.lock().unwrap().push_str(text);
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        self.act().await;
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, pixels: u32) -> Result<()> {
        self.act().await;
        let delta = i64::from(pixels);
        let mut y = self.scroll_y.lock().unwrap();
        *y = match direction {
            ScrollDirection::Down => *y + delta,
            ScrollDirection::Up => (*y - delta).max(0),
        };
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        Ok(format!(
            "Body of {} typed:{}",
            self.url(),
            self.typed.lock().unwrap()
        ))
    }

    async fn links(&self) -> Result<Vec<PageLink>> {
        Ok(vec![PageLink {
            url: format!("{}/next", self.url().trim_end_matches('/')),
            text: "next".to_string(),
        }])
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn close(&self) -> Result<()> {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch and search fakes
// ─────────────────────────────────────────────────────────────────────────────

/// Serves canned HTML keyed by URL
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
        })
    }

    pub fn site() -> Arc<Self> {
        Self::new(&[
            (
                "https://example.org/",
                r#"<html><head><title>Example Domain</title></head><body><p>This domain is for use in examples.</p><a href="/more">More information</a></body></html>"#,
            ),
            (
                "https://example.org/more",
                "<html><head><title>More</title></head><body><p>Further reading.</p></body></html>",
            ),
        ])
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> delve_core::Result<FetchedDocument> {
        let body = self
            .pages
            .get(url)
            .ok_or_else(|| ToolError::Fetch("HTTP 404 Not Found".to_string()))?;
        Ok(FetchedDocument {
            final_url: url.to_string(),
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.clone(),
            truncated: false,
        })
    }
}

pub enum EngineBehaviour {
    Hits(usize),
    /// Fails with this message
    Fail(String),
}

pub struct FakeEngine {
    id: &'static str,
    behaviour: EngineBehaviour,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(id: &'static str, behaviour: EngineBehaviour) -> Arc<Self> {
        Arc::new(Self {
            id,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SearchEngine for FakeEngine {
    fn id(&self) -> &str {
        self.id
    }

    async fn search(&self, query: &SearchQuery) -> delve_core::Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            EngineBehaviour::Hits(n) => Ok((0..*n)
                .map(|i| SearchHit {
                    title: format!("{} result {}", query.query, i),
                    url: format!("https://{}.test/{}", self.id, i),
                    snippet: Some(format!("snippet {}", i)),
                    engine: self.id.to_string(),
                })
                .collect()),
            EngineBehaviour::Fail(msg) => Err(ToolError::Search(msg.clone())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime assembly
// ─────────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub runtime: Arc<Runtime>,
    pub counters: Arc<Counters>,
}

pub fn harness(config: Config, engines: Vec<Arc<dyn SearchEngine>>) -> Harness {
    harness_with(config, engines, |p| p, |l| l)
}

/// Build a runtime over fakes, letting the caller adjust the sandbox fakes.
pub fn harness_with(
    config: Config,
    engines: Vec<Arc<dyn SearchEngine>>,
    provider: impl FnOnce(FakeProvider) -> FakeProvider,
    launcher: impl FnOnce(FakeLauncher) -> FakeLauncher,
) -> Harness {
    let counters = Arc::new(Counters::default());
    let runtime = Runtime::builder(config)
        .fetcher(StaticFetcher::site())
        .search_engines(engines)
        .sandbox_provider(Arc::new(provider(FakeProvider::new(counters.clone()))))
        .browser_launcher(Arc::new(launcher(FakeLauncher::new(counters.clone()))))
        .build()
        .expect("runtime builds over fakes");
    Harness {
        runtime: Arc::new(runtime),
        counters,
    }
}
