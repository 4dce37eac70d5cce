//! Lightweight, per-thread text browser backed by plain HTTP fetches.
//!
//! A session starts empty. The first successful navigation gives it a current
//! page; navigate, click and back move between pages. Nothing executes
//! scripts, so a session is cheap and holds only fetched text and links.

use chrono::{DateTime, Utc};
use delve_config::BrowserConfig;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::extract::{self, Link};
use crate::fetch::{FetchedDocument, PageFetcher};
use crate::ThreadId;

/// Characters of page text included in navigation results
pub const DEFAULT_EXCERPT_CHARS: usize = 2_000;

#[derive(Debug, Clone)]
pub struct LightBrowserSettings {
    pub max_text_chars: usize,
    pub max_links: usize,
    pub max_history: usize,
    pub idle_timeout: Duration,
}

impl From<&BrowserConfig> for LightBrowserSettings {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            max_text_chars: config.max_text_chars,
            max_links: config.max_links,
            max_history: config.max_history.max(1),
            idle_timeout: Duration::from_secs(config.idle_eviction_secs),
        }
    }
}

impl Default for LightBrowserSettings {
    fn default() -> Self {
        Self::from(&BrowserConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
    pub links: Vec<Link>,
    pub fetched_at: DateTime<Utc>,
    /// Text or body was cut to fit the configured ceilings
    pub truncated: bool,
}

/// What navigation-style operations return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    pub url: String,
    pub title: String,
    pub text_excerpt: String,
    pub links: Vec<Link>,
}

impl Page {
    pub fn from_document(doc: FetchedDocument, settings: &LightBrowserSettings) -> Self {
        let (title, text, links) =
            if extract::looks_like_html(doc.content_type.as_deref(), &doc.body) {
                let html = Html::parse_document(&doc.body);
                (
                    extract::extract_title(&html, &doc.final_url),
                    extract::html_to_text(&doc.body),
                    extract::extract_links(&html, &doc.final_url, settings.max_links),
                )
            } else {
                (
                    extract::plain_title(&doc.body, &doc.final_url),
                    doc.body.clone(),
                    Vec::new(),
                )
            };
        let (text, text_truncated) = extract::truncate_chars(text.trim(), settings.max_text_chars);

        Page {
            url: doc.final_url,
            title,
            text,
            links,
            fetched_at: Utc::now(),
            truncated: doc.truncated || text_truncated,
        }
    }

    pub fn view(&self, excerpt_chars: usize) -> PageView {
        PageView {
            url: self.url.clone(),
            title: self.title.clone(),
            text_excerpt: extract::truncate_chars(&self.text, excerpt_chars).0,
            links: self.links.clone(),
        }
    }
}

/// Visited pages, oldest first; the last entry is the current page.
#[derive(Debug, Default)]
struct History {
    pages: Vec<Page>,
}

impl History {
    fn current(&self) -> Result<&Page> {
        self.pages.last().ok_or(ToolError::NoActivePage)
    }

    fn push(&mut self, page: Page, max_depth: usize) {
        self.pages.push(page);
        if self.pages.len() > max_depth {
            let excess = self.pages.len() - max_depth;
            self.pages.drain(..excess);
        }
    }
}

pub struct LightBrowserSession {
    thread_id: ThreadId,
    fetcher: Arc<dyn PageFetcher>,
    settings: LightBrowserSettings,
    history: Mutex<History>,
    last_used: StdMutex<Instant>,
}

impl LightBrowserSession {
    pub fn new(
        thread_id: ThreadId,
        fetcher: Arc<dyn PageFetcher>,
        settings: LightBrowserSettings,
    ) -> Self {
        Self {
            thread_id,
            fetcher,
            settings,
            history: Mutex::new(History::default()),
            last_used: StdMutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_used()) > self.settings.idle_timeout
    }

    pub async fn navigate(&self, url: &str) -> Result<PageView> {
        self.touch();
        let mut history = self.history.lock().await;
        let page = self.load(url).await?;
        let view = page.view(DEFAULT_EXCERPT_CHARS);
        history.push(page, self.settings.max_history);
        Ok(view)
    }

    async fn load(&self, url: &str) -> Result<Page> {
        let doc = self.fetcher.fetch(url).await?;
        let page = Page::from_document(doc, &self.settings);
        debug!(
            thread_id = %self.thread_id,
            url = %page.url,
            links = page.links.len(),
            "Lightweight browser navigated"
        );
        Ok(page)
    }

    /// Follow the link at `index` on the current page.
    pub async fn click(&self, index: usize) -> Result<PageView> {
        self.touch();
        let mut history = self.history.lock().await;
        let current = history.current()?;
        let target = current
            .links
            .iter()
            .find(|l| l.index == index)
            .map(|l| l.url.clone())
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "link index {} out of range (page has {} links)",
                    index,
                    current.links.len()
                ))
            })?;
        let page = self.load(&target).await?;
        let view = page.view(DEFAULT_EXCERPT_CHARS);
        history.push(page, self.settings.max_history);
        Ok(view)
    }

    /// Step back one page. With a single page in history this returns the
    /// current page unchanged.
    pub async fn back(&self) -> Result<PageView> {
        self.touch();
        let mut history = self.history.lock().await;
        history.current()?;
        if history.pages.len() > 1 {
            history.pages.pop();
        }
        Ok(history.current()?.view(DEFAULT_EXCERPT_CHARS))
    }

    pub async fn extract_text(&self, max_chars: Option<usize>) -> Result<String> {
        self.touch();
        let history = self.history.lock().await;
        let page = history.current()?;
        Ok(match max_chars {
            Some(max) => extract::truncate_chars(&page.text, max).0,
            None => page.text.clone(),
        })
    }

    pub async fn list_links(&self) -> Result<Vec<Link>> {
        self.touch();
        let history = self.history.lock().await;
        Ok(history.current()?.links.clone())
    }

    pub async fn current_page(&self) -> Option<Page> {
        self.history.lock().await.pages.last().cloned()
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.pages.len()
    }

    /// Drop the current page and all history
    pub async fn reset(&self) {
        self.touch();
        let mut history = self.history.lock().await;
        history.pages.clear();
        debug!(thread_id = %self.thread_id, "Lightweight browser reset");
    }
}
