//! HTTP clients for the supported search APIs.

use async_trait::async_trait;
use delve_config::SearchConfig;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::{SearchEngine, SearchHit, SearchQuery};
use crate::error::{Result, ToolError};

const GOOGLE_CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Transport errors lose their URL, which may carry a credential in the
/// query string.
fn request_error(engine: &str, timeout: Duration, e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::timeout(format!("{} search", engine), timeout)
    } else {
        ToolError::Search(format!("{}: {}", engine, e.without_url()))
    }
}

fn status_error(engine: &str, status: reqwest::StatusCode) -> ToolError {
    let detail = match status.as_u16() {
        401 | 403 => "credential rejected",
        429 => "rate limited",
        _ => "request failed",
    };
    ToolError::Search(format!("{} search HTTP {} ({})", engine, status, detail))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    engine: &str,
    timeout: Duration,
    resp: reqwest::Response,
) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(status_error(engine, status));
    }
    resp.json()
        .await
        .map_err(|e| request_error(engine, timeout, e))
}

fn hit(engine: &str, title: Option<String>, url: String, snippet: Option<String>) -> SearchHit {
    SearchHit {
        title: title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| url.clone()),
        url,
        snippet: snippet.filter(|s| !s.trim().is_empty()),
        engine: engine.to_string(),
    }
}

pub struct GoogleCseEngine {
    client: reqwest::Client,
    api_key: String,
    cx: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: Option<String>,
    link: String,
    snippet: Option<String>,
}

impl GoogleCseEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        cx: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            cx: cx.into(),
            endpoint: endpoint.unwrap_or_else(|| GOOGLE_CSE_ENDPOINT.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl SearchEngine for GoogleCseEngine {
    fn id(&self) -> &str {
        "google_cse"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>> {
        // The API serves at most 10 results per request
        let num = q.max_results.clamp(1, 10).to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cx.as_str()),
                ("q", q.query.as_str()),
                ("num", num.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(self.id(), self.timeout, e))?;

        let parsed: GoogleResponse = read_json(self.id(), self.timeout, resp).await?;
        Ok(parsed
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|i| hit(self.id(), i.title, i.link, i.snippet))
            .collect())
    }
}

pub struct BingEngine {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BingResponse {
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    value: Option<Vec<BingPage>>,
}

#[derive(Debug, Deserialize)]
struct BingPage {
    name: Option<String>,
    url: String,
    snippet: Option<String>,
}

impl BingEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.unwrap_or_else(|| BING_ENDPOINT.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl SearchEngine for BingEngine {
    fn id(&self) -> &str {
        "bing"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>> {
        let count = q.max_results.clamp(1, 50).to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", q.query.as_str()), ("count", count.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(self.id(), self.timeout, e))?;

        let parsed: BingResponse = read_json(self.id(), self.timeout, resp).await?;
        Ok(parsed
            .web_pages
            .and_then(|w| w.value)
            .unwrap_or_default()
            .into_iter()
            .map(|p| hit(self.id(), p.name, p.url, p.snippet))
            .collect())
    }
}

pub struct BraveEngine {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

impl BraveEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.unwrap_or_else(|| BRAVE_ENDPOINT.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl SearchEngine for BraveEngine {
    fn id(&self) -> &str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>> {
        let count = q.max_results.clamp(1, 20).to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str()), ("count", count.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(self.id(), self.timeout, e))?;

        let parsed: BraveResponse = read_json(self.id(), self.timeout, resp).await?;
        Ok(parsed
            .web
            .and_then(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| hit(self.id(), r.title, r.url, r.description))
            .collect())
    }
}

pub struct TavilyEngine {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
}

impl TavilyEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        endpoint: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.unwrap_or_else(|| TAVILY_ENDPOINT.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl SearchEngine for TavilyEngine {
    fn id(&self) -> &str {
        "tavily"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "query": q.query,
            "max_results": q.max_results.clamp(1, 20),
            "include_answer": false,
            "include_raw_content": false,
            "search_depth": "basic",
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(self.id(), self.timeout, e))?;

        let parsed: TavilyResponse = read_json(self.id(), self.timeout, resp).await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|r| hit(self.id(), r.title, r.url, r.content))
            .collect())
    }
}

pub struct SearxngEngine {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

impl SearxngEngine {
    /// `endpoint` may be the instance base URL or its `/search` route.
    pub fn new(client: reqwest::Client, endpoint: &str, timeout: Duration) -> Self {
        let mut endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if !endpoint.ends_with("/search") {
            endpoint.push_str("/search");
        }
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl SearchEngine for SearxngEngine {
    fn id(&self) -> &str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchHit>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q.query.as_str()), ("format", "json")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| request_error(self.id(), self.timeout, e))?;

        let parsed: SearxngResponse = read_json(self.id(), self.timeout, resp).await?;
        Ok(parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| Some(hit(self.id(), r.title, r.url?, r.content)))
            .collect())
    }
}

/// Build every engine whose credentials or endpoint are configured.
pub fn engines_from_config(config: &SearchConfig, client: reqwest::Client) -> Vec<Arc<dyn SearchEngine>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut engines: Vec<Arc<dyn SearchEngine>> = Vec::new();

    if let Some(google) = &config.google_cse {
        engines.push(Arc::new(GoogleCseEngine::new(
            client.clone(),
            google.api_key.clone(),
            google.cx.clone(),
            google.endpoint.clone(),
            timeout,
        )));
    }
    if let Some(bing) = &config.bing {
        engines.push(Arc::new(BingEngine::new(
            client.clone(),
            bing.api_key.clone(),
            bing.endpoint.clone(),
            timeout,
        )));
    }
    if let Some(brave) = &config.brave {
        engines.push(Arc::new(BraveEngine::new(
            client.clone(),
            brave.api_key.clone(),
            brave.endpoint.clone(),
            timeout,
        )));
    }
    if let Some(tavily) = &config.tavily {
        engines.push(Arc::new(TavilyEngine::new(
            client.clone(),
            tavily.api_key.clone(),
            tavily.endpoint.clone(),
            timeout,
        )));
    }
    if let Some(searxng) = &config.searxng {
        engines.push(Arc::new(SearxngEngine::new(client, &searxng.endpoint, timeout)));
    }
    engines
}
