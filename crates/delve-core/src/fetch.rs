//! HTTP page fetching for the lightweight browser and crawl tools.

use async_trait::async_trait;
use delve_config::BrowserConfig;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ToolError};

/// Raw response body plus the metadata needed to interpret it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
    /// The body hit the byte ceiling and was cut
    pub truncated: bool,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Only textual responses are accepted. A missing content type is allowed
/// and the body is sniffed instead.
pub fn is_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") || ct.contains("json")
        }
    }
}

/// NUL bytes near the start mark a body as binary. Used when the server
/// sent no content type to judge by.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(1024).any(|&b| b == 0)
}

/// Parse and check a user-supplied URL
pub fn parse_http_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw.trim())
        .map_err(|e| ToolError::Fetch(format!("invalid url '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::Fetch(format!(
            "unsupported url scheme '{}'",
            other
        ))),
    }
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.fetch_timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ToolError::Fetch(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::timeout("fetch", self.timeout)
        } else {
            ToolError::Fetch(e.without_url().to_string())
        }
    }

    async fn fetch_inner(&self, url: url::Url) -> Result<FetchedDocument> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Fetch(format!("HTTP {}", status)));
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if !is_textual(content_type.as_deref()) {
            return Err(ToolError::Fetch(format!(
                "unsupported content type: {}",
                content_type.unwrap_or_default()
            )));
        }

        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_error(e))?;
            if bytes.len().saturating_add(chunk.len()) > self.max_bytes {
                let can_take = self.max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if content_type.is_none() && looks_binary(&bytes) {
            return Err(ToolError::Fetch(
                "binary response without a content type".to_string(),
            ));
        }
        debug!(url = %final_url, bytes = bytes.len(), truncated, "Fetched page");

        Ok(FetchedDocument {
            final_url,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            truncated,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let url = parse_http_url(url)?;
        // The client timeout covers each request; this bounds the whole body read.
        match tokio::time::timeout(self.timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::timeout("fetch", self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textual_content_types() {
        assert!(is_textual(None));
        assert!(is_textual(Some("text/html; charset=utf-8")));
        assert!(is_textual(Some("application/xhtml+xml")));
        assert!(is_textual(Some("application/json")));
        assert!(!is_textual(Some("image/png")));
        assert!(!is_textual(Some("application/pdf")));
    }

    #[test]
    fn test_nul_bytes_mark_binary_bodies() {
        assert!(looks_binary(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"));
        assert!(!looks_binary(b"<html><body>hi</body></html>"));
        assert!(!looks_binary("caf\u{e9} na\u{ef}ve".as_bytes()));
        assert!(!looks_binary(b""));
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_http_url("https://example.org").is_ok());
        assert!(matches!(
            parse_http_url("file:///etc/passwd"),
            Err(ToolError::Fetch(_))
        ));
        assert!(matches!(
            parse_http_url("not a url"),
            Err(ToolError::Fetch(_))
        ));
    }
}
