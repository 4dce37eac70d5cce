//! Search API clients and fallback against local stand-ins for the engines.

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use delve_config::{ApiKeyConfig, SearchConfig, SearxngConfig};
use delve_core::redact::Redactor;
use delve_core::search::engines::{engines_from_config, BingEngine};
use delve_core::search::{SearchEngine, SearchFallbackSelector, SearchQuery};
use delve_core::ToolError;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BRAVE_KEY: &str = "brave-key-1234567890";
const BING_KEY: &str = "bing-key-0987654321";

async fn spawn_engines() -> SocketAddr {
    let app = Router::new()
        .route("/bing", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
        .route(
            "/brave",
            get(|headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                let token = headers
                    .get("x-subscription-token")
                    .and_then(|v| v.to_str().ok());
                if token != Some(BRAVE_KEY) {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                let q = params.get("q").cloned().unwrap_or_default();
                Ok(Json(json!({
                    "web": {
                        "results": [
                            {"url": "https://brave.test/1", "title": format!("{} one", q), "description": "first"},
                            {"url": "https://brave.test/2", "title": "", "description": ""}
                        ]
                    }
                })))
            }),
        )
        .route(
            "/searx/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("format").map(String::as_str), Some("json"));
                Json(json!({
                    "results": [
                        {"url": "https://searx.test/a", "title": "A", "content": "from searx"},
                        {"title": "no url, dropped"}
                    ]
                }))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn search_config(addr: SocketAddr, brave_key: &str) -> SearchConfig {
    SearchConfig {
        engines: vec!["bing".to_string(), "brave".to_string(), "searxng".to_string()],
        timeout_secs: 5,
        bing: Some(ApiKeyConfig {
            api_key: BING_KEY.to_string(),
            endpoint: Some(format!("http://{}/bing", addr)),
        }),
        brave: Some(ApiKeyConfig {
            api_key: brave_key.to_string(),
            endpoint: Some(format!("http://{}/brave", addr)),
        }),
        searxng: Some(SearxngConfig {
            endpoint: format!("http://{}/searx/", addr),
        }),
        ..SearchConfig::default()
    }
}

fn selector(config: &SearchConfig) -> SearchFallbackSelector {
    let secrets = [BING_KEY, BRAVE_KEY];
    SearchFallbackSelector::new(
        engines_from_config(config, reqwest::Client::new()),
        &config.aliases,
        Redactor::new(secrets),
    )
    .with_default_preference(config.engines.clone())
}

fn query(q: &str) -> SearchQuery {
    SearchQuery {
        query: q.to_string(),
        max_results: 5,
    }
}

#[tokio::test]
async fn test_rate_limited_engine_falls_through_to_brave() {
    let addr = spawn_engines().await;
    let config = search_config(addr, BRAVE_KEY);

    let outcome = selector(&config)
        .search(&[], &query("rust"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.engine_used.as_deref(), Some("brave"));
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].title, "rust one");
    assert_eq!(outcome.results[0].snippet.as_deref(), Some("first"));
    // Blank titles fall back to the URL, blank snippets are dropped
    assert_eq!(outcome.results[1].title, "https://brave.test/2");
    assert_eq!(outcome.results[1].snippet, None);
}

#[tokio::test]
async fn test_rejected_credential_falls_through_to_searxng() {
    let addr = spawn_engines().await;
    let config = search_config(addr, "wrong-key");

    let outcome = selector(&config)
        .search(&[], &query("rust"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.engine_used.as_deref(), Some("searxng"));
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].url, "https://searx.test/a");
}

#[tokio::test]
async fn test_explicit_preference_overrides_configured_order() {
    let addr = spawn_engines().await;
    let config = search_config(addr, BRAVE_KEY);

    let outcome = selector(&config)
        .search(&["searxng".to_string()], &query("rust"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.engine_used.as_deref(), Some("searxng"));
}

#[tokio::test]
async fn test_status_error_names_engine_without_leaking_key() {
    let addr = spawn_engines().await;
    let bing = BingEngine::new(
        reqwest::Client::new(),
        BING_KEY,
        Some(format!("http://{}/bing", addr)),
        Duration::from_secs(5),
    );

    match bing.search(&query("rust")).await {
        Err(ToolError::Search(msg)) => {
            assert!(msg.contains("bing"), "{}", msg);
            assert!(msg.contains("rate limited"), "{}", msg);
            assert!(!msg.contains(BING_KEY));
        }
        other => panic!("expected search error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_engines_exhaust_to_empty() {
    // Nothing listens on port 9 of the loopback interface
    let config = SearchConfig {
        engines: vec!["searxng".to_string()],
        timeout_secs: 2,
        searxng: Some(SearxngConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
        }),
        ..SearchConfig::default()
    };

    let outcome = selector(&config)
        .search(&[], &query("rust"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.engine_used, None);
    assert!(outcome.results.is_empty());
}
