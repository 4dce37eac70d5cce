//! Tool calls dispatched through a turn over an in-memory runtime.

mod common;

use async_trait::async_trait;
use common::{harness, Counters, EngineBehaviour, FakeEngine, StaticFetcher};
use delve_config::{ApiKeyConfig, Config};
use delve_core::external::{ExternalTool, StaticToolRegistry};
use delve_core::search::SearchEngine;
use delve_core::tool_definitions::ToolDefinition;
use delve_core::{
    CapabilityProfile, Runtime, ThreadId, ToolCall, ToolError, ToolGroup, ToolStatus,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SECRET: &str = "sk-live-9f8e7d6c5b4a";

fn browser_profile() -> CapabilityProfile {
    CapabilityProfile::new().with(ToolGroup::Browser, true)
}

fn sandbox_profile() -> CapabilityProfile {
    CapabilityProfile::new().with(ToolGroup::SandboxBrowser, true)
}

fn call(tool: &str, args: Value) -> ToolCall {
    ToolCall::new(tool, args).with_id(format!("call-{}", tool))
}

/// Fails with a message that embeds the configured credential
struct LeakyTool {
    calls: AtomicUsize,
}

#[async_trait]
impl ExternalTool for LeakyTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            input_schema: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    async fn invoke(&self, _args: Value, _cancel: &CancellationToken) -> delve_core::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ToolError::Search(format!(
            "upstream rejected https://api.test/v1?key={} with 401 (Authorization: Bearer {})",
            SECRET, SECRET
        )))
    }
}

fn config_with_secret() -> Config {
    let mut config = Config::default();
    config.search.bing = Some(ApiKeyConfig {
        api_key: SECRET.to_string(),
        endpoint: None,
    });
    config
}

#[tokio::test]
async fn test_thread_t1_light_browser_scenario() {
    let h = harness(Config::default(), Vec::new());
    let t1 = ThreadId::from("t1");
    let turn = h.runtime.begin_turn(&t1, &browser_profile());

    let before = turn.invoke(&call("browser_extract_text", json!({}))).await;
    assert_eq!(before.status, ToolStatus::Failed);
    assert_eq!(before.error_kind.as_deref(), Some("no_active_page"));

    let nav = turn
        .invoke(&call("browser_navigate", json!({"url": "https://example.org/"})))
        .await;
    assert!(nav.is_success(), "navigate failed: {:?}", nav.error);
    assert_eq!(nav.output["title"], "Example Domain");
    assert_eq!(nav.output["links"][0]["url"], "https://example.org/more");

    let reset = turn.invoke(&call("browser_reset", json!({}))).await;
    assert_eq!(reset.output, json!({"ok": true}));

    let after = turn.invoke(&call("browser_extract_text", json!({}))).await;
    assert_eq!(after.error_kind.as_deref(), Some("no_active_page"));
    assert_eq!(after.call_id, "call-browser_extract_text");

    turn.finish().await;
}

#[tokio::test]
async fn test_light_browser_click_and_back() {
    let h = harness(Config::default(), Vec::new());
    let turn = h.runtime.begin_turn(&ThreadId::from("t2"), &browser_profile());

    turn.invoke(&call("browser_navigate", json!({"url": "https://example.org/"})))
        .await;
    let clicked = turn.invoke(&call("browser_click", json!({"index": 0}))).await;
    assert_eq!(clicked.output["title"], "More");

    let back = turn.invoke(&call("browser_back", json!({}))).await;
    assert_eq!(back.output["title"], "Example Domain");

    let links = turn.invoke(&call("browser_list_links", json!({}))).await;
    assert_eq!(links.output["links"].as_array().map(Vec::len), Some(1));

    let out_of_range = turn.invoke(&call("browser_click", json!({"index": 7}))).await;
    assert_eq!(out_of_range.error_kind.as_deref(), Some("invalid_arguments"));
}

#[tokio::test]
async fn test_sessions_are_isolated_per_thread() {
    let h = harness(Config::default(), Vec::new());
    let a = h.runtime.begin_turn(&ThreadId::from("a"), &browser_profile());
    let b = h.runtime.begin_turn(&ThreadId::from("b"), &browser_profile());

    a.invoke(&call("browser_navigate", json!({"url": "https://example.org/"})))
        .await;
    let other = b.invoke(&call("browser_extract_text", json!({}))).await;
    assert_eq!(other.error_kind.as_deref(), Some("no_active_page"));
}

#[tokio::test]
async fn test_both_browser_flags_expose_only_sandbox_tools() {
    let h = harness(Config::default(), Vec::new());
    let profile = browser_profile().with(ToolGroup::SandboxBrowser, true);
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &profile);

    assert!(turn.tools().contains("sandbox_navigate"));
    assert!(!turn.tools().contains("browser_navigate"));

    let result = turn
        .invoke(&call("browser_navigate", json!({"url": "https://example.org/"})))
        .await;
    assert_eq!(result.error_kind.as_deref(), Some("unknown_tool"));
    assert!(h.runtime.sessions().light_sessions().is_empty());
}

#[tokio::test]
async fn test_building_tools_touches_no_sessions() {
    let h = harness(Config::default(), Vec::new());
    let _turn = h.runtime.begin_turn(&ThreadId::from("t1"), &sandbox_profile());
    assert!(h.runtime.sessions().sandbox_sessions().is_empty());
    assert_eq!(Counters::get(&h.counters.provisions), 0);
}

#[tokio::test]
async fn test_sandbox_tools_provision_lazily() {
    let h = harness(Config::default(), Vec::new());
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &sandbox_profile());

    let early = turn.invoke(&call("sandbox_extract_text", json!({}))).await;
    assert_eq!(early.error_kind.as_deref(), Some("no_active_page"));
    assert_eq!(Counters::get(&h.counters.provisions), 0);

    let nav = turn
        .invoke(&call("sandbox_navigate", json!({"url": "https://example.org/"})))
        .await;
    assert!(nav.is_success(), "navigate failed: {:?}", nav.error);
    assert!(nav.output["screenshot_base64"].is_string());

    let shot = turn.invoke(&call("sandbox_screenshot", json!({}))).await;
    assert!(shot.output["image_bytes_base64"].is_string());

    let scrolled = turn
        .invoke(&call("sandbox_scroll", json!({"direction": "sideways"})))
        .await;
    assert_eq!(scrolled.error_kind.as_deref(), Some("invalid_arguments"));

    turn.invoke(&call("sandbox_type", json!({"text": "hello", "press_enter": true})))
        .await;
    let text = turn.invoke(&call("sandbox_extract_text", json!({}))).await;
    assert!(text.output["text"].as_str().unwrap().contains("typed:hello"));

    let reset = turn.invoke(&call("sandbox_reset", json!({}))).await;
    assert_eq!(reset.output, json!({"ok": true}));
    assert_eq!(Counters::get(&h.counters.provisions), 1);
    assert_eq!(h.counters.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_web_search_falls_back_past_failing_and_unknown_engines() {
    let google = FakeEngine::new(
        "google_cse",
        EngineBehaviour::Fail(format!("google_cse search HTTP 403 for key={}", SECRET)),
    );
    let bing = FakeEngine::new("bing", EngineBehaviour::Hits(3));
    let engines = vec![google.clone() as Arc<dyn SearchEngine>, bing.clone()];
    let h = harness(config_with_secret(), engines);
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());

    let result = turn
        .invoke(&call(
            "web_search",
            json!({"query": "tokio select", "engines": ["google", "unknownx", "bing"]}),
        ))
        .await;
    assert!(result.is_success());
    assert_eq!(result.output["engine_used"], "bing");
    assert_eq!(result.output["results"].as_array().map(Vec::len), Some(3));
    assert_eq!(google.calls.load(Ordering::SeqCst), 1);
    assert!(!result.output.to_string().contains(SECRET));
}

#[tokio::test]
async fn test_web_search_exhaustion_is_an_empty_success() {
    let google = FakeEngine::new("google_cse", EngineBehaviour::Fail("boom".to_string()));
    let h = harness(Config::default(), vec![google as Arc<dyn SearchEngine>]);
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());

    let result = turn
        .invoke(&call("web_search", json!({"query": "anything"})))
        .await;
    assert!(result.is_success());
    assert_eq!(result.output, json!({"engine_used": null, "results": []}));
}

#[tokio::test]
async fn test_failed_tool_messages_are_redacted() {
    let registry = StaticToolRegistry::new();
    registry.register(Arc::new(LeakyTool {
        calls: AtomicUsize::new(0),
    }));
    let counters = Arc::new(Counters::default());
    let runtime = Runtime::builder(config_with_secret())
        .fetcher(StaticFetcher::site())
        .search_engines(Vec::new())
        .sandbox_provider(Arc::new(common::FakeProvider::new(counters.clone())))
        .browser_launcher(Arc::new(common::FakeLauncher::new(counters)))
        .external_tools(Arc::new(registry))
        .build()
        .unwrap();
    let runtime = Arc::new(runtime);
    let turn = runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());

    let result = turn.invoke(&call("lookup", json!({}))).await;
    assert_eq!(result.status, ToolStatus::Failed);
    let message = result.error.unwrap();
    assert!(!message.contains(SECRET), "secret leaked: {}", message);
    assert!(message.contains("[REDACTED]"));
    assert_eq!(result.error_kind.as_deref(), Some("search_error"));
}

#[tokio::test]
async fn test_cancelled_turn_does_not_invoke_tools() {
    let h = harness(Config::default(), Vec::new());
    let t1 = ThreadId::from("t1");
    let turn = h.runtime.begin_turn(&t1, &browser_profile());
    assert!(h.runtime.cancel(&t1, Some("user pressed stop")));

    let result = turn
        .invoke(&call("browser_navigate", json!({"url": "https://example.org/"})))
        .await;
    assert_eq!(result.status, ToolStatus::Cancelled);
    assert_eq!(result.error_kind.as_deref(), Some("cancelled"));
    assert!(h.runtime.sessions().light_sessions().is_empty());
}

#[tokio::test]
async fn test_bad_arguments_are_structured_failures() {
    let h = harness(Config::default(), Vec::new());
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());

    let missing = turn.invoke(&call("crawl_page", json!({}))).await;
    assert_eq!(missing.status, ToolStatus::Failed);
    assert_eq!(missing.error_kind.as_deref(), Some("invalid_arguments"));

    let empty_query = turn.invoke(&call("web_search", json!({"query": "  "}))).await;
    assert_eq!(empty_query.error_kind.as_deref(), Some("invalid_arguments"));
}

#[tokio::test]
async fn test_crawl_tools_leave_no_session_behind() {
    let h = harness(Config::default(), Vec::new());
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());

    let page = turn
        .invoke(&call("crawl_page", json!({"url": "https://example.org/", "max_chars": 11})))
        .await;
    assert_eq!(page.output["title"], "Example Domain");
    assert_eq!(page.output["truncated"], true);

    let links = turn
        .invoke(&call("crawl_links", json!({"url": "https://example.org/"})))
        .await;
    assert_eq!(links.output["links"][0]["text"], "More information");

    let missing = turn
        .invoke(&call("crawl_page", json!({"url": "https://example.org/nope"})))
        .await;
    assert_eq!(missing.error_kind.as_deref(), Some("fetch_error"));
    assert!(h.runtime.sessions().light_sessions().is_empty());
}

#[tokio::test]
async fn test_code_execution_is_off_by_default() {
    let h = harness(Config::default(), Vec::new());
    let turn = h.runtime.begin_turn(&ThreadId::from("t1"), &CapabilityProfile::new());
    let result = turn
        .invoke(&call("run_python", json!({"code": "print(1)"})))
        .await;
    assert_eq!(result.error_kind.as_deref(), Some("unknown_tool"));
}

#[tokio::test]
async fn test_configured_default_profile_applies_under_overrides() {
    let mut config = Config::default();
    config.capabilities.groups.insert("browser".to_string(), true);
    config.capabilities.groups.insert("crawl".to_string(), false);
    config.capabilities.groups.insert("teleport".to_string(), true);
    let h = harness(config, Vec::new());

    let defaults = h.runtime.begin_turn(&ThreadId::from("a"), &CapabilityProfile::new());
    assert!(defaults.tools().contains("browser_navigate"));
    assert!(!defaults.tools().contains("crawl_page"));

    let overridden = h.runtime.begin_turn(
        &ThreadId::from("b"),
        &CapabilityProfile::new().with(ToolGroup::Crawl, true),
    );
    assert!(overridden.tools().contains("crawl_page"));
}
