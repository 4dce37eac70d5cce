//! Subcommand handlers. Each command runs as a single turn on its own
//! thread so it goes through the same registry, dispatch and cancellation
//! paths a conversation would.

use anyhow::{Context, Result};
use base64::Engine;
use delve_config::Config;
use delve_core::redact::Redactor;
use delve_core::{CapabilityProfile, Runtime, ThreadId, ToolCall, ToolGroup, TurnOutcome};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cli_args::ProfileArgs;
use crate::utils::{output_str, print_json, require_success};

const CLI_THREAD: &str = "cli";

/// Run `calls` in order inside one turn, stopping at the first failure.
/// Ctrl-C cancels the turn.
async fn run_calls(
    runtime: &Arc<Runtime>,
    profile: &CapabilityProfile,
    calls: Vec<ToolCall>,
) -> Result<Vec<Value>> {
    let thread = ThreadId::from(CLI_THREAD);
    let turn = runtime.begin_turn(&thread, profile);

    let interrupt = {
        let runtime = Arc::clone(runtime);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                runtime.cancel_all(Some("interrupted"));
            }
        })
    };

    let mut outputs = Vec::with_capacity(calls.len());
    let mut failure = None;
    for call in &calls {
        let result = turn.invoke(call).await;
        match require_success(result) {
            Ok(output) => outputs.push(output),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    interrupt.abort();
    match turn.finish().await {
        TurnOutcome::Cancelled { reason } => anyhow::bail!("cancelled: {}", reason),
        _ => match failure {
            Some(e) => Err(e),
            None => Ok(outputs),
        },
    }
}

pub async fn list_tools(config: Config, profile: &ProfileArgs, as_json: bool) -> Result<()> {
    let (overrides, unknown) = CapabilityProfile::parse_flags(profile.flags());
    if let Some(err) = unknown.into_iter().next() {
        anyhow::bail!(err);
    }

    let runtime = Runtime::from_config(config)?;
    let effective = runtime.default_profile().layered(&overrides);
    let tools = runtime.build_tools(&effective, &ThreadId::from(CLI_THREAD));

    if as_json {
        return print_json(&tools.definitions());
    }
    let groups: Vec<&str> = effective
        .effective_groups()
        .into_iter()
        .map(ToolGroup::key)
        .collect();
    println!("groups: {}", groups.join(", "));
    for definition in tools.definitions() {
        println!("  {:<24} {}", definition.name, definition.description);
    }
    Ok(())
}

pub async fn search(
    config: Config,
    query: String,
    engines: Vec<String>,
    max_results: Option<u64>,
) -> Result<()> {
    let runtime = Arc::new(Runtime::from_config(config)?);
    let mut args = json!({ "query": query });
    if !engines.is_empty() {
        args["engines"] = json!(engines);
    }
    if let Some(n) = max_results {
        args["max_results"] = json!(n);
    }

    let profile = CapabilityProfile::new().with(ToolGroup::WebSearch, true);
    let result = run_calls(&runtime, &profile, vec![ToolCall::new("web_search", args)]).await;
    runtime.shutdown().await;

    let outputs = result?;
    if let Some(outcome) = outputs.first() {
        if outcome.get("engine_used").map_or(true, Value::is_null) {
            warn!("No search engine returned results");
        }
        print_json(outcome)?;
    }
    Ok(())
}

pub async fn browse(
    config: Config,
    url: String,
    follow: Option<u64>,
    links: bool,
    max_chars: u64,
) -> Result<()> {
    let runtime = Arc::new(Runtime::from_config(config)?);
    let mut calls = vec![ToolCall::new("browser_navigate", json!({ "url": url }))];
    if let Some(index) = follow {
        calls.push(ToolCall::new("browser_click", json!({ "index": index })));
    }
    calls.push(ToolCall::new(
        "browser_extract_text",
        json!({ "max_chars": max_chars }),
    ));
    if links {
        calls.push(ToolCall::new("browser_list_links", json!({})));
    }

    let profile = CapabilityProfile::new()
        .with(ToolGroup::Browser, true)
        .with(ToolGroup::SandboxBrowser, false);
    let result = run_calls(&runtime, &profile, calls).await;
    runtime.shutdown().await;
    let outputs = result?;

    let view = &outputs[outputs.len() - if links { 3 } else { 2 }];
    println!("# {}", output_str(view, "title"));
    println!("{}", output_str(view, "url"));
    println!();

    let text_index = if links { outputs.len() - 2 } else { outputs.len() - 1 };
    println!("{}", output_str(&outputs[text_index], "text"));

    if links {
        println!();
        let listed = outputs[outputs.len() - 1]
            .get("links")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for link in listed {
            println!(
                "[{}] {} {}",
                link.get("index").and_then(Value::as_u64).unwrap_or_default(),
                output_str(&link, "text"),
                output_str(&link, "url")
            );
        }
    }
    Ok(())
}

pub async fn sandbox(
    config: Config,
    url: String,
    screenshot: Option<&Path>,
    max_chars: u64,
) -> Result<()> {
    let runtime = Arc::new(Runtime::from_config(config)?);
    let mut calls = vec![
        ToolCall::new("sandbox_navigate", json!({ "url": url })),
        ToolCall::new("sandbox_extract_text", json!({ "max_chars": max_chars })),
    ];
    if screenshot.is_some() {
        calls.push(ToolCall::new("sandbox_screenshot", json!({})));
    }

    let profile = CapabilityProfile::new().with(ToolGroup::SandboxBrowser, true);
    let result = run_calls(&runtime, &profile, calls).await;
    // Always release the sandbox, even when a call failed
    runtime.shutdown().await;
    let outputs = result?;

    println!("# {}", output_str(&outputs[0], "title"));
    println!("{}", output_str(&outputs[0], "url"));
    println!();
    println!("{}", output_str(&outputs[1], "text"));

    if let (Some(path), Some(shot)) = (screenshot, outputs.get(2)) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(output_str(shot, "image_bytes_base64"))
            .context("Sandbox returned an undecodable screenshot")?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write screenshot to {}", path.display()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "Screenshot written");
        println!();
        println!("screenshot: {}", path.display());
    }
    Ok(())
}

/// Effective configuration as TOML with every credential masked
pub fn render_config(config: &Config) -> Result<String> {
    let rendered = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    Ok(Redactor::new(config.secrets()).redact(&rendered))
}

pub fn show_config(config: &Config) -> Result<()> {
    print!("{}", render_config(config)?);
    Ok(())
}

pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let path_str = path
        .to_str()
        .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;
    Config::default().save(path_str)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
