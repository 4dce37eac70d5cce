//! Utility functions for the delve CLI.

use anyhow::{Context, Result};
use delve_config::Config;
use delve_core::ToolResult;
use serde::Serialize;

use crate::cli_args::Cli;

/// Crates whose log level follows `--verbose`
const LOG_TARGETS: &[&str] = &["delve", "delve_cli", "delve_core", "delve_browser", "delve_config"];

pub fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }
    // fantoccini logs every WebDriver round trip at debug
    if let Ok(directive) = "fantoccini=warn".parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    Config::load(cli.config.as_deref()).context("Failed to load configuration")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turn a failed tool result into an error carrying its (already redacted)
/// message.
pub fn require_success(result: ToolResult) -> Result<serde_json::Value> {
    if result.is_success() {
        return Ok(result.output);
    }
    let kind = result.error_kind.unwrap_or_else(|| "error".to_string());
    let message = result.error.unwrap_or_default();
    anyhow::bail!("{} failed ({}): {}", result.tool, kind, message)
}

/// String field of a tool output, or empty
pub fn output_str<'a>(output: &'a serde_json::Value, key: &str) -> &'a str {
    output.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}
