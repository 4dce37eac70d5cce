//! Lightweight text browser tools.
//!
//! `browser_navigate` creates the thread's session on first use. Every other
//! tool needs a page already loaded and fails with `NoActivePage` otherwise.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{Result, ToolError};
use crate::light_browser::LightBrowserSession;
use crate::ToolCall;

use super::executor::{str_arg, to_output, u64_arg, ToolContext};

fn existing_session(ctx: &ToolContext<'_>) -> Result<Arc<LightBrowserSession>> {
    ctx.runtime
        .sessions()
        .light(ctx.thread_id)
        .ok_or(ToolError::NoActivePage)
}

pub async fn execute_browser_navigate(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let url = str_arg(call, "url")?;
    let session = ctx.runtime.sessions().light_or_create(ctx.thread_id);
    let view = ctx.until_cancelled(session.navigate(url)).await?;
    to_output(&view)
}

pub async fn execute_browser_click(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let index = u64_arg(call, "index")?
        .ok_or_else(|| ToolError::InvalidArguments("missing required argument 'index'".to_string()))?;
    let session = existing_session(ctx)?;
    let view = ctx.until_cancelled(session.click(index as usize)).await?;
    to_output(&view)
}

pub async fn execute_browser_back(_call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let view = existing_session(ctx)?.back().await?;
    to_output(&view)
}

pub async fn execute_browser_extract_text(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let max_chars = u64_arg(call, "max_chars")?.map(|n| n as usize);
    let text = existing_session(ctx)?.extract_text(max_chars).await?;
    Ok(json!({ "text": text }))
}

pub async fn execute_browser_list_links(_call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let links = existing_session(ctx)?.list_links().await?;
    Ok(json!({ "links": to_output(&links)? }))
}

/// Resetting a thread that never browsed is fine.
pub async fn execute_browser_reset(_call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    if let Some(session) = ctx.runtime.sessions().light(ctx.thread_id) {
        session.reset().await;
    }
    Ok(json!({ "ok": true }))
}
