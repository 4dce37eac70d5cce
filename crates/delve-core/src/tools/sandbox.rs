//! Sandboxed browser tools.
//!
//! All of them resolve the thread's session by id, creating the (still
//! unprovisioned) session object if needed. Only `sandbox_navigate`
//! provisions; the other actions need a page that is already up.

use delve_browser::ScrollDirection;
use serde_json::{json, Value};

use crate::error::{Result, ToolError};
use crate::sandbox_session::ClickTarget;
use crate::ToolCall;

use super::executor::{bool_arg, opt_str_arg, str_arg, to_output, u64_arg, ToolContext};

const DEFAULT_SCROLL_PIXELS: u32 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Argument parsing
// ─────────────────────────────────────────────────────────────────────────────

fn click_target(call: &ToolCall) -> Result<ClickTarget> {
    match (opt_str_arg(call, "selector")?, opt_str_arg(call, "text")?) {
        (Some(selector), _) => Ok(ClickTarget::Selector(selector.to_string())),
        (None, Some(text)) => Ok(ClickTarget::Text(text.to_string())),
        (None, None) => Err(ToolError::InvalidArguments(
            "either 'selector' or 'text' is required".to_string(),
        )),
    }
}

fn scroll_direction(call: &ToolCall) -> Result<ScrollDirection> {
    match opt_str_arg(call, "direction")? {
        None | Some("down") => Ok(ScrollDirection::Down),
        Some("up") => Ok(ScrollDirection::Up),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "direction must be 'up' or 'down', got '{}'",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool implementations
// ─────────────────────────────────────────────────────────────────────────────

pub async fn execute_sandbox_navigate(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let url = str_arg(call, "url")?;
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let snapshot = session.navigate(url, ctx.cancel).await?;
    to_output(&snapshot)
}

pub async fn execute_sandbox_click(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let target = click_target(call)?;
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let snapshot = session.click(&target, ctx.cancel).await?;
    to_output(&snapshot)
}

pub async fn execute_sandbox_type(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let text = str_arg(call, "text")?;
    let selector = opt_str_arg(call, "selector")?;
    let press_enter = bool_arg(call, "press_enter")?.unwrap_or(false);
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let snapshot = session
        .type_text(text, selector, press_enter, ctx.cancel)
        .await?;
    to_output(&snapshot)
}

pub async fn execute_sandbox_press(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let key = str_arg(call, "key")?;
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let snapshot = session.press(key, ctx.cancel).await?;
    to_output(&snapshot)
}

pub async fn execute_sandbox_scroll(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let direction = scroll_direction(call)?;
    let pixels = match u64_arg(call, "pixels")? {
        Some(px) => u32::try_from(px)
            .map_err(|_| ToolError::InvalidArguments("pixels is too large".to_string()))?,
        None => DEFAULT_SCROLL_PIXELS,
    };
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let snapshot = session.scroll(direction, pixels, ctx.cancel).await?;
    to_output(&snapshot)
}

pub async fn execute_sandbox_extract_text(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let max_chars = u64_arg(call, "max_chars")?.map(|n| n as usize);
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let text = session.extract_text(max_chars, ctx.cancel).await?;
    Ok(json!({ "text": text }))
}

pub async fn execute_sandbox_screenshot(_call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let session = ctx.runtime.sessions().sandbox_or_create(ctx.thread_id);
    let image = session.screenshot(ctx.cancel).await?;
    Ok(json!({ "image_bytes_base64": image }))
}

pub async fn execute_sandbox_reset(_call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    ctx.runtime.sessions().reset_sandbox(ctx.thread_id).await;
    Ok(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_target_prefers_selector() {
        let call = ToolCall::new("sandbox_click", json!({"selector": "#go", "text": "Go"}));
        assert_eq!(
            click_target(&call).unwrap(),
            ClickTarget::Selector("#go".to_string())
        );
        let call = ToolCall::new("sandbox_click", json!({"text": "Go"}));
        assert_eq!(click_target(&call).unwrap(), ClickTarget::Text("Go".to_string()));
        let call = ToolCall::new("sandbox_click", json!({}));
        assert!(matches!(click_target(&call), Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn test_scroll_direction() {
        let down = ToolCall::new("sandbox_scroll", json!({}));
        assert_eq!(scroll_direction(&down).unwrap(), ScrollDirection::Down);
        let up = ToolCall::new("sandbox_scroll", json!({"direction": "up"}));
        assert_eq!(scroll_direction(&up).unwrap(), ScrollDirection::Up);
        let sideways = ToolCall::new("sandbox_scroll", json!({"direction": "left"}));
        assert!(scroll_direction(&sideways).is_err());
    }
}
