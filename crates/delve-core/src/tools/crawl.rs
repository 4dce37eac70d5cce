//! The `crawl_page` and `crawl_links` tools. Each call is a single fetch
//! and touches no browser session.

use serde_json::{json, Value};

use crate::error::Result;
use crate::extract;
use crate::light_browser::Page;
use crate::ToolCall;

use super::executor::{str_arg, to_output, u64_arg, ToolContext};

async fn fetch_page(url: &str, ctx: &ToolContext<'_>) -> Result<Page> {
    let fetcher = ctx.runtime.fetcher();
    let document = ctx.until_cancelled(fetcher.fetch(url)).await?;
    Ok(Page::from_document(document, ctx.runtime.light_settings()))
}

pub async fn execute_crawl_page(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let url = str_arg(call, "url")?;
    let page = fetch_page(url, ctx).await?;
    let (text, cut) = match u64_arg(call, "max_chars")? {
        Some(max) => extract::truncate_chars(&page.text, max as usize),
        None => (page.text.clone(), false),
    };
    Ok(json!({
        "url": page.url,
        "title": page.title,
        "text": text,
        "truncated": page.truncated || cut,
    }))
}

pub async fn execute_crawl_links(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let url = str_arg(call, "url")?;
    let page = fetch_page(url, ctx).await?;
    Ok(json!({
        "url": page.url,
        "title": page.title,
        "links": to_output(&page.links)?,
    }))
}
