//! The `web_search` tool.

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::search::SearchQuery;
use crate::ToolCall;

use super::executor::{str_arg, str_list_arg, to_output, u64_arg, ToolContext};

/// Upper bound on `max_results` regardless of what the caller asks for
const MAX_RESULTS_CEILING: usize = 50;

pub async fn execute_web_search(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let query = str_arg(call, "query")?.trim();
    if query.is_empty() {
        return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
    }
    let max_results = u64_arg(call, "max_results")?
        .map(|n| n as usize)
        .unwrap_or(ctx.runtime.config().search.max_results)
        .clamp(1, MAX_RESULTS_CEILING);
    let preference = str_list_arg(call, "engines")?;

    debug!(thread_id = %ctx.thread_id, query, ?preference, "Running web search");
    let outcome = ctx
        .runtime
        .search()
        .search(
            &preference,
            &SearchQuery {
                query: query.to_string(),
                max_results,
            },
            ctx.cancel,
        )
        .await?;
    to_output(&outcome)
}
