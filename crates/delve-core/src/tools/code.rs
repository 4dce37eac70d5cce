//! The `run_python` tool.

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::ToolCall;

use super::executor::{str_arg, to_output, ToolContext};

pub async fn execute_run_python(call: &ToolCall, ctx: &ToolContext<'_>) -> Result<Value> {
    let code = str_arg(call, "code")?;
    debug!(thread_id = %ctx.thread_id, bytes = code.len(), "Running python");
    let result = ctx.runtime.python().run(code, ctx.cancel).await?;
    to_output(&result)
}
