//! Tool dispatch - routes tool calls to their implementations.
//!
//! Every outcome, including unknown tools and bad arguments, comes back as a
//! [`ToolResult`] so the agent loop can hand it to the model. Error messages
//! are scrubbed of credentials before they leave this module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{Result, ToolError};
use crate::registry::{ToolInvoker, ToolSet};
use crate::tool_definitions::BuiltinTool;
use crate::tools::executor::ToolContext;
use crate::tools::{browser, code, crawl, sandbox, search};
use crate::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool: String,
    pub status: ToolStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ToolResult {
    fn success(call: &ToolCall, output: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            status: ToolStatus::Success,
            output,
            error: None,
            error_kind: None,
        }
    }

    fn failure(call: &ToolCall, err: &ToolError, message: String) -> Self {
        let status = match err {
            ToolError::Cancelled(_) => ToolStatus::Cancelled,
            _ => ToolStatus::Failed,
        };
        Self {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            status,
            output: Value::Null,
            error: Some(message),
            error_kind: Some(err.kind().to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Dispatch a tool call against the turn's tool set.
pub async fn dispatch_tool(call: &ToolCall, tools: &ToolSet, ctx: &ToolContext<'_>) -> ToolResult {
    debug!(thread_id = %ctx.thread_id, tool = %call.tool, "Dispatching tool");

    let outcome = match ctx.check_cancelled() {
        Ok(()) => invoke(call, tools, ctx).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(output) => ToolResult::success(call, output),
        Err(err) => {
            let redactor = ctx.runtime.redactor();
            let mut message = redactor.redact(&err.to_string());
            if let Err(violation) = redactor.verify(&message) {
                error!(tool = %call.tool, "Credential survived redaction; withholding message");
                message = violation.to_string();
            }
            match err {
                ToolError::Cancelled(_) => {
                    debug!(thread_id = %ctx.thread_id, tool = %call.tool, "Tool call cancelled")
                }
                _ => warn!(
                    thread_id = %ctx.thread_id,
                    tool = %call.tool,
                    kind = err.kind(),
                    error = %message,
                    "Tool call failed"
                ),
            }
            ToolResult::failure(call, &err, message)
        }
    }
}

async fn invoke(call: &ToolCall, tools: &ToolSet, ctx: &ToolContext<'_>) -> Result<Value> {
    let descriptor = tools
        .get(&call.tool)
        .ok_or_else(|| ToolError::UnknownTool(call.tool.clone()))?;

    match &descriptor.invoker {
        ToolInvoker::External(tool) => tool.invoke(call.args.clone(), ctx.cancel).await,
        ToolInvoker::Builtin(kind) => match kind {
            BuiltinTool::WebSearch => search::execute_web_search(call, ctx).await,

            BuiltinTool::CrawlPage => crawl::execute_crawl_page(call, ctx).await,
            BuiltinTool::CrawlLinks => crawl::execute_crawl_links(call, ctx).await,

            BuiltinTool::BrowserNavigate => browser::execute_browser_navigate(call, ctx).await,
            BuiltinTool::BrowserClick => browser::execute_browser_click(call, ctx).await,
            BuiltinTool::BrowserBack => browser::execute_browser_back(call, ctx).await,
            BuiltinTool::BrowserExtractText => browser::execute_browser_extract_text(call, ctx).await,
            BuiltinTool::BrowserListLinks => browser::execute_browser_list_links(call, ctx).await,
            BuiltinTool::BrowserReset => browser::execute_browser_reset(call, ctx).await,

            BuiltinTool::SandboxNavigate => sandbox::execute_sandbox_navigate(call, ctx).await,
            BuiltinTool::SandboxClick => sandbox::execute_sandbox_click(call, ctx).await,
            BuiltinTool::SandboxType => sandbox::execute_sandbox_type(call, ctx).await,
            BuiltinTool::SandboxPress => sandbox::execute_sandbox_press(call, ctx).await,
            BuiltinTool::SandboxScroll => sandbox::execute_sandbox_scroll(call, ctx).await,
            BuiltinTool::SandboxExtractText => sandbox::execute_sandbox_extract_text(call, ctx).await,
            BuiltinTool::SandboxScreenshot => sandbox::execute_sandbox_screenshot(call, ctx).await,
            BuiltinTool::SandboxReset => sandbox::execute_sandbox_reset(call, ctx).await,

            BuiltinTool::RunPython => code::execute_run_python(call, ctx).await,
        },
    }
}
