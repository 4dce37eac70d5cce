//! Error kinds surfaced by tools and the runtime around them.

use std::future::Future;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("no active page: navigate to a URL first")]
    NoActivePage,
    #[error("sandbox provisioning failed: {0}")]
    SandboxProvision(String),
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },
    #[error("unknown tool group: {0}")]
    UnknownToolGroup(String),
    #[error("redaction violation: a credential appeared in an error payload")]
    RedactionViolation,
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("browser action failed: {0}")]
    Browser(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("browser session has been closed")]
    SessionClosed,
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Fetch(_) => "fetch_error",
            ToolError::NoActivePage => "no_active_page",
            ToolError::SandboxProvision(_) => "sandbox_provision_error",
            ToolError::Timeout { .. } => "timeout",
            ToolError::UnknownToolGroup(_) => "unknown_tool_group",
            ToolError::RedactionViolation => "redaction_violation",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Search(_) => "search_error",
            ToolError::Browser(_) => "browser_error",
            ToolError::Execution(_) => "execution_error",
            ToolError::SessionClosed => "session_closed",
            ToolError::Cancelled(_) => "cancelled",
            ToolError::UnknownTool(_) => "unknown_tool",
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        ToolError::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

/// Run `fut` with a deadline, mapping expiry to [`ToolError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ToolError::timeout(operation, after)),
    }
}
