//! Orchestration core for the delve research assistant: capability-driven
//! tool sets, per-thread browser sessions, search fallback and cooperative
//! turn cancellation.

pub mod cancellation;
pub mod capability;
pub mod code_runner;
pub mod error;
pub mod external;
pub mod extract;
pub mod fetch;
pub mod light_browser;
pub mod redact;
pub mod registry;
pub mod runtime;
pub mod sandbox_session;
pub mod search;
pub mod session_store;
pub mod tool_definitions;
pub mod tool_dispatch;
pub mod tools;
pub mod turn;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use cancellation::{CancellationManager, TaskHandle, TurnGuard};
pub use capability::{CapabilityProfile, ToolGroup};
pub use error::{Result, ToolError};
pub use registry::{ToolRegistryBuilder, ToolSet};
pub use runtime::{Runtime, RuntimeBuilder};
pub use search::{SearchFallbackSelector, SearchOutcome};
pub use tool_dispatch::{dispatch_tool, ToolResult, ToolStatus};
pub use turn::{Turn, TurnDriver, TurnOutcome, TurnStep};

/// Identifier of a conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Caller-assigned id echoed back in the result
    #[serde(default)]
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value, // JSON object with tool-specific arguments
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: String::new(),
            tool: tool.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}
