//! Tools supplied from outside this crate.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tool_definitions::ToolDefinition;

#[async_trait]
pub trait ExternalTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Long-running tools should poll `cancel` and return
    /// [`ToolError::Cancelled`](crate::ToolError::Cancelled) once it fires.
    async fn invoke(&self, args: Value, cancel: &CancellationToken) -> Result<Value>;
}

/// Source of external tools for the registry builder
pub trait ExternalToolRegistry: Send + Sync {
    fn tools(&self) -> Vec<Arc<dyn ExternalTool>>;
}

/// Registry that exposes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalTools;

impl ExternalToolRegistry for NoExternalTools {
    fn tools(&self) -> Vec<Arc<dyn ExternalTool>> {
        Vec::new()
    }
}

/// In-memory registry; tools are returned in registration order.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: RwLock<Vec<Arc<dyn ExternalTool>>>,
}

impl StaticToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn ExternalTool>) {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExternalToolRegistry for StaticToolRegistry {
    fn tools(&self) -> Vec<Arc<dyn ExternalTool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
