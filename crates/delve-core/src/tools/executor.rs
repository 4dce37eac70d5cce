//! Context handed to tool implementations, plus argument helpers.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolError};
use crate::runtime::Runtime;
use crate::{ThreadId, ToolCall};

/// Shared state a tool may touch while it runs.
pub struct ToolContext<'a> {
    pub runtime: &'a Runtime,
    pub thread_id: &'a ThreadId,
    pub cancel: &'a CancellationToken,
}

impl<'a> ToolContext<'a> {
    pub fn new(runtime: &'a Runtime, thread_id: &'a ThreadId, cancel: &'a CancellationToken) -> Self {
        Self {
            runtime,
            thread_id,
            cancel,
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled("turn cancelled".to_string()));
        }
        Ok(())
    }

    /// Drive `fut` unless the turn is cancelled first.
    pub async fn until_cancelled<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check_cancelled()?;
        tokio::select! {
            result = fut => result,
            _ = self.cancel.cancelled() => Err(ToolError::Cancelled("turn cancelled".to_string())),
        }
    }
}

/// Encode a tool's typed output as JSON.
pub fn to_output<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::Execution(format!("failed to encode tool output: {}", e)))
}

fn arg<'v>(call: &'v ToolCall, name: &str) -> Option<&'v Value> {
    call.args.get(name).filter(|v| !v.is_null())
}

pub fn str_arg<'v>(call: &'v ToolCall, name: &str) -> Result<&'v str> {
    opt_str_arg(call, name)?.ok_or_else(|| {
        ToolError::InvalidArguments(format!("missing required argument '{}'", name))
    })
}

pub fn opt_str_arg<'v>(call: &'v ToolCall, name: &str) -> Result<Option<&'v str>> {
    match arg(call, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{}' must be a string",
            name
        ))),
    }
}

pub fn u64_arg(call: &ToolCall, name: &str) -> Result<Option<u64>> {
    match arg(call, name) {
        None => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "argument '{}' must be a non-negative integer",
                name
            ))
        }),
    }
}

pub fn bool_arg(call: &ToolCall, name: &str) -> Result<Option<bool>> {
    match arg(call, name) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{}' must be a boolean",
            name
        ))),
    }
}

/// String array argument; a single string is accepted as a one-item list.
pub fn str_list_arg(call: &ToolCall, name: &str) -> Result<Vec<String>> {
    match arg(call, name) {
        None => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ToolError::InvalidArguments(format!(
                        "argument '{}' must be a list of strings",
                        name
                    ))
                })
            })
            .collect(),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{}' must be a list of strings",
            name
        ))),
    }
}
