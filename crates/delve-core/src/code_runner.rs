//! Python execution for the `run_python` tool.

use delve_config::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::extract::truncate_chars;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct PythonRunner {
    binary: String,
    timeout: Duration,
    max_output_chars: usize,
}

impl From<&ExecutionConfig> for PythonRunner {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            binary: config.python_binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_chars: config.max_output_chars,
        }
    }
}

impl PythonRunner {
    pub fn new(binary: impl Into<String>, timeout: Duration, max_output_chars: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            max_output_chars,
        }
    }

    /// Run `code` as a script. The child is killed if the timeout expires or
    /// the turn is cancelled.
    pub async fn run(&self, code: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        let mut script = NamedTempFile::new()
            .map_err(|e| ToolError::Execution(format!("failed to create script file: {}", e)))?;
        script
            .write_all(code.as_bytes())
            .map_err(|e| ToolError::Execution(format!("failed to write script file: {}", e)))?;

        let child = Command::new(&self.binary)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to start {}: {}", self.binary, e)))?;

        let output = tokio::select! {
            out = tokio::time::timeout(self.timeout, child.wait_with_output()) => match out {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(ToolError::Execution(e.to_string())),
                Err(_) => return Err(ToolError::timeout("run_python", self.timeout)),
            },
            _ = cancel.cancelled() => return Err(ToolError::Cancelled("turn cancelled".to_string())),
        };

        let (stdout, out_truncated) =
            truncate_chars(&String::from_utf8_lossy(&output.stdout), self.max_output_chars);
        let (stderr, err_truncated) =
            truncate_chars(&String::from_utf8_lossy(&output.stderr), self.max_output_chars);
        debug!(exit_code = ?output.status.code(), "Python script finished");

        Ok(ExecutionResult {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            truncated: out_truncated || err_truncated,
        })
    }
}
