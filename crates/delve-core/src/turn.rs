//! One agent turn: a registered cancellation handle plus the tool set built
//! for it, driven by whatever produces tool calls (normally a model).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancellation::{TurnGuard, DEFAULT_CANCEL_REASON};
use crate::registry::ToolSet;
use crate::runtime::Runtime;
use crate::tool_definitions::ToolDefinition;
use crate::tool_dispatch::{dispatch_tool, ToolResult};
use crate::tools::ToolContext;
use crate::{ThreadId, ToolCall};

/// What the driver wants to do next
#[derive(Debug, Clone, PartialEq)]
pub enum TurnStep {
    ToolCalls(Vec<ToolCall>),
    Done(String),
}

/// Produces the steps of a turn. `results` holds the outcomes of the tool
/// calls from the previous step and is empty on the first call.
#[async_trait]
pub trait TurnDriver: Send {
    async fn next_step(
        &mut self,
        tools: &[ToolDefinition],
        results: &[ToolResult],
    ) -> anyhow::Result<TurnStep>;
}

/// Terminal state of a turn. Cancellation is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed { output: String },
    Cancelled { reason: String },
    Failed { message: String },
}

pub struct Turn {
    runtime: Arc<Runtime>,
    guard: TurnGuard,
    tools: ToolSet,
}

impl Turn {
    pub(crate) fn new(runtime: Arc<Runtime>, guard: TurnGuard, tools: ToolSet) -> Self {
        Self {
            runtime,
            guard,
            tools,
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        self.guard.handle().thread_id()
    }

    pub fn task_id(&self) -> u64 {
        self.guard.handle().task_id()
    }

    pub fn token(&self) -> &CancellationToken {
        self.guard.token()
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn is_cancelled(&self) -> bool {
        self.token().is_cancelled()
    }

    /// Run one tool call through dispatch. Never fails; errors come back as
    /// a failed [`ToolResult`].
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let ctx = ToolContext::new(&self.runtime, self.thread_id(), self.token());
        dispatch_tool(call, &self.tools, &ctx).await
    }

    /// Drive the turn to a terminal state and retire it.
    pub async fn run<D>(self, driver: &mut D) -> TurnOutcome
    where
        D: TurnDriver + ?Sized,
    {
        let outcome = self.drive(driver).await;
        self.retire(&outcome).await;
        outcome
    }

    /// Retire a turn driven by hand through [`invoke`](Self::invoke).
    pub async fn finish(self) -> TurnOutcome {
        let outcome = if self.is_cancelled() {
            self.cancelled()
        } else {
            TurnOutcome::Completed {
                output: String::new(),
            }
        };
        self.retire(&outcome).await;
        outcome
    }

    fn cancelled(&self) -> TurnOutcome {
        TurnOutcome::Cancelled {
            reason: self
                .guard
                .handle()
                .cancel_reason()
                .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()),
        }
    }

    async fn drive<D>(&self, driver: &mut D) -> TurnOutcome
    where
        D: TurnDriver + ?Sized,
    {
        let max_rounds = self.runtime.config().turn.max_tool_rounds;
        let definitions = self.tools.definitions();
        let mut results: Vec<ToolResult> = Vec::new();

        for round in 0..max_rounds {
            if self.is_cancelled() {
                return self.cancelled();
            }

            let step = tokio::select! {
                step = driver.next_step(&definitions, &results) => step,
                _ = self.token().cancelled() => return self.cancelled(),
            };

            let calls = match step {
                Ok(TurnStep::Done(output)) => {
                    debug!(thread_id = %self.thread_id(), round, "Turn completed");
                    return TurnOutcome::Completed { output };
                }
                Ok(TurnStep::ToolCalls(calls)) => calls,
                Err(e) => {
                    let message = self.runtime.redactor().redact(&format!("{:#}", e));
                    warn!(thread_id = %self.thread_id(), error = %message, "Turn driver failed");
                    return TurnOutcome::Failed { message };
                }
            };

            results.clear();
            for call in &calls {
                if self.is_cancelled() {
                    return self.cancelled();
                }
                results.push(self.invoke(call).await);
            }
        }

        TurnOutcome::Failed {
            message: format!("turn exceeded {} tool rounds", max_rounds),
        }
    }

    /// A cancelled turn that still owns its thread releases the thread's
    /// sandboxed browser before unregistering.
    async fn retire(self, outcome: &TurnOutcome) {
        if let TurnOutcome::Cancelled { reason } = outcome {
            let handle = self.guard.handle();
            let manager = self.guard.manager();
            if manager.is_current(handle) {
                // A successor may register while the session lock is awaited
                let had_sandbox = self
                    .runtime
                    .sessions()
                    .reset_sandbox_if(self.thread_id(), || manager.is_current(handle))
                    .await;
                info!(
                    thread_id = %self.thread_id(),
                    task_id = handle.task_id(),
                    reason = %reason,
                    had_sandbox,
                    "Turn cancelled"
                );
            } else {
                debug!(
                    thread_id = %self.thread_id(),
                    task_id = handle.task_id(),
                    "Superseded turn cancelled; leaving sessions to its successor"
                );
            }
        }
        self.guard.finish();
    }
}
