//! Cancellation manager for in-flight agent turns.
//!
//! Every streaming turn registers here under its conversation thread. Clients
//! cancel a thread's turn (or all turns) through the manager; the turn observes
//! its [`CancellationToken`] at tool boundaries and inside long-running tools,
//! unwinds, and unregisters. A turn registered on a thread that already has one
//! in flight supersedes it: the older turn is cancelled and replaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ThreadId;

pub const DEFAULT_CANCEL_REASON: &str = "cancelled by user";
pub const SUPERSEDED_REASON: &str = "superseded";

/// Identifier of one registration; increases monotonically per manager
pub type TaskId = u64;

#[derive(Debug)]
struct ActiveTaskRecord {
    task_id: TaskId,
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
    started_at: DateTime<Utc>,
}

/// Handle returned by [`CancellationManager::register`]. Must be passed back
/// to [`CancellationManager::unregister`] exactly once.
#[derive(Debug)]
pub struct TaskHandle {
    thread_id: ThreadId,
    task_id: TaskId,
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
    started_at: DateTime<Utc>,
    released: AtomicBool,
}

impl TaskHandle {
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason recorded when the turn was cancelled
    pub fn cancel_reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Point-in-time view of one active turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTaskSnapshot {
    pub thread_id: ThreadId,
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub thread_id: ThreadId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllResponse {
    pub cancelled_count: usize,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: Mutex<HashMap<ThreadId, ActiveTaskRecord>>,
    next_task_id: AtomicU64,
    drained: Notify,
}

/// Process-wide registry of in-flight turns. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct CancellationManager {
    inner: Arc<Inner>,
}

fn cancel_record(record: &ActiveTaskRecord, reason: &str) -> bool {
    if record.token.is_cancelled() {
        return false;
    }
    *record.reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
    record.token.cancel();
    true
}

impl CancellationManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<ThreadId, ActiveTaskRecord>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a turn for `thread_id`, cancelling and replacing any turn
    /// already registered there.
    pub fn register(&self, thread_id: &ThreadId) -> TaskHandle {
        let task_id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let reason = Arc::new(Mutex::new(None));
        let started_at = Utc::now();

        let previous = self.tasks().insert(
            thread_id.clone(),
            ActiveTaskRecord {
                task_id,
                token: token.clone(),
                reason: reason.clone(),
                started_at,
            },
        );
        if let Some(previous) = previous {
            cancel_record(&previous, SUPERSEDED_REASON);
            info!(
                thread_id = %thread_id,
                superseded_task = previous.task_id,
                task_id,
                "Superseded in-flight turn"
            );
        } else {
            debug!(thread_id = %thread_id, task_id, "Registered turn");
        }

        TaskHandle {
            thread_id: thread_id.clone(),
            task_id,
            token,
            reason,
            started_at,
            released: AtomicBool::new(false),
        }
    }

    /// Request cancellation of the turn on `thread_id`.
    ///
    /// Returns true only if an active, not-yet-cancelled turn was found.
    pub fn cancel(&self, thread_id: &ThreadId, reason: Option<&str>) -> bool {
        let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
        let tasks = self.tasks();
        match tasks.get(thread_id) {
            Some(record) => {
                let cancelled = cancel_record(record, reason);
                if cancelled {
                    info!(thread_id = %thread_id, task_id = record.task_id, reason, "Cancelled turn");
                }
                cancelled
            }
            None => {
                debug!(thread_id = %thread_id, "No active turn to cancel");
                false
            }
        }
    }

    pub fn cancel_request(&self, request: &CancelRequest) -> CancelResponse {
        CancelResponse {
            cancelled: self.cancel(&request.thread_id, request.reason.as_deref()),
        }
    }

    /// Cancel every active turn, returning how many were newly cancelled.
    pub fn cancel_all(&self, reason: Option<&str>) -> usize {
        let reason = reason.unwrap_or(DEFAULT_CANCEL_REASON);
        let count = self
            .tasks()
            .values()
            .filter(|record| cancel_record(record, reason))
            .count();
        if count > 0 {
            info!(count, reason, "Cancelled all active turns");
        }
        count
    }

    pub fn cancel_all_response(&self, reason: Option<&str>) -> CancelAllResponse {
        CancelAllResponse {
            cancelled_count: self.cancel_all(reason),
        }
    }

    /// Snapshot of active turns, oldest first
    pub fn get_active_tasks(&self) -> Vec<ActiveTaskSnapshot> {
        let mut snapshots: Vec<ActiveTaskSnapshot> = self
            .tasks()
            .iter()
            .map(|(thread_id, record)| ActiveTaskSnapshot {
                thread_id: thread_id.clone(),
                task_id: record.task_id,
                started_at: record.started_at,
                cancelled: record.token.is_cancelled(),
            })
            .collect();
        snapshots.sort_by_key(|s| s.task_id);
        snapshots
    }

    pub fn active_count(&self) -> usize {
        self.tasks().len()
    }

    /// True while `handle` is still the registered turn for its thread
    pub fn is_current(&self, handle: &TaskHandle) -> bool {
        self.tasks()
            .get(&handle.thread_id)
            .is_some_and(|record| record.task_id == handle.task_id)
    }

    /// Remove the turn's record. A superseded turn leaves its successor's
    /// record in place.
    ///
    /// # Panics
    ///
    /// In debug builds, if `handle` was already unregistered.
    pub fn unregister(&self, handle: &TaskHandle) {
        if handle.released.swap(true, Ordering::AcqRel) {
            warn!(
                thread_id = %handle.thread_id,
                task_id = handle.task_id,
                "Turn unregistered twice"
            );
            if cfg!(debug_assertions) {
                panic!(
                    "task {} on thread {} unregistered twice",
                    handle.task_id, handle.thread_id
                );
            }
            return;
        }

        let mut tasks = self.tasks();
        let owned = tasks
            .get(&handle.thread_id)
            .is_some_and(|record| record.task_id == handle.task_id);
        if owned {
            tasks.remove(&handle.thread_id);
            debug!(thread_id = %handle.thread_id, task_id = handle.task_id, "Unregistered turn");
        } else {
            debug!(
                thread_id = %handle.thread_id,
                task_id = handle.task_id,
                "Superseded turn finished; successor keeps the slot"
            );
        }
        let empty = tasks.is_empty();
        drop(tasks);
        if empty {
            self.inner.drained.notify_waiters();
        }
    }

    /// Register and wrap the handle in a guard that unregisters on drop.
    pub fn begin(&self, thread_id: &ThreadId) -> TurnGuard {
        TurnGuard {
            manager: self.clone(),
            handle: self.register(thread_id),
        }
    }

    /// Cancel every turn and wait up to `grace` for all of them to
    /// unregister. Returns the number still registered when the wait ended.
    pub async fn shutdown(&self, reason: &str, grace: Duration) -> usize {
        let cancelled = self.cancel_all(Some(reason));
        info!(cancelled, "Cancellation manager shutting down");

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let remaining = self.active_count();
            if remaining == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let remaining = self.active_count();
                warn!(remaining, "Turns still registered after shutdown grace period");
                return remaining;
            }
        }
    }
}

/// Owns a [`TaskHandle`] and unregisters it when dropped, so error and
/// panic paths cannot leak registry entries.
#[derive(Debug)]
pub struct TurnGuard {
    manager: CancellationManager,
    handle: TaskHandle,
}

impl TurnGuard {
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    pub fn token(&self) -> &CancellationToken {
        self.handle.token()
    }

    pub fn manager(&self) -> &CancellationManager {
        &self.manager
    }

    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.handle.is_released() {
            self.manager.unregister(&self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(s: &str) -> ThreadId {
        ThreadId::from(s)
    }

    #[test]
    fn test_register_cancel_cancel_unregister() {
        let manager = CancellationManager::new();
        let handle = manager.register(&tid("t1"));

        assert!(manager.cancel(&tid("t1"), Some("user pressed stop")));
        assert!(!manager.cancel(&tid("t1"), None));
        assert!(handle.is_cancelled());
        assert_eq!(handle.cancel_reason().as_deref(), Some("user pressed stop"));

        manager.unregister(&handle);
        assert!(!manager.cancel(&tid("t1"), None));
        assert!(manager.get_active_tasks().is_empty());
    }

    #[test]
    fn test_cancel_unknown_thread_is_false() {
        let manager = CancellationManager::new();
        assert!(!manager.cancel(&tid("nobody"), None));
    }

    #[test]
    fn test_default_reason() {
        let manager = CancellationManager::new();
        let handle = manager.register(&tid("t1"));
        manager.cancel(&tid("t1"), None);
        assert_eq!(handle.cancel_reason().as_deref(), Some(DEFAULT_CANCEL_REASON));
        manager.unregister(&handle);
    }

    #[test]
    fn test_register_supersedes_existing_turn() {
        let manager = CancellationManager::new();
        let first = manager.register(&tid("t1"));
        let second = manager.register(&tid("t1"));

        assert!(first.is_cancelled());
        assert_eq!(first.cancel_reason().as_deref(), Some(SUPERSEDED_REASON));
        assert!(!second.is_cancelled());
        assert!(second.task_id() > first.task_id());
        assert!(!manager.is_current(&first));
        assert!(manager.is_current(&second));

        // The superseded turn unwinding must not remove its successor
        manager.unregister(&first);
        let active = manager.get_active_tasks();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].task_id, second.task_id());

        manager.unregister(&second);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_cancel_all_counts_only_newly_cancelled() {
        let manager = CancellationManager::new();
        let a = manager.register(&tid("a"));
        let b = manager.register(&tid("b"));
        let c = manager.register(&tid("c"));
        manager.cancel(&tid("b"), None);

        assert_eq!(manager.cancel_all(Some("shutdown")), 2);
        assert_eq!(manager.cancel_all(None), 0);
        assert_eq!(a.cancel_reason().as_deref(), Some("shutdown"));
        assert_eq!(b.cancel_reason().as_deref(), Some(DEFAULT_CANCEL_REASON));

        for h in [&a, &b, &c] {
            manager.unregister(h);
        }
    }

    #[test]
    fn test_snapshots_are_ordered_and_report_cancellation() {
        let manager = CancellationManager::new();
        let a = manager.register(&tid("a"));
        let b = manager.register(&tid("b"));
        manager.cancel(&tid("b"), None);

        let active = manager.get_active_tasks();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].thread_id, tid("a"));
        assert!(!active[0].cancelled);
        assert_eq!(active[1].thread_id, tid("b"));
        assert!(active[1].cancelled);

        let json = serde_json::to_value(&active[0]).unwrap();
        assert_eq!(json["thread_id"], "a");
        assert!(json["started_at"].is_string());

        manager.unregister(&a);
        manager.unregister(&b);
    }

    #[test]
    fn test_request_response_shapes() {
        let manager = CancellationManager::new();
        let handle = manager.register(&tid("t1"));
        let req: CancelRequest = serde_json::from_str(r#"{"thread_id": "t1"}"#).unwrap();
        assert_eq!(manager.cancel_request(&req), CancelResponse { cancelled: true });
        assert_eq!(
            serde_json::to_value(manager.cancel_all_response(None)).unwrap(),
            serde_json::json!({"cancelled_count": 0})
        );
        manager.unregister(&handle);
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let manager = CancellationManager::new();
        {
            let guard = manager.begin(&tid("t1"));
            assert_eq!(manager.active_count(), 1);
            assert!(!guard.token().is_cancelled());
        }
        assert_eq!(manager.active_count(), 0);

        let guard = manager.begin(&tid("t2"));
        guard.finish();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn test_guard_unregisters_on_panic() {
        let manager = CancellationManager::new();
        let cloned = manager.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.begin(&tid("t1"));
            panic!("tool exploded");
        }));
        assert!(result.is_err());
        assert_eq!(manager.active_count(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "unregistered twice")]
    fn test_double_unregister_panics_in_debug() {
        let manager = CancellationManager::new();
        let handle = manager.register(&tid("t1"));
        manager.unregister(&handle);
        manager.unregister(&handle);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_turns_to_unregister() {
        let manager = CancellationManager::new();
        let guard = manager.begin(&tid("t1"));

        let turn = tokio::spawn(async move {
            guard.token().cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            guard.finish();
        });

        let remaining = manager.shutdown("server stopping", Duration::from_secs(2)).await;
        assert_eq!(remaining, 0);
        turn.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_reports_stragglers() {
        let manager = CancellationManager::new();
        let handle = manager.register(&tid("stuck"));
        let remaining = manager.shutdown("server stopping", Duration::from_millis(30)).await;
        assert_eq!(remaining, 1);
        assert!(handle.is_cancelled());
        manager.unregister(&handle);
    }
}
