//! Long-running task tracking for the gateway's task/log streaming
//! endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A task's lifecycle state, mirroring a single async RPC call that
/// outlives the request/response round trip and can be polled or streamed
/// by its task id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet started.
    Pending,
    /// Executing downstream.
    Running,
    /// Completed with a result payload.
    Completed,
    /// Completed with an error.
    Failed,
}

/// One log line emitted while a task runs.
#[derive(Debug, Clone, Serialize)]
pub struct TaskLogLine {
    /// When the line was emitted.
    pub at: DateTime<Utc>,
    /// The line itself.
    pub message: String,
}

/// A task's current, serializable snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Task id, assigned at creation.
    pub task_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// The result payload, present once `status == Completed`.
    pub result: Option<serde_json::Value>,
    /// The error message, present once `status == Failed`.
    pub error: Option<String>,
    /// Buffered log lines emitted so far.
    pub log: Vec<TaskLogLine>,
}

impl TaskRecord {
    fn new(task_id: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            log: Vec::new(),
        }
    }
}

/// A task's `log`/status-change events, for the streaming endpoint.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A new log line was appended.
    Log(TaskLogLine),
    /// The task's status changed.
    StatusChanged(TaskStatus),
}

struct TaskHandle {
    record: TaskRecord,
    events: broadcast::Sender<TaskEvent>,
}

/// Registry of in-flight and recently-completed tasks, keyed by task id.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, TaskHandle>>,
}

impl TaskRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new task, returning its freshly assigned id.
    #[must_use]
    pub fn start(&self) -> String {
        let task_id = Uuid::new_v4().to_string();
        let (events, _) = broadcast::channel(32);
        self.tasks.insert(
            task_id.clone(),
            TaskHandle {
                record: TaskRecord::new(task_id.clone()),
                events,
            },
        );
        task_id
    }

    /// Mark a task as running.
    pub fn mark_running(&self, task_id: &str) {
        self.transition(task_id, TaskStatus::Running);
    }

    /// Append a log line to a task and fan it out to streaming subscribers.
    pub fn log(&self, task_id: &str, message: impl Into<String>) {
        if let Some(mut handle) = self.tasks.get_mut(task_id) {
            let line = TaskLogLine { at: Utc::now(), message: message.into() };
            handle.record.log.push(line.clone());
            let _ = handle.events.send(TaskEvent::Log(line));
        }
    }

    /// Mark a task completed with `result`.
    pub fn complete(&self, task_id: &str, result: serde_json::Value) {
        if let Some(mut handle) = self.tasks.get_mut(task_id) {
            handle.record.result = Some(result);
        }
        self.transition(task_id, TaskStatus::Completed);
    }

    /// Mark a task failed with `error`.
    pub fn fail(&self, task_id: &str, error: impl Into<String>) {
        if let Some(mut handle) = self.tasks.get_mut(task_id) {
            handle.record.error = Some(error.into());
        }
        self.transition(task_id, TaskStatus::Failed);
    }

    /// Snapshot a task's current record.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.get(task_id).map(|h| h.record.clone())
    }

    /// Subscribe to a task's log/status events for streaming.
    #[must_use]
    pub fn subscribe(&self, task_id: &str) -> Option<broadcast::Receiver<TaskEvent>> {
        self.tasks.get(task_id).map(|h| h.events.subscribe())
    }

    /// Snapshot every tracked task, for operator visibility.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, TaskStatus> {
        self.tasks.iter().map(|e| (e.key().clone(), e.record.status.clone())).collect()
    }

    fn transition(&self, task_id: &str, status: TaskStatus) {
        if let Some(mut handle) = self.tasks.get_mut(task_id) {
            handle.record.status = status.clone();
            let _ = handle.events.send(TaskEvent::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_task_starts_pending() {
        let registry = TaskRegistry::new();
        let id = registry.start();
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn completion_publishes_a_status_event_and_stores_the_result() {
        let registry = TaskRegistry::new();
        let id = registry.start();
        let mut events = registry.subscribe(&id).unwrap();

        registry.mark_running(&id);
        registry.complete(&id, serde_json::json!({"ok": true}));

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(serde_json::json!({"ok": true})));

        assert!(matches!(events.recv().await.unwrap(), TaskEvent::StatusChanged(TaskStatus::Running)));
        assert!(matches!(events.recv().await.unwrap(), TaskEvent::StatusChanged(TaskStatus::Completed)));
    }

    #[test]
    fn failure_records_the_error_message() {
        let registry = TaskRegistry::new();
        let id = registry.start();
        registry.fail(&id, "downstream timed out");
        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("downstream timed out"));
    }
}
