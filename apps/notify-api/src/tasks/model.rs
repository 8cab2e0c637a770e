//! Analysis-task vocabulary shared with the task-processing subsystem.

use serde::{Deserialize, Serialize};

use pori_common::UserId;

/// Identifier of an analysis back-end.
pub type BackendId = i32;

/// Identifier of an analysis task.
pub type TaskId = i64;

/// The kind of work a task performs. New types cannot be defined by
/// individual services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Undefined,
    Analysis,
    Search,
    Feedback,
    BackendFeedback,
}

/// Lifecycle state of a task on one back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Unknown,
    NotStarted,
    Pending,
    Executing,
    Completed,
    Error,
}

/// Status of a task as reported by one back-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub backend_id: BackendId,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Persisted task details, as resolved at notification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetails {
    pub task_id: TaskId,
    pub task_type: TaskType,
    /// Owner of the task; `None` marks an anonymous task.
    pub user_id: Option<UserId>,
    pub backends: Vec<BackendStatus>,
}
