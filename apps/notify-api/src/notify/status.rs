//! Outbound task-finished payload.

use serde::{Deserialize, Serialize};

use crate::tasks::model::{BackendStatus, TaskId, TaskType};

/// Details of a finished task, sent to matching listeners as one text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub task_type: TaskType,
    #[serde(rename = "backendStatusList")]
    pub backend_status_list: Vec<BackendStatus>,
}
