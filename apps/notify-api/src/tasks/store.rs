//! Task-detail lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;

use super::model::{BackendId, TaskDetails, TaskId};

/// Lookup failure in the backing store.
#[derive(Debug)]
pub struct StoreError(pub String);

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Abstraction over the platform's task persistence.
///
/// Backed by the content-analysis database in production and an in-memory
/// map in tests.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Resolve the persisted details of a task as known to the given
    /// back-end. `None` when no such task exists.
    async fn task_details(
        &self,
        backend_id: BackendId,
        task_id: TaskId,
    ) -> Result<Option<TaskDetails>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for Phase 1 / tests)
// ---------------------------------------------------------------------------

pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<(BackendId, TaskId), TaskDetails>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, backend_id: BackendId, details: TaskDetails) {
        self.tasks
            .lock()
            .unwrap()
            .insert((backend_id, details.task_id), details);
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn task_details(
        &self,
        backend_id: BackendId,
        task_id: TaskId,
    ) -> Result<Option<TaskDetails>, StoreError> {
        Ok(self.tasks.lock().unwrap().get(&(backend_id, task_id)).cloned())
    }
}
