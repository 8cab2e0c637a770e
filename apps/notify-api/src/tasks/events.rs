//! Process-wide task-event hub.
//!
//! Uses a single `tokio::sync::broadcast` channel. The task-processing
//! subsystem publishes lifecycle events; interested subsystems subscribe and
//! filter locally.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::model::{BackendId, TaskId, TaskState, TaskType};

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip events (RecvError::Lagged).
const EVENT_CAPACITY: usize = 4096;

/// A task lifecycle event as published by the task-processing subsystem.
#[derive(Debug, Clone)]
pub struct TaskCompletionEvent {
    pub backend_id: BackendId,
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskState,
}

/// The global task-event hub. Cloneable — store in AppState.
#[derive(Clone)]
pub struct TaskEventBus {
    sender: broadcast::Sender<Arc<TaskCompletionEvent>>,
}

impl TaskEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the event stream. Each listener should call this once to
    /// get its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TaskCompletionEvent>> {
        self.sender.subscribe()
    }

    /// Publish an event to all listeners.
    pub fn publish(&self, event: TaskCompletionEvent) {
        // send() returns Err if there are no receivers — that's fine.
        let _ = self.sender.send(Arc::new(event));
    }
}

impl Default for TaskEventBus {
    fn default() -> Self {
        Self::new()
    }
}
