//! Task-finished WebSocket service.

use std::sync::Arc;

use pori_common::UserIdentity;

use crate::ws::service::{Endpoint, ServiceError, SocketService};

use super::core::TaskNotifier;
use super::registration::Registration;

/// Routing name of the service.
pub const SERVICE_TASK_FINISHED: &str = "taskFinished";

/// Accepts authenticated listeners for task-completion notifications.
/// Anonymous connections are rejected.
pub struct TaskFinishedService {
    notifier: Arc<TaskNotifier>,
}

impl TaskFinishedService {
    pub fn new(notifier: Arc<TaskNotifier>) -> Self {
        Self { notifier }
    }
}

impl SocketService for TaskFinishedService {
    fn name(&self) -> &str {
        SERVICE_TASK_FINISHED
    }

    fn accept_user(&self, user: &UserIdentity) -> Result<bool, ServiceError> {
        tracing::debug!(user_id = user.user_id(), "accepting new user");
        Ok(true)
    }

    fn accept_anonymous(&self) -> Result<bool, ServiceError> {
        tracing::debug!("not accepting anonymous connection");
        Ok(false)
    }

    fn user_message(
        &self,
        endpoint: &Endpoint,
        user: &UserIdentity,
        message: &str,
    ) -> Result<(), ServiceError> {
        // An unparsable or empty document counts as "no registration
        // details"; the notifier falls back to the user's own tasks.
        let registration: Option<Registration> = match serde_json::from_str(message) {
            Ok(registration) => Some(registration),
            Err(err) => {
                tracing::debug!(user_id = user.user_id(), %err, "unparsable registration");
                None
            }
        };
        self.notifier.register(endpoint, user, registration);
        Ok(())
    }

    fn anonymous_message(&self, _endpoint: &Endpoint, _message: &str) -> Result<(), ServiceError> {
        // Anonymous sessions are never accepted, so this cannot be reached
        // through the router.
        Err(ServiceError::internal(
            "received message from an anonymous client",
        ))
    }

    fn user_disconnected(&self, user: &UserIdentity) {
        self.notifier.unregister(user);
    }

    fn anonymous_disconnected(&self) {
        // Anonymous sessions are rejected at accept time, so the only closes
        // reaching this hook are ones that never registered.
        tracing::debug!("anonymous session disconnected");
    }
}
