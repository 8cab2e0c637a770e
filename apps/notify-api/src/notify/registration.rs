//! Task-finished listener registration.
//!
//! Backend ids, task ids and task types act as filters; omitting a list means
//! "accept all values". The user id list and the anonymous-task flag are
//! permission-checked at registration time: a caller without the back-end
//! role may only listen to its own tasks.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use pori_common::UserId;

use crate::tasks::model::{BackendId, TaskId, TaskType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Registration {
    #[serde(rename = "backendIdList", skip_serializing_if = "Option::is_none")]
    pub backend_ids: Option<HashSet<BackendId>>,
    #[serde(rename = "taskIdList", skip_serializing_if = "Option::is_none")]
    pub task_ids: Option<HashSet<TaskId>>,
    #[serde(rename = "taskTypeList", skip_serializing_if = "Option::is_none")]
    pub task_types: Option<HashSet<TaskType>>,
    #[serde(rename = "userIdList", skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<HashSet<UserId>>,
    #[serde(rename = "anonymousTasks")]
    pub listen_anonymous_tasks: bool,
}

impl Registration {
    /// A registration listening only to the given user's own tasks.
    pub fn scoped_to_user(user_id: UserId) -> Self {
        Self {
            user_ids: Some(HashSet::from([user_id])),
            ..Self::default()
        }
    }

    /// True when the backend id is listed, or no backend filter was given.
    pub fn has_backend_id(&self, backend_id: BackendId) -> bool {
        match &self.backend_ids {
            Some(ids) if !ids.is_empty() => ids.contains(&backend_id),
            _ => true,
        }
    }

    /// True when the task id is listed, or no task id filter was given.
    pub fn has_task_id(&self, task_id: TaskId) -> bool {
        match &self.task_ids {
            Some(ids) if !ids.is_empty() => ids.contains(&task_id),
            _ => true,
        }
    }

    /// True when the task type is listed, or no type filter was given.
    pub fn has_task_type(&self, task_type: TaskType) -> bool {
        match &self.task_types {
            Some(types) if !types.is_empty() => types.contains(&task_type),
            _ => true,
        }
    }

    /// True if and only if the user id list contains the given user id.
    /// Unlike the other filters an absent list matches nothing; registration
    /// validation always scopes the list before storage.
    pub fn has_user_id(&self, user_id: UserId) -> bool {
        self.user_ids
            .as_ref()
            .is_some_and(|ids| ids.contains(&user_id))
    }
}
