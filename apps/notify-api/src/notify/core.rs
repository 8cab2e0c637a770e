//! Subscription table and task-completion fan-out.

use std::sync::Arc;

use dashmap::DashMap;
use pori_common::{UserAuthority, UserId, UserIdentity};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::tasks::events::TaskCompletionEvent;
use crate::tasks::model::TaskState;
use crate::tasks::store::TaskStore;
use crate::ws::close::CLOSE_FORBIDDEN;
use crate::ws::service::Endpoint;

use super::registration::Registration;
use super::status::TaskStatus;

/// Process-wide registry of task-finished listeners.
///
/// One registration per user; re-registering replaces the previous filter set
/// entirely. Constructed once at startup and shared by reference with the
/// task-finished service and the event listener.
pub struct TaskNotifier {
    registrations: DashMap<UserId, Registration>,
}

impl TaskNotifier {
    pub fn new() -> Self {
        Self {
            registrations: DashMap::new(),
        }
    }

    /// Register the user as a listener for finished tasks.
    ///
    /// Without registration details the user listens to its own tasks only.
    /// Listening to anonymous tasks or to other users' tasks requires the
    /// back-end role; a violation closes the caller's sessions with FORBIDDEN
    /// and leaves the table unchanged.
    pub fn register(
        &self,
        endpoint: &Endpoint,
        user: &UserIdentity,
        registration: Option<Registration>,
    ) {
        let user_id = user.user_id();
        let registration = match registration {
            None => {
                tracing::debug!(user_id, "no registration details, using defaults");
                Registration::scoped_to_user(user_id)
            }
            Some(mut registration) => {
                let elevated = user.has_authority(UserAuthority::RoleBackend);
                if registration.listen_anonymous_tasks && !elevated {
                    tracing::warn!(
                        user_id,
                        "attempted to listen for anonymous tasks without appropriate permissions"
                    );
                    endpoint.close_user(user_id, CLOSE_FORBIDDEN);
                    return;
                }
                match &registration.user_ids {
                    None => {
                        tracing::debug!(user_id, "no user id filter, listening to own tasks");
                        registration.user_ids = Some([user_id].into());
                    }
                    Some(ids) if ids.is_empty() => {
                        tracing::debug!(user_id, "empty user id filter, listening to own tasks");
                        registration.user_ids = Some([user_id].into());
                    }
                    Some(ids) => {
                        if !elevated && (ids.len() != 1 || !ids.contains(&user_id)) {
                            tracing::warn!(user_id, "bad user id filter");
                            endpoint.close_user(user_id, CLOSE_FORBIDDEN);
                            return;
                        }
                    }
                }
                registration
            }
        };
        tracing::debug!(user_id, "registering listener");
        self.registrations.insert(user_id, registration);
    }

    /// Drop the user's registration, if any.
    pub fn unregister(&self, user: &UserIdentity) {
        let user_id = user.user_id();
        tracing::debug!(user_id, "unregistering listener");
        self.registrations.remove(&user_id);
    }

    pub fn has_registration(&self, user_id: UserId) -> bool {
        self.registrations.contains_key(&user_id)
    }

    /// Fan a completed task out to every matching listener.
    ///
    /// Anything but a COMPLETED status is ignored. A task whose details are
    /// no longer resolvable is dropped with a log line; the listener keeps
    /// running either way.
    pub async fn handle_event(
        &self,
        endpoint: &Endpoint,
        store: &dyn TaskStore,
        event: &TaskCompletionEvent,
    ) {
        if event.status != TaskState::Completed {
            return;
        }
        if self.registrations.is_empty() {
            tracing::debug!("no listeners");
            return;
        }

        let details = match store.task_details(event.backend_id, event.task_id).await {
            Ok(Some(details)) => details,
            Ok(None) => {
                tracing::warn!(
                    task_id = event.task_id,
                    backend_id = event.backend_id,
                    "received task finished for non-existing task"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(
                    task_id = event.task_id,
                    backend_id = event.backend_id,
                    %err,
                    "task lookup failed, dropping event"
                );
                return;
            }
        };

        let status = TaskStatus {
            task_id: event.task_id,
            task_type: event.task_type,
            backend_status_list: details.backends,
        };
        let message = match serde_json::to_string(&status) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(task_id = event.task_id, %err, "task status serialization failed");
                return;
            }
        };

        tracing::debug!(task_id = event.task_id, "task completed, sending notifications");
        let owner = details.user_id;
        for entry in self.registrations.iter() {
            let registration = entry.value();
            let owner_matches = match owner {
                None => registration.listen_anonymous_tasks,
                Some(owner) => registration.has_user_id(owner),
            };
            if owner_matches
                && registration.has_backend_id(event.backend_id)
                && registration.has_task_id(event.task_id)
                && registration.has_task_type(event.task_type)
            {
                endpoint.send_to_user(*entry.key(), &message);
            }
        }
    }

    /// Run the completion-event listener until the bus shuts down.
    pub fn spawn_listener(
        self: Arc<Self>,
        endpoint: Arc<Endpoint>,
        store: Arc<dyn TaskStore>,
        mut events: broadcast::Receiver<Arc<TaskCompletionEvent>>,
    ) -> JoinHandle<()> {
        let notifier = self;
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        notifier
                            .handle_event(&endpoint, store.as_ref(), &event)
                            .await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "task listener lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for TaskNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::notify::service::TaskFinishedService;
    use crate::tasks::model::{BackendStatus, TaskDetails, TaskType};
    use crate::tasks::store::{MemoryTaskStore, StoreError};
    use crate::ws::session::{Outbound, Session};

    fn completed_event() -> TaskCompletionEvent {
        TaskCompletionEvent {
            backend_id: 5,
            task_id: 42,
            task_type: TaskType::Analysis,
            status: TaskState::Completed,
        }
    }

    fn details_owned_by(user_id: Option<UserId>) -> TaskDetails {
        TaskDetails {
            task_id: 42,
            task_type: TaskType::Analysis,
            user_id,
            backends: vec![BackendStatus {
                backend_id: 5,
                status: TaskState::Completed,
                message: None,
            }],
        }
    }

    struct Fixture {
        notifier: Arc<TaskNotifier>,
        endpoint: Endpoint,
        store: MemoryTaskStore,
    }

    impl Fixture {
        fn new() -> Self {
            let notifier = Arc::new(TaskNotifier::new());
            let endpoint = Endpoint::new(Arc::new(TaskFinishedService::new(notifier.clone())));
            Self {
                notifier,
                endpoint,
                store: MemoryTaskStore::new(),
            }
        }

        /// Connect a session for the user and return its identity plus the
        /// outbound frame receiver.
        fn connect(
            &self,
            user: UserIdentity,
        ) -> (UserIdentity, mpsc::UnboundedReceiver<Outbound>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let session = Session::new(Some(user.clone()), tx);
            assert!(self.endpoint.accept(&session).unwrap());
            (user, rx)
        }
    }

    fn backend_user(user_id: UserId) -> UserIdentity {
        UserIdentity::with_authorities(
            user_id,
            [UserAuthority::RoleUser, UserAuthority::RoleBackend],
        )
    }

    fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut collected = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            collected.push(frame);
        }
        collected
    }

    #[test]
    fn register_without_details_scopes_to_self() {
        let fixture = Fixture::new();
        let (user, _rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(&fixture.endpoint, &user, None);

        let stored = fixture.notifier.registrations.get(&7).unwrap();
        assert!(stored.has_user_id(7));
        assert!(!stored.has_user_id(9));
        assert!(!stored.listen_anonymous_tasks);
    }

    #[test]
    fn register_defaults_absent_and_empty_user_filters_to_self() {
        let fixture = Fixture::new();
        let (user, _rx) = fixture.connect(UserIdentity::new(7));

        for user_ids in [None, Some(HashSet::new())] {
            fixture.notifier.register(
                &fixture.endpoint,
                &user,
                Some(Registration {
                    user_ids,
                    ..Registration::default()
                }),
            );
            let stored = fixture.notifier.registrations.get(&7).unwrap();
            assert!(stored.has_user_id(7));
            assert!(!stored.has_user_id(9));
        }
    }

    #[test]
    fn register_replaces_previous_registration_entirely() {
        let fixture = Fixture::new();
        let (user, _rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(
            &fixture.endpoint,
            &user,
            Some(Registration {
                backend_ids: Some(HashSet::from([5])),
                ..Registration::default()
            }),
        );
        fixture.notifier.register(&fixture.endpoint, &user, None);

        let stored = fixture.notifier.registrations.get(&7).unwrap();
        assert!(stored.backend_ids.is_none());
    }

    #[test]
    fn anonymous_listening_without_backend_role_is_forbidden() {
        let fixture = Fixture::new();
        let (user, mut rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(
            &fixture.endpoint,
            &user,
            Some(Registration {
                listen_anonymous_tasks: true,
                ..Registration::default()
            }),
        );

        assert!(!fixture.notifier.has_registration(7));
        match rx.try_recv().unwrap() {
            Outbound::Close(signal) => assert_eq!(signal, CLOSE_FORBIDDEN),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[test]
    fn foreign_user_filter_without_backend_role_is_forbidden() {
        let fixture = Fixture::new();
        let (user, mut rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(
            &fixture.endpoint,
            &user,
            Some(Registration {
                user_ids: Some(HashSet::from([7, 9])),
                ..Registration::default()
            }),
        );

        assert!(!fixture.notifier.has_registration(7));
        match rx.try_recv().unwrap() {
            Outbound::Close(signal) => assert_eq!(signal, CLOSE_FORBIDDEN),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[test]
    fn backend_role_may_listen_to_other_users_and_anonymous_tasks() {
        let fixture = Fixture::new();
        let (user, mut rx) = fixture.connect(backend_user(2));

        fixture.notifier.register(
            &fixture.endpoint,
            &user,
            Some(Registration {
                user_ids: Some(HashSet::from([7, 9])),
                listen_anonymous_tasks: true,
                ..Registration::default()
            }),
        );

        assert!(fixture.notifier.has_registration(2));
        assert!(frames(&mut rx).is_empty());
    }

    #[test]
    fn register_then_unregister_round_trips() {
        let fixture = Fixture::new();
        let (user, _rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(&fixture.endpoint, &user, None);
        assert!(fixture.notifier.has_registration(7));
        fixture.notifier.unregister(&user);
        assert!(!fixture.notifier.has_registration(7));
        // Repeated unregister stays a no-op.
        fixture.notifier.unregister(&user);
        assert!(!fixture.notifier.has_registration(7));
    }

    #[tokio::test]
    async fn fan_out_reaches_only_matching_listeners() {
        let fixture = Fixture::new();
        let (owner, mut owner_rx) = fixture.connect(UserIdentity::new(7));
        let (other, mut other_rx) = fixture.connect(UserIdentity::new(9));

        fixture.notifier.register(&fixture.endpoint, &owner, None);
        fixture.notifier.register(
            &fixture.endpoint,
            &other,
            Some(Registration {
                backend_ids: Some(HashSet::from([5])),
                task_ids: Some(HashSet::from([99])),
                ..Registration::default()
            }),
        );

        fixture.store.insert(5, details_owned_by(Some(7)));
        fixture
            .notifier
            .handle_event(&fixture.endpoint, &fixture.store, &completed_event())
            .await;

        let delivered = frames(&mut owner_rx);
        assert_eq!(delivered.len(), 1);
        match &delivered[0] {
            Outbound::Text(text) => {
                let status: TaskStatus = serde_json::from_str(text).unwrap();
                assert_eq!(status.task_id, 42);
                assert_eq!(status.task_type, TaskType::Analysis);
                assert_eq!(status.backend_status_list.len(), 1);
            }
            other => panic!("expected text frame, got {other:?}"),
        }
        // The task id filter of user 9 does not cover task 42.
        assert!(frames(&mut other_rx).is_empty());
    }

    #[tokio::test]
    async fn anonymous_task_reaches_only_anonymous_listeners() {
        let fixture = Fixture::new();
        let (listener, mut listener_rx) = fixture.connect(backend_user(2));
        let (owner_scoped, mut owner_rx) = fixture.connect(UserIdentity::new(7));

        fixture.notifier.register(
            &fixture.endpoint,
            &listener,
            Some(Registration {
                listen_anonymous_tasks: true,
                ..Registration::default()
            }),
        );
        fixture.notifier.register(&fixture.endpoint, &owner_scoped, None);

        fixture.store.insert(5, details_owned_by(None));
        fixture
            .notifier
            .handle_event(&fixture.endpoint, &fixture.store, &completed_event())
            .await;

        assert_eq!(frames(&mut listener_rx).len(), 1);
        assert!(frames(&mut owner_rx).is_empty());
    }

    #[tokio::test]
    async fn non_completed_events_trigger_no_lookup() {
        struct PanicStore;

        #[async_trait]
        impl TaskStore for PanicStore {
            async fn task_details(
                &self,
                _backend_id: i32,
                _task_id: i64,
            ) -> Result<Option<TaskDetails>, StoreError> {
                panic!("lookup must not run for non-completed events");
            }
        }

        let fixture = Fixture::new();
        let (user, _rx) = fixture.connect(UserIdentity::new(7));
        fixture.notifier.register(&fixture.endpoint, &user, None);

        for status in [TaskState::Pending, TaskState::Executing, TaskState::Error] {
            let event = TaskCompletionEvent {
                status,
                ..completed_event()
            };
            fixture
                .notifier
                .handle_event(&fixture.endpoint, &PanicStore, &event)
                .await;
        }
    }

    #[tokio::test]
    async fn empty_table_short_circuits_before_lookup() {
        struct CountingStore(AtomicUsize);

        #[async_trait]
        impl TaskStore for CountingStore {
            async fn task_details(
                &self,
                _backend_id: i32,
                _task_id: i64,
            ) -> Result<Option<TaskDetails>, StoreError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }

        let fixture = Fixture::new();
        let store = CountingStore(AtomicUsize::new(0));

        fixture
            .notifier
            .handle_event(&fixture.endpoint, &store, &completed_event())
            .await;
        assert_eq!(store.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_task_drops_event_without_notifications() {
        let fixture = Fixture::new();
        let (user, mut rx) = fixture.connect(UserIdentity::new(7));
        fixture.notifier.register(&fixture.endpoint, &user, None);

        // Nothing inserted into the store for (5, 42).
        fixture
            .notifier
            .handle_event(&fixture.endpoint, &fixture.store, &completed_event())
            .await;

        assert!(frames(&mut rx).is_empty());
        // The registration survives the dropped event.
        assert!(fixture.notifier.has_registration(7));
    }
}
