pub mod auth;
pub mod config;
pub mod notify;
pub mod routes;
pub mod tasks;
pub mod ws;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use notify::core::TaskNotifier;
use tasks::events::TaskEventBus;
use tasks::store::TaskStore;
use ws::router::EndpointRouter;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub authenticator: Arc<dyn Authenticator>,
    pub websockets: Arc<EndpointRouter>,
    pub events: TaskEventBus,
    pub tasks: Arc<dyn TaskStore>,
    pub notifier: Arc<TaskNotifier>,
}
