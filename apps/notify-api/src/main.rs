use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notify_api::auth::{Authenticator, TokenAuthenticator};
use notify_api::config::Config;
use notify_api::notify::core::TaskNotifier;
use notify_api::notify::service::{TaskFinishedService, SERVICE_TASK_FINISHED};
use notify_api::tasks::events::TaskEventBus;
use notify_api::tasks::store::{MemoryTaskStore, TaskStore};
use notify_api::ws::router::EndpointRouter;
use notify_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory task store and token table for Phase 1. Replace with the
    // content-analysis database and the identity service's introspection
    // when the platform glue lands.
    let tasks: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());
    let authenticator: Arc<dyn Authenticator> = Arc::new(TokenAuthenticator::new());

    let events = TaskEventBus::new();
    let notifier = Arc::new(TaskNotifier::new());

    let websockets = Arc::new(
        EndpointRouter::builder()
            .register(Arc::new(TaskFinishedService::new(notifier.clone())))
            .expect("web socket end point registration failed")
            .build(),
    );

    // Bind the completion-event listener to the task-finished end point.
    let task_finished = websockets
        .endpoint(SERVICE_TASK_FINISHED)
        .expect("task finished end point missing")
        .clone();
    notifier
        .clone()
        .spawn_listener(task_finished, tasks.clone(), events.subscribe());

    let state = AppState {
        config: Arc::new(config),
        authenticator,
        websockets,
        events,
        tasks,
        notifier,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(notify_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "notify-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
