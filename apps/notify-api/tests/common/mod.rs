use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use notify_api::auth::{Authenticator, TokenAuthenticator};
use notify_api::config::Config;
use notify_api::notify::core::TaskNotifier;
use notify_api::notify::service::{TaskFinishedService, SERVICE_TASK_FINISHED};
use notify_api::tasks::events::TaskEventBus;
use notify_api::tasks::store::{MemoryTaskStore, TaskStore};
use notify_api::ws::router::EndpointRouter;
use notify_api::AppState;

pub struct TestBackend {
    pub addr: SocketAddr,
    pub state: AppState,
    pub authenticator: Arc<TokenAuthenticator>,
    pub tasks: Arc<MemoryTaskStore>,
}

/// Build an AppState wired like main(), with the completion-event listener
/// running. Returns handles to the in-memory token table and task store so
/// tests can seed them.
pub fn build_state() -> (AppState, Arc<TokenAuthenticator>, Arc<MemoryTaskStore>) {
    let authenticator = Arc::new(TokenAuthenticator::new());
    let tasks = Arc::new(MemoryTaskStore::new());
    let events = TaskEventBus::new();
    let notifier = Arc::new(TaskNotifier::new());

    let websockets = Arc::new(
        EndpointRouter::builder()
            .register(Arc::new(TaskFinishedService::new(notifier.clone())))
            .expect("register task finished service")
            .build(),
    );

    let task_finished = websockets
        .endpoint(SERVICE_TASK_FINISHED)
        .expect("task finished end point")
        .clone();
    notifier.clone().spawn_listener(
        task_finished,
        tasks.clone() as Arc<dyn TaskStore>,
        events.subscribe(),
    );

    let state = AppState {
        config: Arc::new(Config { port: 0 }),
        authenticator: authenticator.clone() as Arc<dyn Authenticator>,
        websockets,
        events,
        tasks: tasks.clone() as Arc<dyn TaskStore>,
        notifier,
    };
    (state, authenticator, tasks)
}

/// Start a full notify-api instance on an ephemeral port.
pub async fn start_backend() -> TestBackend {
    let (state, authenticator, tasks) = build_state();
    let app = notify_api::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestBackend {
        addr,
        state,
        authenticator,
        tasks,
    }
}

/// Open a WebSocket connection to the given end point, optionally with a
/// bearer token.
pub async fn connect(
    addr: SocketAddr,
    end_point: &str,
    token: Option<&str>,
) -> WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>> {
    let url = format!("ws://{addr}/websocket/{end_point}");
    let mut request = url.into_client_request().expect("client request");
    if let Some(token) = token {
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
    }
    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");
    ws_stream
}

/// Read the next frame, failing the test on timeout.
pub async fn next_frame(
    ws: &mut WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
) -> tungstenite::Message {
    use futures_util::StreamExt;

    time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error")
}

/// Poll the condition until it holds, failing the test after a few seconds.
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

/// Assert that the next frame is a close with the given code and reason.
pub async fn expect_close(
    ws: &mut WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    code: u16,
    reason: &str,
) {
    match next_frame(ws).await {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(code)
            );
            assert_eq!(frame.reason.as_str(), reason);
        }
        other => panic!("expected close frame, got: {other:?}"),
    }
}
