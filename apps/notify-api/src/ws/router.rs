//! Physical WebSocket entry point.
//!
//! Every connection arrives at `/websocket/{end_point}` and is demultiplexed
//! by the trailing path segment to the named [`Endpoint`]. Service-level
//! outcomes map to a fixed close-signal vocabulary: unknown name NOT_FOUND,
//! policy rejection UNAUTHORIZED, validation failure BAD_REQUEST, anything
//! unexpected INTERNAL_SERVER_ERROR.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pori_common::UserIdentity;
use tokio::sync::mpsc;

use crate::AppState;

use super::close::{
    CloseSignal, CLOSE_BAD_REQUEST, CLOSE_INTERNAL_SERVER_ERROR, CLOSE_NOT_FOUND,
    CLOSE_UNAUTHORIZED,
};
use super::service::{Endpoint, ServiceError, SocketService};
use super::session::{Outbound, Session};

/// Base path of the WebSocket service URI.
pub const SERVICE_URI: &str = "/websocket";

/// Error raised while assembling the endpoint table.
#[derive(Debug, PartialEq, Eq)]
pub enum EndpointTableError {
    InvalidName,
    DuplicateName(String),
}

impl fmt::Display for EndpointTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => f.write_str("invalid web socket end point name"),
            Self::DuplicateName(name) => {
                write!(f, "duplicate web socket end point name {name}")
            }
        }
    }
}

impl std::error::Error for EndpointTableError {}

/// Immutable name → endpoint table, built once at startup.
pub struct EndpointRouter {
    endpoints: HashMap<String, Arc<Endpoint>>,
}

impl EndpointRouter {
    pub fn builder() -> EndpointRouterBuilder {
        EndpointRouterBuilder {
            endpoints: HashMap::new(),
        }
    }

    /// Look up a bound service endpoint by its routing name.
    pub fn endpoint(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.get(name)
    }
}

pub struct EndpointRouterBuilder {
    endpoints: HashMap<String, Arc<Endpoint>>,
}

impl EndpointRouterBuilder {
    /// Bind a service under its routing name. Duplicate or empty names fail
    /// the build immediately.
    pub fn register(
        mut self,
        service: Arc<dyn SocketService>,
    ) -> Result<Self, EndpointTableError> {
        let name = service.name().to_string();
        if name.is_empty() {
            return Err(EndpointTableError::InvalidName);
        }
        if self.endpoints.contains_key(&name) {
            return Err(EndpointTableError::DuplicateName(name));
        }
        self.endpoints
            .insert(name, Arc::new(Endpoint::new(service)));
        Ok(self)
    }

    pub fn build(self) -> EndpointRouter {
        tracing::info!(count = self.endpoints.len(), "web socket end points bound");
        EndpointRouter {
            endpoints: self.endpoints,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route(&format!("{SERVICE_URI}/{{end_point}}"), get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(end_point): Path<String>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Credentials resolve before the upgrade; a connection without valid
    // credentials proceeds as anonymous and faces the service's accept policy.
    let user = state.authenticator.authenticate(&headers);
    ws.on_upgrade(move |socket| handle_connection(socket, state, end_point, user))
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    end_point: String,
    user: Option<UserIdentity>,
) {
    let (mut ws_tx, ws_rx) = socket.split();

    let Some(endpoint) = state.websockets.endpoint(&end_point).cloned() else {
        tracing::warn!(end_point, "closing session to non-existent end point");
        let _ = send_close(&mut ws_tx, CLOSE_NOT_FOUND).await;
        return;
    };

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let session = Session::new(user, out_tx);

    let close_signal = match endpoint.accept(&session) {
        Ok(true) => run_session(&endpoint, &session, &mut ws_tx, ws_rx, out_rx).await,
        Ok(false) => {
            tracing::debug!(session_id = session.id(), "closing rejected session");
            Some(CLOSE_UNAUTHORIZED)
        }
        Err(ServiceError::Validation(message)) => {
            tracing::debug!(session_id = session.id(), message, "accept failed validation");
            Some(CLOSE_BAD_REQUEST)
        }
        Err(ServiceError::Internal(message)) => {
            tracing::error!(session_id = session.id(), message, "accept failed");
            Some(CLOSE_INTERNAL_SERVER_ERROR)
        }
    };

    if let Some(signal) = close_signal {
        let _ = send_close(&mut ws_tx, signal).await;
    }
    endpoint.on_close(&session, close_signal.as_ref());
}

/// Pump the accepted session until either side closes.
///
/// Inbound text frames dispatch to the service; frames queued by the rest of
/// the process drain onto the socket here, so no registry lock ever spans a
/// network write. Returns the close signal to send, if any.
async fn run_session(
    endpoint: &Endpoint,
    session: &Session,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
) -> Option<CloseSignal> {
    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match endpoint.received(session, text.as_str()) {
                            Ok(()) => {}
                            Err(ServiceError::Validation(message)) => {
                                tracing::debug!(
                                    session_id = session.id(),
                                    message,
                                    "message failed validation"
                                );
                                return Some(CLOSE_BAD_REQUEST);
                            }
                            Err(ServiceError::Internal(message)) => {
                                tracing::error!(
                                    session_id = session.id(),
                                    message,
                                    "message handling failed"
                                );
                                return Some(CLOSE_INTERNAL_SERVER_ERROR);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        return match endpoint.on_error(session, &error) {
                            Ok(()) => None,
                            Err(ServiceError::Validation(_)) => Some(CLOSE_BAD_REQUEST),
                            Err(ServiceError::Internal(_)) => Some(CLOSE_INTERNAL_SERVER_ERROR),
                        };
                    }
                }
            }

            outbound = out_rx.recv() => {
                match outbound {
                    Some(Outbound::Text(text)) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            tracing::debug!(session_id = session.id(), "write failed, closing");
                            return None;
                        }
                    }
                    Some(Outbound::Close(signal)) => return Some(signal),
                    None => return None,
                }
            }
        }
    }
}

async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    signal: CloseSignal,
) -> Result<(), axum::Error> {
    ws_tx
        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code: signal.code,
            reason: signal.reason.into(),
        })))
        .await
}
