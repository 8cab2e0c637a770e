//! Socket-service capability and its composition with a session registry.

use std::fmt;
use std::sync::Arc;

use pori_common::{UserId, UserIdentity};

use super::close::CloseSignal;
use super::registry::SessionRegistry;
use super::session::Session;

/// Error surfaced by a service hook. The connection router maps the variant
/// to a close signal: validation errors close with BAD_REQUEST, anything else
/// with INTERNAL_SERVER_ERROR.
#[derive(Debug)]
pub enum ServiceError {
    Validation(String),
    Internal(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "validation error: {message}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Policy hooks for one named WebSocket service.
///
/// Implementations decide who may connect and what inbound messages mean; the
/// surrounding [`Endpoint`] owns session storage and delivery. Hooks receive
/// the endpoint so they can send to or close other sessions of the service.
pub trait SocketService: Send + Sync + 'static {
    /// Routing name of the service. Checked once at router construction;
    /// changing it at runtime has no effect.
    fn name(&self) -> &str;

    /// Whether a connection for the given authenticated user should be
    /// accepted. A `false` closes the connection as unauthorized.
    fn accept_user(&self, user: &UserIdentity) -> Result<bool, ServiceError>;

    /// Whether an anonymous connection should be accepted.
    fn accept_anonymous(&self) -> Result<bool, ServiceError>;

    /// A text frame arrived from an authenticated user.
    fn user_message(
        &self,
        endpoint: &Endpoint,
        user: &UserIdentity,
        message: &str,
    ) -> Result<(), ServiceError>;

    /// A text frame arrived from an anonymous session.
    fn anonymous_message(&self, endpoint: &Endpoint, message: &str) -> Result<(), ServiceError>;

    /// The user's session closed and was removed from the registry.
    fn user_disconnected(&self, user: &UserIdentity);

    /// An anonymous session closed and was removed from the registry.
    fn anonymous_disconnected(&self);

    /// A transport error occurred on a live session. The close path follows
    /// regardless; the default just records the error.
    fn connection_error(
        &self,
        _endpoint: &Endpoint,
        session: &Session,
        error: &axum::Error,
    ) -> Result<(), ServiceError> {
        tracing::debug!(session_id = session.id(), %error, "transport error");
        Ok(())
    }
}

/// A [`SocketService`] bound to its [`SessionRegistry`].
///
/// This is what the endpoint router stores per service name and what the rest
/// of the process uses to reach a service's connected clients.
pub struct Endpoint {
    service: Arc<dyn SocketService>,
    registry: SessionRegistry,
}

impl Endpoint {
    pub fn new(service: Arc<dyn SocketService>) -> Self {
        Self {
            service,
            registry: SessionRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.service.name()
    }

    /// Classify and store a new session.
    ///
    /// Returns `Ok(false)` when the service's policy rejects the connection;
    /// the registry is untouched in that case and the caller must close the
    /// connection as unauthorized.
    pub fn accept(&self, session: &Session) -> Result<bool, ServiceError> {
        match session.user() {
            None => {
                if self.service.accept_anonymous()? {
                    self.registry.insert_anonymous(session.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Some(user) => {
                if self.service.accept_user(user)? {
                    self.registry.insert_user(user.user_id(), session.clone());
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Remove the session and fire the matching disconnect hook exactly once.
    ///
    /// Removal is attempted even for sessions that were never registered
    /// (rejected, or raced with the close); that case only logs.
    pub fn on_close(&self, session: &Session, reason: Option<&CloseSignal>) {
        match reason {
            Some(signal) => tracing::debug!(
                session_id = session.id(),
                code = signal.code,
                reason = signal.reason,
                "closing session"
            ),
            None => tracing::debug!(session_id = session.id(), "closing session, reason unknown"),
        }
        self.registry.remove(session);
        match session.user() {
            None => self.service.anonymous_disconnected(),
            Some(user) => self.service.user_disconnected(user),
        }
    }

    /// Forward a transport error to the service hook. The caller proceeds to
    /// the close path afterwards, mapping a returned error to a close signal.
    pub fn on_error(&self, session: &Session, error: &axum::Error) -> Result<(), ServiceError> {
        self.service.connection_error(self, session, error)
    }

    /// Route an inbound text frame to the per-user or anonymous hook.
    pub fn received(&self, session: &Session, message: &str) -> Result<(), ServiceError> {
        match session.user() {
            None => self.service.anonymous_message(self, message),
            Some(user) => self.service.user_message(self, user, message),
        }
    }

    /// Send to every live session of the user. True if at least one write
    /// was queued.
    pub fn send_to_user(&self, user_id: UserId, message: &str) -> bool {
        self.registry.send_to_user(user_id, message)
    }

    /// Send to every anonymous session.
    pub fn send_to_anonymous(&self, message: &str) {
        self.registry.send_to_anonymous(message);
    }

    /// Send to every connected session of this service.
    pub fn broadcast(&self, message: &str) {
        self.registry.broadcast(message);
    }

    /// Whether the user currently has sessions on record. May be stale by the
    /// time the caller acts on it.
    pub fn has_sessions(&self, user_id: UserId) -> bool {
        self.registry.has_sessions(user_id)
    }

    /// Close all of the user's sessions with the given signal. Registry
    /// entries are removed by the per-session close callbacks that follow.
    pub fn close_user(&self, user_id: UserId, signal: CloseSignal) {
        self.registry.close_user(user_id, signal);
    }
}
