//! Per-connection session handle.

use std::fmt;
use std::sync::Arc;

use pori_common::UserIdentity;
use tokio::sync::mpsc;

use super::close::CloseSignal;

/// Commands queued for the connection's write half.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(String),
    Close(CloseSignal),
}

struct SessionInner {
    id: String,
    user: Option<UserIdentity>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Handle to one live bidirectional connection.
///
/// The transport task owns the socket; everything else holds this handle and
/// talks to the connection through its outbound queue. Queueing never blocks,
/// so a registry lock can be held while sending. Cloning is cheap and clones
/// refer to the same connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(user: Option<UserIdentity>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: pori_common::id::prefixed_ulid(pori_common::id::prefix::SESSION),
                user,
                outbound,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The authenticated principal, or `None` for an anonymous connection.
    pub fn user(&self) -> Option<&UserIdentity> {
        self.inner.user.as_ref()
    }

    /// Queue a text frame. Fails only when the connection's write half is
    /// already gone, in which case a close callback will follow.
    pub fn send_text(&self, message: &str) -> Result<(), SessionGone> {
        self.inner
            .outbound
            .send(Outbound::Text(message.to_string()))
            .map_err(|_| SessionGone)
    }

    /// Queue a close frame. The transport task sends the frame and tears the
    /// connection down; repeated closes are tolerated.
    pub fn close(&self, signal: CloseSignal) {
        let _ = self.inner.outbound.send(Outbound::Close(signal));
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("user", &self.inner.user)
            .finish()
    }
}

/// The connection's write half has shut down.
#[derive(Debug)]
pub struct SessionGone;

impl fmt::Display for SessionGone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("session connection is gone")
    }
}

impl std::error::Error for SessionGone {}
