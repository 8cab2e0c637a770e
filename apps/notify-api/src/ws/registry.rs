//! Live-session storage for one socket service.
//!
//! Authorized sessions are keyed by user id (a user may hold several
//! simultaneous connections); anonymous sessions live in a flat pool. The two
//! collections have independent locks. Writes to sessions only queue on the
//! connection's outbound channel, so no lock is ever held across network I/O.

use std::collections::HashMap;

use parking_lot::Mutex;
use pori_common::UserId;

use super::close::CloseSignal;
use super::session::Session;

pub struct SessionRegistry {
    authorized: Mutex<HashMap<UserId, Vec<Session>>>,
    anonymous: Mutex<Vec<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            authorized: Mutex::new(HashMap::new()),
            anonymous: Mutex::new(Vec::new()),
        }
    }

    /// Store an accepted session under its user id, creating the per-user
    /// list on first connection.
    pub fn insert_user(&self, user_id: UserId, session: Session) {
        let mut authorized = self.authorized.lock();
        authorized.entry(user_id).or_default().push(session);
        tracing::debug!(user_id, "added new authorized session");
    }

    /// Store an accepted anonymous session.
    pub fn insert_anonymous(&self, session: Session) {
        self.anonymous.lock().push(session);
        tracing::debug!("added new anonymous session");
    }

    /// Remove a session from whichever collection it belongs to.
    ///
    /// Returns false when the session was not present. That is a normal
    /// outcome, not an error: the connection may have been rejected before
    /// registration, or the registration may have raced with the close. An
    /// empty per-user list is dropped so one-shot connections do not leak
    /// map entries.
    pub fn remove(&self, session: &Session) -> bool {
        match session.user() {
            None => {
                let mut anonymous = self.anonymous.lock();
                match anonymous.iter().position(|s| s == session) {
                    Some(index) => {
                        anonymous.remove(index);
                        true
                    }
                    None => {
                        tracing::debug!(session_id = session.id(), "anonymous session not registered");
                        false
                    }
                }
            }
            Some(user) => {
                let user_id = user.user_id();
                let mut authorized = self.authorized.lock();
                let Some(sessions) = authorized.get_mut(&user_id) else {
                    tracing::debug!(user_id, "no known sessions for user");
                    return false;
                };
                let removed = match sessions.iter().position(|s| s == session) {
                    Some(index) => {
                        sessions.remove(index);
                        true
                    }
                    None => {
                        tracing::debug!(
                            user_id,
                            session_id = session.id(),
                            "session not registered for user"
                        );
                        false
                    }
                };
                if sessions.is_empty() {
                    authorized.remove(&user_id);
                }
                removed
            }
        }
    }

    /// Send a message to every live session of the given user.
    ///
    /// Returns true if the message was queued on at least one session. A
    /// failed session is skipped; its close callback will follow.
    pub fn send_to_user(&self, user_id: UserId, message: &str) -> bool {
        let authorized = self.authorized.lock();
        let Some(sessions) = authorized.get(&user_id) else {
            tracing::warn!(user_id, "the user has no valid sessions");
            return false;
        };
        let mut sent = false;
        for session in sessions {
            match session.send_text(message) {
                Ok(()) => sent = true,
                Err(err) => {
                    tracing::warn!(user_id, session_id = session.id(), %err, "send failed");
                }
            }
        }
        sent
    }

    /// Send a message to every anonymous session.
    pub fn send_to_anonymous(&self, message: &str) {
        let anonymous = self.anonymous.lock();
        for session in anonymous.iter() {
            if let Err(err) = session.send_text(message) {
                tracing::warn!(session_id = session.id(), %err, "send failed");
            }
        }
    }

    /// Send a message to every connected session, authorized and anonymous.
    pub fn broadcast(&self, message: &str) {
        tracing::debug!("sending message to all authorized sessions");
        {
            let authorized = self.authorized.lock();
            for sessions in authorized.values() {
                for session in sessions {
                    if let Err(err) = session.send_text(message) {
                        tracing::warn!(session_id = session.id(), %err, "send failed");
                    }
                }
            }
        }
        tracing::debug!("sending message to all anonymous sessions");
        self.send_to_anonymous(message);
    }

    /// Whether the user has sessions on record. "Active" is loosely defined:
    /// a session may have dropped without the registry having seen the close
    /// yet.
    pub fn has_sessions(&self, user_id: UserId) -> bool {
        self.authorized.lock().contains_key(&user_id)
    }

    /// Queue a close on every live session of the given user. Entries are not
    /// removed here; removal happens in the close callback each teardown
    /// triggers.
    pub fn close_user(&self, user_id: UserId, signal: CloseSignal) {
        let authorized = self.authorized.lock();
        let Some(sessions) = authorized.get(&user_id) else {
            tracing::debug!(user_id, "no sessions for user");
            return;
        };
        for session in sessions {
            session.close(signal);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
