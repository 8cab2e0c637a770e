//! Platform user identity shared by the Pori services.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Numeric identifier of an authenticated principal, unique platform-wide.
pub type UserId = i64;

/// Granted roles. Services use these for coarse permission checks; fine
/// grained access control stays with the owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserAuthority {
    RoleUser,
    RoleAdmin,
    /// Analysis back-end role. Grants access to tasks owned by other users
    /// and to anonymous tasks.
    RoleBackend,
}

/// An authenticated user and the authorities granted at login time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: UserId,
    #[serde(default)]
    authorities: HashSet<UserAuthority>,
}

impl UserIdentity {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            authorities: HashSet::from([UserAuthority::RoleUser]),
        }
    }

    pub fn with_authorities(
        user_id: UserId,
        authorities: impl IntoIterator<Item = UserAuthority>,
    ) -> Self {
        Self {
            user_id,
            authorities: authorities.into_iter().collect(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn has_authority(&self, authority: UserAuthority) -> bool {
        self.authorities.contains(&authority)
    }
}
