pub mod id;
pub mod users;

pub use users::{UserAuthority, UserId, UserIdentity};
