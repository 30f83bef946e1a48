use serde::{Deserialize, Serialize};

use crate::UserId;

/// The part of a user account the authority hands around: who, and under which name.
///
/// This is also the payload bound to an exchange ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub username: String,
}

impl UserIdentity {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}
