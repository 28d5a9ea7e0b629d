//! The authenticated identity every core operation acts as.

use duet_shared::UserId;

/// Who the current process is acting for.
///
/// Issued once the external identity provider has signed the user in and
/// passed explicitly into every operation that reads or writes on the user's
/// behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    user_id: UserId,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn is_self(&self, other: &UserId) -> bool {
        &self.user_id == other
    }
}
