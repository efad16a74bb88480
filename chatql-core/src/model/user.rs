use super::types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A registered participant, identified by a unique e-mail address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: UserId::generate(),
            email: email.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Key under which e-mail uniqueness is enforced
    pub fn email_key(email: &str) -> String {
        email.trim().to_lowercase()
    }
}
