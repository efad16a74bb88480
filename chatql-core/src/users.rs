//! User lookup and first-contact registration

use crate::model::{User, UserId};
use crate::store::{ChatStore, StoreResult};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn ChatStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Find the user registered under `email` (case-insensitive), registering one if absent
    pub async fn get_or_create(&self, email: &str) -> StoreResult<User> {
        if let Some(user) = self.store.find_user_by_email(email).await? {
            return Ok(user);
        }

        let user = User::new(email.trim());
        match self.store.insert_user(&user).await {
            Ok(()) => {
                info!(user_id = %user.id, "Registered user");
                Ok(user)
            }
            // Registered concurrently under the same e-mail
            Err(err) if err.is_conflict() => match self.store.find_user_by_email(email).await? {
                Some(existing) => Ok(existing),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Look up a user by textual id; malformed ids are absent
    pub async fn find(&self, user_id: &str) -> StoreResult<Option<User>> {
        match UserId::parse(user_id) {
            Some(id) => self.store.get_user(&id).await,
            None => Ok(None),
        }
    }

    pub async fn get(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        self.store.get_user(user_id).await
    }

    /// All users ordered by e-mail
    pub async fn list(&self) -> StoreResult<Vec<User>> {
        self.store.list_users().await
    }
}
