//! Channel identity resolution
//!
//! A member set maps to exactly one channel. Lookup goes through the
//! persisted membership signature; when two callers race to create the same
//! membership, the signature's uniqueness constraint rejects the second
//! insert and that caller adopts the winner's channel.

use crate::model::{dedupe_members, Channel, ChannelId, MembershipSignature, User, UserId};
use crate::store::{ChatStore, StoreError, StoreResult};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("a channel needs at least one member")]
    EmptyMembership,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ChannelResolver {
    store: Arc<dyn ChatStore>,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Return the channel whose member set equals `members`, creating it if needed
    ///
    /// Duplicates are dropped keeping first-seen order, which becomes the
    /// stored member order of a newly created channel.
    pub async fn get_or_create(&self, members: Vec<User>) -> Result<Channel, ChannelError> {
        let members = dedupe_members(members);
        if members.is_empty() {
            return Err(ChannelError::EmptyMembership);
        }

        let signature = MembershipSignature::of(members.iter().map(|member| &member.id));
        if let Some(existing) = self.store.find_channel_by_signature(&signature).await? {
            return Ok(existing);
        }

        let channel = Channel::new(members);
        match self.store.insert_channel(&channel).await {
            Ok(()) => {
                info!(channel_id = %channel.id, members = channel.members.len(), "Created channel");
                Ok(channel)
            }
            Err(err) if err.is_conflict() => {
                debug!(signature = %signature, "Channel created concurrently, adopting existing");
                self.store
                    .find_channel_by_signature(&signature)
                    .await?
                    .ok_or(ChannelError::Store(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Look up a channel by textual id; malformed ids are absent
    pub async fn find(&self, channel_id: &str) -> StoreResult<Option<Channel>> {
        match ChannelId::parse(channel_id) {
            Some(id) => self.store.get_channel(&id).await,
            None => Ok(None),
        }
    }

    /// Channels `user_id` belongs to, ordered by id
    pub async fn channels_for(&self, user_id: &UserId) -> StoreResult<Vec<Channel>> {
        self.store.list_channels_for_member(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqlChatStore;

    async fn setup(n: usize) -> (ChannelResolver, Arc<dyn ChatStore>, Vec<User>) {
        let store: Arc<dyn ChatStore> = Arc::new(SqlChatStore::memory().unwrap());
        let mut users = Vec::new();
        for i in 0..n {
            let user = User::new(format!("member{}@example.com", i));
            store.insert_user(&user).await.unwrap();
            users.push(user);
        }
        (ChannelResolver::new(store.clone()), store, users)
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_and_order_independent() {
        let (resolver, store, users) = setup(3).await;

        let first = resolver.get_or_create(users.clone()).await.unwrap();
        let reordered = vec![users[2].clone(), users[0].clone(), users[1].clone(), users[0].clone()];
        let second = resolver.get_or_create(reordered).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count_channels().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_channel_keeps_first_seen_order() {
        let (resolver, _, users) = setup(2).await;

        let channel = resolver
            .get_or_create(vec![users[1].clone(), users[0].clone(), users[1].clone()])
            .await
            .unwrap();

        let ids: Vec<UserId> = channel.member_ids().copied().collect();
        assert_eq!(ids, vec![users[1].id, users[0].id]);
    }

    #[tokio::test]
    async fn test_subsets_are_distinct_channels() {
        let (resolver, store, users) = setup(3).await;

        let pair = resolver.get_or_create(users[..2].to_vec()).await.unwrap();
        let trio = resolver.get_or_create(users.clone()).await.unwrap();
        let solo = resolver.get_or_create(vec![users[0].clone()]).await.unwrap();

        assert_ne!(pair.id, trio.id);
        assert_ne!(pair.id, solo.id);
        assert_eq!(store.count_channels().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_membership_rejected() {
        let (resolver, _, _) = setup(0).await;
        assert!(matches!(
            resolver.get_or_create(Vec::new()).await,
            Err(ChannelError::EmptyMembership)
        ));
    }

    #[tokio::test]
    async fn test_find_ignores_malformed_ids() {
        let (resolver, _, users) = setup(1).await;
        let channel = resolver.get_or_create(users).await.unwrap();

        assert!(resolver.find("definitely-not-an-id").await.unwrap().is_none());
        assert_eq!(resolver.find(&channel.id.to_string()).await.unwrap().unwrap().id, channel.id);
    }
}
