//! Persistence for users, channels, messages and counters
//!
//! [`ChatStore`] is the storage seam the rest of the crate is written
//! against. Writes that race on a version or a uniqueness constraint fail
//! with [`StoreError::Conflict`] rather than blocking.

use crate::model::{
    Channel, ChannelId, Counter, CounterKind, MembershipSignature, Message, MessageId, User,
    UserId,
};
use async_trait::async_trait;

mod error;
pub mod migrations;
mod sql_store;

pub use error::{StoreError, StoreResult};
pub use sql_store::SqlChatStore;

/// Criteria for [`ChatStore::query_messages`]
///
/// Every populated field narrows the result; `member` always applies.
#[derive(Debug, Clone)]
pub struct MessageFilter {
    /// Only channels this user belongs to are visible
    pub member: UserId,
    pub channel: Option<ChannelId>,
    pub sender: Option<UserId>,
    /// Full-text terms matched against message content
    pub text: Option<String>,
    /// Only messages with a strictly smaller sequence
    pub before_sequence: Option<i64>,
    pub limit: u32,
}

impl MessageFilter {
    pub fn for_member(member: UserId, limit: u32) -> Self {
        Self {
            member,
            channel: None,
            sender: None,
            text: None,
            before_sequence: None,
            limit,
        }
    }
}

/// Async storage interface
#[async_trait]
pub trait ChatStore: Send + Sync {
    // ===== Users =====

    /// Insert a user; a taken e-mail (case-insensitive) is a conflict
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    /// Case-insensitive e-mail lookup
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// All users ordered by e-mail
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    // ===== Counters =====

    async fn load_counter(&self, kind: CounterKind) -> StoreResult<Option<Counter>>;

    /// Create a counter; an existing one for the same kind is a conflict
    async fn insert_counter(&self, counter: &Counter) -> StoreResult<()>;

    /// Store `next_value` if the persisted version still equals
    /// `current.version`, bumping the version. Otherwise a conflict.
    async fn compare_and_set_counter(&self, current: &Counter, next_value: i64)
        -> StoreResult<()>;

    // ===== Channels =====

    /// Insert a channel and its members; a duplicate membership signature is a conflict
    async fn insert_channel(&self, channel: &Channel) -> StoreResult<()>;

    async fn find_channel_by_signature(
        &self,
        signature: &MembershipSignature,
    ) -> StoreResult<Option<Channel>>;

    async fn get_channel(&self, id: &ChannelId) -> StoreResult<Option<Channel>>;

    /// Channels the user belongs to, ordered by id
    async fn list_channels_for_member(&self, user_id: &UserId) -> StoreResult<Vec<Channel>>;

    async fn count_channels(&self) -> StoreResult<u64>;

    // ===== Messages =====

    /// Persist a message; a reused sequence number is a conflict
    async fn insert_message(&self, message: &Message) -> StoreResult<()>;

    async fn get_message(&self, id: &MessageId) -> StoreResult<Option<Message>>;

    /// Messages matching `filter`, newest sequence first
    async fn query_messages(&self, filter: &MessageFilter) -> StoreResult<Vec<Message>>;
}
