//! Membership-scoped message retrieval

use crate::model::{ChannelId, Message, MessageId, UserId};
use crate::store::{ChatStore, MessageFilter, StoreResult};
use std::sync::Arc;

/// Largest page `list_messages` returns
pub const MAX_PAGE_SIZE: i64 = 100;

/// Caller-supplied listing parameters
///
/// Identifiers arrive as text; ones that do not parse are ignored rather
/// than rejected.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub limit: i64,
    pub channel_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    pub before_sequence: Option<i64>,
}

impl Default for MessageQuery {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            channel_id: None,
            sender_id: None,
            content: None,
            before_sequence: None,
        }
    }
}

#[derive(Clone)]
pub struct MessageQueryEngine {
    store: Arc<dyn ChatStore>,
}

impl MessageQueryEngine {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Clamp a requested page size into `1..=MAX_PAGE_SIZE`
    pub fn clamp_limit(limit: i64) -> u32 {
        limit.clamp(1, MAX_PAGE_SIZE) as u32
    }

    /// Messages visible to `user_id`, newest sequence first
    pub async fn list_messages(
        &self,
        user_id: &UserId,
        query: &MessageQuery,
    ) -> StoreResult<Vec<Message>> {
        let filter = MessageFilter {
            member: *user_id,
            channel: query.channel_id.as_deref().and_then(ChannelId::parse),
            sender: query.sender_id.as_deref().and_then(UserId::parse),
            text: query
                .content
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
            before_sequence: query.before_sequence,
            limit: Self::clamp_limit(query.limit),
        };

        self.store.query_messages(&filter).await
    }

    /// The message, if `user_id` currently belongs to its channel
    pub async fn get_message(
        &self,
        message_id: &MessageId,
        user_id: &UserId,
    ) -> StoreResult<Option<Message>> {
        let message = self.store.get_message(message_id).await?;
        Ok(message.filter(|message| message.channel.has_member(user_id)))
    }

    /// Same as [`get_message`](Self::get_message) for a textual id
    pub async fn find_message(
        &self,
        message_id: &str,
        user_id: &UserId,
    ) -> StoreResult<Option<Message>> {
        match MessageId::parse(message_id) {
            Some(id) => self.get_message(&id, user_id).await,
            None => Ok(None),
        }
    }
}
