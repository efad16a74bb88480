use super::channel::Channel;
use super::types::{MessageId, Timestamp};
use super::user::User;
use serde::{Deserialize, Serialize};

/// An immutable message with its channel and sender resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel: Channel,
    pub sender: User,
    pub content: String,
    /// Global ordering key, unique across all channels
    pub sequence: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    pub fn new(sender: User, channel: Channel, content: impl Into<String>, sequence: i64) -> Self {
        let now = Timestamp::now();
        Self {
            id: MessageId::generate(),
            channel,
            sender,
            content: content.into(),
            sequence,
            created_at: now,
            updated_at: now,
        }
    }
}
