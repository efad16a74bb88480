//! Client-facing shapes of users, channels and messages

use chatql_core::model::{Channel, Message, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            created_at: user.created_at.to_datetime(),
            updated_at: user.updated_at.to_datetime(),
        }
    }
}

/// Channel with its members listed by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub members: Vec<UserView>,
}

impl From<&Channel> for ChannelView {
    fn from(channel: &Channel) -> Self {
        let mut members: Vec<UserView> = channel.members.iter().map(UserView::from).collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            id: channel.id.to_string(),
            created_at: channel.created_at.to_datetime(),
            updated_at: channel.updated_at.to_datetime(),
            members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub channel: ChannelView,
    pub sender: UserView,
    pub content: String,
    pub sequence: i64,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            created_at: message.created_at.to_datetime(),
            updated_at: message.updated_at.to_datetime(),
            channel: ChannelView::from(&message.channel),
            sender: UserView::from(&message.sender),
            content: message.content.clone(),
            sequence: message.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_members_sorted_by_id() {
        let users: Vec<User> = (0..5).map(|i| User::new(format!("u{}@example.com", i))).collect();
        let channel = Channel::new(users.clone());

        let view = ChannelView::from(&channel);
        let ids: Vec<&str> = view.members.iter().map(|m| m.id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_message_view_field_names() {
        let user = User::new("a@example.com");
        let channel = Channel::new(vec![user.clone()]);
        let message = Message::new(user, channel, "hello", 7);

        let value = serde_json::to_value(MessageView::from(&message)).unwrap();
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["content"], "hello");
        assert!(value.get("createdAt").is_some());
        assert!(value["channel"]["members"].is_array());
        assert_eq!(value["sender"]["email"], "a@example.com");
    }
}
