//! Domain model: users, channels, messages and counters

pub mod channel;
pub mod counter;
pub mod message;
pub mod types;
pub mod user;

pub use channel::{dedupe_members, Channel, MembershipSignature};
pub use counter::{Counter, CounterKind};
pub use message::Message;
pub use types::{ChannelId, MessageId, Timestamp, UserId};
pub use user::User;
