//! Identifiers and timestamps shared by every model type

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn generate() -> Self {
                $name(Uuid::new_v4())
            }

            /// Parse a textual identifier; anything that is not a UUID is absent
            pub fn parse(value: &str) -> Option<Self> {
                Uuid::parse_str(value.trim()).ok().map($name)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a User
    UserId
);

uuid_id!(
    /// Unique identifier for a Channel
    ChannelId
);

uuid_id!(
    /// Unique identifier for a Message
    MessageId
);

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Calendar form, used when rendering timestamps to clients
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
