//! Channels and their membership signature
//!
//! A channel's identity is its member set. The [`MembershipSignature`] is the
//! canonical digest of that set: member ids are deduplicated, sorted and
//! hashed, so any ordering or repetition of the same users yields the same
//! signature.

use super::types::{ChannelId, Timestamp, UserId};
use super::user::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A conversation between a fixed set of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    /// Members in the order they were first listed at creation
    pub members: Vec<User>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Channel {
    /// Create a channel from an already deduplicated member list
    pub fn new(members: Vec<User>) -> Self {
        let now = Timestamp::now();
        Self {
            id: ChannelId::generate(),
            members,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_member(&self, user_id: &UserId) -> bool {
        self.members.iter().any(|member| &member.id == user_id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = &UserId> {
        self.members.iter().map(|member| &member.id)
    }

    pub fn signature(&self) -> MembershipSignature {
        MembershipSignature::of(self.member_ids())
    }
}

/// Canonical, order-independent identity of a member set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MembershipSignature(String);

impl MembershipSignature {
    pub fn of<'a>(member_ids: impl IntoIterator<Item = &'a UserId>) -> Self {
        let canonical: BTreeSet<&UserId> = member_ids.into_iter().collect();
        let joined = canonical
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        MembershipSignature(blake3::hash(joined.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MembershipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deduplicate users by id, keeping the first occurrence of each
pub fn dedupe_members(members: impl IntoIterator<Item = User>) -> Vec<User> {
    let mut seen = BTreeSet::new();
    members
        .into_iter()
        .filter(|member| seen.insert(member.id))
        .collect()
}
