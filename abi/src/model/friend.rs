use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::model::document::{Document, FieldValue, Fields};
use crate::model::user::User;

pub const FRIEND_UID: &str = "friendUid";
pub const ADDED_AT: &str = "addedAt";
pub const FROM_UID: &str = "fromUid";
pub const TIMESTAMP: &str = "timestamp";
pub const REMOVED_AT: &str = "removedAt";

/// pending request, stored under the recipient and keyed by the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub created_at: i64,
}

impl FriendRequest {
    /// fields for a new request; the timestamp is assigned by the store
    pub fn fields(sender: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FROM_UID.to_string(), FieldValue::from(sender));
        fields.insert(TIMESTAMP.to_string(), FieldValue::ServerTimestamp);
        fields
    }
}

impl TryFrom<&Document> for FriendRequest {
    type Error = Error;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let (recipient, sender) = doc
            .path
            .as_friend_request()
            .ok_or_else(|| Error::parse(format!("{} is not a friend request", doc.path)))?;
        Ok(Self {
            from_user_id: sender.to_string(),
            to_user_id: recipient.to_string(),
            created_at: doc.timestamp_field(TIMESTAMP).unwrap_or(doc.update_time),
        })
    }
}

/// one direction of an accepted friendship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipEdge {
    pub owner_id: String,
    pub friend_id: String,
    pub added_at: i64,
}

impl FriendshipEdge {
    pub fn fields(friend: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FRIEND_UID.to_string(), FieldValue::from(friend));
        fields.insert(ADDED_AT.to_string(), FieldValue::ServerTimestamp);
        fields
    }
}

impl TryFrom<&Document> for FriendshipEdge {
    type Error = Error;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let (owner, friend) = doc
            .path
            .as_friend_edge()
            .ok_or_else(|| Error::parse(format!("{} is not a friendship edge", doc.path)))?;
        Ok(Self {
            owner_id: owner.to_string(),
            friend_id: doc.opt_str_field(FRIEND_UID).unwrap_or(friend).to_string(),
            added_at: doc.timestamp_field(ADDED_AT).unwrap_or(doc.update_time),
        })
    }
}

/// Marker left in the remover's namespace when the counterpart edge could
/// not be deleted. Edges added before `removed_at` are not completed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedFriend {
    pub owner_id: String,
    pub friend_id: String,
    pub removed_at: i64,
}

impl RemovedFriend {
    pub fn fields(friend: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FRIEND_UID.to_string(), FieldValue::from(friend));
        fields.insert(REMOVED_AT.to_string(), FieldValue::ServerTimestamp);
        fields
    }
}

impl TryFrom<&Document> for RemovedFriend {
    type Error = Error;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let owner = doc
            .path
            .parent()
            .as_str()
            .split('/')
            .nth(1)
            .map(str::to_string)
            .ok_or_else(|| Error::parse(format!("{} has no owner", doc.path)))?;
        Ok(Self {
            owner_id: owner,
            friend_id: doc.id().to_string(),
            removed_at: doc.timestamp_field(REMOVED_AT).unwrap_or(doc.update_time),
        })
    }
}

/// pending request joined with the sender's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingRequest {
    #[serde(flatten)]
    pub user: User,
    pub created_at: i64,
}

/// friendship edge joined with the counterpart's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendWithUser {
    #[serde(flatten)]
    pub user: User,
    pub added_at: i64,
}

/// The state of an unordered pair `{a, b}` viewed as one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendshipState {
    None,
    Requested,
    AcceptedPartial,
    AcceptedSymmetric,
}

impl FriendshipState {
    pub fn from_parts(request_pending: bool, forward: bool, reverse: bool) -> Self {
        match (forward, reverse) {
            (true, true) => FriendshipState::AcceptedSymmetric,
            (true, false) | (false, true) => FriendshipState::AcceptedPartial,
            (false, false) if request_pending => FriendshipState::Requested,
            (false, false) => FriendshipState::None,
        }
    }
}

impl std::fmt::Display for FriendshipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FriendshipState::None => f.write_str("None"),
            FriendshipState::Requested => f.write_str("Requested"),
            FriendshipState::AcceptedPartial => f.write_str("AcceptedPartial"),
            FriendshipState::AcceptedSymmetric => f.write_str("AcceptedSymmetric"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    /// the accepter's own edge, always written
    pub edge: FriendshipEdge,
    /// false when the requester's edge failed; the healer completes it later
    pub reverse_written: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOutcome {
    pub friend_id: String,
    pub counterpart_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Requested { request: FriendRequest },
    /// the recipient had already asked the sender; their request was accepted
    Accepted { outcome: AcceptOutcome },
}
