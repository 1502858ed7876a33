use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub const USERS: &str = "users";
pub const FRIENDS: &str = "friends";
pub const FRIEND_REQUESTS: &str = "friendRequests";
pub const REMOVED_FRIENDS: &str = "removedFriends";

/// Absolute path of one document: `collection/doc(/collection/doc)*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

/// Absolute path of a collection: `collection(/doc/collection)*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

fn check_segment(segment: &str) -> Result<&str, Error> {
    if segment.is_empty() || segment.contains('/') {
        return Err(Error::invalid_path(format!(
            "invalid path segment: {:?}",
            segment
        )));
    }
    Ok(segment)
}

fn count_segments(path: &str) -> Result<usize, Error> {
    if path.is_empty() {
        return Err(Error::invalid_path("empty path"));
    }
    let mut count = 0;
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(Error::invalid_path(format!("empty segment in {:?}", path)));
        }
        count += 1;
    }
    Ok(count)
}

impl DocPath {
    pub fn parse(path: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        if count_segments(&path)? % 2 != 0 {
            return Err(Error::invalid_path(format!(
                "{:?} is not a document path",
                path
            )));
        }
        Ok(Self(path))
    }

    /// `users/{user_id}`
    pub fn user(user_id: &str) -> Result<Self, Error> {
        CollectionPath::users().doc(user_id)
    }

    /// `users/{owner}/friends/{friend}`
    pub fn friend_edge(owner: &str, friend: &str) -> Result<Self, Error> {
        CollectionPath::friends(owner)?.doc(friend)
    }

    /// `users/{recipient}/friendRequests/{sender}`
    pub fn friend_request(recipient: &str, sender: &str) -> Result<Self, Error> {
        CollectionPath::friend_requests(recipient)?.doc(sender)
    }

    /// `users/{owner}/removedFriends/{friend}`
    pub fn removed_friend(owner: &str, friend: &str) -> Result<Self, Error> {
        CollectionPath::removed_friends(owner)?.doc(friend)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// last segment
    pub fn id(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, id)) => id,
            None => &self.0,
        }
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    /// `(owner, friend)` if the path is `users/{owner}/friends/{friend}`
    pub fn as_friend_edge(&self) -> Option<(&str, &str)> {
        self.user_sub_document(FRIENDS)
    }

    /// `(recipient, sender)` if the path is `users/{recipient}/friendRequests/{sender}`
    pub fn as_friend_request(&self) -> Option<(&str, &str)> {
        self.user_sub_document(FRIEND_REQUESTS)
    }

    fn user_sub_document(&self, collection: &str) -> Option<(&str, &str)> {
        let mut segments = self.0.split('/');
        match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(USERS), Some(owner), Some(sub), Some(id), None) if sub == collection => {
                Some((owner, id))
            }
            _ => None,
        }
    }
}

impl CollectionPath {
    pub fn parse(path: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        if count_segments(&path)? % 2 != 1 {
            return Err(Error::invalid_path(format!(
                "{:?} is not a collection path",
                path
            )));
        }
        Ok(Self(path))
    }

    pub fn users() -> Self {
        Self(USERS.to_string())
    }

    pub fn friends(owner: &str) -> Result<Self, Error> {
        Self::user_sub_collection(owner, FRIENDS)
    }

    pub fn friend_requests(recipient: &str) -> Result<Self, Error> {
        Self::user_sub_collection(recipient, FRIEND_REQUESTS)
    }

    pub fn removed_friends(owner: &str) -> Result<Self, Error> {
        Self::user_sub_collection(owner, REMOVED_FRIENDS)
    }

    fn user_sub_collection(user_id: &str, collection: &str) -> Result<Self, Error> {
        Ok(Self(format!(
            "{}/{}/{}",
            USERS,
            check_segment(user_id)?,
            collection
        )))
    }

    pub fn doc(&self, id: &str) -> Result<DocPath, Error> {
        Ok(DocPath(format!("{}/{}", self.0, check_segment(id)?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// last segment, the name shared by a collection group
    pub fn collection_id(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, id)) => id,
            None => &self.0,
        }
    }

    pub fn contains(&self, path: &DocPath) -> bool {
        path.parent() == *self
    }
}

impl TryFrom<String> for DocPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocPath> for String {
    fn from(value: DocPath) -> Self {
        value.0
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CollectionPath> for String {
    fn from(value: CollectionPath) -> Self {
        value.0
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single field of a stored document.
///
/// `ServerTimestamp` is a write-only sentinel: the store replaces it with its
/// own commit time, so readers only ever see `Timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// milliseconds since the unix epoch
    Timestamp(i64),
    ServerTimestamp,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

pub fn resolve_server_timestamps(fields: Fields, now: i64) -> Fields {
    fields
        .into_iter()
        .map(|(name, value)| match value {
            FieldValue::ServerTimestamp => (name, FieldValue::Timestamp(now)),
            value => (name, value),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
    pub create_time: i64,
    pub update_time: i64,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn str_field(&self, name: &str) -> Result<&str, Error> {
        match self.fields.get(name) {
            Some(FieldValue::String(value)) => Ok(value),
            Some(other) => Err(Error::parse(format!(
                "field {} of {} is not a string: {:?}",
                name, self.path, other
            ))),
            None => Err(Error::parse(format!("{} has no field {}", self.path, name))),
        }
    }

    pub fn opt_str_field(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn timestamp_field(&self, name: &str) -> Result<i64, Error> {
        match self.fields.get(name) {
            Some(FieldValue::Timestamp(value)) | Some(FieldValue::Integer(value)) => Ok(*value),
            Some(other) => Err(Error::parse(format!(
                "field {} of {} is not a timestamp: {:?}",
                name, self.path, other
            ))),
            None => Err(Error::parse(format!("{} has no field {}", self.path, name))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => f.write_str("created"),
            ChangeKind::Updated => f.write_str("updated"),
            ChangeKind::Deleted => f.write_str("deleted"),
        }
    }
}

/// published by a store after every successful write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: DocPath,
    /// the new content; `None` for deletes
    pub document: Option<Document>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_edge_path_should_round_trip() {
        let path = DocPath::friend_edge("alice", "bob").unwrap();
        assert_eq!(path.as_str(), "users/alice/friends/bob");
        assert_eq!(path.id(), "bob");
        assert_eq!(path.parent().as_str(), "users/alice/friends");
        assert_eq!(path.parent().collection_id(), FRIENDS);
        assert_eq!(path.as_friend_edge(), Some(("alice", "bob")));
        assert_eq!(path.as_friend_request(), None);
    }

    #[test]
    fn friend_request_path_should_be_keyed_by_sender() {
        let path = DocPath::friend_request("bob", "alice").unwrap();
        assert_eq!(path.as_str(), "users/bob/friendRequests/alice");
        assert_eq!(path.as_friend_request(), Some(("bob", "alice")));
        assert!(CollectionPath::friend_requests("bob")
            .unwrap()
            .contains(&path));
    }

    #[test]
    fn segments_with_slash_or_empty_should_be_rejected() {
        assert!(DocPath::friend_edge("a/b", "c").is_err());
        assert!(DocPath::friend_edge("a", "").is_err());
        assert!(DocPath::parse("users//friends/x").is_err());
        assert!(DocPath::parse("users/a/friends").is_err());
        assert!(CollectionPath::parse("users/a").is_err());
        assert!(CollectionPath::parse("users/a/friends").is_ok());
    }

    #[test]
    fn nested_friend_edge_is_not_matched() {
        let path = DocPath::parse("users/a/friends/b/notes/c").unwrap();
        assert_eq!(path.as_friend_edge(), None);
        let path = DocPath::parse("groups/a/friends/b").unwrap();
        assert_eq!(path.as_friend_edge(), None);
    }

    #[test]
    fn server_timestamp_should_be_resolved() {
        let mut fields = Fields::new();
        fields.insert("friendUid".into(), "bob".into());
        fields.insert("addedAt".into(), FieldValue::ServerTimestamp);
        let fields = resolve_server_timestamps(fields, 42);
        assert_eq!(fields["addedAt"], FieldValue::Timestamp(42));
        assert_eq!(fields["friendUid"], FieldValue::String("bob".into()));
    }

    #[test]
    fn change_event_should_serialize_with_string_path() {
        let event = ChangeEvent {
            kind: ChangeKind::Deleted,
            path: DocPath::friend_edge("a", "b").unwrap(),
            document: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"deleted","path":"users/a/friends/b","document":null}"#
        );
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert!(serde_json::from_str::<ChangeEvent>(
            r#"{"kind":"deleted","path":"users/a","document":null}"#
        )
        .is_ok());
        assert!(serde_json::from_str::<ChangeEvent>(
            r#"{"kind":"deleted","path":"users","document":null}"#
        )
        .is_err());
    }

    #[test]
    fn typed_field_access() {
        let mut fields = Fields::new();
        fields.insert("fromUid".into(), "alice".into());
        fields.insert("timestamp".into(), FieldValue::Timestamp(7));
        let doc = Document {
            path: DocPath::friend_request("bob", "alice").unwrap(),
            fields,
            create_time: 7,
            update_time: 7,
        };
        assert_eq!(doc.str_field("fromUid").unwrap(), "alice");
        assert_eq!(doc.timestamp_field("timestamp").unwrap(), 7);
        assert!(doc.str_field("timestamp").is_err());
        assert!(doc.timestamp_field("missing").is_err());
        assert_eq!(doc.opt_str_field("missing"), None);
    }
}
