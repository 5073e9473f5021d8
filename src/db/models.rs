use std::fmt;

use bson::oid::ObjectId;
use bson::DateTime;
use serde::{Deserialize, Serialize};

/// A stored document that can be addressed by its `_id`.
pub trait Entity:
    Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + Unpin + 'static
{
    /// Collection name, also used in logs.
    const COLLECTION: &'static str;

    fn id(&self) -> ObjectId;
}

/// Timestamp for a write to a record created at `created_at`: now, but never
/// at or before the creation time.
pub fn update_timestamp(created_at: Option<DateTime>) -> DateTime {
    let now = DateTime::now();
    match created_at {
        Some(created) if now.timestamp_millis() <= created.timestamp_millis() => {
            DateTime::from_millis(created.timestamp_millis() + 1)
        }
        _ => now,
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Parse the wire name (exact, upper case).
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for bson::Bson {
            fn from(value: $name) -> Self {
                bson::Bson::String(value.as_str().to_string())
            }
        }
    };
}

string_enum!(
    /// What a node's `content` holds.
    DataType { Text => "TEXT", Url => "URL", Deleted => "DELETED" }
);

string_enum!(
    /// Where a node sits in a thread.
    RelationType { Post => "POST", Comment => "COMMENT" }
);

string_enum!(
    LinkType { Comment => "COMMENT", Post => "POST" }
);

string_enum!(
    VoteType { Up => "UP", Down => "DOWN" }
);

/// A content node (post or comment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub data_type: DataType,
    pub relation_type: RelationType,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Set for comments; always `None` for posts.
    #[serde(default)]
    pub parent_id: Option<ObjectId>,
    /// Ids of the comments attached directly to this node.
    #[serde(default)]
    pub children: Vec<ObjectId>,
    pub created_by_id: Option<ObjectId>,
    pub updated_by_id: Option<ObjectId>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

impl Node {
    pub fn is_deleted(&self) -> bool {
        self.data_type == DataType::Deleted
    }

    /// Soft delete: keep the id and thread structure, drop everything else.
    pub fn into_deleted(self) -> Node {
        Node {
            id: self.id,
            data_type: DataType::Deleted,
            relation_type: self.relation_type,
            title: None,
            content: None,
            parent_id: self.parent_id,
            children: self.children,
            created_by_id: None,
            updated_by_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Node {
    const COLLECTION: &'static str = "nodes";

    fn id(&self) -> ObjectId {
        self.id
    }
}

/// A typed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub source_node_id: ObjectId,
    pub dest_node_id: ObjectId,
    pub created_by_id: Option<ObjectId>,
    pub created_at: Option<DateTime>,
}

impl Entity for Link {
    const COLLECTION: &'static str = "links";

    fn id(&self) -> ObjectId {
        self.id
    }
}

/// One user's vote on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
    pub node_id: ObjectId,
    pub user_id: ObjectId,
    pub created_at: Option<DateTime>,
}

impl Entity for Vote {
    const COLLECTION: &'static str = "votes";

    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    /// Bcrypt hash; the plaintext password is never stored.
    pub password_hash: String,
    #[serde(default)]
    pub email_verified: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> ObjectId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Mutation inputs. Enum-valued fields arrive as raw strings so that
// membership can be reported as a field error alongside everything else.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub data_type: String,
    pub relation_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInput {
    #[serde(rename = "type")]
    pub link_type: String,
    pub source_node_id: String,
    pub dest_node_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkUpdate {
    #[serde(rename = "type")]
    pub link_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    #[serde(rename = "type")]
    pub vote_type: String,
    pub node_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteUpdate {
    #[serde(rename = "type")]
    pub vote_type: String,
}

#[derive(Clone, Default, Deserialize)]
pub struct UserInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Result of a successful sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}
