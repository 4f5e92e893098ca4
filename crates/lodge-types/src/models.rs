use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a message lives. Two messages belong to the same page-able stream
/// iff their keys are equal. A key with `parent_message_id` set selects a
/// thread stream, which is paged by the parent id alone; top-level streams
/// additionally require that a message has no parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerKey {
    pub channel_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
}

impl ContainerKey {
    pub fn channel(channel_id: Uuid) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Default::default()
        }
    }

    pub fn conversation(conversation_id: Uuid) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            ..Default::default()
        }
    }

    pub fn thread(parent_message_id: Uuid) -> Self {
        Self {
            parent_message_id: Some(parent_message_id),
            ..Default::default()
        }
    }

    pub fn is_thread(&self) -> bool {
        self.parent_message_id.is_some()
    }

    /// A key that names no container at all cannot be paged or written to.
    pub fn is_empty(&self) -> bool {
        self.channel_id.is_none()
            && self.parent_message_id.is_none()
            && self.conversation_id.is_none()
    }
}

/// Message authorship: a human workspace member or the workspace's
/// automated participant. Exactly one, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuthorRef {
    Member(Uuid),
    Bot(Uuid),
}

/// Uniform display identity resolved from either author variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorIdentity {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub join_code: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub username: String,
    pub image: Option<String>,
}

/// A 1:1 conversation: either two human members, or a member and the
/// workspace bot. `member_two_id` and `bot_id` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub member_one_id: Uuid,
    pub member_two_id: Option<Uuid>,
    pub bot_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: Option<String>,
    pub image: Option<String>,
}
