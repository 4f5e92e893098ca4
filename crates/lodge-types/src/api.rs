use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AuthorIdentity;

// -- JWT Claims --

/// JWT claims shared between lodge-api (REST middleware) and lodge-gateway
/// (WebSocket Identify). Canonical definition lives here in lodge-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Directory --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinWorkspaceRequest {
    pub join_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
}

/// Create-or-get a 1:1 conversation. With `member_id` set the peer is that
/// human member; without it the peer is the workspace bot.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub member_id: Option<Uuid>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub workspace_id: Uuid,
    pub body: String,
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub image: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: Uuid,
}

/// One fully enriched message row as served to readers.
#[derive(Debug, Clone, Serialize)]
pub struct MessageItem {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub conversation_id: Option<Uuid>,
    pub parent_message_id: Option<Uuid>,
    pub author: AuthorIdentity,
    pub body: String,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub reactions: Vec<ReactionGroup>,
    pub thread: ThreadSummary,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub items: Vec<MessageItem>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleReactionResponse {
    /// Id of the inserted fact; None when the toggle removed one.
    pub reaction_id: Option<Uuid>,
}

/// Per-emoji aggregate for one message. `count` always equals the number of
/// distinct members in `member_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionGroup {
    pub value: String,
    pub count: usize,
    pub member_ids: Vec<Uuid>,
}

// -- Threads --

/// Reply roll-up for a message acting as a thread root. The zero value (no
/// replies, or the last reply's author no longer resolvable) is the default.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadSummary {
    pub count: usize,
    pub last_author: Option<AuthorIdentity>,
    pub last_timestamp: i64,
}

// -- Uploads --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_id: Uuid,
    pub size: u64,
}
