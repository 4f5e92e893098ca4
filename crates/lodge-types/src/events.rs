use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AuthorRef;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was posted into a container
    MessageCreate {
        id: Uuid,
        workspace_id: Uuid,
        channel_id: Option<Uuid>,
        conversation_id: Option<Uuid>,
        parent_message_id: Option<Uuid>,
        author: AuthorRef,
        body: String,
        created_at: i64,
    },

    /// A message body was edited by its author
    MessageUpdate {
        id: Uuid,
        channel_id: Option<Uuid>,
        body: String,
        updated_at: i64,
    },

    /// A message was removed
    MessageDelete {
        id: Uuid,
        channel_id: Option<Uuid>,
    },

    /// A member toggled a reaction on
    ReactionAdd {
        message_id: Uuid,
        member_id: Uuid,
        value: String,
    },

    /// A member toggled a reaction off
    ReactionRemove {
        message_id: Uuid,
        member_id: Uuid,
        value: String,
    },

    /// A user started typing in a channel
    TypingStart {
        channel_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are global and are delivered to all clients;
    /// conversation and thread traffic is intentionally not filtered here.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { channel_id, .. } => *channel_id,
            Self::MessageUpdate { channel_id, .. } => *channel_id,
            Self::MessageDelete { channel_id, .. } => *channel_id,
            Self::TypingStart { channel_id, .. } => Some(*channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to channel-scoped events for specific channels.
    Subscribe { channel_ids: Vec<Uuid> },

    /// Indicate typing in a channel
    StartTyping { channel_id: Uuid },
}
