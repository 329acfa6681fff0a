//! WebSocket wire protocol (§6): JSON frames tagged by `type`.

use serde::{Deserialize, Serialize};
use taxon_common::model::{Conversation, Message};

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    SendMessage {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        text: String,
        #[serde(rename = "userName")]
        user_name: String,
        #[serde(rename = "clientMessageId")]
        client_message_id: Option<String>,
    },
    SendImage {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        #[serde(rename = "imageUrl")]
        image_url: Option<String>,
        #[serde(rename = "imageBase64")]
        image_base64: Option<String>,
        #[serde(rename = "imageMimeType")]
        image_mime_type: Option<String>,
        text: Option<String>,
        #[serde(rename = "clientMessageId")]
        client_message_id: Option<String>,
    },
    JoinConversation {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
    },
    GetAllGroups {},
    Ping {
        timestamp: Option<i64>,
    },
    Pong {
        timestamp: Option<i64>,
    },
}

/// Frames the server sends. `Clone` because a broadcast fans the same
/// frame out to every connected participant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    NewMessage {
        message: Message,
    },
    MessageSent {
        message: Message,
    },
    ConversationHistory {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        messages: Vec<Message>,
    },
    AllGroups {
        conversations: Vec<Conversation>,
    },
    BotAdded {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    BotRemoved {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Broadcast to every connected user when a new group conversation is
    /// created via the HTTP side channel (§6), so open client sessions pick
    /// it up without polling.
    GroupCreated {
        conversation: Conversation,
    },
    UserJoinedGroup {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        #[serde(rename = "userId")]
        user_id: uuid::Uuid,
        conversation: Conversation,
    },
    UserLeftGroup {
        #[serde(rename = "conversationId")]
        conversation_id: uuid::Uuid,
        #[serde(rename = "userId")]
        user_id: uuid::Uuid,
        conversation: Conversation,
    },
    Ping {
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    PongAck {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }
}
