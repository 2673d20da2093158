use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::internal::{Chat, ChatRole, ChatSummary, Message};

// ==================== REQUEST DTOs ====================

/// New user turn. Omitting `chat_id` starts a new chat.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub chat_id: Option<Uuid>,
    pub message: String,
    pub model: String,
    #[serde(default)]
    pub think: bool,
}

/// Replaces an earlier user message and regenerates from that turn;
/// everything after the edited message is discarded. Passing `model`
/// switches the chat to that model.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EditMessageRequest {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub message: String,
    pub model: Option<String>,
    #[serde(default)]
    pub think: bool,
}

/// Regenerates an assistant message in place, on `model` when given
/// instead of the chat's pinned one.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegenerateRequest {
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub model: Option<String>,
    #[serde(default)]
    pub think: bool,
}

// ==================== RESPONSE DTOs ====================

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageDto {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub edited_at: Option<NaiveDateTime>,
    pub think: bool,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
            edited_at: m.edited_at,
            think: m.think,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub id: Uuid,
    pub name: String,
    pub model: String,
    pub shared: bool,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: NaiveDateTime,
    pub messages: Vec<MessageDto>,
}

impl From<Chat> for ChatResponse {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            name: chat.name,
            model: chat.model,
            shared: chat.shared,
            updated_at: chat.updated_at,
            messages: chat.messages.into_iter().map(MessageDto::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatSummaryDto {
    pub id: Uuid,
    pub name: String,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: NaiveDateTime,
}

impl From<ChatSummary> for ChatSummaryDto {
    fn from(s: ChatSummary) -> Self {
        Self {
            id: s.id,
            name: s.name,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummaryDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShareResponse {
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
