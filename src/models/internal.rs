use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<ChatRole> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub edited_at: Option<NaiveDateTime>,
    pub think: bool,
}

impl Message {
    pub fn user(content: impl Into<String>, think: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content: content.into(),
            created_at: chrono::Utc::now().naive_utc(),
            edited_at: None,
            think,
        }
    }

    pub fn assistant(id: Uuid, content: impl Into<String>, think: bool) -> Self {
        Self {
            id,
            role: ChatRole::Assistant,
            content: content.into(),
            created_at: chrono::Utc::now().naive_utc(),
            edited_at: None,
            think,
        }
    }
}

/// A conversation document. Messages are kept in append order; edits to a
/// user message truncate everything after it (history is linear).
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub model: String,
    pub shared: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub messages: Vec<Message>,
}

/// Sidebar listing projection.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub name: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub model: String,
}

/// One item of the context sent upstream. Never persisted; derived from
/// chat state at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Durable ids handed to the client before the first byte of the stream,
/// so optimistic placeholder ids can be reconciled up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMeta {
    pub chat_id: Uuid,
    pub user_message_id: Option<Uuid>,
    pub assistant_message_id: Uuid,
}
