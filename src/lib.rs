//! chatflow - adaptive token-streaming chat server

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod storage;
pub mod stream;

// Re-export main types for convenience
pub use crate::api::dto::*;
pub use crate::api::rate_limiter::RateLimiter;
pub use crate::api::routes::{create_router, AppState};
pub use crate::config::Config;
pub use crate::models::internal::{Chat, ChatRole, ChatSummary, Message, NewChat, ResponseMeta};
pub use crate::orchestrator::{ChatError, ChatNamer, ChatOrchestrator, GroqNamer};
pub use crate::providers::{
    GenerateError, LiveProviderAdapter, ModelId, ProviderAdapter, ScriptedAdapter, TokenEvent,
};
pub use crate::storage::db::init_db;
pub use crate::storage::repository::{ChatRepository, SeaOrmChatRepository};
pub use crate::stream::{ChannelSink, SmootherConfig};
