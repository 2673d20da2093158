pub mod internal;

pub use internal::{Chat, ChatRole, ChatSummary, ContextMessage, Message, NewChat, ResponseMeta};
