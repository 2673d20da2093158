//! Coordinates one generation turn end to end: persist the user's
//! input, build context, drive the provider stream into the client sink,
//! then persist or roll back depending on how the stream ended.

pub mod naming;

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::internal::{
    Chat, ChatRole, ChatSummary, ContextMessage, Message, NewChat, ResponseMeta,
};
use crate::providers::{
    GenerateError, GenerateRequest, ModelId, ProviderAdapter, TokenEvent, TokenStream,
};
use crate::storage::repository::{ChatRepository, RepositoryError};
use crate::stream::{RateSmoother, SmootherConfig, StreamSink};

pub use naming::{fallback_name, ChatNamer, GroqNamer};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Chat not found")]
    NotFound,
    #[error("Access denied")]
    Forbidden,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerateError),
}

/// What to do with the chat once the stream finishes or fails.
#[derive(Debug)]
enum GenerationKind {
    /// New user turn; roll the user message back on failure.
    Send { user_message_id: Uuid },
    /// Edited turn; restore the pre-edit message list on failure.
    Edit { previous_messages: Vec<Message> },
    /// In-place regeneration; the chat is untouched on failure.
    Regenerate { target_message_id: Uuid },
}

/// A validated, persisted setup for one generation turn. The durable ids
/// in `meta` go out as response headers before the first streamed byte.
#[derive(Debug)]
pub struct PreparedGeneration {
    pub meta: ResponseMeta,
    kind: GenerationKind,
    owner_id: String,
    model: ModelId,
    think: bool,
    context: Vec<ContextMessage>,
}

pub struct ChatOrchestrator {
    repo: Arc<dyn ChatRepository>,
    provider: Arc<dyn ProviderAdapter>,
    namer: Arc<dyn ChatNamer>,
    smoothing: SmootherConfig,
}

impl ChatOrchestrator {
    pub fn new(
        repo: Arc<dyn ChatRepository>,
        provider: Arc<dyn ProviderAdapter>,
        namer: Arc<dyn ChatNamer>,
        smoothing: SmootherConfig,
    ) -> Self {
        Self {
            repo,
            provider,
            namer,
            smoothing,
        }
    }

    /// Validates a new user turn, creating and naming the chat if needed,
    /// and persists the user message before any generation starts.
    pub async fn prepare_send(
        &self,
        owner_id: &str,
        chat_id: Option<Uuid>,
        message: &str,
        model: &str,
        think: bool,
    ) -> Result<PreparedGeneration, ChatError> {
        let content = message.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }
        let model =
            ModelId::parse(model).ok_or_else(|| ChatError::Validation("unknown model".into()))?;

        let (chat_id, mut history) = match chat_id {
            Some(id) => {
                let chat = self
                    .repo
                    .find_by_id_for_owner(id, owner_id)
                    .await?
                    .ok_or(ChatError::NotFound)?;
                (chat.id, chat.messages)
            }
            None => {
                let name = match self.namer.generate_name(content).await {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::warn!("chat naming failed, using fallback: {}", e);
                        fallback_name(self.repo.count_by_owner(owner_id).await?)
                    }
                };
                let id = self
                    .repo
                    .insert_new(NewChat {
                        id: Uuid::new_v4(),
                        owner_id: owner_id.to_string(),
                        name,
                        model: model.as_str().to_string(),
                    })
                    .await?;
                (id, Vec::new())
            }
        };

        let user_message = Message::user(content, think);
        let user_message_id = user_message.id;
        self.repo
            .append_message(chat_id, owner_id, user_message.clone(), Some(model.as_str()))
            .await?;
        history.push(user_message);

        Ok(PreparedGeneration {
            meta: ResponseMeta {
                chat_id,
                user_message_id: Some(user_message_id),
                assistant_message_id: Uuid::new_v4(),
            },
            kind: GenerationKind::Send { user_message_id },
            owner_id: owner_id.to_string(),
            model,
            think,
            context: context_of(&history),
        })
    }

    /// Replaces the content of an earlier user message and truncates
    /// everything after it; the chat becomes linear again from that turn.
    /// A `model` override switches the chat to that model for the
    /// regenerated reply.
    pub async fn prepare_edit(
        &self,
        owner_id: &str,
        chat_id: Uuid,
        message_id: Uuid,
        message: &str,
        model: Option<&str>,
        think: bool,
    ) -> Result<PreparedGeneration, ChatError> {
        let content = message.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }

        let chat = self
            .repo
            .find_by_id_for_owner(chat_id, owner_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let model = resolve_model(model, &chat.model)?;

        let target = chat
            .messages
            .iter()
            .position(|m| m.id == message_id && m.role == ChatRole::User)
            .ok_or(ChatError::NotFound)?;

        let previous_messages = chat.messages.clone();

        let mut kept: Vec<Message> = chat.messages[..target].to_vec();
        let mut edited = chat.messages[target].clone();
        edited.content = content.to_string();
        edited.edited_at = Some(chrono::Utc::now().naive_utc());
        edited.think = think;
        kept.push(edited);

        self.repo.replace_messages(chat_id, kept.clone()).await?;

        Ok(PreparedGeneration {
            meta: ResponseMeta {
                chat_id,
                user_message_id: Some(message_id),
                assistant_message_id: Uuid::new_v4(),
            },
            kind: GenerationKind::Edit { previous_messages },
            owner_id: owner_id.to_string(),
            model,
            think,
            context: context_of(&kept),
        })
    }

    /// Regenerates an assistant message in place; later messages are
    /// neither part of the context nor touched. A `model` override uses
    /// that model for the new reply instead of the chat's pinned one.
    pub async fn prepare_regenerate(
        &self,
        owner_id: &str,
        chat_id: Uuid,
        message_id: Uuid,
        model: Option<&str>,
        think: bool,
    ) -> Result<PreparedGeneration, ChatError> {
        let chat = self
            .repo
            .find_by_id_for_owner(chat_id, owner_id)
            .await?
            .ok_or(ChatError::NotFound)?;
        let model = resolve_model(model, &chat.model)?;

        let target = chat
            .messages
            .iter()
            .position(|m| m.id == message_id && m.role == ChatRole::Assistant)
            .ok_or(ChatError::NotFound)?;

        Ok(PreparedGeneration {
            meta: ResponseMeta {
                chat_id,
                user_message_id: None,
                assistant_message_id: message_id,
            },
            kind: GenerationKind::Regenerate {
                target_message_id: message_id,
            },
            owner_id: owner_id.to_string(),
            model,
            think,
            context: context_of(&chat.messages[..target]),
        })
    }

    /// Drives the generation into `sink` and settles the chat state.
    ///
    /// Quota exhaustion on a model with a configured fallback retries
    /// once on the fallback model over the same sink. Any other failure
    /// (or a failed fallback) undoes the optimistic writes of the turn.
    pub async fn stream<S>(&self, prepared: PreparedGeneration, mut sink: S) -> Result<(), ChatError>
    where
        S: StreamSink + Send + 'static,
    {
        let PreparedGeneration {
            meta,
            kind,
            owner_id,
            model,
            think,
            context,
        } = prepared;

        let result = match self.generate_once(model, think, &context, &mut sink).await {
            Err(e) if e.is_quota_exhausted() && model.caps().fallback.is_some() => {
                let fallback = model.caps().fallback.unwrap();
                tracing::warn!(
                    model = model.as_str(),
                    fallback = fallback.as_str(),
                    "quota exhausted, retrying on fallback model"
                );
                self.generate_once(fallback, think, &context, &mut sink)
                    .await
            }
            other => other,
        };

        match result {
            Ok(text) => {
                let text = text.trim();
                match kind {
                    GenerationKind::Send { .. } | GenerationKind::Edit { .. } => {
                        self.repo
                            .append_message(
                                meta.chat_id,
                                &owner_id,
                                Message::assistant(meta.assistant_message_id, text, think),
                                Some(model.as_str()),
                            )
                            .await?;
                    }
                    GenerationKind::Regenerate { target_message_id } => {
                        self.repo
                            .replace_message_content(meta.chat_id, target_message_id, text, think)
                            .await?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match kind {
                    GenerationKind::Send { user_message_id } => {
                        if let Err(undo) = self
                            .repo
                            .remove_message(meta.chat_id, &owner_id, user_message_id)
                            .await
                        {
                            tracing::error!("failed to roll back user message: {}", undo);
                        }
                    }
                    GenerationKind::Edit { previous_messages } => {
                        if let Err(undo) = self
                            .repo
                            .replace_messages(meta.chat_id, previous_messages)
                            .await
                        {
                            tracing::error!("failed to restore pre-edit messages: {}", undo);
                        }
                    }
                    GenerationKind::Regenerate { .. } => {}
                }
                Err(ChatError::Generation(e))
            }
        }
    }

    /// One generation attempt. Returns the complete accumulated text even
    /// when the sink closed partway through.
    async fn generate_once<S: StreamSink>(
        &self,
        model: ModelId,
        think: bool,
        context: &[ContextMessage],
        sink: &mut S,
    ) -> Result<String, GenerateError> {
        let stream = self.provider.generate(GenerateRequest {
            model,
            think,
            messages: context.to_vec(),
        });

        if model.caps().smoothed {
            self.run_smoothed(stream, think, sink).await
        } else {
            run_direct(stream, sink).await
        }
    }

    async fn run_smoothed<S: StreamSink>(
        &self,
        mut stream: TokenStream,
        think: bool,
        sink: &mut S,
    ) -> Result<String, GenerateError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forward = tokio::spawn(async move {
            let mut framer = ThoughtFramer::default();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        let text = framer.frame(event);
                        if !text.is_empty() && tx.send(Ok(text)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                }
            }
            if let Some(text) = framer.finish() {
                let _ = tx.send(Ok(text));
            }
        });

        let mut smoother = RateSmoother::new(&mut *sink, self.smoothing);
        if think {
            // This provider keeps its reasoning private; bridge the wait.
            smoother.emit_preamble().await;
        }
        let result = smoother.run(&mut rx).await;
        let text = smoother.into_text();
        let _ = forward.await;

        result.map(|_| text)
    }
}

async fn run_direct<S: StreamSink>(
    mut stream: TokenStream,
    sink: &mut S,
) -> Result<String, GenerateError> {
    let mut framer = ThoughtFramer::default();
    let mut text = String::new();
    let mut sink_open = true;

    let mut push = |text: &mut String, sink: &mut S, sink_open: &mut bool, fragment: String| {
        if fragment.is_empty() {
            return;
        }
        text.push_str(&fragment);
        if *sink_open && sink.write(&fragment).is_err() {
            tracing::debug!("stream sink closed mid-generation");
            *sink_open = false;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => push(&mut text, sink, &mut sink_open, framer.frame(event)),
            Err(e) => return Err(e),
        }
    }
    if let Some(tail) = framer.finish() {
        push(&mut text, sink, &mut sink_open, tail);
    }
    Ok(text)
}

impl ChatOrchestrator {
    /// Loads a chat for display. Reading someone else's shared chat forks
    /// it into a private copy under the reader, as in the original share
    /// semantics; unshared chats of other owners are off limits.
    pub async fn open(&self, owner_id: &str, chat_id: Uuid) -> Result<Chat, ChatError> {
        let chat = self
            .repo
            .find_by_id(chat_id)
            .await?
            .ok_or(ChatError::NotFound)?;

        if chat.owner_id == owner_id {
            return Ok(chat);
        }
        if !chat.shared {
            return Err(ChatError::Forbidden);
        }

        let fork_id = self
            .repo
            .insert_new(NewChat {
                id: Uuid::new_v4(),
                owner_id: owner_id.to_string(),
                name: chat.name.clone(),
                model: chat.model.clone(),
            })
            .await?;
        // Copies get fresh message ids; the originals stay owned by the
        // source chat.
        let copies = chat
            .messages
            .into_iter()
            .map(|mut m| {
                m.id = Uuid::new_v4();
                m
            })
            .collect();
        self.repo.replace_messages(fork_id, copies).await?;

        self.repo
            .find_by_id(fork_id)
            .await?
            .ok_or(ChatError::NotFound)
    }

    pub async fn share(&self, owner_id: &str, chat_id: Uuid) -> Result<(), ChatError> {
        self.repo.set_shared(chat_id, owner_id, true).await?;
        Ok(())
    }

    pub async fn delete(&self, owner_id: &str, chat_id: Uuid) -> Result<(), ChatError> {
        self.repo.delete(chat_id, owner_id).await?;
        Ok(())
    }

    pub async fn list(&self, owner_id: &str) -> Result<Vec<ChatSummary>, ChatError> {
        Ok(self.repo.list_by_owner(owner_id).await?)
    }
}

fn resolve_model(requested: Option<&str>, pinned: &str) -> Result<ModelId, ChatError> {
    match requested {
        Some(m) => {
            ModelId::parse(m).ok_or_else(|| ChatError::Validation("unknown model".into()))
        }
        None => ModelId::parse(pinned)
            .ok_or_else(|| ChatError::Validation("chat has an unknown model".into())),
    }
}

fn context_of(messages: &[Message]) -> Vec<ContextMessage> {
    messages
        .iter()
        .map(|m| ContextMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// Re-frames the two-channel token stream as one text stream with the
/// reasoning wrapped in literal `<think>` markers, which is how clients
/// and persisted messages represent it.
#[derive(Debug, Default)]
struct ThoughtFramer {
    in_think: bool,
}

impl ThoughtFramer {
    fn frame(&mut self, event: TokenEvent) -> String {
        match event {
            TokenEvent::Thought(text) => {
                if self.in_think {
                    text
                } else {
                    self.in_think = true;
                    format!("<think>{}", text)
                }
            }
            TokenEvent::Content(text) => {
                if self.in_think {
                    self.in_think = false;
                    format!("</think>{}", text)
                } else {
                    text
                }
            }
        }
    }

    fn finish(&mut self) -> Option<String> {
        if self.in_think {
            self.in_think = false;
            Some("</think>".to_string())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(events: Vec<TokenEvent>) -> String {
        let mut framer = ThoughtFramer::default();
        let mut out = String::new();
        for event in events {
            out.push_str(&framer.frame(event));
        }
        if let Some(tail) = framer.finish() {
            out.push_str(&tail);
        }
        out
    }

    #[test]
    fn thought_runs_are_wrapped_once() {
        let out = frame_all(vec![
            TokenEvent::Thought("step one ".into()),
            TokenEvent::Thought("step two".into()),
            TokenEvent::Content("answer".into()),
        ]);
        assert_eq!(out, "<think>step one step two</think>answer");
    }

    #[test]
    fn plain_content_is_untouched() {
        let out = frame_all(vec![
            TokenEvent::Content("hello ".into()),
            TokenEvent::Content("world".into()),
        ]);
        assert_eq!(out, "hello world");
    }

    #[test]
    fn unclosed_thought_is_closed_at_end() {
        let out = frame_all(vec![TokenEvent::Thought("half".into())]);
        assert_eq!(out, "<think>half</think>");
    }
}
