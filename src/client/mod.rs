//! Client-side view model for a streamed conversation.
//!
//! Mirrors what a connected UI keeps in memory: optimistic placeholder
//! messages with temporary ids, reconciliation against the durable ids
//! the server sends as response headers, incremental UTF-8 decoding of
//! the body, and gradual reveal of buffered text.

pub mod reveal;

use crate::models::internal::ChatRole;

pub use reveal::RevealQueue;

pub const TEMP_USER_PREFIX: &str = "temp-user-";
pub const TEMP_AI_PREFIX: &str = "temp-ai-";

/// Durable ids from the stream's response headers.
#[derive(Debug, Clone)]
pub struct StreamHandshake {
    pub chat_id: String,
    pub user_message_id: Option<String>,
    pub assistant_message_id: String,
}

#[derive(Debug, Clone)]
pub struct ViewMessage {
    pub id: String,
    pub role: ChatRole,
    /// Everything received so far.
    pub content: String,
    /// The revealed prefix shown to the user.
    pub visible: String,
    pub streaming: bool,
}

#[derive(Debug, Default)]
pub struct ChatView {
    pub chat_id: Option<String>,
    pub messages: Vec<ViewMessage>,
    pub input_disabled: bool,
    pub error: Option<String>,
    reveal: RevealQueue,
    utf8_tail: Vec<u8>,
    next_temp: u64,
    streaming_id: Option<String>,
    pending_user_id: Option<String>,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the optimistic user message and an empty assistant
    /// placeholder, returning their temporary ids. Input stays disabled
    /// until the stream settles.
    pub fn begin_send(&mut self, message: &str) -> (String, String) {
        self.next_temp += 1;
        let user_id = format!("{}{}", TEMP_USER_PREFIX, self.next_temp);
        let ai_id = format!("{}{}", TEMP_AI_PREFIX, self.next_temp);

        self.messages.push(ViewMessage {
            id: user_id.clone(),
            role: ChatRole::User,
            content: message.to_string(),
            visible: message.to_string(),
            streaming: false,
        });
        self.messages.push(ViewMessage {
            id: ai_id.clone(),
            role: ChatRole::Assistant,
            content: String::new(),
            visible: String::new(),
            streaming: true,
        });

        self.input_disabled = true;
        self.error = None;
        self.streaming_id = Some(ai_id.clone());
        self.pending_user_id = Some(user_id.clone());
        self.reveal = RevealQueue::new();
        self.utf8_tail.clear();

        (user_id, ai_id)
    }

    /// Swaps the temporary ids for the durable ones from the headers.
    /// Runs before the first body byte, so later operations (edit,
    /// regenerate) can reference real ids immediately.
    pub fn reconcile(&mut self, handshake: &StreamHandshake) {
        self.chat_id = Some(handshake.chat_id.clone());

        if let Some(durable) = &handshake.user_message_id {
            if let Some(temp) = self.pending_user_id.take() {
                if let Some(m) = self.messages.iter_mut().find(|m| m.id == temp) {
                    m.id = durable.clone();
                }
                self.pending_user_id = Some(durable.clone());
            }
        }
        if let Some(temp) = self.streaming_id.take() {
            if let Some(m) = self.messages.iter_mut().find(|m| m.id == temp) {
                m.id = handshake.assistant_message_id.clone();
            }
            self.streaming_id = Some(handshake.assistant_message_id.clone());
        }
    }

    /// Feeds raw body bytes into the in-flight assistant message. Split
    /// code points are held until completed; invalid sequences decode to
    /// the replacement character.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        let decoded = self.decode_streaming(bytes);
        if decoded.is_empty() {
            return;
        }
        if let Some(m) = self.streaming_message_mut() {
            m.content.push_str(&decoded);
        }
        self.reveal.push(&decoded, true);
    }

    /// Advances the reveal animation by one frame. Returns false once
    /// nothing is left to reveal.
    pub fn tick(&mut self) -> bool {
        let revealed = self.reveal.tick();
        if !revealed.is_empty() {
            if let Some(m) = self.streaming_message_mut() {
                m.visible.push_str(&revealed);
            }
        }
        !self.reveal.is_empty()
    }

    /// Settles the view after the stream ended cleanly: flushes any held
    /// bytes and reveal backlog, then re-enables input.
    pub fn finish_stream(&mut self) {
        if !self.utf8_tail.is_empty() {
            let tail = String::from_utf8_lossy(&self.utf8_tail).into_owned();
            self.utf8_tail.clear();
            if let Some(m) = self.streaming_message_mut() {
                m.content.push_str(&tail);
            }
            self.reveal.push(&tail, true);
        }
        self.reveal.push("", false);
        while self.tick() {}

        if let Some(id) = self.streaming_id.take() {
            if let Some(m) = self.messages.iter_mut().find(|m| m.id == id) {
                m.streaming = false;
                m.visible = m.content.clone();
            }
        }
        self.pending_user_id = None;
        self.input_disabled = false;
    }

    /// Unwinds the optimistic messages after a failed stream; the server
    /// rolled its copies back, so the view must match.
    pub fn mark_error(&mut self, error: &str) {
        if let Some(id) = self.streaming_id.take() {
            self.messages.retain(|m| m.id != id);
        }
        if let Some(id) = self.pending_user_id.take() {
            self.messages.retain(|m| m.id != id);
        }
        self.reveal = RevealQueue::new();
        self.utf8_tail.clear();
        self.error = Some(error.to_string());
        // Input stays locked until the error is acknowledged.
        self.input_disabled = true;
    }

    /// Clears an acknowledged error and unlocks input.
    pub fn refresh(&mut self) {
        self.error = None;
        self.input_disabled = false;
    }

    fn streaming_message_mut(&mut self) -> Option<&mut ViewMessage> {
        let id = self.streaming_id.clone()?;
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn decode_streaming(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.utf8_tail);
        buf.extend_from_slice(bytes);

        let mut out = String::new();
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(n) => {
                            out.push('\u{FFFD}');
                            rest = &after[n..];
                        }
                        None => {
                            // Incomplete code point; wait for more bytes.
                            self.utf8_tail = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}
