//! Automatic naming of new chats from their first message.

use async_trait::async_trait;

use crate::providers::groq::GroqClient;
use crate::providers::GenerateError;

const NAMING_SYSTEM_PROMPT: &str = "\
You title conversations. Given the user's first message, reply with a \
JSON object of the form {\"name\": \"...\"} where the name is a short \
title of at most three words. No punctuation, no quotes inside the \
name, same language as the message.";

#[async_trait]
pub trait ChatNamer: Send + Sync {
    async fn generate_name(&self, first_user_message: &str) -> Result<String, GenerateError>;
}

/// Names chats with a single constrained completion against a small
/// Groq-hosted model.
pub struct GroqNamer {
    client: GroqClient,
    model: String,
}

impl GroqNamer {
    pub fn new(client: GroqClient, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ChatNamer for GroqNamer {
    async fn generate_name(&self, first_user_message: &str) -> Result<String, GenerateError> {
        let raw = self
            .client
            .complete_json(&self.model, NAMING_SYSTEM_PROMPT, first_user_message)
            .await?;

        let parsed: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| GenerateError::new(format!("namer returned invalid JSON: {}", e)))?;

        parsed["name"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GenerateError::new("namer returned no name"))
    }
}

/// Used when the namer fails; numbering continues from the owner's
/// current chat count.
pub fn fallback_name(existing_chats: u64) -> String {
    format!("Chat #{}", existing_chats + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_numbering_starts_at_one() {
        assert_eq!(fallback_name(0), "Chat #1");
        assert_eq!(fallback_name(7), "Chat #8");
    }
}
