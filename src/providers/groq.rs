//! Client for the OpenAI-compatible (Groq-family) chat completion API.

use serde_json::{json, Value};

use crate::models::internal::ContextMessage;

use super::sse::SseReader;
use super::GenerateError;

#[derive(Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Opens a streaming chat completion; the returned reader yields raw
    /// SSE payloads.
    pub async fn stream_chat(
        &self,
        model: &str,
        system: &str,
        messages: &[ContextMessage],
        reasoning: bool,
    ) -> Result<SseReader, GenerateError> {
        let mut body = json!({
            "model": model,
            "messages": wire_messages(system, messages),
            "temperature": 0.7,
            "max_completion_tokens": 4096,
            "top_p": 1,
            "stream": true,
        });
        if reasoning {
            body["reasoning_effort"] = json!("default");
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::new(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(SseReader::from_response(response))
    }

    /// Single non-streaming completion constrained to a JSON object
    /// response; returns the raw message content.
    pub async fn complete_json(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, GenerateError> {
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": 1,
            "max_completion_tokens": 64,
            "top_p": 1,
            "stream": false,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::new(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| GenerateError::new(format!("invalid response: {}", e)))?;

        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerateError::new("no completion returned"))
    }
}

fn wire_messages(system: &str, messages: &[ContextMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(json!({ "role": "system", "content": system }));
    for m in messages {
        out.push(json!({ "role": m.role.as_str(), "content": m.content }));
    }
    out
}

/// Extracts the content delta from one streaming payload, if any.
pub fn content_delta(payload: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(payload).ok()?;
    parsed["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The OpenAI-style end-of-stream sentinel.
pub fn is_done(payload: &str) -> bool {
    payload.trim() == "[DONE]"
}

async fn api_error(response: reqwest::Response) -> GenerateError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
        let message = parsed["error"]["message"].as_str();
        let code = parsed["error"]["code"].as_str();
        if let Some(message) = message {
            return match code {
                Some(code) => GenerateError::with_code(code, message),
                None => GenerateError::new(message),
            };
        }
    }

    GenerateError::new(format!("API error {}: {}", status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extraction() {
        let payload = r#"{"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(content_delta(payload).unwrap(), "hel");

        let finished = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(content_delta(finished), None);

        assert!(is_done("[DONE]"));
        assert!(!is_done(payload));
    }
}
