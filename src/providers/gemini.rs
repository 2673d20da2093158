//! Client for the Gemini streaming generation API.

use serde_json::{json, Value};

use crate::models::internal::{ChatRole, ContextMessage};

use super::sse::SseReader;
use super::GenerateError;

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    pub async fn stream_generate(
        &self,
        model: &str,
        system: &str,
        messages: &[ContextMessage],
    ) -> Result<SseReader, GenerateError> {
        let body = json!({
            "contents": wire_contents(messages),
            "systemInstruction": { "parts": [{ "text": system }] },
        });

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::new(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
                if let Some(message) = parsed["error"]["message"].as_str() {
                    let code = parsed["error"]["status"].as_str();
                    return Err(match code {
                        Some(code) => GenerateError::with_code(code, message),
                        None => GenerateError::new(message),
                    });
                }
            }
            return Err(GenerateError::new(format!("API error {}: {}", status, body)));
        }

        Ok(SseReader::from_response(response))
    }
}

// Gemini uses "model" instead of "assistant" for its own turns.
fn wire_contents(messages: &[ContextMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect()
}

/// Concatenated text parts of one streaming payload, if any.
pub fn text_parts(payload: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(payload).ok()?;
    let parts = parsed["candidates"][0]["content"]["parts"].as_array()?;
    let mut out = String::new();
    for part in parts {
        if let Some(text) = part["text"].as_str() {
            out.push_str(text);
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
