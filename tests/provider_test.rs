use chatflow::config::Config;
use chatflow::models::internal::{ChatRole, ContextMessage};
use chatflow::providers::{
    GenerateError, GenerateRequest, LiveProviderAdapter, ModelId, ProviderAdapter, TokenEvent,
    TokenStream,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> Config {
    Config {
        server_port: 8080,
        database_url: "sqlite::memory:".to_string(),
        gemini_api_key: "gemini-key".to_string(),
        groq_api_key: "groq-key".to_string(),
        gemini_base_url: base_url.to_string(),
        groq_base_url: base_url.to_string(),
        naming_model: "llama3-70b-8192".to_string(),
        public_base_url: "http://localhost:8080".to_string(),
        max_connections: 10,
        log_level: "info".to_string(),
        rate_limit_requests: None,
        rate_limit_window_secs: None,
    }
}

async fn collect(mut stream: TokenStream) -> Vec<Result<TokenEvent, GenerateError>> {
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
        out.push(item);
    }
    out
}

fn request(model: ModelId, think: bool, message: &str) -> GenerateRequest {
    GenerateRequest {
        model,
        think,
        messages: vec![ContextMessage {
            role: ChatRole::User,
            content: message.to_string(),
        }],
    }
}

#[tokio::test]
async fn groq_stream_is_normalized_and_think_markers_split() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"<think>plan</th\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ink>answer\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer groq-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "deepseek-r1-distill-llama-70b",
            "stream": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = LiveProviderAdapter::new(&test_config(&server.uri()));
    let events = collect(adapter.generate(request(ModelId::DeepseekR1, true, "2+2?"))).await;

    let events: Vec<TokenEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(
        events,
        vec![
            TokenEvent::Thought("plan".to_string()),
            TokenEvent::Content("answer".to_string()),
        ]
    );
}

#[tokio::test]
async fn groq_quota_error_is_classified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {
                "message": "Limit reached: 6000 tokens per minute",
                "code": "rate_limit_exceeded",
            }
        })))
        .mount(&server)
        .await;

    let adapter = LiveProviderAdapter::new(&test_config(&server.uri()));
    let events = collect(adapter.generate(request(ModelId::GptOss120b, false, "hi"))).await;

    assert_eq!(events.len(), 1);
    let err = events.into_iter().next().unwrap().unwrap_err();
    assert!(err.is_quota_exhausted());
    assert_eq!(err.code.as_deref(), Some("rate_limit_exceeded"));
}

#[tokio::test]
async fn gemini_stream_concatenates_text_parts() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Once\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" upon\"},{\"text\":\" a time\"}]}}]}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
        .and(header("x-goog-api-key", "gemini-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = LiveProviderAdapter::new(&test_config(&server.uri()));
    let events = collect(adapter.generate(request(ModelId::GeminiPro25, false, "story"))).await;

    let events: Vec<TokenEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(
        events,
        vec![
            TokenEvent::Content("Once".to_string()),
            TokenEvent::Content(" upon a time".to_string()),
        ]
    );
}

#[tokio::test]
async fn gemini_error_body_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-pro:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "message": "Invalid request", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let adapter = LiveProviderAdapter::new(&test_config(&server.uri()));
    let events = collect(adapter.generate(request(ModelId::GeminiPro25, true, "hi"))).await;

    assert_eq!(events.len(), 1);
    let err = events.into_iter().next().unwrap().unwrap_err();
    assert_eq!(err.message, "Invalid request");
    assert!(!err.is_quota_exhausted());
}
