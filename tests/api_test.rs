use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chatflow::api::rate_limiter::RateLimiter;
use chatflow::api::routes::{create_router, AppState};
use chatflow::config::Config;
use chatflow::orchestrator::{ChatNamer, ChatOrchestrator};
use chatflow::providers::{GenerateError, ScriptedAdapter, TokenEvent};
use chatflow::storage::db::init_db;
use chatflow::storage::repository::SeaOrmChatRepository;
use chatflow::stream::SmootherConfig;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tower::ServiceExt;

struct FixedNamer;

#[async_trait]
impl ChatNamer for FixedNamer {
    async fn generate_name(&self, _first_user_message: &str) -> Result<String, GenerateError> {
        Ok("Test Chat".to_string())
    }
}

fn test_config() -> Config {
    Config {
        server_port: 8080,
        database_url: "sqlite::memory:".to_string(),
        gemini_api_key: String::new(),
        groq_api_key: String::new(),
        gemini_base_url: "http://localhost:1".to_string(),
        groq_base_url: "http://localhost:1".to_string(),
        naming_model: "llama3-70b-8192".to_string(),
        public_base_url: "https://chat.example.com".to_string(),
        max_connections: 10,
        log_level: "info".to_string(),
        rate_limit_requests: None,
        rate_limit_window_secs: None,
    }
}

async fn test_app(
    scripts: Vec<Vec<Result<TokenEvent, GenerateError>>>,
    limiter: RateLimiter,
) -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let db = init_db(&url).await.unwrap();

    let orchestrator = Arc::new(ChatOrchestrator::new(
        Arc::new(SeaOrmChatRepository::new(db)),
        Arc::new(ScriptedAdapter::new(scripts)),
        Arc::new(FixedNamer),
        SmootherConfig::default(),
    ));

    let state = AppState {
        config: Arc::new(RwLock::new(test_config())),
        orchestrator,
    };
    (create_router(state, limiter), dir)
}

fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", user))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", user))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn content(text: &str) -> Vec<Result<TokenEvent, GenerateError>> {
    vec![Ok(TokenEvent::Content(text.to_string()))]
}

#[tokio::test]
async fn health_is_public() {
    let (app, _dir) = test_app(vec![], RateLimiter::new(100, 5)).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_bearer_token_is_unauthorized() {
    let (app, _dir) = test_app(vec![], RateLimiter::new(100, 5)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/chats/send")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "message": "hi", "model": "deepseek-r1" }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (app, _dir) = test_app(vec![], RateLimiter::new(100, 5)).await;

    let response = app
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "   ", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_chat_is_not_found() {
    let (app, _dir) = test_app(vec![], RateLimiter::new(100, 5)).await;

    let response = app
        .oneshot(get(
            "/api/v1/chats/00000000-0000-0000-0000-000000000000",
            "alice",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn send_streams_body_with_id_headers() {
    let (app, _dir) = test_app(vec![content("Hello!")], RateLimiter::new(100, 5)).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "hi", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let chat_id = response
        .headers()
        .get("x-chat-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(response.headers().contains_key("x-user-message-id"));
    assert!(response.headers().contains_key("x-ai-message-id"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"Hello!");

    // The finished turn is visible through the chat endpoint.
    let response = app
        .oneshot(get(&format!("/api/v1/chats/{}", chat_id), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let chat = body_json(response).await;
    assert_eq!(chat["name"], "Test Chat");
    assert_eq!(chat["messages"].as_array().unwrap().len(), 2);
    assert_eq!(chat["messages"][1]["content"], "Hello!");
}

#[tokio::test]
async fn generation_endpoints_are_rate_limited() {
    let (app, _dir) = test_app(
        vec![content("one"), content("two")],
        RateLimiter::new(1, 60),
    )
    .await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "hi", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "again", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Reads are not limited.
    let response = app.oneshot(get("/api/v1/chats", "alice")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn share_returns_a_public_url_and_forks_for_readers() {
    let (app, _dir) = test_app(vec![content("shared answer")], RateLimiter::new(100, 5)).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "hi", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    let chat_id = response
        .headers()
        .get("x-chat-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    // Drain the stream so the turn settles before the next request.
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    // Unshared chats are forbidden to other users.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/chats/{}", chat_id), "bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/chats/{}/share", chat_id),
            "alice",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let share = body_json(response).await;
    assert_eq!(
        share["url"],
        format!("https://chat.example.com/chats/{}", chat_id)
    );

    let response = app
        .oneshot(get(&format!("/api/v1/chats/{}", chat_id), "bob"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fork = body_json(response).await;
    assert_ne!(fork["id"], chat_id);
    assert_eq!(fork["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn delete_removes_the_chat() {
    let (app, _dir) = test_app(vec![content("bye")], RateLimiter::new(100, 5)).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chats/send",
            "alice",
            json!({ "message": "hi", "model": "deepseek-r1" }),
        ))
        .await
        .unwrap();
    let chat_id = response
        .headers()
        .get("x-chat-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/chats/{}", chat_id))
        .header("authorization", "Bearer alice")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get(&format!("/api/v1/chats/{}", chat_id), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
