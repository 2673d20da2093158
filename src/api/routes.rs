use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    api::dto::*,
    api::rate_limiter::{rate_limit_middleware, RateLimiter},
    auth::AuthedUser,
    config::Config,
    orchestrator::{ChatError, ChatOrchestrator, PreparedGeneration},
    storage::repository::RepositoryError,
    stream::ChannelSink,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub orchestrator: Arc<ChatOrchestrator>,
}

pub async fn send_message(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let prepared = state
        .orchestrator
        .prepare_send(&user, req.chat_id, &req.message, &req.model, req.think)
        .await
        .map_err(error_response)?;

    Ok(streaming_response(state, prepared))
}

pub async fn edit_message(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<EditMessageRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let prepared = state
        .orchestrator
        .prepare_edit(
            &user,
            req.chat_id,
            req.message_id,
            &req.message,
            req.model.as_deref(),
            req.think,
        )
        .await
        .map_err(error_response)?;

    Ok(streaming_response(state, prepared))
}

pub async fn regenerate_message(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(req): Json<RegenerateRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let prepared = state
        .orchestrator
        .prepare_regenerate(
            &user,
            req.chat_id,
            req.message_id,
            req.model.as_deref(),
            req.think,
        )
        .await
        .map_err(error_response)?;

    Ok(streaming_response(state, prepared))
}

/// Spawns the generation and returns a streaming plain-text response.
/// The durable ids ride as headers so the client can reconcile its
/// optimistic placeholders before the first byte of content.
fn streaming_response(state: AppState, prepared: PreparedGeneration) -> Response {
    let meta = prepared.meta;
    let (sink, rx) = ChannelSink::pair();

    let error_sink = sink.clone();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.stream(prepared, sink).await {
            tracing::error!("generation failed: {}", e);
            // Headers already went out; abort the body mid-stream so the
            // client sees a transport error rather than a silent truncation.
            error_sink.fail(&e.to_string());
        }
    });

    let body = Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    }));

    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(v) = HeaderValue::from_str(&meta.chat_id.to_string()) {
        response.headers_mut().insert("x-chat-id", v);
    }
    if let Some(user_message_id) = meta.user_message_id {
        if let Ok(v) = HeaderValue::from_str(&user_message_id.to_string()) {
            response.headers_mut().insert("x-user-message-id", v);
        }
    }
    if let Ok(v) = HeaderValue::from_str(&meta.assistant_message_id.to_string()) {
        response.headers_mut().insert("x-ai-message-id", v);
    }
    response
}

pub async fn get_chat(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let chat = state
        .orchestrator
        .open(&user, id)
        .await
        .map_err(error_response)?;
    Ok(Json(ChatResponse::from(chat)))
}

pub async fn list_chats(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<Json<ChatListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let chats = state
        .orchestrator
        .list(&user)
        .await
        .map_err(error_response)?;
    Ok(Json(ChatListResponse {
        chats: chats.into_iter().map(ChatSummaryDto::from).collect(),
    }))
}

pub async fn share_chat(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShareResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .orchestrator
        .share(&user, id)
        .await
        .map_err(error_response)?;

    let base = state.config.read().await.public_base_url.clone();
    Ok(Json(ShareResponse {
        url: format!("{}/chats/{}", base.trim_end_matches('/'), id),
    }))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .orchestrator
        .delete(&user, id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn error_response(e: ChatError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        ChatError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatError::NotFound => StatusCode::NOT_FOUND,
        ChatError::Forbidden => StatusCode::FORBIDDEN,
        ChatError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
        ChatError::Repository(RepositoryError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

pub fn create_router(state: AppState, limiter: RateLimiter) -> Router {
    let generation = Router::new()
        .route("/api/v1/chats/send", post(send_message))
        .route("/api/v1/chats/edit", post(edit_message))
        .route("/api/v1/chats/regenerate", post(regenerate_message))
        .layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

    Router::new()
        .merge(generation)
        .route("/api/v1/chats", get(list_chats))
        .route("/api/v1/chats/{id}", get(get_chat).delete(delete_chat))
        .route("/api/v1/chats/{id}/share", post(share_chat))
        .route("/health", get(health))
        .with_state(state)
}
