use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The authenticated caller, extracted from the bearer token.
///
/// Token verification is delegated to the fronting identity proxy; by
/// the time a request reaches this service the token is an opaque,
/// already-verified user id. Every chat is scoped to it.
pub struct AuthedUser(pub String);

impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get auth header
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                let body = Json(json!({
                    "error": "Missing authorization header"
                }));
                (StatusCode::UNAUTHORIZED, body).into_response()
            })?;

        // Extract Bearer token
        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            let body = Json(json!({
                "error": "Invalid authorization format"
            }));
            (StatusCode::BAD_REQUEST, body).into_response()
        })?;

        if token.is_empty() {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Empty bearer token" })),
            )
                .into_response());
        }

        Ok(AuthedUser(token.to_string()))
    }
}
