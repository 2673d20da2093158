//! Rate limiting middleware for the generation endpoints

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Fixed-window rate limiter keyed per caller.
///
/// Generation requests are expensive upstream, so the window is short
/// and the budget small (the default is 4 requests per 5 seconds).
#[derive(Clone)]
pub struct RateLimiter {
    /// Maximum requests per window
    max_requests: u32,
    /// Window length
    window: Duration,
    /// Request tracking: caller -> (count, window_start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check if a request is allowed for the given caller
    pub async fn check_rate_limit(&self, caller: &str) -> bool {
        let mut requests = self.requests.write().await;
        let now = Instant::now();

        match requests.get_mut(caller) {
            Some((count, start)) => {
                // Check if window has expired
                if now.duration_since(*start) > self.window {
                    // Reset window
                    *count = 1;
                    *start = now;
                    true
                } else if *count < self.max_requests {
                    // Increment counter
                    *count += 1;
                    true
                } else {
                    // Rate limit exceeded
                    false
                }
            }
            None => {
                // First request from this caller
                requests.insert(caller.to_string(), (1, now));
                true
            }
        }
    }

    /// Clean up expired entries (call periodically)
    pub async fn cleanup_expired(&self) {
        let mut requests = self.requests.write().await;
        let now = Instant::now();
        let window = self.window;

        requests.retain(|_, (_, start)| now.duration_since(*start) <= window);
    }
}

/// Rate limiting middleware. Keys on the bearer token (the user id);
/// unauthenticated requests share one bucket and get rejected by the
/// auth extractor anyway.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let caller = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("anonymous")
        .to_string();

    if limiter.check_rate_limit(&caller).await {
        next.run(request).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_allows_requests() {
        let limiter = RateLimiter::new(10, 5);

        // First 10 requests should succeed
        for _ in 0..10 {
            assert!(limiter.check_rate_limit("user-a").await);
        }
    }

    #[tokio::test]
    async fn test_rate_limiter_blocks_excess() {
        let limiter = RateLimiter::new(2, 5);

        // First 2 requests succeed
        assert!(limiter.check_rate_limit("user-a").await);
        assert!(limiter.check_rate_limit("user-a").await);

        // Third request should fail
        assert!(!limiter.check_rate_limit("user-a").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_per_caller() {
        let limiter = RateLimiter::new(2, 5);

        // One caller uses its quota
        assert!(limiter.check_rate_limit("user-a").await);
        assert!(limiter.check_rate_limit("user-a").await);
        assert!(!limiter.check_rate_limit("user-a").await);

        // Another caller still has quota
        assert!(limiter.check_rate_limit("user-b").await);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let limiter = RateLimiter::new(100, 5);

        // Make request
        assert!(limiter.check_rate_limit("user-a").await);
        assert_eq!(limiter.requests.read().await.len(), 1);

        // Cleanup should not remove recent entries
        limiter.cleanup_expired().await;
        assert_eq!(limiter.requests.read().await.len(), 1);
    }
}
