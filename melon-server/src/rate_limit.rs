use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::api::ApiError;

/// Fixed-window request limiter keyed by session token.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    max_requests: u32,
    window_duration: Duration,
}

struct Window {
    count: u32,
    started: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window_duration: Duration::from_secs(window_seconds),
        }
    }

    /// Count one request against the token's current window.
    pub fn check_rate_limit(&self, token: &str) -> Result<(), String> {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();

        // Keep the map bounded; stale windows are reaped once it grows
        if windows.len() > 10_000 {
            windows.retain(|_, w| now.duration_since(w.started) < self.window_duration * 2);
        }

        let window = windows.entry(token.to_string()).or_insert_with(|| Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.window_duration {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.max_requests {
            let retry_after = self.window_duration - now.duration_since(window.started);
            return Err(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after.as_secs()
            ));
        }

        window.count += 1;
        Ok(())
    }
}

/// Middleware applying per-session rate limiting. Unauthenticated
/// requests pass through untouched.
pub async fn rate_limit_middleware(
    axum::Extension(limiter): axum::Extension<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok());

    if let Some(token) = token {
        if let Err(msg) = limiter.check_rate_limit(token) {
            return Ok(ApiError::TooManyRequests(msg).into_response());
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new(3, 60);
        assert!(limiter.check_rate_limit("token-a").is_ok());
        assert!(limiter.check_rate_limit("token-a").is_ok());
        assert!(limiter.check_rate_limit("token-a").is_ok());
        assert!(limiter.check_rate_limit("token-a").is_err());
    }

    #[test]
    fn test_tokens_are_limited_independently() {
        let limiter = RateLimiter::new(1, 60);
        assert!(limiter.check_rate_limit("token-a").is_ok());
        assert!(limiter.check_rate_limit("token-b").is_ok());
        assert!(limiter.check_rate_limit("token-a").is_err());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, 0);
        assert!(limiter.check_rate_limit("token-a").is_ok());
        // A zero-second window has always elapsed, so the next request
        // starts a fresh one
        assert!(limiter.check_rate_limit("token-a").is_ok());
    }
}
