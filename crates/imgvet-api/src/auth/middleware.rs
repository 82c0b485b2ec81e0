use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use imgvet_core::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AuthFailureLimiter {
    inner: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_failures: u32,
    window: Duration,
}

impl AuthFailureLimiter {
    pub fn new(max_failures: u32, window_seconds: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_failures,
            window: Duration::from_secs(window_seconds),
        }
    }

    pub async fn record_failure(&self, ip: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let (count, reset_at) = guard.entry(ip.to_string()).or_insert((0, now + self.window));
        if now >= *reset_at {
            *count = 0;
            *reset_at = now + self.window;
        }
        *count += 1;
        *count >= self.max_failures
    }

    pub async fn is_blocked(&self, ip: &str) -> bool {
        let mut guard = self.inner.lock().await;
        if let Some((count, reset_at)) = guard.get(ip) {
            if Instant::now() >= *reset_at {
                guard.remove(ip);
                return false;
            }
            return *count >= self.max_failures;
        }
        false
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub master_api_key: String,
    pub auth_failure_limiter: Option<Arc<AuthFailureLimiter>>,
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<std::net::SocketAddr>()
                .map(|addr| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    if let Some(ref limiter) = auth_state.auth_failure_limiter {
        if limiter.is_blocked(&ip).await {
            return (StatusCode::TOO_MANY_REQUESTS, "Too many failed auth attempts")
                .into_response();
        }
    }

    let auth_header = match request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h,
        None => {
            if let Some(ref limiter) = auth_state.auth_failure_limiter {
                if limiter.record_failure(&ip).await {
                    return (StatusCode::TOO_MANY_REQUESTS, "Too many failed auth attempts")
                        .into_response();
                }
            }
            return HttpAppError(AppError::Unauthorized(
                "Missing authorization header".to_string(),
            ))
            .into_response();
        }
    };

    if !auth_header.starts_with("Bearer ") {
        if let Some(ref limiter) = auth_state.auth_failure_limiter {
            if limiter.record_failure(&ip).await {
                return (StatusCode::TOO_MANY_REQUESTS, "Too many failed auth attempts")
                    .into_response();
            }
        }
        return HttpAppError(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ))
        .into_response();
    }

    let token = &auth_header[7..];
    if secure_compare(token, &auth_state.master_api_key) {
        return next.run(request).await;
    }

    if let Some(ref limiter) = auth_state.auth_failure_limiter {
        if limiter.record_failure(&ip).await {
            return (StatusCode::TOO_MANY_REQUESTS, "Too many failed auth attempts")
                .into_response();
        }
    }
    HttpAppError(AppError::Unauthorized("Invalid API key".to_string())).into_response()
}
