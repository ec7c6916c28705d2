use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sonic_rs::JsonValueTrait;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Registrations allowed per client IP within the window.
const REGISTER_MAX_ATTEMPTS: i32 = 2;
/// Failed logins allowed per username within the window.
const LOGIN_MAX_FAILURES: i32 = 5;
/// Counter lifetime in seconds (12 hours).
const WINDOW_SECS: i64 = 43200;
/// Largest login body we are willing to buffer.
const MAX_LOGIN_BODY_BYTES: usize = 16 * 1024;

/// Extracts the real IP address from the request extensions.
///
/// # Arguments
///
/// * `req` - The incoming request.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn attempts(state: &AppState, key: &str) -> Option<i32> {
    redis::cmd("GET")
        .arg(key)
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(None)
}

async fn minutes_left(state: &AppState, key: &str) -> i32 {
    let ttl: Option<i32> = redis::cmd("TTL")
        .arg(key)
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(None);
    ttl.unwrap_or(0).max(0) / 60
}

async fn bump(state: &AppState, key: &str) {
    let _: () = redis::pipe()
        .cmd("INCR")
        .arg(key)
        .ignore()
        .cmd("EXPIRE")
        .arg(key)
        .arg(WINDOW_SECS)
        .ignore()
        .query_async(&mut state.redis.clone())
        .await
        .unwrap_or(());
}

/// A middleware that rate limits user registration.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an error `AppError`.
pub async fn rate_limit_register(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:register:{}", ip);

    if attempts(&state, &key).await.is_some_and(|n| n >= REGISTER_MAX_ATTEMPTS) {
        return AppError::RateLimitExceeded(format!(
            "Registration limit exceeded. Try again in {} minutes",
            minutes_left(&state, &key).await
        ))
        .into_response();
    }

    bump(&state, &key).await;

    next.run(req).await
}

/// A middleware that rate limits failed login attempts per username.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an error `AppError`.
pub async fn rate_limit_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    fn extract_username_from_body(body_bytes: &[u8]) -> Option<String> {
        let json = sonic_rs::from_slice::<sonic_rs::Value>(body_bytes).ok()?;
        json.get("username")
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase())
    }

    let (parts, body) = req.into_parts();
    let body_bytes = match axum::body::to_bytes(body, MAX_LOGIN_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let username = extract_username_from_body(&body_bytes)
        .unwrap_or_else(|| "unknown".to_string());

    let key = format!("rate_limit:login:{}", username);

    if attempts(&state, &key).await.is_some_and(|n| n >= LOGIN_MAX_FAILURES) {
        return AppError::RateLimitExceeded(format!(
            "Too many failed login attempts. Try again in {} minutes",
            minutes_left(&state, &key).await
        ))
        .into_response();
    }

    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;

    if response.status().is_client_error() {
        bump(&state, &key).await;
    } else if response.status().is_success() {
        let _: () = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut state.redis.clone())
            .await
            .unwrap_or(());
    }

    response
}
