//! Session creation, resolution and removal.

use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::models::user::PublicUser;
use crate::repositories::session::SessionStore;

/// The size of a session token in bytes.
const SESSION_TOKEN_SIZE: usize = 32;

/// Generates an opaque 256-bit session token as lowercase hex.
pub fn generate_session_token() -> Result<String> {
    let mut token = [0u8; SESSION_TOKEN_SIZE];
    OsRng
        .try_fill_bytes(&mut token)
        .map_err(|e| AppError::Internal(format!("Failed to generate session token: {}", e)))?;
    Ok(hex::encode(token))
}

/// Resolves the session token from a cookie to its owner.
///
/// A missing token short-circuits without touching the store. Unknown,
/// expired or deleted sessions resolve to `None`.
pub async fn resolve<S: SessionStore>(
    store: &S,
    session_id: Option<&str>,
) -> Result<Option<PublicUser>> {
    let Some(session_id) = session_id.filter(|id| !id.is_empty()) else {
        return Ok(None);
    };

    let user = store.find_active_user(session_id, Utc::now()).await?;

    match &user {
        Some(user) => tracing::debug!("✅ Session resolved for user: {}", user.id),
        None => tracing::debug!("Session not found or expired"),
    }

    Ok(user)
}

/// Creates and stores a session for `user_id`.
pub async fn start_session<S: SessionStore>(
    store: &S,
    user_id: Uuid,
    duration_days: i64,
) -> Result<Session> {
    let now = Utc::now();
    let session = Session {
        id: generate_session_token()?,
        user_id,
        created_at: now,
        expires_at: now + Duration::days(duration_days),
    };

    store.insert(&session).await?;
    tracing::info!("✅ Session created for user: {}", user_id);

    Ok(session)
}

/// Removes a session; unknown ids are ignored.
pub async fn end_session<S: SessionStore>(store: &S, session_id: &str) -> Result<()> {
    store.delete(session_id).await
}
