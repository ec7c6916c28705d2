use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A login session persisted in PostgreSQL.
///
/// `id` is the opaque token stored in the `session_id` cookie.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}
