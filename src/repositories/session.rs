//! Session persistence.

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        session::Session,
        user::{PublicUser, Role},
    },
};

/// Persistence boundary for login sessions.
#[trait_variant::make(SessionStore: Send)]
pub trait LocalSessionStore {
    /// Stores a freshly created session.
    async fn insert(&self, session: &Session) -> Result<()>;

    /// Finds the active owner of `session_id`, if the session exists and
    /// has not expired at `now`.
    async fn find_active_user(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublicUser>>;

    /// Removes a session.
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// `SessionStore` backed by the `sessions` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: Pool,
}

impl PgSessionStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO sessions (id, user_id, created_at, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
                &[&session.id, &session.user_id, &session.created_at, &session.expires_at],
            )
            .await?;
        Ok(())
    }

    async fn find_active_user(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PublicUser>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT u.id, u.name, u.username, u.role
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.id = $1 AND s.expires_at > $2 AND u.is_active = true
                "#,
                &[&session_id, &now],
            )
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?;
        let role: String = row.try_get("role").map_err(|_| AppError::MissingData("role".to_string()))?;

        Ok(Some(PublicUser {
            id,
            name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
            username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
            role: Role::from_db(&role),
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute("DELETE FROM sessions WHERE id = $1", &[&session_id])
            .await?;
        Ok(())
    }
}
