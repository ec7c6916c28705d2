use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::user::{Role, User},
};

const USER_COLUMNS: &str = "id, name, username, password, role";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.try_get("role").map_err(|_| AppError::MissingData("role".to_string()))?;

    Ok(User {
        id: row.try_get("id").map_err(|_| AppError::MissingData("id".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        username: row.try_get("username").map_err(|_| AppError::MissingData("username".to_string()))?,
        password: row.try_get("password").map_err(|_| AppError::MissingData("password".to_string()))?,
        role: Role::from_db(&role),
    })
}

/// Creates a new user in the database.
///
/// Returns `None` when the username is already taken.
pub async fn create_user(
    pool: &Pool,
    id: Uuid,
    name: &str,
    username: &str,
    password_hash: &str,
    role: Role,
) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            format!(
                r#"
                INSERT INTO users (id, name, username, password, role)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (username) DO NOTHING
                RETURNING {USER_COLUMNS}
                "#
            )
            .as_str(),
            &[&id, &name, &username, &password_hash, &role.as_str()],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds an active user by their username.
pub async fn find_by_username(pool: &Pool, username: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            format!(
                r#"
                SELECT {USER_COLUMNS}
                FROM users
                WHERE username = $1 AND is_active = true
                "#
            )
            .as_str(),
            &[&username],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds a user by their ID.
pub async fn find_by_id(pool: &Pool, user_id: &Uuid) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            format!(
                r#"
                SELECT {USER_COLUMNS}
                FROM users
                WHERE id = $1
                "#
            )
            .as_str(),
            &[user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Replaces a user's stored credential.
pub async fn update_password(pool: &Pool, user_id: &Uuid, password_hash: &str) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            r#"
            UPDATE users
            SET
                password = $1,
                updated_at = NOW(),
                last_password_change = NOW()
            WHERE id = $2
            "#,
            &[&password_hash, user_id],
        )
        .await?;
    Ok(())
}
