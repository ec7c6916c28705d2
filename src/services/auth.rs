use crate::crypto::password::{LoginCheck, check_login, hash_password, verify_password};
use crate::error::{AppError, Result};
use crate::models::user::{Role, User};
use crate::repositories::user as user_repo;
use deadpool_postgres::Pool;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Creates a new member account.
///
/// # Arguments
///
/// * `db` - The database connection pool.
/// * `name` - The user's name.
/// * `username` - The user's username.
/// * `password` - The user's password.
///
/// # Returns
///
/// A `Result` containing the created `User`.
pub async fn create_user(
    db: &Pool,
    name: &str,
    username: &str,
    password: Zeroizing<String>,
) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", username);
    let hashed_password = hash_password(&password)?;

    let user = user_repo::create_user(
        db,
        Uuid::new_v4(),
        name,
        username,
        &hashed_password,
        Role::Member,
    )
    .await?
    .ok_or_else(|| AppError::Conflict("Username is already taken".to_string()))?;

    tracing::info!("✅ User created with ID: {}", user.id);
    Ok(user)
}

/// Authenticates a user.
///
/// Accounts still holding a legacy digest are moved to the salted format
/// once the password has been confirmed.
///
/// # Arguments
///
/// * `db` - The database connection pool.
/// * `username` - The user's username.
/// * `password` - The user's password.
///
/// # Returns
///
/// A `Result` containing the authenticated `User`.
pub async fn authenticate_user(
    db: &Pool,
    username: &str,
    password: Zeroizing<String>,
) -> Result<User> {
    tracing::debug!("🔐 Authenticating user: {}", username);

    let invalid = || AppError::Authentication("Invalid username or password".to_string());

    let user = user_repo::find_by_username(db, username)
        .await?
        .ok_or_else(invalid)?;

    match check_login(&password, &user.password)? {
        LoginCheck::Rejected => return Err(invalid()),
        LoginCheck::Accepted => {}
        LoginCheck::Upgrade(upgraded) => {
            user_repo::update_password(db, &user.id, &upgraded).await?;
            tracing::info!("🔁 Legacy credential upgraded for user: {}", user.id);
        }
    }

    tracing::info!("✅ User authenticated: {}", user.id);

    Ok(user)
}

/// Changes a user's password.
///
/// # Arguments
///
/// * `db` - The database connection pool.
/// * `user_id` - The ID of the user.
/// * `old_password` - The user's old password.
/// * `new_password` - The user's new password.
///
/// # Returns
///
/// A `Result<()>`.
pub async fn change_password(
    db: &Pool,
    user_id: Uuid,
    old_password: Zeroizing<String>,
    new_password: Zeroizing<String>,
) -> Result<()> {
    tracing::info!("🔑 Changing password for user: {}", user_id);

    let user = user_repo::find_by_id(db, &user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !verify_password(&old_password, &user.password) {
        return Err(AppError::Authentication(
            "Invalid current password".to_string(),
        ));
    }

    let new_hashed_password = hash_password(&new_password)?;
    user_repo::update_password(db, &user_id, &new_hashed_password).await?;

    tracing::info!("✅ Password changed for user: {}", user_id);

    Ok(())
}
