use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tower_cookies::{Cookies, Cookie};
use tower_cookies::cookie::time::Duration;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    crypto::csrf::{CSRF_COOKIE_NAME, generate_csrf_token},
    error::{AppError, Result},
    middleware_layer::auth::{SESSION_COOKIE_NAME, SessionToken},
    middleware_layer::csrf::csrf_cookie,
    models::user::PublicUser,
    services::{auth as auth_service, session as session_service},
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

/// Creates the HttpOnly session cookie.
fn session_cookie(value: String, max_age_days: i64, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE_NAME, value);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::days(max_age_days));
    cookie.set_path("/");
    cookie
}

/// Creates a removal cookie for `name`.
fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookie
}

/// Starts a session for `user` and sets the session and CSRF cookies.
async fn sign_in(state: &AppState, cookies: &Cookies, user: &PublicUser) -> Result<()> {
    let session = session_service::start_session(
        &state.sessions,
        user.id,
        state.config.session_duration_days,
    )
    .await?;

    cookies.add(session_cookie(
        session.id,
        state.config.session_duration_days,
        state.config.is_production,
    ));

    cookies.add(csrf_cookie(generate_csrf_token()?, state.config.is_production));
    tracing::debug!("✅ Session and CSRF cookies set for user: {}", user.id);

    Ok(())
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt for username: {}", payload.username);
    validate_name(&payload.name)?;
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    let user = auth_service::create_user(
        &state.db,
        payload.name.trim(),
        &payload.username,
        Zeroizing::new(payload.password),
    )
    .await?
    .to_public();

    sign_in(&state, &cookies, &user).await?;

    tracing::info!("✅ User registered: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "Registration successful. Welcome!".to_string(),
        user: Some(user),
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt for username: {}", payload.username);

    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let user = auth_service::authenticate_user(
        &state.db,
        &payload.username,
        Zeroizing::new(payload.password),
    )
    .await?
    .to_public();

    sign_in(&state, &cookies, &user).await?;

    tracing::info!("✅ User logged in: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: Some(user),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<PublicUser>,
    Extension(SessionToken(token)): Extension<SessionToken>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", user.id);

    session_service::end_session(&state.sessions, &token).await?;

    cookies.remove(expired_cookie(SESSION_COOKIE_NAME));
    cookies.remove(expired_cookie(CSRF_COOKIE_NAME));

    tracing::info!("✅ User logged out: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
        user: None,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the signed-in user.
pub async fn me(Extension(user): Extension<PublicUser>) -> Json<PublicUser> {
    Json(user)
}

/// Handles changing a user's password.
#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<PublicUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
    tracing::info!("🔑 Change password for user: {}", user.id);

    validate_password(&payload.new_password)?;

    auth_service::change_password(
        &state.db,
        user.id,
        Zeroizing::new(payload.old_password),
        Zeroizing::new(payload.new_password),
    )
    .await?;

    let response = AuthResponse {
        success: true,
        message: "Password changed successfully".to_string(),
        user: None,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}
