use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::user::PublicUser,
    services::session as session_service,
    state::AppState,
};

/// The cookie carrying the session token.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// The raw session token of the current request, for logout.
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);

/// Extracts the session token from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the session token if found.
fn extract_session_token(cookies: &Cookies) -> Option<String> {
    cookies
        .get(SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
}

/// A middleware that requires a valid session to be present.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The inner `Response`, or 401 when the session does not resolve.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_session_token(&cookies);

    let user = match session_service::resolve(&state.sessions, token.as_deref()).await {
        Ok(Some(user)) => user,
        Ok(None) => return AppError::Unauthenticated.into_response(),
        Err(e) => return e.into_response(),
    };

    tracing::debug!("✅ User authenticated: {}", user.id);

    if let Some(token) = token {
        request.extensions_mut().insert(SessionToken(token));
    }
    request.extensions_mut().insert(user);

    next.run(request).await
}

/// A middleware that admits only organizers. Must run inside `require_auth`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<PublicUser>()
        .is_some_and(PublicUser::is_admin);

    if !is_admin {
        return AppError::Forbidden.into_response();
    }

    next.run(request).await
}
