use axum::{Json, extract::State};
use serde::Serialize;
use tower_cookies::Cookies;

use crate::{
    crypto::csrf::{CSRF_COOKIE_NAME, generate_csrf_token},
    error::Result,
    middleware_layer::csrf::csrf_cookie,
    state::AppState,
};

#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Returns the caller's CSRF token, minting one when the cookie is absent.
///
/// Repeated calls return the same value until the cookie expires.
pub async fn csrf_token(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<CsrfTokenResponse>> {
    if let Some(existing) = cookies.get(CSRF_COOKIE_NAME) {
        let token = existing.value().to_string();
        if !token.is_empty() {
            return Ok(Json(CsrfTokenResponse { csrf_token: token }));
        }
    }

    let token = generate_csrf_token()?;
    cookies.add(csrf_cookie(token.clone(), state.csrf.secure_cookie));
    tracing::debug!("🔐 CSRF token minted on request");

    Ok(Json(CsrfTokenResponse { csrf_token: token }))
}
