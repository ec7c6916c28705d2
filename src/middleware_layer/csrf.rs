use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::cookie::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::crypto::csrf::{
    CSRF_COOKIE_NAME, CSRF_HEADER_NAME, CsrfDecision, evaluate, generate_csrf_token,
};
use crate::error::AppError;
use crate::state::CsrfSettings;

/// Lifetime of the CSRF cookie in hours.
const CSRF_COOKIE_HOURS: i64 = 24;

/// Builds the CSRF cookie.
///
/// Not HttpOnly: client script mirrors the value into `X-CSRF-Token`.
pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(CSRF_COOKIE_NAME, token);
    cookie.set_http_only(false);
    cookie.set_secure(secure);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(Duration::hours(CSRF_COOKIE_HOURS));
    cookie.set_path("/");
    cookie
}

/// A middleware that verifies the double-submit CSRF token.
///
/// # Arguments
///
/// * `settings` - The CSRF settings.
/// * `cookies` - The request cookies.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The inner `Response`, or a 403 carrying `CSRF_TOKEN_MISSING` or
/// `CSRF_TOKEN_INVALID`.
pub async fn verify_csrf(
    State(settings): State<CsrfSettings>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    let cookie_token = cookies.get(CSRF_COOKIE_NAME).map(|c| c.value().to_string());

    let header_token = req
        .headers()
        .get(CSRF_HEADER_NAME)
        .map(|value| value.as_bytes());

    let decision = evaluate(
        req.method(),
        req.uri().path(),
        cookie_token.as_deref().map(str::as_bytes),
        header_token,
        &settings.exemptions,
    );

    match decision {
        CsrfDecision::SafeMethod | CsrfDecision::UnprotectedPath => {
            tracing::debug!("✅ CSRF exemption: {} {}", req.method(), req.uri().path());
        }
        CsrfDecision::TokenValid => {
            tracing::debug!("✅ CSRF token valid");
        }
        CsrfDecision::TokenMissing | CsrfDecision::TokenMismatch => {
            tracing::warn!("❌ CSRF: {:?} on {} {}", decision, req.method(), req.uri().path());
        }
    }

    match decision.into_result() {
        Ok(()) => next.run(req).await,
        Err(rejection) => AppError::Csrf(rejection).into_response(),
    }
}

/// A middleware that hands out a CSRF cookie to clients that lack one.
///
/// Runs after the handler, so a token minted by the handler itself
/// (login, registration, the token endpoint) is left untouched. A cookie
/// the handler removed, as logout does, is replaced with a fresh one.
pub async fn ensure_csrf_cookie(
    State(settings): State<CsrfSettings>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    let response = next.run(req).await;

    if cookies.get(CSRF_COOKIE_NAME).is_none() {
        match generate_csrf_token() {
            Ok(token) => {
                cookies.add(csrf_cookie(token, settings.secure_cookie));
                tracing::debug!("🔐 CSRF cookie issued");
            }
            Err(e) => return e.into_response(),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::csrf::{CsrfExemptions, DEFAULT_EXEMPT_PATHS};
    use axum::{
        Router,
        http::{Method, StatusCode, header},
        middleware::from_fn_with_state,
        routing::{get, post},
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use axum::http::HeaderValue;
    use tower_cookies::CookieManagerLayer;

    const TOKEN: &str = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";

    fn app() -> Router {
        let settings = CsrfSettings {
            exemptions: Arc::new(CsrfExemptions::new(DEFAULT_EXEMPT_PATHS.iter().copied())),
            secure_cookie: false,
        };

        Router::new()
            .route("/api/events", get(|| async { "list" }).post(|| async { "created" }))
            .route("/api/auth/login", post(|| async { "logged in" }))
            .route(
                "/api/auth/logout",
                post(|cookies: Cookies| async move {
                    cookies.remove(Cookie::from(CSRF_COOKIE_NAME));
                    "logged out"
                }),
            )
            .layer(from_fn_with_state(settings.clone(), verify_csrf))
            .layer(from_fn_with_state(settings, ensure_csrf_cookie))
            .layer(CookieManagerLayer::new())
    }

    fn request(method: Method, uri: &str, cookie: Option<&str>, csrf_header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", CSRF_COOKIE_NAME, cookie));
        }
        if let Some(value) = csrf_header {
            builder = builder.header("X-CSRF-Token", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn matching_cookie_and_header_pass() {
        let response = app()
            .oneshot(request(Method::POST, "/api/events", Some(TOKEN), Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "created");
    }

    #[tokio::test]
    async fn mismatch_is_rejected_with_invalid_code() {
        let response = app()
            .oneshot(request(Method::POST, "/api/events", Some("A"), Some("B")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("CSRF_TOKEN_INVALID"));
    }

    #[tokio::test]
    async fn cookie_without_header_is_rejected_with_missing_code() {
        let response = app()
            .oneshot(request(Method::POST, "/api/events", Some(TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("CSRF_TOKEN_MISSING"));
    }

    #[tokio::test]
    async fn get_without_tokens_passes_and_receives_cookie() {
        let response = app()
            .oneshot(request(Method::GET, "/api/events", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("csrf_token="));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Path=/"));
        assert!(!set_cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn existing_cookie_is_not_replaced() {
        let response = app()
            .oneshot(request(Method::GET, "/api/events", Some(TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn exempt_path_passes_without_tokens() {
        let response = app()
            .oneshot(request(Method::POST, "/api/auth/login", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejected_request_still_gets_a_cookie_to_retry_with() {
        let response = app()
            .oneshot(request(Method::POST, "/api/events", None, Some(TOKEN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
    }

    fn with_raw_header(mut request: Request<Body>, raw: &'static [u8]) -> Request<Body> {
        request
            .headers_mut()
            .insert("x-csrf-token", HeaderValue::from_bytes(raw).unwrap());
        request
    }

    #[tokio::test]
    async fn non_ascii_header_does_not_block_safe_or_exempt_requests() {
        let raw = b"caf\xc3\xa9";

        let response = app()
            .oneshot(with_raw_header(request(Method::GET, "/api/events", None, None), raw))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app()
            .oneshot(with_raw_header(request(Method::POST, "/api/auth/login", None, None), raw))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_ascii_header_on_protected_post_follows_missing_then_invalid() {
        let raw = b"caf\xc3\xa9";

        let response = app()
            .oneshot(with_raw_header(request(Method::POST, "/api/events", None, None), raw))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("CSRF_TOKEN_MISSING"));

        let response = app()
            .oneshot(with_raw_header(request(Method::POST, "/api/events", Some(TOKEN), None), raw))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("CSRF_TOKEN_INVALID"));
    }

    #[tokio::test]
    async fn removed_cookie_is_rotated_not_cleared() {
        let response = app()
            .oneshot(request(Method::POST, "/api/auth/logout", Some(TOKEN), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        let value = set_cookie
            .strip_prefix("csrf_token=")
            .and_then(|rest| rest.split(';').next())
            .unwrap();
        assert!(!value.is_empty());
        assert_ne!(value, TOKEN);
    }
}
