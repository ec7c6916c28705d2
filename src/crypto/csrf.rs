use axum::http::Method;
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::crypto::password::constant_time_eq;
use crate::error::{AppError, Result};

/// The size of the CSRF token in bytes.
const CSRF_TOKEN_SIZE: usize = 32;

/// The cookie carrying the CSRF token.
pub const CSRF_COOKIE_NAME: &str = "csrf_token";
/// The header the client mirrors the cookie into.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Paths that skip CSRF verification unless overridden by configuration.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/logout",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
    "/api/health",
    "/api/init-db",
    "/api/upload/*",
];

/// Generates a new random CSRF token.
///
/// # Returns
///
/// A URL-safe base64-encoded CSRF token.
pub fn generate_csrf_token() -> Result<String> {
    let mut token = [0u8; CSRF_TOKEN_SIZE];
    OsRng
        .try_fill_bytes(&mut token)
        .map_err(|e| AppError::Internal(format!("Failed to generate CSRF token: {}", e)))?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(token))
}

/// Why a mutating request was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    #[error("CSRF token missing")]
    Missing,
    #[error("CSRF token invalid")]
    Invalid,
}

impl CsrfRejection {
    /// Machine-readable code for the client's retry logic.
    pub fn code(&self) -> &'static str {
        match self {
            CsrfRejection::Missing => "CSRF_TOKEN_MISSING",
            CsrfRejection::Invalid => "CSRF_TOKEN_INVALID",
        }
    }
}

/// Outcome of the double-submit check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfDecision {
    SafeMethod,
    UnprotectedPath,
    TokenMissing,
    TokenMismatch,
    TokenValid,
}

impl CsrfDecision {
    /// Converts the decision into pass/fail.
    pub fn into_result(self) -> std::result::Result<(), CsrfRejection> {
        match self {
            CsrfDecision::SafeMethod | CsrfDecision::UnprotectedPath | CsrfDecision::TokenValid => {
                Ok(())
            }
            CsrfDecision::TokenMissing => Err(CsrfRejection::Missing),
            CsrfDecision::TokenMismatch => Err(CsrfRejection::Invalid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    Prefix(String),
}

/// Allow-list of paths that bypass the CSRF check.
///
/// An entry ending in `*` matches every path starting with what precedes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfExemptions {
    patterns: Vec<PathPattern>,
}

impl CsrfExemptions {
    pub fn new<'a>(entries: impl IntoIterator<Item = &'a str>) -> Self {
        let patterns = entries
            .into_iter()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.strip_suffix('*') {
                Some(prefix) => PathPattern::Prefix(prefix.to_string()),
                None => PathPattern::Exact(entry.to_string()),
            })
            .collect();

        Self { patterns }
    }

    /// Parses a comma-separated list.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| match pattern {
            PathPattern::Exact(exact) => path == exact,
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        })
    }
}

/// Decides whether a request passes the double-submit check.
///
/// Tokens are compared as raw bytes; header values need not be ASCII.
pub fn evaluate(
    method: &Method,
    path: &str,
    cookie: Option<&[u8]>,
    header: Option<&[u8]>,
    exemptions: &CsrfExemptions,
) -> CsrfDecision {
    if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
        return CsrfDecision::SafeMethod;
    }

    if exemptions.is_exempt(path) {
        return CsrfDecision::UnprotectedPath;
    }

    let (cookie, header) = match (cookie, header) {
        (Some(c), Some(h)) if !c.is_empty() && !h.is_empty() => (c, h),
        _ => return CsrfDecision::TokenMissing,
    };

    if constant_time_eq(cookie, header) {
        CsrfDecision::TokenValid
    } else {
        CsrfDecision::TokenMismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> CsrfExemptions {
        CsrfExemptions::new(DEFAULT_EXEMPT_PATHS.iter().copied())
    }

    fn check(
        method: Method,
        path: &str,
        cookie: Option<&str>,
        header: Option<&str>,
        exemptions: &CsrfExemptions,
    ) -> CsrfDecision {
        evaluate(&method, path, cookie.map(str::as_bytes), header.map(str::as_bytes), exemptions)
    }

    #[test]
    fn generated_tokens_are_256_bit_and_unique() {
        let a = generate_csrf_token().unwrap();
        let b = generate_csrf_token().unwrap();
        assert_eq!(general_purpose::URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn matching_tokens_are_accepted() {
        let token = "abc123".repeat(11);
        let token = &token[..64];
        let decision = check(Method::POST, "/api/events", Some(token), Some(token), &defaults());
        assert_eq!(decision, CsrfDecision::TokenValid);
    }

    #[test]
    fn mismatched_tokens_are_rejected_as_invalid() {
        let decision = check(Method::POST, "/api/events", Some("A"), Some("B"), &defaults());
        assert_eq!(decision, CsrfDecision::TokenMismatch);
        assert_eq!(decision.into_result(), Err(CsrfRejection::Invalid));
        assert_eq!(CsrfRejection::Invalid.code(), "CSRF_TOKEN_INVALID");
    }

    #[test]
    fn cookie_without_header_is_missing() {
        let decision = check(Method::DELETE, "/api/events/3", Some("A"), None, &defaults());
        assert_eq!(decision.into_result(), Err(CsrfRejection::Missing));

        let decision = check(Method::PATCH, "/api/events/3", None, Some("A"), &defaults());
        assert_eq!(decision, CsrfDecision::TokenMissing);

        let decision = check(Method::PUT, "/api/events/3", Some(""), Some(""), &defaults());
        assert_eq!(decision, CsrfDecision::TokenMissing);
    }

    #[test]
    fn safe_methods_pass_without_tokens() {
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let decision = check(method, "/api/events", None, None, &defaults());
            assert_eq!(decision, CsrfDecision::SafeMethod);
        }
    }

    #[test]
    fn non_ascii_header_only_matters_on_protected_requests() {
        let header = "café".as_bytes();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let decision = evaluate(&method, "/api/events", None, Some(header), &defaults());
            assert_eq!(decision, CsrfDecision::SafeMethod);
        }

        let decision = evaluate(&Method::POST, "/api/auth/login", None, Some(header), &defaults());
        assert_eq!(decision, CsrfDecision::UnprotectedPath);

        let decision = evaluate(&Method::POST, "/api/events", None, Some(header), &defaults());
        assert_eq!(decision, CsrfDecision::TokenMissing);

        let decision = evaluate(&Method::POST, "/api/events", Some(b"cafe".as_slice()), Some(header), &defaults());
        assert_eq!(decision, CsrfDecision::TokenMismatch);

        let decision = evaluate(&Method::POST, "/api/events", Some(header), Some(header), &defaults());
        assert_eq!(decision, CsrfDecision::TokenValid);
    }

    #[test]
    fn exempt_paths_support_exact_and_prefix() {
        let exemptions = defaults();
        assert!(exemptions.is_exempt("/api/auth/login"));
        assert!(!exemptions.is_exempt("/api/auth/login/extra"));
        assert!(exemptions.is_exempt("/api/upload/materials"));
        assert!(!exemptions.is_exempt("/api/auth/change-password"));

        let decision = check(Method::POST, "/api/auth/login", None, None, &exemptions);
        assert_eq!(decision, CsrfDecision::UnprotectedPath);
    }

    #[test]
    fn exemptions_parse_from_comma_list() {
        let exemptions = CsrfExemptions::parse(" /api/health , /api/hooks/* ,,");
        assert!(exemptions.is_exempt("/api/health"));
        assert!(exemptions.is_exempt("/api/hooks/github"));
        assert!(!exemptions.is_exempt("/api/auth/login"));
    }
}
