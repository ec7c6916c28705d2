use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::attendance::DEFAULT_VALIDITY_MINUTES;
use crate::crypto::csrf::{CsrfExemptions, DEFAULT_EXEMPT_PATHS};
use crate::validation::attendance::validate_validity_minutes;

/// The minimum accepted length of the attendance token secret, in bytes.
const MIN_ATTENDANCE_SECRET_LEN: usize = 32;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The duration of a session in days.
    pub session_duration_days: i64,
    /// The key used to sign attendance check-in tokens.
    pub attendance_secret: Zeroizing<Vec<u8>>,
    /// How long a freshly issued attendance token stays valid.
    pub attendance_validity_minutes: i64,
    /// Paths that skip CSRF verification.
    pub csrf_exemptions: CsrfExemptions,
    /// Origins allowed by the CORS layer.
    pub cors_origins: Vec<String>,
    /// Whether the server runs in production mode.
    pub is_production: bool,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut secret = env::var("ATTENDANCE_TOKEN_SECRET")
            .context("ATTENDANCE_TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let attendance_secret = Zeroizing::new(secret.as_bytes().to_vec());
        secret.zeroize();

        if attendance_secret.len() < MIN_ATTENDANCE_SECRET_LEN {
            anyhow::bail!(
                "ATTENDANCE_TOKEN_SECRET must be at least {} bytes",
                MIN_ATTENDANCE_SECRET_LEN
            );
        }

        let csrf_exemptions = match env::var("CSRF_EXEMPT_PATHS") {
            Ok(list) => CsrfExemptions::parse(&list),
            Err(_) => CsrfExemptions::new(DEFAULT_EXEMPT_PATHS.iter().copied()),
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let attendance_validity_minutes: i64 = env::var("ATTENDANCE_TOKEN_VALIDITY_MINUTES")
            .unwrap_or_else(|_| DEFAULT_VALIDITY_MINUTES.to_string())
            .parse()
            .context("Invalid ATTENDANCE_TOKEN_VALIDITY_MINUTES")?;

        validate_validity_minutes(attendance_validity_minutes)
            .context("Invalid ATTENDANCE_TOKEN_VALIDITY_MINUTES")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
            attendance_secret,
            attendance_validity_minutes,
            csrf_exemptions,
            cors_origins,
            is_production: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string()) == "production",
        })
    }
}
