use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::config::Config;
use crate::crypto::attendance::AttendanceTokenCodec;
use crate::crypto::csrf::CsrfExemptions;
use crate::error::Result;
use crate::repositories::session::PgSessionStore;

/// Settings shared by the CSRF verification and issuance layers.
#[derive(Clone)]
pub struct CsrfSettings {
    /// Paths that skip verification.
    pub exemptions: Arc<CsrfExemptions>,
    /// Whether the token cookie is marked `Secure`.
    pub secure_cookie: bool,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// Session lookups and writes.
    pub sessions: PgSessionStore,
    /// Attendance token signer.
    pub attendance_codec: AttendanceTokenCodec,
    /// CSRF layer settings.
    pub csrf: CsrfSettings,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let attendance_codec = AttendanceTokenCodec::new(&config.attendance_secret)?;
        tracing::info!("✅ Attendance token codec initialized");

        let csrf = CsrfSettings {
            exemptions: Arc::new(config.csrf_exemptions.clone()),
            secure_cookie: config.is_production,
        };

        Ok(AppState {
            sessions: PgSessionStore::new(db.clone()),
            db,
            redis,
            config: config.clone(),
            attendance_codec,
            csrf,
        })
    }
}
