use axum::{
    Router,
    routing::{get, post},
    middleware::{from_fn, from_fn_with_state},
    extract::DefaultBodyLimit,
};

use anyhow::Context;
use http::{HeaderValue, Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::{AllowOrigin, CorsLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;
mod db;
mod crypto {
    pub mod attendance;
    pub mod csrf;
    pub mod password;
}

mod models {
    pub mod attendance;
    pub mod session;
    pub mod user;
}

mod repositories {
    pub mod attendance;
    pub mod session;
    pub mod user;
}

mod services {
    pub mod attendance;
    pub mod auth;
    pub mod session;
}

mod handlers {
    pub mod attendance;
    pub mod auth;
    pub mod csrf;
    pub mod system;
}

mod middleware_layer {
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

mod validation {
    pub mod attendance;
    pub mod auth;
}

use config::Config;
use state::AppState;

/// Largest accepted request body (JSON payloads only).
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    if let Err(e) = db::init_schema(&state.db).await {
        tracing::error!("❌ Failed to ensure database schema: {}", e);
        return Err(e.into());
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("CORS_ORIGINS contains an invalid origin")?;

    let csrf_header: http::HeaderName = crypto::csrf::CSRF_HEADER_NAME.parse()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            csrf_header.clone(),
        ])
        .allow_credentials(true)
        .expose_headers([csrf_header])
        .max_age(Duration::from_secs(86400));

    let protected_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(60)
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let public_routes = Router::new()
        .route("/api/health", get(handlers::system::health))
        .route("/api/init-db", post(handlers::system::init_db))
        .route("/api/csrf-token", get(handlers::csrf::csrf_token))
        .with_state(state.clone());

    let register_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_register,
        ))
        .with_state(state.clone());

    let login_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_login,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/api/events", post(handlers::attendance::create_event))
        .route(
            "/api/events/{event_id}/qr",
            get(handlers::attendance::event_qr),
        )
        .route(
            "/api/events/{event_id}/attendance",
            get(handlers::attendance::list_attendance),
        )
        .route_layer(from_fn(middleware_layer::auth::require_admin));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/api/attendance/check-in",
            post(handlers::attendance::check_in),
        )
        .merge(admin_routes)
        .layer(tower_governor::GovernorLayer::new(
            protected_governor_conf.clone(),
        ))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(register_routes)
        .merge(login_routes)
        .merge(protected_routes)
        .layer(from_fn_with_state(
            state.csrf.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .layer(from_fn_with_state(
            state.csrf.clone(),
            middleware_layer::csrf::ensure_csrf_cookie,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors);

    let addr: SocketAddr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
