//! # stickerctl: accounts, sessions and credits for a sticker generation product
//!
//! `stickerctl` is the control service behind a sticker SaaS. It registers users, issues session
//! tokens, keeps every user's credit balance, runs the top-up approval workflow and charges for
//! generations made through an external image provider.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer.
//! Persistence sits behind the [`db::handlers::Store`] trait with two implementations: an
//! in-memory store (the default, useful for development and tests) and PostgreSQL (selected by
//! `database.type: external` or `DATABASE_URL`).
//!
//! ### Request Flow
//!
//! A request to `/api/v1/*` is authenticated by the
//! [`CurrentUser`](api::models::users::CurrentUser) extractor, which verifies the session token
//! (cookie or bearer) and re-reads the user from the store. The handler then calls one of two
//! services:
//!
//! - [`auth::accounts::Accounts`] for registration, login and profile changes
//! - [`ledger::Ledger`] for balances, history, top-ups and billable actions
//!
//! Every balance change is one atomic store operation (a conditional debit or a request
//! resolution), so concurrent requests can never drive a balance negative or apply a top-up twice.
//!
//! ### Core Components
//!
//! - [`api`]: handlers and JSON models
//! - [`auth`]: passwords, session tokens, the current-user extractor and role checks
//! - [`db`]: the store trait, its implementations and store models
//! - [`ledger`]: the credit ledger service
//! - [`generation`]: the image provider trait and its HTTP adapter
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use stickerctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = stickerctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     stickerctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod ledger;
mod metrics;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::handlers,
    auth::accounts::Accounts,
    config::{CorsOrigin, DatabaseConfig},
    db::handlers::{InMemoryStore, PostgresStore, Store},
    generation::{GenerationProvider, HttpGenerationProvider},
    openapi::ApiDoc,
};
use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{delete, get, patch, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{CreditEntryId, CreditRequestId, GenerationId, UserId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .store(Arc::new(InMemoryStore::new()))
///     .config(config)
///     .generator(Arc::new(provider))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub generator: Arc<dyn GenerationProvider>,
}

/// Get the stickerctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the configured administrator if it doesn't exist, or refresh its password and role.
///
/// Does nothing unless both `admin_email` and `admin_password` are set.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(store: &dyn Store, config: &Config) -> anyhow::Result<Option<UserId>> {
    let (Some(email), Some(password)) = (config.admin_email.as_deref(), config.admin_password.as_deref()) else {
        debug!("No initial administrator configured");
        return Ok(None);
    };

    let id = Accounts::new(store, config)
        .ensure_admin(email, password)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;
    Ok(Some(id))
}

/// Open the configured store, running migrations for PostgreSQL.
async fn setup_store(config: &Config) -> anyhow::Result<(Arc<dyn Store>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::Memory => {
            info!("Using in-memory store; data will be lost on shutdown");
            Ok((Arc::new(InMemoryStore::new()), None))
        }
        DatabaseConfig::External { url, pool } => {
            info!("Using external database");
            let pg = PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(pool.acquire_timeout)
                .connect(url)
                .await?;
            migrator().run(&pg).await?;
            Ok((Arc::new(PostgresStore::new(pg.clone())), Some(pg)))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash Url adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(cors_config.allow_credentials)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH, http::Method::DELETE])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

async fn render_metrics() -> Result<String, errors::Error> {
    Ok(metrics::render()?)
}

/// Build the application router with all endpoints and middleware.
///
/// - Authentication routes at `/authentication/*`
/// - The JSON API at `/api/v1/*`
/// - OpenAPI JSON at `/api-docs/openapi.json` and Scalar docs at `/docs`
/// - `/healthz`, plus `/metrics` when metrics are enabled
/// - CORS and tracing layers
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/register", post(handlers::auth::register))
        .route("/authentication/login", post(handlers::auth::login))
        .route("/authentication/logout", post(handlers::auth::logout))
        .route("/authentication/password-change", post(handlers::auth::change_password));

    let api_routes = Router::new()
        // Users
        .route("/users", get(handlers::users::list_users))
        .route(
            "/users/current",
            get(handlers::users::get_current_user).patch(handlers::users::update_current_user),
        )
        .route("/users/{user_id}", patch(handlers::users::update_user_role))
        // Credits
        .route("/users/current/credits/history", get(handlers::credits::list_credit_history))
        .route(
            "/users/current/credits/requests",
            get(handlers::credits::list_own_credit_requests).post(handlers::credits::create_credit_request),
        )
        .route("/credits/requests", get(handlers::credits::list_pending_credit_requests))
        .route(
            "/users/{user_id}/credits/requests/{request_id}/approve",
            post(handlers::credits::approve_credit_request),
        )
        .route(
            "/users/{user_id}/credits/requests/{request_id}/reject",
            post(handlers::credits::reject_credit_request),
        )
        // Generations
        .route("/generations", post(handlers::generations::create_generation))
        .route("/users/current/generations", get(handlers::generations::list_generations))
        .route(
            "/users/current/generations/{generation_id}",
            delete(handlers::generations::trash_generation),
        )
        // Admin
        .route("/admin/stats", get(handlers::admin::get_stats));

    let enable_metrics = state.config.enable_metrics;
    let cors = create_cors_layer(&state.config)?;

    let mut router = Router::new()
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state);

    if enable_metrics {
        router = router.route("/metrics", get(render_metrics));
    }

    let router = router.layer(cors).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and manages the application lifecycle.
///
/// 1. **Create**: [`Application::new`] opens the store, runs migrations and creates the
///    initial administrator
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, closes the database pool and flushes
///    telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting stickerctl with configuration: {:#?}", config);

        let (store, pool) = setup_store(&config).await?;
        create_initial_admin_user(store.as_ref(), &config).await?;

        let generator = HttpGenerationProvider::new(config.generation.clone())?;
        if config.generation.api_token.is_none() {
            info!("No generation API token configured; generation requests will fail");
        }

        let state = AppState::builder()
            .store(store)
            .config(config.clone())
            .generator(Arc::new(generator))
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "stickerctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{AppState, build_router, create_initial_admin_user};
    use crate::{
        api::models::users::Role,
        config::{CorsOrigin, DatabaseConfig},
        db::handlers::{InMemoryStore, Store},
        test_utils::*,
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_initial_admin_user_new_user() {
        let store = InMemoryStore::new();
        let mut config = create_test_config();
        config.admin_email = Some("Admin@Example.com".to_string());
        config.admin_password = Some("adminpw1".to_string());

        let id = create_initial_admin_user(&store, &config).await.unwrap().unwrap();

        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.email, "admin@example.com");
        assert_eq!(user.role, Role::Administrator);
    }

    #[tokio::test]
    async fn test_create_initial_admin_user_existing_user() {
        let store = InMemoryStore::new();
        let mut config = create_test_config();
        config.admin_email = Some("admin@example.com".to_string());
        config.admin_password = Some("adminpw1".to_string());

        let first = create_initial_admin_user(&store, &config).await.unwrap();
        config.admin_password = Some("adminpw2".to_string());
        let second = create_initial_admin_user(&store, &config).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_users(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_admin_without_credentials() {
        let store = InMemoryStore::new();
        let mut config = create_test_config();
        config.admin_email = Some("admin@example.com".to_string());
        config.admin_password = None;

        assert!(create_initial_admin_user(&store, &config).await.unwrap().is_none());
        assert!(store.list_users(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_application_integration() {
        let mut config = create_test_config();
        config.database = DatabaseConfig::Memory;
        config.admin_email = Some("admin@example.com".to_string());
        config.admin_password = Some("adminpw1".to_string());

        let app = crate::Application::new(config).await;
        assert!(app.is_ok(), "Application::new should succeed");
        let server = app.unwrap().into_test_server();

        let health_response = server.get("/healthz").await;
        assert_eq!(health_response.status_code().as_u16(), 200);
        assert_eq!(health_response.text(), "OK");

        // API routes require a session
        let api_response = server.get("/api/v1/users").await;
        assert_eq!(api_response.status_code().as_u16(), 401);

        // The configured administrator can log in
        let login = server
            .post("/authentication/login")
            .json(&serde_json::json!({ "email": "admin@example.com", "password": "adminpw1" }))
            .await;
        assert_eq!(login.status_code().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_openapi_json_endpoint() {
        let server = create_test_server(create_test_state(create_test_config()));

        let response = server.get("/api-docs/openapi.json").await;
        assert_eq!(response.status_code().as_u16(), 200);
        let content = response.text();
        assert!(content.contains("\"openapi\""));
        assert!(content.contains("/api/v1/generations"));

        let docs = server.get("/docs").await;
        assert_eq!(docs.status_code().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_build_router_with_metrics_disabled() {
        let mut config = create_test_config();
        config.enable_metrics = false;

        let server = create_test_server(create_test_state(config));
        let metrics_response = server.get("/metrics").await;
        assert_eq!(metrics_response.status_code().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_build_router_with_metrics_enabled() {
        let mut config = create_test_config();
        config.enable_metrics = true;
        let state = create_test_state(config);
        let (_, token) = create_test_user(&state, "ann@x.com").await;
        let server = create_test_server(state);

        // Touch the ledger so the credit counters have samples
        server
            .post("/api/v1/users/current/credits/requests")
            .authorization_bearer(&token)
            .json(&serde_json::json!({ "amount": 100 }))
            .await;

        let metrics_response = server.get("/metrics").await;
        assert_eq!(metrics_response.status_code().as_u16(), 200);
        let metrics_content = metrics_response.text();
        assert!(metrics_content.contains("# HELP") || metrics_content.contains("# TYPE"));
    }

    #[tokio::test]
    async fn test_cors_preflight_for_configured_origin() {
        let mut config = create_test_config();
        config.auth.security.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        let state = AppState::builder()
            .store(Arc::new(InMemoryStore::new()))
            .config(config)
            .generator(Arc::new(StubGenerator::succeeding("x")))
            .build();
        let server = axum_test::TestServer::new(build_router(state).unwrap()).unwrap();

        let response = server
            .method(axum::http::Method::OPTIONS, "/api/v1/users/current")
            .add_header(
                axum::http::header::ORIGIN,
                axum::http::HeaderValue::from_static("https://app.example.com"),
            )
            .add_header(
                axum::http::header::ACCESS_CONTROL_REQUEST_METHOD,
                axum::http::HeaderValue::from_static("GET"),
            )
            .await;

        assert_eq!(
            response.header("access-control-allow-origin"),
            "https://app.example.com"
        );
    }
}
