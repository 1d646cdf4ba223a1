use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use persistence::repositories::{ExportRecordRepository, UserRepository};
use shared::jwt::JwtConfig;

use crate::config::Config;
use crate::routes::{consent, exports, health, settings};
use crate::services::{ExportOrchestrator, ExportSettings, WorkerApi};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub worker: Arc<dyn WorkerApi>,
    pub orchestrator: Arc<ExportOrchestrator>,
}

impl AppState {
    /// Wires the repository-backed orchestrator from its parts.
    pub fn new(
        config: Config,
        pool: PgPool,
        jwt: JwtConfig,
        worker: Arc<dyn WorkerApi>,
    ) -> Self {
        let config = Arc::new(config);

        let candidates = Arc::new(UserRepository::new(pool.clone()));
        let ledger = Arc::new(ExportRecordRepository::new(pool.clone()));
        let orchestrator = Arc::new(ExportOrchestrator::new(
            candidates,
            ledger,
            worker.clone(),
            ExportSettings::from_config(&config.export),
        ));

        Self {
            pool,
            config,
            jwt: Arc::new(jwt),
            worker,
            orchestrator,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    // Build CORS layer based on configuration
    let cors = if state.config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Production: only allow specified origins
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = state
            .config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Authenticated routes; token checks live in the extractors
    let api_routes = Router::new()
        .route("/api/v1/exports/manual", post(exports::trigger_manual_export))
        .route(
            "/api/v1/admin/exports/scheduled",
            post(exports::trigger_scheduled_export),
        )
        .route("/api/v1/admin/exports/status", get(exports::export_status))
        .route(
            "/api/v1/admin/settings/notification-email",
            put(settings::update_notification_email),
        )
        .route(
            "/api/v1/users/me/export-consent",
            put(consent::update_export_consent),
        );

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live));

    let request_timeout = state.config.server.request_timeout_secs;

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
