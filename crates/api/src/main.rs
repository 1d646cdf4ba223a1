use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use finclass_api::app::{create_app, AppState};
use finclass_api::config::Config;
use finclass_api::jobs::{ExportReconciliationJob, JobScheduler, ScheduledExportJob};
use finclass_api::middleware::logging::init_logging;
use finclass_api::services::HttpWorkerClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting FinClass export API v{}", env!("CARGO_PKG_VERSION"));

    // Create database pool
    let pool = config.database.pool_config().connect().await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    let jwt = config.jwt.build()?;
    let worker = Arc::new(HttpWorkerClient::new(&config.worker));

    let jobs_config = config.jobs.clone();
    let export_config = config.export.clone();

    let state = AppState::new(config, pool.clone(), jwt, worker.clone());

    // Start background jobs
    let mut scheduler = JobScheduler::new();
    if jobs_config.reconcile_enabled {
        scheduler.register(ExportReconciliationJob::new(
            pool.clone(),
            worker.clone(),
            jobs_config.reconcile_interval_minutes,
        ));
    }
    if jobs_config.scheduled_export_enabled {
        scheduler.register(ScheduledExportJob::new(
            pool.clone(),
            state.orchestrator.clone(),
            export_config.destination_email.clone(),
            jobs_config.scheduled_export_interval_minutes,
        ));
    }
    scheduler.start();

    // Build application
    let addr = state.config.socket_addr();
    let app = create_app(state);

    // Start server
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down background jobs");
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
