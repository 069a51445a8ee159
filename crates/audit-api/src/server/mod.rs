//! Server setup and initialization
//!
//! Provides the application builder, dependency wiring, and the server runner.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use audit_common::{AppConfig, AppError};
use audit_core::AuditStore;
use audit_db::{create_pool, run_migrations, MemoryAuditStore, PgAuditStore};
use audit_service::services::{CleanupRequest, RetentionScheduler};
use audit_service::{AuditPipeline, FallbackSink, FileSpool, PipelineConfig, ServiceContextBuilder};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::middleware::{apply_middleware, apply_middleware_with_config};
use crate::routes::{create_router, health_routes};
use crate::state::AppState;

/// Build the complete Axum application with all routes and middleware
///
/// Health probes get the base stack only so they are never rate limited.
pub fn create_app(state: AppState) -> Result<Router, AppError> {
    let config = state.config();
    let api = apply_middleware_with_config(
        create_router(),
        &config.rate_limit,
        &config.cors,
        config.app.env.is_production(),
    )?;
    let health = apply_middleware(health_routes());
    Ok(api.merge(health).with_state(state))
}

/// Open the audit store selected by configuration
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn AuditStore>, AppError> {
    let Some(database) = &config.database else {
        warn!("DATABASE_URL not set; audit events are kept in memory only");
        return Ok(Arc::new(MemoryAuditStore::new()));
    };

    info!("Connecting to PostgreSQL...");
    let db_config = audit_db::DatabaseConfig::from(database);
    let pool = create_pool(&db_config)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    run_migrations(&pool, &db_config.migrations_dir)
        .await
        .map_err(|e| AppError::Database(format!("migration failed: {e}")))?;
    info!("PostgreSQL connection established");

    Ok(Arc::new(PgAuditStore::new(pool)))
}

/// Wire the pipeline and services around an already opened store
///
/// Must be called from within a Tokio runtime.
pub fn build_app_state(config: AppConfig, store: Arc<dyn AuditStore>) -> Result<AppState, AppError> {
    let fallback = config.pipeline.spool_path.as_ref().map(|path| {
        info!(path = %path.display(), "Audit spool enabled");
        Arc::new(FileSpool::new(path.clone())) as Arc<dyn FallbackSink>
    });

    let pipeline = AuditPipeline::start(
        PipelineConfig::from(&config.pipeline),
        Arc::clone(&store),
        fallback,
    );

    let service_context = ServiceContextBuilder::new()
        .store(store)
        .pipeline(pipeline)
        .anomaly(config.anomaly.clone())
        .retention(config.retention.clone())
        .build()?;

    Ok(AppState::new(service_context, config))
}

/// Initialize all dependencies and create AppState
pub async fn create_app_state(config: AppConfig) -> Result<AppState, AppError> {
    let store = open_store(&config).await?;
    build_app_state(config, store)
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Run the HTTP server until `shutdown` resolves
pub async fn run_server<F>(app: Router, addr: SocketAddr, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| AppError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Run the complete server with configuration
///
/// On shutdown the retention scheduler is stopped and the pipeline drained.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .api
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid listen address: {e}")))?;

    // Create app state
    let state = create_app_state(config).await?;
    let ctx = state.service_context().clone();

    let retention = &state.config().retention;
    let scheduler = (retention.interval_secs > 0).then(|| {
        RetentionScheduler::spawn(
            ctx.clone(),
            Duration::from_secs(retention.interval_secs),
            CleanupRequest::from(retention),
        )
    });

    // Build application
    let app = create_app(state)?;

    // Run server
    let served = run_server(app, addr, shutdown_signal()).await;

    if let Some(scheduler) = scheduler {
        scheduler.stop();
    }
    let report = ctx.pipeline().shutdown().await;
    info!(
        drained = report.drained,
        abandoned = report.abandoned,
        persisted = report.stats.persisted,
        spooled = report.stats.spooled,
        "Audit pipeline stopped"
    );

    served
}
