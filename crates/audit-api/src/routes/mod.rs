//! Route definitions
//!
//! Reporting routes are mounted under /api/v1; health probes sit at the root.

use axum::{routing::get, Router};

use crate::handlers::{audit, health};
use crate::state::AppState;

/// Create the main API router (excluding health for separate middleware handling)
pub fn create_router() -> Router<AppState> {
    Router::new()
        // API v1 endpoints
        .nest("/api/v1", api_v1_routes())
}

/// Health check routes (exported separately to bypass rate limiting)
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
}

/// API v1 routes
fn api_v1_routes() -> Router<AppState> {
    Router::new().merge(audit_routes())
}

/// Audit trail routes
fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/audit/events", get(audit::list_events))
        .route("/audit/events/:event_id", get(audit::get_event))
        .route("/audit/statistics", get(audit::statistics))
        .route("/audit/findings", get(audit::findings))
        .route("/audit/export.csv", get(audit::export_csv))
        .route("/audit/pipeline", get(audit::pipeline_stats))
}
