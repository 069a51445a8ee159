//! Audit trail handlers
//!
//! Read-only reporting over the audit store. Exports are themselves audited.

use axum::{
    extract::{Path, State},
    Json,
};
use audit_core::{ActionType, EntityId, Finding};
use audit_service::dto::{
    ApiResponse, AuditEventQuery, AuditEventResponse, PaginatedResponse, WindowQuery,
};
use audit_service::services::{
    AnomalyEngine, ArtifactDescriptor, AuditQueryService, AuditRecorder, Statistics, Target,
    FINDINGS_WINDOW_DAYS,
};
use audit_service::PipelineStats;
use chrono::Utc;
use serde_json::json;

use crate::extractors::{Caller, EventIdPath, ValidatedQuery};
use crate::response::{ApiResult, CsvAttachment};
use crate::state::AppState;

/// Default statistics window
pub const STATISTICS_WINDOW_DAYS: u32 = 30;

/// Entity type recorded for exports of the audit trail
const AUDIT_TRAIL_ENTITY: &str = "audit_event";

/// List audit events
///
/// GET /api/v1/audit/events
pub async fn list_events(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<AuditEventQuery>,
) -> ApiResult<Json<PaginatedResponse<AuditEventResponse>>> {
    let filter = query.to_filter()?;
    let page = AuditQueryService::new(state.service_context())
        .list(&filter, query.page())
        .await?;
    Ok(Json(PaginatedResponse::from(page)))
}

/// Get a single audit event
///
/// GET /api/v1/audit/events/:event_id
pub async fn get_event(
    State(state): State<AppState>,
    Path(path): Path<EventIdPath>,
) -> ApiResult<Json<ApiResponse<AuditEventResponse>>> {
    let event_id = path.event_id()?;
    let event = AuditQueryService::new(state.service_context())
        .get(event_id)
        .await?;
    Ok(Json(ApiResponse::new(AuditEventResponse::from(event))))
}

/// Aggregate counts over a window
///
/// GET /api/v1/audit/statistics
pub async fn statistics(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<WindowQuery>,
) -> ApiResult<Json<ApiResponse<Statistics>>> {
    let window = query.to_window(STATISTICS_WINDOW_DAYS)?;
    let stats = AnomalyEngine::new(state.service_context())
        .statistics(window, query.top())
        .await?;
    Ok(Json(ApiResponse::new(stats)))
}

/// Suspicious activity findings, most severe first
///
/// GET /api/v1/audit/findings
pub async fn findings(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<WindowQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Finding>>>> {
    let window = query.to_window(FINDINGS_WINDOW_DAYS)?;
    let findings = AnomalyEngine::new(state.service_context())
        .findings(window)
        .await?;
    Ok(Json(ApiResponse::new(findings)))
}

/// Download matching events as CSV
///
/// GET /api/v1/audit/export.csv
///
/// The download is recorded as an EXPORT of the audit trail itself.
pub async fn export_csv(
    State(state): State<AppState>,
    Caller(caller): Caller,
    ValidatedQuery(query): ValidatedQuery<AuditEventQuery>,
) -> ApiResult<CsvAttachment> {
    let ctx = state.service_context();
    let filter = query.to_filter()?;

    let mut body = Vec::new();
    let rows = AuditQueryService::new(ctx)
        .export_csv(&filter, &mut body)
        .await?;

    let filename = format!("audit-events-{}.csv", Utc::now().format("%Y%m%dT%H%M%SZ"));
    let artifact = ArtifactDescriptor::new(filename.clone(), body.len() as u64, "csv");
    let outcome = AuditRecorder::new(ctx)
        .record(
            &caller,
            ActionType::Export,
            Target::new(AUDIT_TRAIL_ENTITY, EntityId::default()),
            None,
            json!({ "artifact": artifact, "rows": rows }),
        )
        .await;
    if !outcome.is_queued() {
        tracing::warn!(outcome = ?outcome, "Export audit event not queued");
    }

    Ok(CsvAttachment { filename, body })
}

/// Pipeline counters
///
/// GET /api/v1/audit/pipeline
pub async fn pipeline_stats(State(state): State<AppState>) -> Json<ApiResponse<PipelineStats>> {
    Json(ApiResponse::new(state.service_context().pipeline().stats()))
}
