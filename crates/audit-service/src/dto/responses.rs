//! Response DTOs for API endpoints
//!
//! All response DTOs implement `Serialize` for JSON output.
//! Ids are serialized as strings for JavaScript compatibility.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// Common Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Paginated response with offset pagination
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, offset: u64, limit: u32, total: u64) -> Self {
        let has_more = offset + (data.len() as u64) < total;
        Self {
            data,
            pagination: PaginationMeta {
                offset,
                limit,
                total,
                has_more,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub offset: u64,
    /// Page size limit used
    pub limit: u32,
    /// Matching events across all pages
    pub total: u64,
    /// Whether more results exist
    pub has_more: bool,
}

// ============================================================================
// Audit Event Responses
// ============================================================================

/// Audit event response
#[derive(Debug, Clone, Serialize)]
pub struct AuditEventResponse {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<String>,
    pub action_type: String,
    pub target_entity_type: String,
    pub target_record_id: String,
    pub subject_id: Option<String>,
    pub source_ip: String,
    pub client_descriptor: String,
    pub changes: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ============================================================================
// Health Responses
// ============================================================================

/// Basic health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
}

/// Health check status for each dependency
#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub store: String,
    pub pipeline: String,
}

impl ReadinessResponse {
    pub fn ready(store_healthy: bool, pipeline_open: bool) -> Self {
        let all_healthy = store_healthy && pipeline_open;
        Self {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            timestamp: Utc::now(),
            checks: HealthChecks {
                store: if store_healthy { "healthy" } else { "unhealthy" }.to_string(),
                pipeline: if pipeline_open { "healthy" } else { "closed" }.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginated_response() {
        let response = PaginatedResponse::new(vec![1, 2, 3], 0, 3, 10);
        assert!(response.pagination.has_more);
        assert_eq!(response.pagination.limit, 3);
        assert_eq!(response.pagination.total, 10);

        let last = PaginatedResponse::new(vec![1], 9, 3, 10);
        assert!(!last.pagination.has_more);
    }

    #[test]
    fn test_health_response() {
        let health = HealthResponse::healthy();
        assert_eq!(health.status, "healthy");
    }

    #[test]
    fn test_readiness_response() {
        let ready = ReadinessResponse::ready(true, true);
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.checks.store, "healthy");
        assert!(ready.is_ready());

        let not_ready = ReadinessResponse::ready(true, false);
        assert_eq!(not_ready.status, "not_ready");
        assert_eq!(not_ready.checks.pipeline, "closed");
    }
}
