//! API Integration Tests
//!
//! Each test spins up an in-process server over the memory store; no
//! external services are needed.
//!
//! Run with: cargo test -p integration-tests --test api_tests

use audit_core::{ActionType, EntityId};
use audit_service::services::CSV_HEADER;
use chrono::{Duration, Utc};
use integration_tests::{assert_json, assert_status, fixtures::*, test_config, TestServer};
use reqwest::StatusCode;

// ============================================================================
// Health Check Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health").await.expect("Request failed");
    assert_status(response, StatusCode::OK).await.unwrap();
}

#[tokio::test]
async fn test_health_ready() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/health/ready").await.expect("Request failed");
    let body: ReadinessBody = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body.status, "ready");
    assert_eq!(body.checks.store, "healthy");
    assert_eq!(body.checks.pipeline, "healthy");
}

#[tokio::test]
async fn test_not_ready_after_pipeline_shutdown() {
    let server = TestServer::start().await.expect("Failed to start server");
    server.state.service_context().pipeline().shutdown().await;

    let response = server.get("/health/ready").await.unwrap();
    let body: ReadinessBody = assert_json(response, StatusCode::SERVICE_UNAVAILABLE)
        .await
        .unwrap();
    assert_eq!(body.status, "not_ready");
    assert_eq!(body.checks.pipeline, "closed");
}

#[tokio::test]
async fn test_request_id_propagated() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .client
        .get(format!("{}/api/v1/audit/pipeline", server.base_url()))
        .header("x-request-id", "req-123")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let generated = server.get("/api/v1/audit/pipeline").await.unwrap();
    assert!(generated.headers().contains_key("x-request-id"));
}

// ============================================================================
// Event Query Tests
// ============================================================================

#[tokio::test]
async fn test_list_events_newest_first_with_pagination() {
    let server = TestServer::start().await.expect("Failed to start server");
    let base = Utc::now() - Duration::hours(2);
    for i in 0..5 {
        server.seed(chart_read(7, 100 + i, base + Duration::minutes(i))).await;
    }

    let response = server.get("/api/v1/audit/events?limit=2").await.unwrap();
    let page: EventPage = assert_json(response, StatusCode::OK).await.unwrap();

    assert_eq!(page.data.len(), 2);
    assert_eq!(page.pagination.total, 5);
    assert_eq!(page.pagination.limit, 2);
    assert!(page.pagination.has_more);
    assert_eq!(page.data[0].target_record_id, "104");
    assert!(page.data[0].timestamp > page.data[1].timestamp);

    let response = server
        .get("/api/v1/audit/events?limit=2&offset=4&order=asc")
        .await
        .unwrap();
    let last: EventPage = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(last.data.len(), 1);
    assert_eq!(last.data[0].target_record_id, "104");
    assert!(!last.pagination.has_more);
}

#[tokio::test]
async fn test_list_events_filters() {
    let server = TestServer::start().await.expect("Failed to start server");
    let at = Utc::now() - Duration::minutes(30);
    server.seed(chart_read(7, 100, at)).await;
    server.seed(chart_read(8, 101, at)).await;
    server.seed(appointment_update(7, 42, 100, at)).await;

    let response = server
        .get("/api/v1/audit/events?actor_id=7&action_type=update")
        .await
        .unwrap();
    let page: EventPage = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(page.pagination.total, 1);
    let event = &page.data[0];
    assert_eq!(event.action_type, "UPDATE");
    assert_eq!(event.target_entity_type, "appointment");
    assert_eq!(event.target_record_id, "42");
    assert_eq!(event.subject_id.as_deref(), Some("100"));
    assert_eq!(event.changes["after"]["status"], "confirmed");

    let response = server
        .get("/api/v1/audit/events?subject_id=100")
        .await
        .unwrap();
    let page: EventPage = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(page.pagination.total, 2);
}

#[tokio::test]
async fn test_list_events_rejects_bad_queries() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .get("/api/v1/audit/events?action_type=TELEPORT")
        .await
        .unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body.error.code, "UNKNOWN_ACTION_TYPE");

    let response = server.get("/api/v1/audit/events?limit=5000").await.unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body.error.code, "VALIDATION_ERROR");

    let response = server
        .get("/api/v1/audit/events?actor_id=seven")
        .await
        .unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body.error.code, "INVALID_QUERY_PARAMETER");
}

#[tokio::test]
async fn test_get_event() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = server
        .seed(appointment_update(3, 42, 9, Utc::now() - Duration::minutes(5)))
        .await;

    let response = server
        .get(&format!("/api/v1/audit/events/{id}"))
        .await
        .unwrap();
    let body: DataEnvelope<EventBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body.data.id, id.to_string());
    assert_eq!(body.data.actor_id.as_deref(), Some("3"));

    let response = server.get("/api/v1/audit/events/999999").await.unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(body.error.code, "NOT_FOUND");

    let response = server.get("/api/v1/audit/events/not-a-number").await.unwrap();
    assert_status(response, StatusCode::BAD_REQUEST).await.unwrap();
}

// ============================================================================
// Statistics and Findings Tests
// ============================================================================

#[tokio::test]
async fn test_statistics() {
    let server = TestServer::start().await.expect("Failed to start server");
    let at = business_hours_recently();
    for patient in [100, 100, 101] {
        server.seed(chart_read(7, patient, at)).await;
    }
    server.seed(chart_read(8, 100, at)).await;
    server.seed(appointment_update(7, 42, 100, at)).await;

    let response = server.get("/api/v1/audit/statistics?days=3&top=1").await.unwrap();
    let body: DataEnvelope<StatisticsBody> = assert_json(response, StatusCode::OK).await.unwrap();
    let stats = body.data;

    assert_eq!(stats.total, 5);
    assert_eq!(stats.by_action_type.get("READ"), Some(&4));
    assert_eq!(stats.by_action_type.get("UPDATE"), Some(&1));
    assert_eq!(stats.top_actors.len(), 1);
    assert_eq!(stats.top_actors[0].key, "7");
    assert_eq!(stats.top_actors[0].count, 4);
    assert_eq!(stats.top_subjects[0].key, "100");
    assert_eq!(stats.by_hour.len(), 24);
    assert_eq!(stats.by_hour[10], 5);
}

#[tokio::test]
async fn test_statistics_rejects_inverted_window() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server
        .get("/api/v1/audit/statistics?from=2024-02-01T00:00:00Z&to=2024-01-01T00:00:00Z")
        .await
        .unwrap();
    assert_status(response, StatusCode::BAD_REQUEST).await.unwrap();
}

#[tokio::test]
async fn test_findings_flag_failed_logins() {
    let server = TestServer::start().await.expect("Failed to start server");
    let base = Utc::now() - Duration::hours(3);
    for i in 0..12 {
        server
            .seed(failed_login("198.51.100.7", base + Duration::minutes(i)))
            .await;
    }
    for i in 0..5 {
        server
            .seed(failed_login("198.51.100.8", base + Duration::minutes(i)))
            .await;
    }
    server.seed(failed_login("198.51.100.9", base)).await;

    let response = server.get("/api/v1/audit/findings").await.unwrap();
    let body: DataEnvelope<Vec<FindingBody>> = assert_json(response, StatusCode::OK).await.unwrap();
    let findings = body.data;

    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].finding_type, "Multiple Failed Logins");
    assert_eq!(findings[0].severity, "HIGH");
    assert!(findings[0].description.contains("198.51.100.7"));
    assert_eq!(findings[1].severity, "MEDIUM");
    assert!(findings[1].description.contains("198.51.100.8"));
}

#[tokio::test]
async fn test_findings_empty_store() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server.get("/api/v1/audit/findings").await.unwrap();
    let body: DataEnvelope<Vec<FindingBody>> = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(body.data.is_empty());
}

// ============================================================================
// Export Tests
// ============================================================================

#[tokio::test]
async fn test_export_csv_is_audited() {
    let server = TestServer::start().await.expect("Failed to start server");
    let base = Utc::now() - Duration::hours(1);
    server.seed(chart_read(7, 100, base)).await;
    server
        .seed(appointment_update(7, 42, 100, base + Duration::minutes(1)))
        .await;
    server.seed(chart_read(8, 101, base)).await;

    let response = server
        .get_as("/api/v1/audit/export.csv?actor_id=7", 55)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .starts_with("attachment"));

    let body = response.text().await.unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(lines.len(), 3);
    // Oldest first
    assert!(lines[1].contains(",READ,patient,100,"));
    assert!(lines[2].contains(",UPDATE,appointment,42,"));

    server.settle().await;

    let exports: Vec<_> = server
        .store
        .snapshot()
        .into_iter()
        .filter(|e| e.action_type == ActionType::Export)
        .collect();
    assert_eq!(exports.len(), 1);
    let export = &exports[0];
    assert_eq!(export.actor_id, Some(EntityId::new(55)));
    assert_eq!(export.source_ip, "127.0.0.1");
    assert_eq!(export.client_descriptor, "integration-tests");
    assert_eq!(export.changes["rows"], 2);
    assert_eq!(export.changes["artifact"]["format"], "csv");
    assert_eq!(
        export.changes["artifact"]["size_bytes"],
        body.len() as u64
    );
}

#[tokio::test]
async fn test_export_rejects_malformed_actor_header() {
    let server = TestServer::start().await.expect("Failed to start server");
    let response = server
        .client
        .get(format!("{}/api/v1/audit/export.csv", server.base_url()))
        .header("x-actor-id", "root")
        .send()
        .await
        .unwrap();
    let body: ErrorEnvelope = assert_json(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(body.error.code, "INVALID_HEADER");
    assert!(server.store.is_empty());
}

// ============================================================================
// Pipeline and Middleware Tests
// ============================================================================

#[tokio::test]
async fn test_pipeline_counters() {
    let server = TestServer::start().await.expect("Failed to start server");

    server.get_as("/api/v1/audit/export.csv", 1).await.unwrap();
    server.get_as("/api/v1/audit/export.csv", 2).await.unwrap();
    server.settle().await;

    let response = server.get("/api/v1/audit/pipeline").await.unwrap();
    let body: DataEnvelope<PipelineBody> = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body.data.submitted, 2);
    assert_eq!(body.data.persisted, 2);
    assert_eq!(body.data.rejected, 0);
    assert_eq!(body.data.pending, 0);
}

#[tokio::test]
async fn test_rate_limit_applies_to_api_not_health() {
    let config = test_config(&[
        ("RATE_LIMIT_REQUESTS_PER_SECOND", "1"),
        ("RATE_LIMIT_BURST", "2"),
    ])
    .unwrap();
    let server = TestServer::start_with_config(config)
        .await
        .expect("Failed to start server");

    let mut limited = false;
    for _ in 0..5 {
        let response = server.get("/api/v1/audit/pipeline").await.unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            limited = true;
        }
    }
    assert!(limited);

    for _ in 0..5 {
        let response = server.get("/health").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
