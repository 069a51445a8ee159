//! Test fixtures and data generators
//!
//! Provides seed events and the response shapes the API returns.

use audit_core::{ActionType, EntityId, NewAuditEvent};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

// ============================================================================
// Seed events
// ============================================================================

/// Clinician reading a patient chart
pub fn chart_read(actor: i64, patient: i64, at: DateTime<Utc>) -> NewAuditEvent {
    NewAuditEvent::builder(ActionType::Read)
        .timestamp(at)
        .actor(Some(EntityId::new(actor)))
        .target("patient", EntityId::new(patient))
        .subject(Some(EntityId::new(patient)))
        .source_ip("10.0.0.5")
        .client_descriptor("front-desk")
        .build()
        .expect("valid read event")
}

/// Appointment status change
pub fn appointment_update(actor: i64, appointment: i64, patient: i64, at: DateTime<Utc>) -> NewAuditEvent {
    NewAuditEvent::builder(ActionType::Update)
        .timestamp(at)
        .actor(Some(EntityId::new(actor)))
        .target("appointment", EntityId::new(appointment))
        .subject(Some(EntityId::new(patient)))
        .source_ip("10.0.0.6")
        .changes(json!({
            "before": {"status": "scheduled"},
            "after": {"status": "confirmed"}
        }))
        .build()
        .expect("valid update event")
}

/// Failed login from `ip`
pub fn failed_login(ip: &str, at: DateTime<Utc>) -> NewAuditEvent {
    NewAuditEvent::builder(ActionType::LoginFailed)
        .timestamp(at)
        .source_ip(ip)
        .changes(json!({"attempted_username": "admin"}))
        .build()
        .expect("valid failed login event")
}

/// The most recent 10:00 UTC that is not in the future
pub fn business_hours_recently() -> DateTime<Utc> {
    let now = Utc::now();
    let today = now.date_naive().and_hms_opt(10, 0, 0).map(|t| t.and_utc());
    match today {
        Some(t) if t <= now => t,
        Some(t) => t - Duration::days(1),
        None => now,
    }
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct EventPage {
    pub data: Vec<EventBody>,
    pub pagination: PaginationBody,
}

#[derive(Debug, Deserialize)]
pub struct PaginationBody {
    pub offset: u64,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventBody {
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
}

#[derive(Debug, Deserialize)]
pub struct GroupCountBody {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsBody {
    pub total: u64,
    pub by_action_type: std::collections::BTreeMap<String, u64>,
    pub top_actors: Vec<GroupCountBody>,
    pub top_subjects: Vec<GroupCountBody>,
    pub by_hour: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FindingBody {
    #[serde(rename = "type")]
    pub finding_type: String,
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Deserialize)]
pub struct PipelineBody {
    pub submitted: u64,
    pub persisted: u64,
    pub rejected: u64,
    pub pending: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReadinessBody {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Deserialize)]
pub struct ReadinessChecks {
    pub store: String,
    pub pipeline: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
