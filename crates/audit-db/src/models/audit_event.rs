//! Audit event database model

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

/// Database model for the audit_events table
#[derive(Debug, Clone, FromRow)]
pub struct AuditEventModel {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<i64>,
    /// Action type stored as its SCREAMING_SNAKE_CASE name
    pub action_type: String,
    pub target_entity_type: String,
    pub target_record_id: i64,
    pub subject_id: Option<i64>,
    pub source_ip: String,
    pub client_descriptor: String,
    /// JSON object containing the sanitized diff or metadata
    pub changes: JsonValue,
    pub reason: Option<String>,
}

/// One row of a grouped count
#[derive(Debug, Clone, FromRow)]
pub struct GroupCountModel {
    pub key: String,
    pub count: i64,
}

/// One bucket of the hour-of-day histogram
#[derive(Debug, Clone, FromRow)]
pub struct HourCountModel {
    pub hour: i32,
    pub count: i64,
}
