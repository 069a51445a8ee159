//! AuditEvent entity <-> model mapper

use audit_core::entities::{ActionType, AuditEvent, NewAuditEvent};
use audit_core::error::DomainError;
use audit_core::value_objects::{EntityId, EventId};

use crate::models::AuditEventModel;

/// Convert AuditEventModel to AuditEvent entity
///
/// Fails only if the row holds an action type this build does not know.
impl TryFrom<AuditEventModel> for AuditEvent {
    type Error = DomainError;

    fn try_from(model: AuditEventModel) -> Result<Self, Self::Error> {
        Ok(AuditEvent {
            id: EventId::new(model.id),
            timestamp: model.occurred_at,
            actor_id: model.actor_id.map(EntityId::new),
            action_type: model.action_type.parse::<ActionType>()?,
            target_entity_type: model.target_entity_type,
            target_record_id: EntityId::new(model.target_record_id),
            subject_id: model.subject_id.map(EntityId::new),
            source_ip: model.source_ip,
            client_descriptor: model.client_descriptor,
            changes: model.changes,
            reason: model.reason,
        })
    }
}

/// Borrowed column values for inserting a new event
pub struct AuditEventInsert<'a> {
    pub occurred_at: chrono::DateTime<chrono::Utc>,
    pub actor_id: Option<i64>,
    pub action_type: &'static str,
    pub target_entity_type: &'a str,
    pub target_record_id: i64,
    pub subject_id: Option<i64>,
    pub source_ip: &'a str,
    pub client_descriptor: &'a str,
    pub changes: &'a serde_json::Value,
    pub reason: Option<&'a str>,
}

impl<'a> AuditEventInsert<'a> {
    pub fn new(event: &'a NewAuditEvent) -> Self {
        Self {
            occurred_at: event.timestamp,
            actor_id: event.actor_id.map(EntityId::into_inner),
            action_type: event.action_type.as_str(),
            target_entity_type: &event.target_entity_type,
            target_record_id: event.target_record_id.into_inner(),
            subject_id: event.subject_id.map(EntityId::into_inner),
            source_ip: &event.source_ip,
            client_descriptor: &event.client_descriptor,
            changes: event.changes(),
            reason: event.reason.as_deref(),
        }
    }
}
