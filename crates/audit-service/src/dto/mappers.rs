//! Entity to DTO mappers
//!
//! Implements `From` conversions from domain entities to response DTOs.

use audit_core::entities::AuditEvent;

use crate::services::AuditPage;

use super::responses::{AuditEventResponse, PaginatedResponse};

// ============================================================================
// Audit Event Mappers
// ============================================================================

impl From<&AuditEvent> for AuditEventResponse {
    fn from(event: &AuditEvent) -> Self {
        Self {
            id: event.id.to_string(),
            timestamp: event.timestamp,
            actor_id: event.actor_id.map(|id| id.to_string()),
            action_type: event.action_type.as_str().to_string(),
            target_entity_type: event.target_entity_type.clone(),
            target_record_id: event.target_record_id.to_string(),
            subject_id: event.subject_id.map(|id| id.to_string()),
            source_ip: event.source_ip.clone(),
            client_descriptor: event.client_descriptor.clone(),
            changes: event.changes.clone(),
            reason: event.reason.clone(),
        }
    }
}

impl From<AuditEvent> for AuditEventResponse {
    fn from(event: AuditEvent) -> Self {
        Self::from(&event)
    }
}

impl From<AuditPage> for PaginatedResponse<AuditEventResponse> {
    fn from(page: AuditPage) -> Self {
        let data = page.events.into_iter().map(AuditEventResponse::from).collect();
        Self::new(data, page.page.offset, page.page.limit, page.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::entities::ActionType;
    use audit_core::traits::PageRequest;
    use audit_core::value_objects::{EntityId, EventId};
    use chrono::Utc;
    use serde_json::json;

    fn event(id: i64) -> AuditEvent {
        AuditEvent {
            id: EventId::new(id),
            timestamp: Utc::now(),
            actor_id: Some(EntityId::new(5)),
            action_type: ActionType::Read,
            target_entity_type: "patient".to_string(),
            target_record_id: EntityId::new(77),
            subject_id: Some(EntityId::new(77)),
            source_ip: "10.1.1.1".to_string(),
            client_descriptor: "browser".to_string(),
            changes: json!({}),
            reason: None,
        }
    }

    #[test]
    fn test_event_response_uses_string_ids() {
        let response = AuditEventResponse::from(event(9));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], "9");
        assert_eq!(value["actor_id"], "5");
        assert_eq!(value["action_type"], "READ");
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_page_mapping() {
        let page = AuditPage {
            events: vec![event(1), event(2)],
            total: 5,
            page: PageRequest::new(0, 2),
        };
        let response = PaginatedResponse::from(page);
        assert_eq!(response.data.len(), 2);
        assert!(response.pagination.has_more);
    }
}
