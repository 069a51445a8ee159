//! Audit event entity - one immutable record of an observed action

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::entities::ActionType;
use crate::error::DomainError;
use crate::sanitize::Sanitizer;
use crate::value_objects::{EntityId, EventId};

/// Placeholder for source IP / client when the caller supplied none
pub const UNKNOWN: &str = "unknown";

/// Entity type recorded for events that do not touch a domain record
pub const NO_ENTITY: &str = "";

/// A persisted audit event
///
/// Instances are only produced by an audit store; there is no way to write a
/// modified event back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<EntityId>,
    pub action_type: ActionType,
    pub target_entity_type: String,
    pub target_record_id: EntityId,
    pub subject_id: Option<EntityId>,
    pub source_ip: String,
    pub client_descriptor: String,
    pub changes: Value,
    pub reason: Option<String>,
}

impl AuditEvent {
    /// Materialize a stored event from its pre-append form
    pub fn from_new(id: EventId, event: NewAuditEvent) -> Self {
        Self {
            id,
            timestamp: event.timestamp,
            actor_id: event.actor_id,
            action_type: event.action_type,
            target_entity_type: event.target_entity_type,
            target_record_id: event.target_record_id,
            subject_id: event.subject_id,
            source_ip: event.source_ip,
            client_descriptor: event.client_descriptor,
            changes: event.changes,
            reason: event.reason,
        }
    }

    /// Check if the event was performed by the system or an anonymous caller
    #[inline]
    pub fn is_system(&self) -> bool {
        self.actor_id.is_none()
    }
}

/// An audit event that has been captured but not yet appended
///
/// `changes` is sanitized on construction and on deserialization, so a
/// `NewAuditEvent` never carries denylisted keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<EntityId>,
    pub action_type: ActionType,
    pub target_entity_type: String,
    pub target_record_id: EntityId,
    pub subject_id: Option<EntityId>,
    pub source_ip: String,
    pub client_descriptor: String,
    #[serde(deserialize_with = "deserialize_sanitized")]
    changes: Value,
    pub reason: Option<String>,
}

impl NewAuditEvent {
    /// Start building an event of the given action type
    pub fn builder(action_type: ActionType) -> NewAuditEventBuilder {
        NewAuditEventBuilder::new(action_type)
    }

    /// Sanitized changes payload
    #[inline]
    pub fn changes(&self) -> &Value {
        &self.changes
    }

    /// Check structural invariants before append
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.action_type.requires_target() && self.target_entity_type.trim().is_empty() {
            return Err(DomainError::MissingTargetEntity {
                action: self.action_type,
            });
        }
        if !self.changes.is_object() {
            return Err(DomainError::ChangesNotAnObject);
        }
        Ok(())
    }
}

fn deserialize_sanitized<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let mut value = Value::deserialize(deserializer)?;
    Sanitizer::default().sanitize_in_place(&mut value);
    Ok(value)
}

/// Builder for [`NewAuditEvent`]
#[derive(Debug, Clone)]
pub struct NewAuditEventBuilder {
    timestamp: Option<DateTime<Utc>>,
    actor_id: Option<EntityId>,
    action_type: ActionType,
    target_entity_type: String,
    target_record_id: EntityId,
    subject_id: Option<EntityId>,
    source_ip: Option<String>,
    client_descriptor: Option<String>,
    changes: Value,
    reason: Option<String>,
}

impl NewAuditEventBuilder {
    fn new(action_type: ActionType) -> Self {
        Self {
            timestamp: None,
            actor_id: None,
            action_type,
            target_entity_type: NO_ENTITY.to_string(),
            target_record_id: EntityId::default(),
            subject_id: None,
            source_ip: None,
            client_descriptor: None,
            changes: Value::Object(Map::new()),
            reason: None,
        }
    }

    /// Capture time; defaults to now at `build()`
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn actor(mut self, actor_id: Option<EntityId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn target(mut self, entity_type: impl Into<String>, record_id: EntityId) -> Self {
        self.target_entity_type = entity_type.into();
        self.target_record_id = record_id;
        self
    }

    pub fn subject(mut self, subject_id: Option<EntityId>) -> Self {
        self.subject_id = subject_id;
        self
    }

    pub fn source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    pub fn client_descriptor(mut self, client: impl Into<String>) -> Self {
        self.client_descriptor = Some(client.into());
        self
    }

    /// Changes payload, sanitized with the default denylist
    pub fn changes(self, changes: Value) -> Self {
        self.changes_with(changes, &Sanitizer::default())
    }

    /// Changes payload, sanitized with a custom denylist
    pub fn changes_with(mut self, changes: Value, sanitizer: &Sanitizer) -> Self {
        self.changes = match changes {
            Value::Null => Value::Object(Map::new()),
            other => sanitizer.sanitize(&other),
        };
        self
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason.filter(|r| !r.trim().is_empty());
        self
    }

    /// Finish the event, validating invariants
    pub fn build(self) -> Result<NewAuditEvent, DomainError> {
        let event = NewAuditEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            actor_id: self.actor_id,
            action_type: self.action_type,
            target_entity_type: self.target_entity_type,
            target_record_id: self.target_record_id,
            subject_id: self.subject_id,
            source_ip: non_blank_or_unknown(self.source_ip),
            client_descriptor: non_blank_or_unknown(self.client_descriptor),
            changes: self.changes,
            reason: self.reason,
        };
        event.validate()?;
        Ok(event)
    }
}

fn non_blank_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
