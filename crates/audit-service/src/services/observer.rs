//! Change observer
//!
//! Business code reports create/update/delete of watched entities through
//! [`EntityChangeObserver`]. The observer diffs the snapshots, resolves the
//! subject, and hands the event to the pipeline. Nothing that goes wrong in
//! here reaches the caller's operation.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, instrument, warn};

use audit_common::DIAGNOSTICS_TARGET;
use audit_core::diff;
use audit_core::entities::ActionType;
use audit_core::value_objects::EntityId;
use audit_core::{DomainError, Sanitizer};

use crate::pipeline::SubmitOutcome;

use super::context::ServiceContext;
use super::recorder::{AuditRecorder, CallerContext, Target};
use super::subject::resolve_subject;

/// State of one record at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub entity_type: String,
    pub record_id: EntityId,
    pub fields: Map<String, Value>,
}

impl EntitySnapshot {
    pub fn new(entity_type: impl Into<String>, record_id: EntityId, fields: Map<String, Value>) -> Self {
        Self {
            entity_type: entity_type.into(),
            record_id,
            fields,
        }
    }

    /// Snapshot any serializable entity; it must serialize to a JSON object
    pub fn capture<T: Serialize>(
        entity_type: impl Into<String>,
        record_id: EntityId,
        entity: &T,
    ) -> Result<Self, DomainError> {
        match serde_json::to_value(entity)? {
            Value::Object(fields) => Ok(Self::new(entity_type, record_id, fields)),
            other => Err(DomainError::CaptureError(format!(
                "entity serialized to {} instead of an object",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A mutation of a watched entity
///
/// Updates carry both states together so the diff is always consistent.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityChange {
    Created { after: EntitySnapshot },
    Updated { before: EntitySnapshot, after: EntitySnapshot },
    Deleted { before: EntitySnapshot },
}

impl EntityChange {
    pub fn action(&self) -> ActionType {
        match self {
            Self::Created { .. } => ActionType::Create,
            Self::Updated { .. } => ActionType::Update,
            Self::Deleted { .. } => ActionType::Delete,
        }
    }

    /// Snapshot that identifies the record: post-state, or pre-state for deletes
    pub fn current(&self) -> &EntitySnapshot {
        match self {
            Self::Created { after } | Self::Updated { after, .. } => after,
            Self::Deleted { before } => before,
        }
    }

    /// Sanitized `changes` payload
    pub fn changes(&self, sanitizer: &Sanitizer) -> Result<Value, DomainError> {
        match self {
            Self::Created { after } => Ok(diff::created(&after.fields, sanitizer)),
            Self::Deleted { before } => Ok(diff::deleted(&before.fields, sanitizer)),
            Self::Updated { before, after } => {
                if before.entity_type != after.entity_type || before.record_id != after.record_id {
                    return Err(DomainError::CaptureError(format!(
                        "update snapshots disagree: {}#{} vs {}#{}",
                        before.entity_type, before.record_id, after.entity_type, after.record_id
                    )));
                }
                Ok(diff::field_diff(&before.fields, &after.fields, sanitizer))
            }
        }
    }
}

/// What the observer did with a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Submitted(SubmitOutcome),
    /// Entity type is not watched
    Skipped,
    /// Capture failed; logged on the diagnostics target
    Failed,
}

/// Receives entity mutations from business code
#[async_trait]
pub trait EntityChangeObserver: Send + Sync {
    async fn on_change(&self, caller: &CallerContext, change: EntityChange) -> CaptureOutcome;
}

/// Observer that records changes of watched entities
#[derive(Debug, Clone)]
pub struct ChangeObserver {
    ctx: ServiceContext,
}

impl ChangeObserver {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Build the change with `capture` and record it
    ///
    /// Errors and panics raised by `capture` are contained here.
    pub async fn capture<F>(&self, caller: &CallerContext, capture: F) -> CaptureOutcome
    where
        F: FnOnce() -> Result<EntityChange, DomainError>,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(capture)) {
            Ok(Ok(change)) => self.on_change(caller, change).await,
            Ok(Err(e)) => {
                error!(target: DIAGNOSTICS_TARGET, error = %e, "Entity state capture failed");
                CaptureOutcome::Failed
            }
            Err(_) => {
                error!(target: DIAGNOSTICS_TARGET, "Entity state capture panicked");
                CaptureOutcome::Failed
            }
        }
    }

    async fn observe(&self, caller: &CallerContext, change: EntityChange) -> CaptureOutcome {
        let current = change.current();
        let Some(watched) = self.ctx.watched().get(&current.entity_type) else {
            return CaptureOutcome::Skipped;
        };

        let changes = match change.changes(self.ctx.sanitizer()) {
            Ok(changes) => changes,
            Err(e) => {
                error!(
                    target: DIAGNOSTICS_TARGET,
                    entity = current.entity_type.as_str(),
                    record_id = %current.record_id,
                    error = %e,
                    "Failed to compute entity changes"
                );
                return CaptureOutcome::Failed;
            }
        };

        let subject = resolve_subject(
            &watched.subject,
            current.record_id,
            &current.fields,
            self.ctx.resolver(),
        )
        .await;

        let recorder = AuditRecorder::new(&self.ctx);
        let target = Target::new(current.entity_type.clone(), current.record_id);
        let outcome = recorder
            .record(caller, change.action(), target, subject, changes)
            .await;
        if !outcome.is_queued() {
            warn!(
                target: DIAGNOSTICS_TARGET,
                entity = current.entity_type.as_str(),
                record_id = %current.record_id,
                outcome = ?outcome,
                "Entity change not queued"
            );
        }
        CaptureOutcome::Submitted(outcome)
    }
}

#[async_trait]
impl EntityChangeObserver for ChangeObserver {
    #[instrument(skip_all, fields(action = %change.action()))]
    async fn on_change(&self, caller: &CallerContext, change: EntityChange) -> CaptureOutcome {
        match AssertUnwindSafe(self.observe(caller, change))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(target: DIAGNOSTICS_TARGET, "Change observer panicked");
                CaptureOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> EntitySnapshot {
        EntitySnapshot::new(
            "appointment",
            EntityId::new(42),
            value.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_capture_requires_object() {
        #[derive(Serialize)]
        struct Appointment {
            status: &'static str,
            patient_id: i64,
        }

        let snap = EntitySnapshot::capture(
            "appointment",
            EntityId::new(1),
            &Appointment {
                status: "pending",
                patient_id: 7,
            },
        )
        .unwrap();
        assert_eq!(snap.fields["status"], "pending");

        let err = EntitySnapshot::capture("appointment", EntityId::new(1), &5).unwrap_err();
        assert!(matches!(err, DomainError::CaptureError(_)));
    }

    #[test]
    fn test_update_changes_only_changed_fields() {
        let change = EntityChange::Updated {
            before: snapshot(json!({"status": "pending", "room": "A"})),
            after: snapshot(json!({"status": "confirmed", "room": "A"})),
        };
        assert_eq!(change.action(), ActionType::Update);
        assert_eq!(
            change.changes(&Sanitizer::default()).unwrap(),
            json!({"before": {"status": "pending"}, "after": {"status": "confirmed"}})
        );
    }

    #[test]
    fn test_update_with_mismatched_records_fails() {
        let mut after = snapshot(json!({"status": "confirmed"}));
        after.record_id = EntityId::new(43);
        let change = EntityChange::Updated {
            before: snapshot(json!({"status": "pending"})),
            after,
        };
        assert!(change.changes(&Sanitizer::default()).is_err());
    }

    #[test]
    fn test_delete_uses_pre_state() {
        let change = EntityChange::Deleted {
            before: snapshot(json!({"status": "cancelled", "password": "x"})),
        };
        assert_eq!(change.current().record_id, EntityId::new(42));
        assert_eq!(
            change.changes(&Sanitizer::default()).unwrap(),
            json!({"before": {"status": "cancelled"}})
        );
    }
}
