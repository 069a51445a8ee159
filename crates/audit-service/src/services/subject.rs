//! Watched entity registry and subject resolution
//!
//! Each watched entity type declares how the affected person (the subject) is
//! derived from a record snapshot.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;

use audit_common::DIAGNOSTICS_TARGET;
use audit_core::value_objects::EntityId;
use audit_core::RepoResult;

/// How to derive `subject_id` from a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRule {
    /// The entity has no subject
    None,
    /// The record itself is the subject (e.g. a patient)
    SelfReference,
    /// A field holding the subject id (e.g. `patient_id`)
    Field(String),
    /// A field referencing another entity whose subject is looked up
    Indirect {
        field: String,
        related_entity: String,
    },
}

/// Registration for an entity type covered by observation and access logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEntity {
    pub entity_type: String,
    pub subject: SubjectRule,
}

impl WatchedEntity {
    pub fn new(entity_type: impl Into<String>, subject: SubjectRule) -> Self {
        Self {
            entity_type: entity_type.into(),
            subject,
        }
    }
}

/// Looks up the subject of a related record for [`SubjectRule::Indirect`]
#[async_trait]
pub trait RelatedEntityResolver: Send + Sync {
    async fn subject_of(&self, entity_type: &str, record_id: EntityId)
        -> RepoResult<Option<EntityId>>;
}

/// Concurrent registry of watched entity types
#[derive(Debug, Default)]
pub struct WatchedEntityRegistry {
    entries: DashMap<String, WatchedEntity>,
}

impl WatchedEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the clinic's patient-facing entities
    pub fn clinic_defaults() -> Self {
        let registry = Self::new();
        registry.register(WatchedEntity::new("patient", SubjectRule::SelfReference));
        registry.register(WatchedEntity::new(
            "appointment",
            SubjectRule::Field("patient_id".to_string()),
        ));
        registry.register(WatchedEntity::new(
            "invoice",
            SubjectRule::Field("patient_id".to_string()),
        ));
        registry.register(WatchedEntity::new(
            "payment",
            SubjectRule::Indirect {
                field: "invoice_id".to_string(),
                related_entity: "invoice".to_string(),
            },
        ));
        registry.register(WatchedEntity::new("inventory_item", SubjectRule::None));
        registry
    }

    /// Register or replace an entity type
    pub fn register(&self, entity: WatchedEntity) {
        self.entries.insert(entity.entity_type.clone(), entity);
    }

    pub fn unregister(&self, entity_type: &str) -> bool {
        self.entries.remove(entity_type).is_some()
    }

    pub fn get(&self, entity_type: &str) -> Option<WatchedEntity> {
        self.entries.get(entity_type).map(|e| e.value().clone())
    }

    #[inline]
    pub fn is_watched(&self, entity_type: &str) -> bool {
        self.entries.contains_key(entity_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read an id out of a snapshot field; accepts integers and numeric strings
pub fn id_field(fields: &Map<String, Value>, name: &str) -> Option<EntityId> {
    match fields.get(name)? {
        Value::Number(n) => n.as_i64().map(EntityId::new),
        Value::String(s) => EntityId::parse(s).ok(),
        _ => None,
    }
}

/// Resolve the subject for a record snapshot
///
/// Never fails: an unresolvable subject is logged and reported as `None`.
pub async fn resolve_subject(
    rule: &SubjectRule,
    record_id: EntityId,
    fields: &Map<String, Value>,
    resolver: Option<&Arc<dyn RelatedEntityResolver>>,
) -> Option<EntityId> {
    match rule {
        SubjectRule::None => None,
        SubjectRule::SelfReference => Some(record_id),
        SubjectRule::Field(field) => {
            let subject = id_field(fields, field);
            if subject.is_none() {
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    record_id = %record_id,
                    field = field.as_str(),
                    "Subject field missing or not an id"
                );
            }
            subject
        }
        SubjectRule::Indirect {
            field,
            related_entity,
        } => {
            let Some(related_id) = id_field(fields, field) else {
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    record_id = %record_id,
                    field = field.as_str(),
                    "Related reference missing, subject unresolved"
                );
                return None;
            };
            let Some(resolver) = resolver else {
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    related_entity = related_entity.as_str(),
                    "No related entity resolver configured, subject unresolved"
                );
                return None;
            };
            match resolver.subject_of(related_entity, related_id).await {
                Ok(subject) => {
                    if subject.is_none() {
                        warn!(
                            target: DIAGNOSTICS_TARGET,
                            related_entity = related_entity.as_str(),
                            related_id = %related_id,
                            "Related entity has no subject"
                        );
                    }
                    subject
                }
                Err(e) => {
                    warn!(
                        target: DIAGNOSTICS_TARGET,
                        related_entity = related_entity.as_str(),
                        related_id = %related_id,
                        error = %e,
                        "Subject resolution failed"
                    );
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::DomainError;
    use serde_json::json;

    struct InvoiceResolver;

    #[async_trait]
    impl RelatedEntityResolver for InvoiceResolver {
        async fn subject_of(
            &self,
            entity_type: &str,
            record_id: EntityId,
        ) -> RepoResult<Option<EntityId>> {
            match (entity_type, record_id.into_inner()) {
                ("invoice", 7) => Ok(Some(EntityId::new(1001))),
                ("invoice", 8) => Err(DomainError::StoreUnavailable("down".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_clinic_defaults() {
        let registry = WatchedEntityRegistry::clinic_defaults();
        assert_eq!(registry.len(), 5);
        assert!(registry.is_watched("appointment"));
        assert!(!registry.is_watched("staff_shift"));
        assert_eq!(
            registry.get("patient").unwrap().subject,
            SubjectRule::SelfReference
        );
    }

    #[test]
    fn test_id_field_accepts_strings() {
        let f = fields(json!({"a": 5, "b": "6", "c": "x", "d": null}));
        assert_eq!(id_field(&f, "a"), Some(EntityId::new(5)));
        assert_eq!(id_field(&f, "b"), Some(EntityId::new(6)));
        assert_eq!(id_field(&f, "c"), None);
        assert_eq!(id_field(&f, "d"), None);
        assert_eq!(id_field(&f, "missing"), None);
    }

    #[tokio::test]
    async fn test_resolve_direct_rules() {
        let f = fields(json!({"patient_id": 1001}));
        let id = EntityId::new(42);
        assert_eq!(resolve_subject(&SubjectRule::None, id, &f, None).await, None);
        assert_eq!(
            resolve_subject(&SubjectRule::SelfReference, id, &f, None).await,
            Some(id)
        );
        assert_eq!(
            resolve_subject(&SubjectRule::Field("patient_id".into()), id, &f, None).await,
            Some(EntityId::new(1001))
        );
    }

    #[tokio::test]
    async fn test_resolve_indirect() {
        let resolver: Arc<dyn RelatedEntityResolver> = Arc::new(InvoiceResolver);
        let rule = SubjectRule::Indirect {
            field: "invoice_id".to_string(),
            related_entity: "invoice".to_string(),
        };
        let id = EntityId::new(3);

        let ok = fields(json!({"invoice_id": 7}));
        assert_eq!(
            resolve_subject(&rule, id, &ok, Some(&resolver)).await,
            Some(EntityId::new(1001))
        );

        let failing = fields(json!({"invoice_id": 8}));
        assert_eq!(resolve_subject(&rule, id, &failing, Some(&resolver)).await, None);

        assert_eq!(resolve_subject(&rule, id, &ok, None).await, None);
    }
}
