//! Audit recorder
//!
//! Fire-and-forget entry point used by business code, plus helpers for
//! authentication outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use audit_core::entities::{ActionType, NewAuditEvent, NO_ENTITY, UNKNOWN};
use audit_core::value_objects::EntityId;

use crate::pipeline::SubmitOutcome;

use super::context::ServiceContext;

/// Who is acting and from where
///
/// Passed explicitly by the caller; missing values default to `None` and
/// `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub actor_id: Option<EntityId>,
    pub source_ip: String,
    pub client_descriptor: String,
    pub reason: Option<String>,
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl CallerContext {
    /// No actor, unknown origin
    pub fn anonymous() -> Self {
        Self {
            actor_id: None,
            source_ip: UNKNOWN.to_string(),
            client_descriptor: UNKNOWN.to_string(),
            reason: None,
        }
    }

    pub fn actor(actor_id: EntityId) -> Self {
        Self::anonymous().with_actor(Some(actor_id))
    }

    pub fn with_actor(mut self, actor_id: Option<EntityId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = ip.into();
        self
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client_descriptor = client.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Record target: entity type and record id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub entity_type: String,
    pub record_id: EntityId,
}

impl Target {
    pub fn new(entity_type: impl Into<String>, record_id: EntityId) -> Self {
        Self {
            entity_type: entity_type.into(),
            record_id,
        }
    }

    /// No target entity, for session-level events
    pub fn none() -> Self {
        Self::new(NO_ENTITY, EntityId::default())
    }
}

/// Audit recorder service
pub struct AuditRecorder<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> AuditRecorder<'a> {
    /// Create a new AuditRecorder
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Build an event from its parts; invalid parts are counted as rejected
    pub(crate) fn compose(
        &self,
        caller: &CallerContext,
        action: ActionType,
        target: Target,
        subject_id: Option<EntityId>,
        changes: Value,
    ) -> Result<NewAuditEvent, SubmitOutcome> {
        NewAuditEvent::builder(action)
            .actor(caller.actor_id)
            .source_ip(caller.source_ip.as_str())
            .client_descriptor(caller.client_descriptor.as_str())
            .reason(caller.reason.clone())
            .target(target.entity_type, target.record_id)
            .subject(subject_id)
            .changes_with(changes, self.ctx.sanitizer())
            .build()
            .map_err(|e| self.ctx.pipeline().reject(&e))
    }

    /// Record an action without waiting for persistence
    ///
    /// Never fails; the outcome is informational.
    #[instrument(skip(self, caller, changes), fields(entity = %target.entity_type))]
    pub async fn record(
        &self,
        caller: &CallerContext,
        action: ActionType,
        target: Target,
        subject_id: Option<EntityId>,
        changes: Value,
    ) -> SubmitOutcome {
        match self.compose(caller, action, target, subject_id, changes) {
            Ok(event) => self.ctx.pipeline().submit(event).await,
            Err(outcome) => outcome,
        }
    }

    // === Authentication outcomes ===

    pub async fn login_succeeded(&self, caller: &CallerContext, user_id: EntityId) -> SubmitOutcome {
        let caller = caller.clone().with_actor(Some(user_id));
        self.record(
            &caller,
            ActionType::LoginSuccess,
            Target::new("user", user_id),
            None,
            Value::Null,
        )
        .await
    }

    /// Failed login; the actor is never recorded and credentials are stripped
    pub async fn login_failed(&self, caller: &CallerContext, attempt: Value) -> SubmitOutcome {
        let caller = caller.clone().with_actor(None);
        self.record(
            &caller,
            ActionType::LoginFailed,
            Target::none(),
            None,
            attempt,
        )
        .await
    }

    pub async fn logged_out(&self, caller: &CallerContext, user_id: EntityId) -> SubmitOutcome {
        let caller = caller.clone().with_actor(Some(user_id));
        self.record(
            &caller,
            ActionType::Logout,
            Target::new("user", user_id),
            None,
            Value::Null,
        )
        .await
    }

    /// Authorization failure on a resource
    pub async fn access_denied(
        &self,
        caller: &CallerContext,
        target: Target,
        permission: &str,
    ) -> SubmitOutcome {
        self.record(
            caller,
            ActionType::AccessDenied,
            target,
            None,
            json!({ "permission": permission }),
        )
        .await
    }
}
