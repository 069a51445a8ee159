//! Service context - dependency container for services
//!
//! Holds the audit store, the pipeline, the watched entity registry, and
//! the settings the audit services read.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use audit_common::{AnomalySettings, RetentionSettings};
use audit_core::traits::AuditStore;
use audit_core::Sanitizer;

use crate::pipeline::AuditPipeline;

use super::error::{ServiceError, ServiceResult};
use super::subject::{RelatedEntityResolver, WatchedEntityRegistry};

/// Service context containing all dependencies
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct ServiceContext {
    // Persistence
    store: Arc<dyn AuditStore>,
    pipeline: AuditPipeline,

    // Capture
    watched: Arc<WatchedEntityRegistry>,
    resolver: Option<Arc<dyn RelatedEntityResolver>>,
    sanitizer: Arc<Sanitizer>,

    // Settings
    anomaly: AnomalySettings,
    retention: RetentionSettings,

    // Singleton guard for retention runs
    retention_running: Arc<AtomicBool>,
}

impl ServiceContext {
    /// Create a new service context with all dependencies
    pub fn new(
        store: Arc<dyn AuditStore>,
        pipeline: AuditPipeline,
        watched: Arc<WatchedEntityRegistry>,
        resolver: Option<Arc<dyn RelatedEntityResolver>>,
        sanitizer: Arc<Sanitizer>,
        anomaly: AnomalySettings,
        retention: RetentionSettings,
    ) -> Self {
        Self {
            store,
            pipeline,
            watched,
            resolver,
            sanitizer,
            anomaly,
            retention,
            retention_running: Arc::new(AtomicBool::new(false)),
        }
    }

    // === Persistence ===

    /// Get the audit store
    pub fn store(&self) -> &dyn AuditStore {
        self.store.as_ref()
    }

    /// Get a shared handle to the audit store
    pub fn store_handle(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.store)
    }

    /// Get the audit pipeline
    pub fn pipeline(&self) -> &AuditPipeline {
        &self.pipeline
    }

    // === Capture ===

    pub fn watched(&self) -> &WatchedEntityRegistry {
        self.watched.as_ref()
    }

    pub fn resolver(&self) -> Option<&Arc<dyn RelatedEntityResolver>> {
        self.resolver.as_ref()
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        self.sanitizer.as_ref()
    }

    // === Settings ===

    pub fn anomaly_settings(&self) -> &AnomalySettings {
        &self.anomaly
    }

    pub fn retention_settings(&self) -> &RetentionSettings {
        &self.retention
    }

    pub(crate) fn retention_running(&self) -> &AtomicBool {
        self.retention_running.as_ref()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("store", &"AuditStore")
            .field("pipeline", &self.pipeline)
            .field("watched", &self.watched.len())
            .field("resolver", &self.resolver.is_some())
            .field("anomaly", &self.anomaly)
            .field("retention", &self.retention)
            .finish()
    }
}

/// Builder for creating ServiceContext with custom configuration
pub struct ServiceContextBuilder {
    store: Option<Arc<dyn AuditStore>>,
    pipeline: Option<AuditPipeline>,
    watched: Option<Arc<WatchedEntityRegistry>>,
    resolver: Option<Arc<dyn RelatedEntityResolver>>,
    sanitizer: Option<Arc<Sanitizer>>,
    anomaly: AnomalySettings,
    retention: RetentionSettings,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            pipeline: None,
            watched: None,
            resolver: None,
            sanitizer: None,
            anomaly: AnomalySettings::default(),
            retention: RetentionSettings::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pipeline(mut self, pipeline: AuditPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Watched entities; defaults to [`WatchedEntityRegistry::clinic_defaults`]
    pub fn watched(mut self, watched: Arc<WatchedEntityRegistry>) -> Self {
        self.watched = Some(watched);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn RelatedEntityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = Some(Arc::new(sanitizer));
        self
    }

    pub fn anomaly(mut self, settings: AnomalySettings) -> Self {
        self.anomaly = settings;
        self
    }

    pub fn retention(mut self, settings: RetentionSettings) -> Self {
        self.retention = settings;
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if the store or pipeline is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        Ok(ServiceContext::new(
            self.store
                .ok_or_else(|| ServiceError::validation("store is required"))?,
            self.pipeline
                .ok_or_else(|| ServiceError::validation("pipeline is required"))?,
            self.watched
                .unwrap_or_else(|| Arc::new(WatchedEntityRegistry::clinic_defaults())),
            self.resolver,
            self.sanitizer.unwrap_or_default(),
            self.anomaly,
            self.retention,
        ))
    }
}

impl Default for ServiceContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
