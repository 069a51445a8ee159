//! Audit event pipeline
//!
//! Turns submitted events into persisted rows without making the submitting
//! task wait on the store:
//!
//! ```text
//! submit() ──► bounded queue ──► N workers ──► AuditStore::append
//!                  │ full                 │ transient error: backoff + retry
//!                  ▼                      ▼ final failure
//!            dropped_overflow       FallbackSink (spooled) or dropped_failed
//! ```
//!
//! Every submitted event ends in exactly one terminal counter, so an idle
//! pipeline always satisfies `submitted == persisted + spooled + dropped_* + rejected`.

mod counters;
mod spool;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use audit_common::{OverflowMode, PipelineSettings, DIAGNOSTICS_TARGET};
use audit_core::entities::NewAuditEvent;
use audit_core::traits::AuditStore;
use audit_core::DomainError;

use counters::PipelineCounters;

pub use counters::PipelineStats;
pub use spool::{FallbackSink, FileSpool, ReplayReport, SpoolError};

// ============================================================================
// Configuration
// ============================================================================

/// Behaviour when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the event and count it
    Drop,
    /// Wait up to `timeout` for queue space, then drop
    Block { timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    /// Total append attempts per event, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub overflow: OverflowPolicy,
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.max(1),
            workers: settings.workers.max(1),
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
            overflow: match settings.overflow {
                OverflowMode::Drop => OverflowPolicy::Drop,
                OverflowMode::Block => OverflowPolicy::Block {
                    timeout: settings.block_timeout(),
                },
            },
            shutdown_timeout: settings.shutdown_timeout(),
        }
    }
}

impl PipelineConfig {
    /// Backoff before retry number `retry` (1-based), with jitter in `[d/2, d]`
    fn backoff(&self, retry: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
            .min(self.max_backoff);
        let millis = base.as_millis() as u64;
        if millis < 2 {
            return base;
        }
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to a submitted event at the intake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted for asynchronous persistence
    Queued,
    /// Queue full; event dropped
    DroppedOverflow,
    /// Pipeline shut down; event dropped
    Closed,
    /// Event failed validation; never queued
    Rejected,
}

impl SubmitOutcome {
    #[inline]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Result of [`AuditPipeline::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All queued events were processed before the deadline
    pub drained: bool,
    /// Events abandoned when workers were aborted
    pub abandoned: u64,
    pub stats: PipelineStats,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Handle to the audit pipeline; cheap to clone
#[derive(Clone)]
pub struct AuditPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    sender: RwLock<Option<mpsc::Sender<NewAuditEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PipelineCounters>,
    config: PipelineConfig,
}

struct Worker {
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<NewAuditEvent>>>,
    store: Arc<dyn AuditStore>,
    fallback: Option<Arc<dyn FallbackSink>>,
    counters: Arc<PipelineCounters>,
    config: PipelineConfig,
}

impl AuditPipeline {
    /// Start the worker pool
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: PipelineConfig,
        store: Arc<dyn AuditStore>,
        fallback: Option<Arc<dyn FallbackSink>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(PipelineCounters::default());

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: Arc::clone(&receiver),
                    store: Arc::clone(&store),
                    fallback: fallback.clone(),
                    counters: Arc::clone(&counters),
                    config: config.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers = config.workers,
            capacity = config.queue_capacity,
            max_attempts = config.max_attempts,
            spool = fallback.is_some(),
            "Audit pipeline started"
        );

        Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(sender)),
                workers: Mutex::new(workers),
                counters,
                config,
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Current counters
    pub fn stats(&self) -> PipelineStats {
        self.inner.counters.snapshot()
    }

    /// Check whether the intake still accepts events
    pub fn is_open(&self) -> bool {
        self.inner.sender.read().is_some()
    }

    /// Count a submission and reject invalid events before they are queued
    fn admit(&self, event: &NewAuditEvent) -> Result<(), SubmitOutcome> {
        if let Err(e) = event.validate() {
            return Err(self.reject(&e));
        }
        PipelineCounters::incr(&self.inner.counters.submitted);
        Ok(())
    }

    /// Account for an event that could not even be built
    pub fn reject(&self, error: &DomainError) -> SubmitOutcome {
        let counters = &self.inner.counters;
        PipelineCounters::incr(&counters.submitted);
        PipelineCounters::incr(&counters.rejected);
        warn!(target: DIAGNOSTICS_TARGET, error = %error, "Audit event rejected");
        SubmitOutcome::Rejected
    }

    /// Non-blocking submit; drops on overflow regardless of policy
    pub fn try_submit(&self, event: NewAuditEvent) -> SubmitOutcome {
        if let Err(outcome) = self.admit(&event) {
            return outcome;
        }

        let counters = &self.inner.counters;
        let guard = self.inner.sender.read();
        let Some(sender) = guard.as_ref() else {
            PipelineCounters::incr(&counters.dropped_shutdown);
            return SubmitOutcome::Closed;
        };

        PipelineCounters::incr(&counters.pending);
        match sender.try_send(event) {
            Ok(()) => SubmitOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(event)) => {
                counters.settle(&counters.dropped_overflow);
                debug!(
                    target: DIAGNOSTICS_TARGET,
                    action = %event.action_type,
                    "Audit queue full, event dropped"
                );
                SubmitOutcome::DroppedOverflow
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counters.settle(&counters.dropped_shutdown);
                SubmitOutcome::Closed
            }
        }
    }

    /// Submit according to the configured overflow policy
    ///
    /// Never waits for durability. With [`OverflowPolicy::Block`] it waits at
    /// most the configured timeout for queue space.
    pub async fn submit(&self, event: NewAuditEvent) -> SubmitOutcome {
        let timeout = match self.inner.config.overflow {
            OverflowPolicy::Drop => return self.try_submit(event),
            OverflowPolicy::Block { timeout } => timeout,
        };

        if let Err(outcome) = self.admit(&event) {
            return outcome;
        }

        let counters = &self.inner.counters;
        let Some(sender) = self.inner.sender.read().clone() else {
            PipelineCounters::incr(&counters.dropped_shutdown);
            return SubmitOutcome::Closed;
        };

        PipelineCounters::incr(&counters.pending);
        match tokio::time::timeout(timeout, sender.send(event)).await {
            Ok(Ok(())) => SubmitOutcome::Queued,
            Ok(Err(_)) => {
                counters.settle(&counters.dropped_shutdown);
                SubmitOutcome::Closed
            }
            Err(_) => {
                counters.settle(&counters.dropped_overflow);
                debug!(
                    target: DIAGNOSTICS_TARGET,
                    timeout_ms = timeout.as_millis() as u64,
                    "Audit queue still full after block timeout, event dropped"
                );
                SubmitOutcome::DroppedOverflow
            }
        }
    }

    /// Wait until no event is pending, up to `timeout`
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.stats().is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Close intake, drain up to the shutdown timeout, then abort workers
    ///
    /// Events still pending after the deadline are counted as `dropped_shutdown`.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) -> ShutdownReport {
        drop(self.inner.sender.write().take());
        let mut handles = std::mem::take(&mut *self.inner.workers.lock());

        let drained = tokio::time::timeout(
            self.inner.config.shutdown_timeout,
            futures::future::join_all(handles.iter_mut()),
        )
        .await
        .is_ok();

        if !drained {
            for handle in &handles {
                handle.abort();
            }
            // Aborted tasks resolve promptly; after this no worker touches the counters
            futures::future::join_all(handles).await;
        }

        let counters = &self.inner.counters;
        let abandoned = counters.pending.swap(0, std::sync::atomic::Ordering::SeqCst);
        counters
            .dropped_shutdown
            .fetch_add(abandoned, std::sync::atomic::Ordering::SeqCst);

        let stats = self.stats();
        if abandoned > 0 {
            error!(
                target: DIAGNOSTICS_TARGET,
                abandoned,
                "Audit pipeline shutdown deadline reached, pending events dropped"
            );
        }
        info!(
            drained,
            persisted = stats.persisted,
            spooled = stats.spooled,
            dropped = stats.dropped(),
            "Audit pipeline stopped"
        );

        ShutdownReport {
            drained,
            abandoned,
            stats,
        }
    }
}

impl std::fmt::Debug for AuditPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditPipeline")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

// ============================================================================
// Workers
// ============================================================================

enum Delivery {
    Persisted,
    Failed(NewAuditEvent, String),
}

impl Worker {
    async fn run(self) {
        loop {
            let next = { self.receiver.lock().await.recv().await };
            let Some(event) = next else {
                break;
            };

            let delivery = AssertUnwindSafe(self.persist(event)).catch_unwind().await;
            let counters = &self.counters;
            match delivery {
                Ok(Delivery::Persisted) => counters.settle(&counters.persisted),
                Ok(Delivery::Failed(event, reason)) => self.fall_back(&event, &reason).await,
                Err(_) => {
                    error!(
                        target: DIAGNOSTICS_TARGET,
                        worker = self.id,
                        "Audit store panicked during append, event dropped"
                    );
                    counters.settle(&counters.dropped_failed);
                }
            }
        }
        debug!(worker = self.id, "Audit worker exiting");
    }

    async fn persist(&self, event: NewAuditEvent) -> Delivery {
        let mut attempt = 1;
        loop {
            match self.store.append(event.clone()).await {
                Ok(_) => return Delivery::Persisted,
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.backoff(attempt);
                    PipelineCounters::incr(&self.counters.retried);
                    debug!(
                        worker = self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Audit append failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Delivery::Failed(event, e.to_string()),
            }
        }
    }

    async fn fall_back(&self, event: &NewAuditEvent, reason: &str) {
        let counters = &self.counters;
        let Some(sink) = &self.fallback else {
            error!(
                target: DIAGNOSTICS_TARGET,
                worker = self.id,
                action = %event.action_type,
                entity = %event.target_entity_type,
                error = reason,
                "Audit event could not be persisted and no spool is configured, dropped"
            );
            counters.settle(&counters.dropped_failed);
            return;
        };

        match sink.spool(event).await {
            Ok(()) => {
                warn!(
                    target: DIAGNOSTICS_TARGET,
                    worker = self.id,
                    action = %event.action_type,
                    error = reason,
                    "Audit event spooled after persistence failure"
                );
                counters.settle(&counters.spooled);
            }
            Err(spool_err) => {
                error!(
                    target: DIAGNOSTICS_TARGET,
                    worker = self.id,
                    action = %event.action_type,
                    error = reason,
                    spool_error = %spool_err,
                    "Audit event could not be persisted or spooled, dropped"
                );
                counters.settle(&counters.dropped_failed);
            }
        }
    }
}
