//! Pipeline counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters shared by submitters and workers
///
/// Each submitted event ends up in exactly one terminal counter. `pending`
/// covers events that were accepted but have not reached a terminal state.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub submitted: AtomicU64,
    pub persisted: AtomicU64,
    pub spooled: AtomicU64,
    pub dropped_overflow: AtomicU64,
    pub dropped_failed: AtomicU64,
    pub dropped_shutdown: AtomicU64,
    pub rejected: AtomicU64,
    pub retried: AtomicU64,
    pub pending: AtomicU64,
}

impl PipelineCounters {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Move one pending event into a terminal counter
    #[inline]
    pub fn settle(&self, terminal: &AtomicU64) {
        terminal.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            spooled: self.spooled.load(Ordering::SeqCst),
            dropped_overflow: self.dropped_overflow.load(Ordering::SeqCst),
            dropped_failed: self.dropped_failed.load(Ordering::SeqCst),
            dropped_shutdown: self.dropped_shutdown.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub submitted: u64,
    pub persisted: u64,
    pub spooled: u64,
    pub dropped_overflow: u64,
    pub dropped_failed: u64,
    pub dropped_shutdown: u64,
    pub rejected: u64,
    /// Retry attempts, not events
    pub retried: u64,
    pub pending: u64,
}

impl PipelineStats {
    /// Events that reached a terminal state
    pub fn accounted(&self) -> u64 {
        self.persisted
            + self.spooled
            + self.dropped_overflow
            + self.dropped_failed
            + self.dropped_shutdown
            + self.rejected
    }

    /// Events lost without being persisted or spooled
    pub fn dropped(&self) -> u64 {
        self.dropped_overflow + self.dropped_failed + self.dropped_shutdown
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }

    /// `submitted == accounted` once the pipeline is idle
    pub fn is_balanced(&self) -> bool {
        self.is_idle() && self.submitted == self.accounted()
    }
}
