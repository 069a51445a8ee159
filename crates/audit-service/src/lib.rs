//! # audit-service
//!
//! Application layer: the audit pipeline, change and access capture,
//! retention, statistics, and DTOs.

pub mod dto;
pub mod pipeline;
pub mod services;

pub use pipeline::{
    AuditPipeline, FallbackSink, FileSpool, OverflowPolicy, PipelineConfig, PipelineStats,
    ReplayReport, ShutdownReport, SpoolError, SubmitOutcome,
};
pub use services::{ServiceContext, ServiceContextBuilder, ServiceError, ServiceResult};
