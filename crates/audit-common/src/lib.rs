//! # audit-common
//!
//! Shared utilities including configuration, error handling, and telemetry.

pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AnomalySettings, AppConfig, AppSettings, ConfigError, CorsConfig, DatabaseConfig,
    Environment, OverflowMode, PipelineSettings, RateLimitConfig, RetentionSettings,
    ServerConfig,
};
pub use error::{AppError, AppResult};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError, DIAGNOSTICS_TARGET,
};
