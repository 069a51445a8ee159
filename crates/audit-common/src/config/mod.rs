//! Configuration structs

mod app_config;

pub use app_config::{
    AnomalySettings, AppConfig, AppSettings, ConfigError, CorsConfig, DatabaseConfig,
    Environment, OverflowMode, PipelineSettings, RateLimitConfig, RetentionSettings,
    ServerConfig,
};
