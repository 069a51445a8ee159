//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub api: ServerConfig,
    /// `None` selects the in-memory audit store
    pub database: Option<DatabaseConfig>,
    pub pipeline: PipelineSettings,
    pub retention: RetentionSettings,
    pub anomaly: AnomalySettings,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Overrides the migrations directory baked in at build time
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
}

/// What the pipeline does when its queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowMode {
    #[default]
    Drop,
    Block,
}

impl FromStr for OverflowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "block" => Ok(Self::Block),
            other => Err(format!("expected 'drop' or 'block', got '{other}'")),
        }
    }
}

/// Audit event pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub overflow: OverflowMode,
    pub block_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub spool_path: Option<PathBuf>,
}

impl PipelineSettings {
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 4,
            max_attempts: 3,
            initial_backoff_ms: 25,
            max_backoff_ms: 500,
            overflow: OverflowMode::Drop,
            block_timeout_ms: 50,
            shutdown_timeout_ms: 5_000,
            spool_path: None,
        }
    }
}

/// Retention settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionSettings {
    pub retention_days: u32,
    pub batch_size: u32,
    /// Scheduler period; 0 disables the in-process scheduler
    pub interval_secs: u64,
}

impl RetentionSettings {
    /// Upper bound on `retention_days` (100 years)
    pub const MAX_RETENTION_DAYS: u32 = 36_500;
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            retention_days: 2190, // 6 years
            batch_size: 1000,
            interval_secs: 0,
        }
    }
}

/// Anomaly engine thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalySettings {
    /// First business hour, UTC, inclusive
    pub business_hours_start: u32,
    /// Last business hour, UTC, exclusive; below `start` the window wraps past midnight
    pub business_hours_end: u32,
    pub after_hours_threshold: u64,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            business_hours_start: 8,
            business_hours_end: 18,
            after_hours_threshold: 50,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

// Default value functions
fn default_app_name() -> String {
    "clinic-audit".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst() -> u32 {
    50
}

/// Typed lookup over a variable source
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue(key, format!("'{raw}': {e}"))),
            None => Ok(default),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    ///
    /// # Errors
    /// Returns an error if a value is malformed or settings are inconsistent
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let pipeline_defaults = PipelineSettings::default();
        let retention_defaults = RetentionSettings::default();
        let anomaly_defaults = AnomalySettings::default();

        let config = Self {
            app: AppSettings {
                name: vars.get("APP_NAME").unwrap_or_else(default_app_name),
                env: vars
                    .get("APP_ENV")
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            api: ServerConfig {
                host: vars.get("API_HOST").unwrap_or_else(default_host),
                port: vars.parse_or("API_PORT", default_port())?,
            },
            database: match vars.get("DATABASE_URL") {
                Some(url) => Some(DatabaseConfig {
                    url,
                    max_connections: vars
                        .parse_or("DATABASE_MAX_CONNECTIONS", default_max_connections())?,
                    min_connections: vars
                        .parse_or("DATABASE_MIN_CONNECTIONS", default_min_connections())?,
                    migrations_dir: vars.get("AUDIT_MIGRATIONS_DIR").map(PathBuf::from),
                }),
                None => None,
            },
            pipeline: PipelineSettings {
                queue_capacity: vars
                    .parse_or("AUDIT_QUEUE_CAPACITY", pipeline_defaults.queue_capacity)?,
                workers: vars.parse_or("AUDIT_WORKERS", pipeline_defaults.workers)?,
                max_attempts: vars.parse_or("AUDIT_MAX_ATTEMPTS", pipeline_defaults.max_attempts)?,
                initial_backoff_ms: vars
                    .parse_or("AUDIT_BACKOFF_MS", pipeline_defaults.initial_backoff_ms)?,
                max_backoff_ms: vars
                    .parse_or("AUDIT_MAX_BACKOFF_MS", pipeline_defaults.max_backoff_ms)?,
                overflow: vars.parse_or("AUDIT_OVERFLOW", pipeline_defaults.overflow)?,
                block_timeout_ms: vars
                    .parse_or("AUDIT_BLOCK_TIMEOUT_MS", pipeline_defaults.block_timeout_ms)?,
                shutdown_timeout_ms: vars.parse_or(
                    "AUDIT_SHUTDOWN_TIMEOUT_MS",
                    pipeline_defaults.shutdown_timeout_ms,
                )?,
                spool_path: vars.get("AUDIT_SPOOL_PATH").map(PathBuf::from),
            },
            retention: RetentionSettings {
                retention_days: vars
                    .parse_or("AUDIT_RETENTION_DAYS", retention_defaults.retention_days)?,
                batch_size: vars
                    .parse_or("AUDIT_RETENTION_BATCH_SIZE", retention_defaults.batch_size)?,
                interval_secs: vars.parse_or(
                    "AUDIT_RETENTION_INTERVAL_SECS",
                    retention_defaults.interval_secs,
                )?,
            },
            anomaly: AnomalySettings {
                business_hours_start: vars.parse_or(
                    "AUDIT_BUSINESS_HOURS_START",
                    anomaly_defaults.business_hours_start,
                )?,
                business_hours_end: vars.parse_or(
                    "AUDIT_BUSINESS_HOURS_END",
                    anomaly_defaults.business_hours_end,
                )?,
                after_hours_threshold: vars.parse_or(
                    "AUDIT_AFTER_HOURS_THRESHOLD",
                    anomaly_defaults.after_hours_threshold,
                )?,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: vars
                    .parse_or("RATE_LIMIT_REQUESTS_PER_SECOND", default_requests_per_second())?,
                burst: vars.parse_or("RATE_LIMIT_BURST", default_burst())?,
            },
            cors: CorsConfig {
                allowed_origins: vars
                    .get("CORS_ALLOWED_ORIGINS")
                    .map(|s| s.split(',').map(str::trim).map(String::from).collect())
                    .unwrap_or_default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.workers == 0 {
            return Err(ConfigError::InvalidValue("AUDIT_WORKERS", "must be at least 1".into()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_QUEUE_CAPACITY",
                "must be at least 1".into(),
            ));
        }
        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_MAX_ATTEMPTS",
                "must be at least 1".into(),
            ));
        }
        if self.retention.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_RETENTION_BATCH_SIZE",
                "must be at least 1".into(),
            ));
        }
        if self.retention.retention_days > RetentionSettings::MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidValue(
                "AUDIT_RETENTION_DAYS",
                format!("must be at most {}", RetentionSettings::MAX_RETENTION_DAYS),
            ));
        }
        let hours = &self.anomaly;
        if hours.business_hours_start > 23 {
            return Err(ConfigError::InvalidValue(
                "AUDIT_BUSINESS_HOURS_START",
                "must be a UTC hour between 0 and 23".into(),
            ));
        }
        if hours.business_hours_end > 24 || hours.business_hours_start == hours.business_hours_end {
            return Err(ConfigError::InvalidValue(
                "AUDIT_BUSINESS_HOURS_END",
                format!(
                    "business hours {}..{} are not a valid UTC range",
                    hours.business_hours_start, hours.business_hours_end
                ),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_environment_is_production() {
        assert!(!Environment::Development.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(Environment::Production.is_production());
    }

    #[test]
    fn test_server_address() {
        let config = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        };
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_defaults_without_any_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.app.name, "clinic-audit");
        assert!(config.database.is_none());
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.queue_capacity, 1024);
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.pipeline.overflow, OverflowMode::Drop);
        assert_eq!(config.retention.retention_days, 2190);
        assert_eq!(config.anomaly.business_hours_start, 8);
        assert_eq!(config.anomaly.business_hours_end, 18);
        assert_eq!(config.anomaly.after_hours_threshold, 50);
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/audit"),
            ("DATABASE_MAX_CONNECTIONS", "8"),
        ])
        .unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/audit");
        assert_eq!(db.max_connections, 8);
        assert_eq!(db.min_connections, 5);
        assert!(db.migrations_dir.is_none());
    }

    #[test]
    fn test_pipeline_overrides() {
        let config = load(&[
            ("AUDIT_OVERFLOW", "BLOCK"),
            ("AUDIT_WORKERS", "2"),
            ("AUDIT_SPOOL_PATH", "/tmp/audit.spool"),
        ])
        .unwrap();
        assert_eq!(config.pipeline.overflow, OverflowMode::Block);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(
            config.pipeline.spool_path,
            Some(PathBuf::from("/tmp/audit.spool"))
        );
    }

    #[test]
    fn test_malformed_value_is_rejected() {
        let err = load(&[("AUDIT_QUEUE_CAPACITY", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("AUDIT_QUEUE_CAPACITY", _)));

        let err = load(&[("AUDIT_OVERFLOW", "spill")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("AUDIT_OVERFLOW", _)));
    }

    #[test]
    fn test_inconsistent_business_hours_rejected() {
        let err = load(&[
            ("AUDIT_BUSINESS_HOURS_START", "9"),
            ("AUDIT_BUSINESS_HOURS_END", "9"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("AUDIT_BUSINESS_HOURS_END", _)));

        let err = load(&[("AUDIT_BUSINESS_HOURS_START", "24")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("AUDIT_BUSINESS_HOURS_START", _)));

        assert!(load(&[("AUDIT_BUSINESS_HOURS_END", "25")]).is_err());
    }

    #[test]
    fn test_overnight_business_hours_accepted() {
        let config = load(&[
            ("AUDIT_BUSINESS_HOURS_START", "22"),
            ("AUDIT_BUSINESS_HOURS_END", "6"),
        ])
        .unwrap();
        assert_eq!(config.anomaly.business_hours_start, 22);
        assert_eq!(config.anomaly.business_hours_end, 6);
    }

    #[test]
    fn test_retention_days_upper_bound() {
        let config = load(&[("AUDIT_RETENTION_DAYS", "36500")]).unwrap();
        assert_eq!(config.retention.retention_days, RetentionSettings::MAX_RETENTION_DAYS);

        let err = load(&[("AUDIT_RETENTION_DAYS", "100000000")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("AUDIT_RETENTION_DAYS", _)));
    }

    #[test]
    fn test_migrations_dir_override() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/audit"),
            ("AUDIT_MIGRATIONS_DIR", "/opt/clinic-audit/migrations"),
        ])
        .unwrap();
        assert_eq!(
            config.database.unwrap().migrations_dir,
            Some(PathBuf::from("/opt/clinic-audit/migrations"))
        );
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(load(&[("AUDIT_WORKERS", "0")]).is_err());
    }
}
