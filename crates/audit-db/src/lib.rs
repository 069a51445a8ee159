//! # audit-db
//!
//! Storage layer implementing the audit store port.
//!
//! ## Overview
//!
//! - [`PgAuditStore`]: PostgreSQL via SQLx, with an immutability trigger on
//!   the `audit_events` table
//! - [`MemoryAuditStore`]: process-local store for tests and development
//!
//! ## Usage
//!
//! ```rust,ignore
//! use audit_db::pool::{create_pool, migrations_dir, run_migrations, DatabaseConfig};
//! use audit_db::PgAuditStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool(&DatabaseConfig::default()).await?;
//!     run_migrations(&pool, &migrations_dir()).await?;
//!     let store = PgAuditStore::new(pool);
//!     Ok(())
//! }
//! ```

pub mod mappers;
pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use memory::MemoryAuditStore;
pub use pool::{create_pool, migrations_dir, run_migrations, DatabaseConfig, PgPool};
pub use repositories::PgAuditStore;
