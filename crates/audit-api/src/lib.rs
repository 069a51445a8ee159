//! # audit-api
//!
//! Reporting API for the audit trail built with the Axum framework,
//! plus the `audit-admin` maintenance CLI.

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{create_app, create_app_state, run};
pub use state::AppState;
