//! Integration test utilities for the audit API
//!
//! This crate provides helpers for running end-to-end tests against
//! the reporting API backed by the in-memory audit store.

pub mod helpers;
pub mod fixtures;

pub use helpers::*;
pub use fixtures::*;
