//! Shared service plumbing for Gatehouse services.
//!
//! Provides env-based configuration loading, tracing bootstrap, health
//! handlers, and the request-id middleware layer.

pub mod config;
pub mod health;
pub mod middleware;
pub mod tracing;
