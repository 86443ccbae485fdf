//! Token types shared between the Gatehouse identity service and its consumers.
//!
//! Provides claim structs for all four token kinds, JWT validation, and the
//! cookie builders for token transport.

pub mod cookie;
pub mod token;
