//! Support-case and moderation pipeline for the estate marketplace.

pub mod config;
pub mod error;
pub mod moderation;
pub mod telemetry;
