//! Rental application and lease lifecycle orchestration.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
