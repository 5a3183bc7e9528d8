//! Infrastructure adapters and runtime bootstrap.

pub mod description;
pub mod error;
pub mod telemetry;
