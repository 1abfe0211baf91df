//! Observability module
//!
//! Structured logging setup and helpers shared by the recovery engine.

pub mod telemetry;
