//! Core data types.
//!
//! - [`types`]: motor channels, command sets, telemetry snapshots, image frames

pub mod types;
