//! SetuIO - Vehicle-side remote-operation relay
//!
//! Bridges an operator's framed JSON motor commands onto the line-oriented
//! actuator bus, answers each command with telemetry, streams camera frames,
//! and stops every motor when commands go stale.

pub mod app;
pub mod capture;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod streaming;
pub mod transport;
pub mod watchdog;

// Re-export commonly used types
pub use app::RelayApp;
pub use config::AppConfig;
pub use error::{Error, Result};
