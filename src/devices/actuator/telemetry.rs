//! Shared telemetry snapshot

use crate::core::types::{TelemetryReading, TelemetrySnapshot, unix_timestamp};
use parking_lot::RwLock;

/// Holder for the latest telemetry snapshot.
///
/// Writes replace the whole snapshot under the lock, so readers always see a
/// consistent copy. Timestamps never go backwards even if the wall clock does.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    snapshot: RwLock<TelemetrySnapshot>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with a freshly parsed reading
    pub fn replace(&self, reading: TelemetryReading) -> TelemetrySnapshot {
        let mut guard = self.snapshot.write();
        let timestamp = unix_timestamp().max(guard.timestamp);
        *guard = reading.stamped(timestamp);
        *guard
    }

    /// Re-stamp the current values with "now" (simulated mode)
    pub fn touch(&self) -> TelemetrySnapshot {
        let mut guard = self.snapshot.write();
        guard.timestamp = unix_timestamp().max(guard.timestamp);
        *guard
    }

    /// Copy of the current snapshot
    pub fn current(&self) -> TelemetrySnapshot {
        *self.snapshot.read()
    }
}
