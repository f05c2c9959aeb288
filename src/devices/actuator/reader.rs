//! Reader thread for the actuator link
//!
//! Parses newline-terminated responses from the controller. `R,` lines replace
//! the shared telemetry snapshot; everything else is diagnostic output and is
//! only logged. The reader never writes to the device.

use super::protocol::{LineBuffer, TELEMETRY_PREFIX, parse_telemetry_line};
use super::telemetry::TelemetryStore;
use crate::transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Reader loop - runs until `shutdown` is set
///
/// Each read is bounded by the transport's timeout, so the flag is observed
/// within one timeout period.
pub(super) fn reader_loop(
    mut port: Box<dyn Transport>,
    shutdown: Arc<AtomicBool>,
    telemetry: Arc<TelemetryStore>,
) {
    let mut lines = LineBuffer::new();
    let mut buf = [0u8; 128];
    let fault = FaultLatch::default();

    while !shutdown.load(Ordering::Relaxed) {
        let result = port.read(&mut buf);
        if result.is_ok() && fault.clear() {
            log::info!("Actuator reads recovered");
        }
        match result {
            Ok(0) => {
                // Read timeout or nothing buffered
                thread::sleep(Duration::from_millis(2));
            }
            Ok(n) => {
                for line in lines.push(&buf[..n]) {
                    handle_line(&line, &telemetry);
                }
            }
            Err(e) => {
                if fault.trip() {
                    log::error!("Actuator read error: {}", e);
                } else {
                    log::trace!("Actuator read still failing: {}", e);
                }
                thread::sleep(Duration::from_millis(100));
            }
        }
    }

    log::info!("Actuator reader thread exiting");
}

/// Healthy/faulted state of one I/O direction
///
/// A persistent fault is reported on the transition only; callers log
/// repeats at a lower level.
#[derive(Debug, Default)]
pub(super) struct FaultLatch(AtomicBool);

impl FaultLatch {
    /// Record a fault; true on the healthy -> faulted transition
    pub(super) fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::Relaxed)
    }

    /// Record a success; true when this ends a fault
    pub(super) fn clear(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }

    pub(super) fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Dispatch one complete line
pub(super) fn handle_line(line: &str, telemetry: &TelemetryStore) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    if line.starts_with(TELEMETRY_PREFIX) {
        match parse_telemetry_line(line) {
            Ok(reading) => {
                let snapshot = telemetry.replace(reading);
                log::trace!("Telemetry: {:?}", snapshot);
            }
            Err(e) => log::warn!("Dropping telemetry line: {}", e),
        }
    } else {
        log::info!("Controller: {}", line);
    }
}
