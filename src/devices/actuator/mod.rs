//! Actuator controller link
//!
//! Owns the line-oriented serial connection to the motor controller board.
//!
//! # Thread Model
//!
//! 1. **Writers** (session handler, watchdog, shutdown): serialized through the
//!    [`translator::CommandTranslator`] lock and the port mutex, so two lines
//!    never interleave on the wire.
//! 2. **Reader thread** (continuous): owns a cloned port handle, parses `R,`
//!    telemetry lines into the shared [`TelemetryStore`]. Reads are bounded by
//!    the port timeout so shutdown is observed promptly.
//!
//! # Simulated Mode
//!
//! When no controller is found (or the configured port fails to open) the link
//! runs in simulated mode: every send is logged instead of written and the
//! telemetry snapshot is the zero default stamped at read time. This is never
//! fatal to the relay.

pub mod discovery;
pub mod protocol;
mod reader;
pub mod telemetry;
pub mod translator;

pub use protocol::LineFormat;
pub use telemetry::TelemetryStore;
pub use translator::CommandTranslator;

use crate::config::ActuatorConfig;
use crate::core::types::TelemetrySnapshot;
use crate::error::{Error, Result};
use crate::transport::{SerialTransport, Transport};
use parking_lot::Mutex;
use reader::FaultLatch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Time allowed for the final stop line to drain before the port is released
const CLOSE_DRAIN: Duration = Duration::from_millis(200);

/// What happened to a line handed to the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the controller
    Written,
    /// No controller attached; line logged only
    Simulated,
    /// I/O fault while writing; logged, relay keeps running
    Dropped,
    /// Link closed or translator sealed for shutdown
    Rejected,
}

/// Serial link to the actuator controller
pub struct ActuatorLink {
    /// Write handle; `None` once closed
    writer: Mutex<Option<Box<dyn Transport>>>,
    port_name: Option<String>,
    simulated: bool,
    stop_line: String,
    telemetry: Arc<TelemetryStore>,
    /// Shutdown signal for the reader thread
    shutdown: Arc<AtomicBool>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    write_fault: FaultLatch,
}

impl ActuatorLink {
    /// Connect to the controller, falling back to simulated mode
    pub fn connect(config: &ActuatorConfig) -> Self {
        match Self::open(config) {
            Ok(link) => link,
            Err(e) => {
                log::warn!("Actuator controller unavailable ({}), running in simulated mode", e);
                Self::simulated(config)
            }
        }
    }

    /// Open the configured port, or discover one if none is configured
    pub fn open(config: &ActuatorConfig) -> Result<Self> {
        let read_timeout = Duration::from_millis(config.read_timeout_ms);
        let (path, transport) = match &config.port {
            Some(path) => (
                path.clone(),
                SerialTransport::open(path, config.baud_rate, read_timeout)?,
            ),
            None => Self::discover(config.baud_rate, read_timeout)?,
        };
        Self::with_transport(Box::new(transport), &path, config)
    }

    /// Try candidates in preference order, accept the first that opens
    fn discover(baud_rate: u32, read_timeout: Duration) -> Result<(String, SerialTransport)> {
        for candidate in discovery::candidate_ports() {
            match SerialTransport::open(&candidate.path, baud_rate, read_timeout) {
                Ok(transport) => {
                    log::info!("Actuator controller candidate accepted: {}", candidate.path);
                    return Ok((candidate.path, transport));
                }
                Err(e) => log::debug!("Skipping {}: {}", candidate.path, e),
            }
        }
        Err(Error::NoActuatorFound)
    }

    /// Wrap an already-open transport and start the reader thread
    ///
    /// Waits `settle_ms` first: controller boards commonly reset when the
    /// line is opened.
    pub fn with_transport(
        mut transport: Box<dyn Transport>,
        port_name: &str,
        config: &ActuatorConfig,
    ) -> Result<Self> {
        if config.settle_ms > 0 {
            log::info!(
                "Waiting {}ms for actuator controller on {} to settle",
                config.settle_ms,
                port_name
            );
            thread::sleep(Duration::from_millis(config.settle_ms));
        }

        if let Err(e) = transport.clear_input() {
            log::warn!("Failed to flush controller input buffer: {}", e);
        }

        let reader_port = transport.try_clone()?;
        let telemetry = Arc::new(TelemetryStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader_shutdown = Arc::clone(&shutdown);
        let reader_telemetry = Arc::clone(&telemetry);
        let handle = thread::Builder::new()
            .name("actuator-reader".to_string())
            .spawn(move || reader::reader_loop(reader_port, reader_shutdown, reader_telemetry))?;

        log::info!("Actuator link up on {}", port_name);

        Ok(Self {
            writer: Mutex::new(Some(transport)),
            port_name: Some(port_name.to_string()),
            simulated: false,
            stop_line: protocol::all_stop_line(config.line_format),
            telemetry,
            shutdown,
            reader_handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            write_fault: FaultLatch::default(),
        })
    }

    /// Link with no hardware behind it
    pub fn simulated(config: &ActuatorConfig) -> Self {
        Self {
            writer: Mutex::new(None),
            port_name: None,
            simulated: true,
            stop_line: protocol::all_stop_line(config.line_format),
            telemetry: Arc::new(TelemetryStore::new()),
            shutdown: Arc::new(AtomicBool::new(true)),
            reader_handle: Mutex::new(None),
            closed: AtomicBool::new(false),
            write_fault: FaultLatch::default(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// True while the last write attempt failed
    pub fn is_write_faulted(&self) -> bool {
        self.write_fault.is_set()
    }

    /// Write a line verbatim. Faults are logged here and never propagated.
    pub fn send(&self, line: &str) -> SendOutcome {
        if self.closed.load(Ordering::SeqCst) {
            log::debug!("Actuator link closed, rejecting {:?}", line.trim_end());
            return SendOutcome::Rejected;
        }
        if self.simulated {
            log::info!("[simulated] actuator <- {}", line.trim_end());
            return SendOutcome::Simulated;
        }

        match self.try_send(line) {
            Ok(true) => {
                if self.write_fault.clear() {
                    log::info!("Actuator writes recovered");
                }
                log::trace!("actuator <- {}", line.trim_end());
                SendOutcome::Written
            }
            Ok(false) => SendOutcome::Rejected,
            Err(e) => {
                if self.write_fault.trip() {
                    log::error!("Actuator write failed: {}", e);
                } else {
                    log::debug!("Actuator write still failing: {}", e);
                }
                SendOutcome::Dropped
            }
        }
    }

    /// Write under the port lock; `Ok(false)` when the writer is gone
    fn try_send(&self, line: &str) -> Result<bool> {
        let mut writer = self.writer.lock();
        let Some(port) = writer.as_mut() else {
            return Ok(false);
        };
        port.write_all(line.as_bytes())?;
        port.flush()?;
        Ok(true)
    }

    /// Prompt the controller for an out-of-cadence telemetry line
    pub fn request_telemetry(&self) -> SendOutcome {
        self.send(protocol::TELEMETRY_REQUEST)
    }

    /// Copy of the current telemetry snapshot
    ///
    /// In simulated mode the default snapshot is re-stamped with the current time.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        if self.simulated {
            self.telemetry.touch()
        } else {
            self.telemetry.current()
        }
    }

    /// Best-effort close: all-stop, brief drain, stop the reader, release the port
    pub fn close(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        match self.send(&self.stop_line) {
            SendOutcome::Written => thread::sleep(CLOSE_DRAIN),
            SendOutcome::Dropped => log::warn!("Final stop line could not be written"),
            _ => {}
        }
        self.closed.store(true, Ordering::SeqCst);

        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader_handle.lock().take()
            && handle.join().is_err()
        {
            log::error!("Actuator reader thread panicked");
        }

        if self.writer.lock().take().is_some() {
            log::info!(
                "Actuator link on {} closed",
                self.port_name.as_deref().unwrap_or("?")
            );
        }
    }
}

impl Drop for ActuatorLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn test_config() -> ActuatorConfig {
        ActuatorConfig {
            settle_ms: 0,
            ..ActuatorConfig::default()
        }
    }

    #[test]
    fn test_send_writes_verbatim() {
        let mock = MockTransport::new();
        let link = ActuatorLink::with_transport(Box::new(mock.clone()), "mock", &test_config())
            .unwrap();
        assert_eq!(link.send("M,0,0,0,0,0,0,0,0,0,0\n"), SendOutcome::Written);
        assert_eq!(mock.get_written(), b"M,0,0,0,0,0,0,0,0,0,0\n");
    }

    #[test]
    fn test_write_fault_is_contained() {
        let mock = MockTransport::new();
        let link = ActuatorLink::with_transport(Box::new(mock.clone()), "mock", &test_config())
            .unwrap();
        mock.set_fail_writes(true);
        assert_eq!(link.send("S\n"), SendOutcome::Dropped);
        mock.set_fail_writes(false);
        assert_eq!(link.send("S\n"), SendOutcome::Written);
    }

    #[test]
    fn test_persistent_write_fault_latches_until_recovery() {
        let mock = MockTransport::new();
        let link = ActuatorLink::with_transport(Box::new(mock.clone()), "mock", &test_config())
            .unwrap();
        assert!(!link.is_write_faulted());

        mock.set_fail_writes(true);
        for _ in 0..5 {
            assert_eq!(link.send("S\n"), SendOutcome::Dropped);
            assert!(link.is_write_faulted());
        }

        mock.set_fail_writes(false);
        assert_eq!(link.send("S\n"), SendOutcome::Written);
        assert!(!link.is_write_faulted());
    }

    #[test]
    fn test_simulated_mode() {
        let link = ActuatorLink::simulated(&test_config());
        assert!(link.is_simulated());
        assert_eq!(link.send("M,1,1,1,1,1,1,1,1,1,1\n"), SendOutcome::Simulated);
        let snap = link.snapshot();
        assert_eq!(snap.voltage, 0.0);
        assert!(snap.timestamp > 0.0);
    }

    #[test]
    fn test_close_sends_stop_then_rejects() {
        let mock = MockTransport::new();
        let link = ActuatorLink::with_transport(Box::new(mock.clone()), "mock", &test_config())
            .unwrap();
        link.close();
        assert_eq!(mock.written_lines(), vec!["M,0,0,0,0,0,0,0,0,0,0\n"]);
        assert_eq!(link.send("S\n"), SendOutcome::Rejected);
        link.close();
        assert_eq!(mock.written_lines().len(), 1);
    }
}
