//! Camera capture integration
//!
//! A [`CaptureSource`] produces one encoded frame per call. The capture loop
//! calls it at its own cadence, overwrites the single-slot [`LatestFrame`]
//! and, when a session is active, pushes the frame out as an `image` message.
//!
//! Frames are never queued. If the session's writer is busy (telemetry reply
//! in flight, slow client) the frame is skipped; the next one will be newer.

mod directory;
mod pattern;

pub use directory::DirectorySource;
pub use pattern::TestPatternSource;

use crate::config::{CaptureConfig, CaptureSourceKind};
use crate::core::types::ImageFrame;
use crate::error::{Error, Result};
use crate::streaming::{OutboundMessage, SessionSlot};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Consecutive failures before the latest frame is dropped
pub const FAILURE_LIMIT: u32 = 10;

/// Producer of encoded image frames
pub trait CaptureSource: Send {
    /// Human-readable source name for logs
    fn name(&self) -> &str;

    /// Capture and encode one frame
    fn capture(&mut self) -> Result<Vec<u8>>;
}

/// Build the configured source
pub fn create_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>> {
    match config.source {
        CaptureSourceKind::Pattern => Ok(Box::new(TestPatternSource::new(
            config.width,
            config.height,
            config.jpeg_quality,
        ))),
        CaptureSourceKind::Directory => Ok(Box::new(DirectorySource::open(&config.directory)?)),
    }
}

/// Single-slot holder for the most recent frame
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<ImageFrame>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the held frame
    pub fn replace(&self, frame: ImageFrame) {
        *self.slot.lock() = Some(frame);
    }

    pub fn latest(&self) -> Option<ImageFrame> {
        self.slot.lock().clone()
    }

    pub fn clear(&self) {
        self.slot.lock().take();
    }
}

/// One capture step, separated from the thread for testing
struct CaptureWorker {
    source: Box<dyn CaptureSource>,
    latest: Arc<LatestFrame>,
    sessions: SessionSlot,
    failures: u32,
}

impl CaptureWorker {
    fn step(&mut self) {
        match self.source.capture() {
            Ok(payload) => {
                if self.failures >= FAILURE_LIMIT {
                    log::info!("Capture source {} recovered", self.source.name());
                }
                self.failures = 0;

                let frame = ImageFrame::new(payload);
                self.publish(&frame);
                self.latest.replace(frame);
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures == FAILURE_LIMIT {
                    log::warn!(
                        "Capture source {} failed {} times in a row ({}), no frame available",
                        self.source.name(),
                        FAILURE_LIMIT,
                        e
                    );
                    self.latest.clear();
                } else if self.failures < FAILURE_LIMIT {
                    log::debug!("Capture failed: {}", e);
                }
            }
        }
    }

    fn publish(&self, frame: &ImageFrame) {
        let Some(sender) = self.sessions.sender() else {
            return;
        };
        match sender.try_send(&OutboundMessage::from(frame)) {
            Ok(true) => log::trace!("Image frame sent to session {}", sender.id()),
            Ok(false) => log::debug!("Session {} writer busy, skipping frame", sender.id()),
            Err(e @ Error::FrameTooLarge { .. }) => log::warn!("Dropping image frame: {}", e),
            Err(e) => log::debug!("Image frame not delivered: {}", e),
        }
    }
}

/// Background capture thread
pub struct CaptureLoop {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    pub fn spawn(
        source: Box<dyn CaptureSource>,
        latest: Arc<LatestFrame>,
        sessions: SessionSlot,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        log::info!(
            "Capture started: {} every {:?}",
            source.name(),
            interval
        );

        let worker = CaptureWorker {
            source,
            latest,
            sessions,
            failures: 0,
        };
        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || capture_loop(worker, stop_rx, interval))
            .map_err(|e| Error::Other(format!("Failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Capture thread panicked");
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(mut worker: CaptureWorker, stop_rx: Receiver<()>, interval: Duration) {
    loop {
        worker.step();

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::info!("Capture thread exiting");
}
