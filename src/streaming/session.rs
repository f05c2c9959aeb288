//! Session handler for the operator connection
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. RelayServer accepts a connection and builds a Session
//! 2. SessionSlot stops the previous session (if any), then spawns this one
//! 3. Inbound loop: frame -> decode -> CommandTranslator -> telemetry reply
//! 4. Disconnect, write fault, takeover or shutdown ends the loop
//! ```
//!
//! Staleness is the watchdog's business: a disconnect does nothing to the
//! motors directly, the last command simply ages out.
//!
//! # Outbound Path
//!
//! Telemetry replies (session thread) and image frames (capture thread) share
//! one [`SessionSender`]. Each frame is written whole under the writer lock,
//! so the two kinds never interleave on the wire.

use super::messages::{self, InboundMessage, OutboundMessage};
use super::wire::{FrameReader, ReadEvent, encode_frame};
use crate::core::types::MotorCommandSet;
use crate::devices::actuator::{CommandTranslator, SendOutcome};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Process-wide collaborators every session works with
#[derive(Clone)]
pub struct SessionContext {
    pub translator: Arc<CommandTranslator>,
    /// Global running flag (daemon shutdown)
    pub running: Arc<AtomicBool>,
    /// Prompt the controller for telemetry after each applied command
    pub request_telemetry: bool,
}

/// Outbound half of a session, shareable with the capture thread
#[derive(Clone)]
pub struct SessionSender {
    id: u64,
    writer: Arc<Mutex<TcpStream>>,
    /// Separate handle so the socket can be shut down while a write holds the lock
    control: Arc<TcpStream>,
    /// Per-connection alive flag
    alive: Arc<AtomicBool>,
}

impl SessionSender {
    fn new(id: u64, stream: &TcpStream) -> Result<Self> {
        Ok(Self {
            id,
            writer: Arc::new(Mutex::new(stream.try_clone()?)),
            control: Arc::new(stream.try_clone()?),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Write one framed message, waiting for the writer if needed
    ///
    /// A message that cannot be framed (oversized) is an error for the caller
    /// only; the connection stays up.
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        let frame = encode_frame(&message.encode()?)?;
        let mut writer = self.writer.lock();
        self.write_locked(&mut writer, &frame)
    }

    /// Write one framed message unless another write is in progress
    ///
    /// Returns `Ok(false)` when the frame was skipped.
    pub fn try_send(&self, message: &OutboundMessage) -> Result<bool> {
        let frame = encode_frame(&message.encode()?)?;
        let Some(mut writer) = self.writer.try_lock() else {
            return Ok(false);
        };
        self.write_locked(&mut writer, &frame)?;
        Ok(true)
    }

    /// Socket write of an already-framed message; any fault closes the session
    fn write_locked(&self, writer: &mut TcpStream, frame: &[u8]) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::Io(ErrorKind::NotConnected.into()));
        }
        let result = writer.write_all(frame).and_then(|()| writer.flush());
        if result.is_err() {
            self.close();
        }
        Ok(result?)
    }

    /// Mark the session dead and unblock any pending read or write
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::Relaxed) {
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }
}

/// One accepted operator connection
pub struct Session {
    id: u64,
    peer: SocketAddr,
    reader: FrameReader<TcpStream>,
    sender: SessionSender,
    ctx: SessionContext,
}

impl Session {
    /// Wrap an accepted stream (already in blocking mode with timeouts set)
    pub fn new(id: u64, stream: TcpStream, ctx: SessionContext) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let sender = SessionSender::new(id, &stream)?;
        Ok(Self {
            id,
            peer,
            reader: FrameReader::new(stream),
            sender,
            ctx,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// Run until the connection ends; never propagates an error
    pub fn run(mut self) {
        log::info!("Session {} started for {}", self.id, self.peer);

        match self.serve() {
            Ok(()) => {}
            Err(_) if !self.sender.is_alive() => {
                log::debug!("Session {}: socket closed by relay", self.id);
            }
            Err(e) if e.is_disconnect() => {
                log::info!("Session {}: client {} disconnected", self.id, self.peer);
            }
            Err(e @ (Error::TruncatedFrame { .. } | Error::FrameTooLarge { .. })) => {
                log::warn!("Session {}: {}, closing connection", self.id, e);
            }
            Err(e) => log::error!("Session {} error: {}", self.id, e),
        }

        self.sender.close();
        log::info!("Session {} stopped", self.id);
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            if !self.ctx.running.load(Ordering::Relaxed) {
                log::debug!("Session {}: running flag cleared", self.id);
                return Ok(());
            }
            if !self.sender.is_alive() {
                log::debug!("Session {}: alive flag cleared", self.id);
                return Ok(());
            }

            match self.reader.read_frame()? {
                ReadEvent::Frame(payload) => self.handle_payload(&payload)?,
                ReadEvent::Idle => {}
                ReadEvent::Closed => {
                    log::info!("Session {}: client {} closed the connection", self.id, self.peer);
                    return Ok(());
                }
            }
        }
    }

    /// Decode and apply one frame. Only outbound write failures are errors.
    fn handle_payload(&mut self, payload: &[u8]) -> Result<()> {
        let message = match messages::decode_inbound(payload) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Session {}: dropping frame ({} bytes): {}", self.id, payload.len(), e);
                return Ok(());
            }
        };

        let set = match message {
            InboundMessage::Command(set) => set,
            InboundMessage::Stop => {
                log::info!("Session {}: operator stop", self.id);
                MotorCommandSet::all_stop()
            }
            InboundMessage::Unknown(kind) => {
                log::warn!("Session {}: ignoring message type {:?}", self.id, kind);
                return Ok(());
            }
        };

        let translator = &self.ctx.translator;
        if translator.apply(set) == SendOutcome::Rejected {
            log::debug!("Session {}: command rejected, relay shutting down", self.id);
            return Ok(());
        }

        let link = translator.link();
        if self.ctx.request_telemetry {
            link.request_telemetry();
        }
        self.sender.send(&OutboundMessage::Telemetry(link.snapshot()))
    }
}

struct ActiveSession {
    sender: SessionSender,
    handle: JoinHandle<()>,
}

impl ActiveSession {
    /// Signal, unblock and join the handler
    fn stop(self) {
        self.sender.close();
        if self.handle.join().is_err() {
            log::error!("Session {} thread panicked", self.sender.id());
        }
    }
}

/// Owner of the single active session
///
/// Installing a new session first stops the old one and waits for its thread
/// to exit, so two handlers never apply commands at the same time.
#[derive(Clone, Default)]
pub struct SessionSlot {
    inner: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over the slot and start `session` on its own thread
    pub fn install(&self, session: Session) -> Result<()> {
        let mut slot = self.inner.lock();

        if let Some(previous) = slot.take() {
            if previous.sender.is_alive() {
                log::info!(
                    "Session {} taken over by session {} ({})",
                    previous.sender.id(),
                    session.id(),
                    session.peer()
                );
            }
            previous.stop();
        }

        let sender = session.sender();
        let handle = thread::Builder::new()
            .name(format!("session-{}", session.id()))
            .spawn(move || session.run())
            .map_err(|e| Error::Other(format!("Failed to spawn session thread: {}", e)))?;

        *slot = Some(ActiveSession { sender, handle });
        Ok(())
    }

    /// Outbound path of the live session, if there is one
    pub fn sender(&self) -> Option<SessionSender> {
        self.inner
            .lock()
            .as_ref()
            .filter(|active| active.sender.is_alive())
            .map(|active| active.sender.clone())
    }

    pub fn is_active(&self) -> bool {
        self.sender().is_some()
    }

    /// Stop the current session (shutdown)
    pub fn close(&self) {
        if let Some(active) = self.inner.lock().take() {
            log::info!("Closing session {}", active.sender.id());
            active.stop();
        }
    }
}
