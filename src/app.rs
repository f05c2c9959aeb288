//! Relay application wiring
//!
//! Owns the actuator link, translator, watchdog and capture loop for the
//! process lifetime and drives the listener.
//!
//! # Shutdown Order
//!
//! ```text
//! 1. Stop accepting connections (listener closed)
//! 2. Stop the watchdog and capture threads
//! 3. Final all-stop through the translator (seals it)
//! 4. Close the actuator link (stop line, drain, release port)
//! 5. Close the active session socket
//! ```
//!
//! The translator is sealed at step 3, so a session still running until step 5
//! cannot put the motors back into motion.

use crate::capture::{self, CaptureLoop, LatestFrame};
use crate::config::AppConfig;
use crate::devices::actuator::{ActuatorLink, CommandTranslator};
use crate::error::Result;
use crate::streaming::{RelayServer, SessionContext, SessionSlot};
use crate::watchdog::{Watchdog, WatchdogState};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Main application structure that manages all components
pub struct RelayApp {
    config: AppConfig,
    translator: Arc<CommandTranslator>,
    server: RelayServer,
    latest_frame: Arc<LatestFrame>,
    /// Cleared to request shutdown
    running: Arc<AtomicBool>,
}

impl RelayApp {
    /// Connect the actuator controller (or fall back to simulation) and bind
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let link = ActuatorLink::connect(&config.actuator);
        Self::with_link(config, Arc::new(link))
    }

    /// Build around an existing link
    pub fn with_link(config: AppConfig, link: Arc<ActuatorLink>) -> Result<Self> {
        info!("Initializing SetuIO relay");

        let watchdog_state = Arc::new(WatchdogState::new(config.watchdog.timeout()));
        let translator = Arc::new(CommandTranslator::new(
            link,
            watchdog_state,
            config.actuator.line_format,
        ));

        // Actuators start from a known-zero state
        translator.stop_all();

        let running = Arc::new(AtomicBool::new(true));
        let ctx = SessionContext {
            translator: Arc::clone(&translator),
            running: Arc::clone(&running),
            request_telemetry: config.actuator.request_telemetry,
        };
        let server = RelayServer::bind(&config.network, config.bind_addr()?, ctx)?;

        Ok(Self {
            config,
            translator,
            server,
            latest_frame: Arc::new(LatestFrame::new()),
            running,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Flag that stops [`RelayApp::run`] when cleared
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Most recent capture frame, shared with the capture loop
    pub fn latest_frame(&self) -> Arc<LatestFrame> {
        Arc::clone(&self.latest_frame)
    }

    /// Clear the running flag on SIGINT / SIGTERM
    pub fn install_signal_handler(&self) -> Result<()> {
        let running = Arc::clone(&self.running);
        let mut signals = Signals::new([SIGINT, SIGTERM])?;

        thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, initiating shutdown...", sig);
                    running.store(false, Ordering::Relaxed);
                }
            })?;
        Ok(())
    }

    /// Serve until the running flag clears, then shut down in order
    pub fn run(self) -> Result<()> {
        let RelayApp {
            config,
            translator,
            server,
            latest_frame,
            running: _,
        } = self;

        let mut watchdog = Watchdog::spawn(
            Arc::clone(&translator),
            config.watchdog.poll_period(),
        )?;
        let mut capture = start_capture(&config, latest_frame, server.slot());

        match translator.link().port_name() {
            Some(port) => info!("Actuator controller: {}", port),
            None => warn!("Actuator controller: none (simulated)"),
        }
        info!(
            "Watchdog timeout {:?}, poll {:?}",
            config.watchdog.timeout(),
            config.watchdog.poll_period()
        );
        info!("SetuIO running. Press Ctrl-C to stop.");

        let sessions: SessionSlot = server.run();

        info!("Shutting down...");
        watchdog.stop();
        if let Some(capture) = capture.as_mut() {
            capture.stop();
        }

        let outcome = translator.shutdown();
        info!("Final stop: {:?}", outcome);
        translator.link().close();
        sessions.close();

        info!("SetuIO stopped");
        Ok(())
    }
}

/// Start the capture loop if enabled; a missing source disables capture
fn start_capture(
    config: &AppConfig,
    latest: Arc<LatestFrame>,
    sessions: SessionSlot,
) -> Option<CaptureLoop> {
    if !config.capture.enabled {
        return None;
    }

    let source = match capture::create_source(&config.capture) {
        Ok(source) => source,
        Err(e) => {
            warn!("Capture source unavailable ({}), capture disabled", e);
            return None;
        }
    };

    match CaptureLoop::spawn(source, latest, sessions, config.capture.interval()) {
        Ok(capture) => Some(capture),
        Err(e) => {
            error!("Failed to start capture: {}", e);
            None
        }
    }
}
