//! Command watchdog
//!
//! Guarantees that no applied motor command stays active longer than the
//! configured timeout without a fresh one from the operator.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────┐   age >= timeout (stop_all once)   ┌─────────────┐
//! │   ARMED     │ ─────────────────────────────────▶ │  TRIPPED    │
//! │             │ ◀───────────────────────────────── │             │
//! └─────────────┘   any command applied (immediate)  └─────────────┘
//! ```
//!
//! Staleness is judged purely by command age. A client that disconnects and a
//! client that stays connected but silent trip the same way.
//!
//! The clock is refreshed and checked inside the translator's lock (see
//! [`CommandTranslator::apply`] and [`CommandTranslator::stop_if_stale`]), so a
//! trip can never land between a fresh command's refresh and its write.

use crate::devices::actuator::CommandTranslator;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Last-command clock shared by the session handler and the watchdog
#[derive(Debug)]
pub struct WatchdogState {
    /// Reference point for the atomic clock
    epoch: Instant,
    /// Microseconds since `epoch` of the last applied command, 0 = never
    last_command_us: AtomicU64,
    /// True from a fresh command until the stop for its staleness is issued
    armed: AtomicBool,
    timeout: Duration,
}

impl WatchdogState {
    /// New state in TRIPPED with nothing left to stop
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_command_us: AtomicU64::new(0),
            armed: AtomicBool::new(false),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Record a freshly applied command and re-arm
    pub fn refresh(&self) {
        self.last_command_us.store(self.now_us().max(1), Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Age of the last command (`None` before the first one)
    pub fn age(&self) -> Option<Duration> {
        let last = self.last_command_us.load(Ordering::SeqCst);
        if last == 0 {
            return None;
        }
        Some(Duration::from_micros(self.now_us().saturating_sub(last)))
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// ARMED -> TRIPPED if the last command is stale.
    ///
    /// Returns true exactly once per staleness episode; the caller must then
    /// issue the stop.
    pub fn try_trip(&self) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        let last = self.last_command_us.load(Ordering::SeqCst);
        let age = Duration::from_micros(self.now_us().saturating_sub(last));
        if age < self.timeout {
            return false;
        }
        self.armed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Poll period for a timeout, clamped to timeout/20 ..= timeout/4
pub fn poll_period(timeout: Duration, divisor: u32) -> Duration {
    timeout / divisor.clamp(4, 20)
}

/// Background watchdog thread
pub struct Watchdog {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start polling `translator` every `period`
    pub fn spawn(translator: Arc<CommandTranslator>, period: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || watchdog_loop(translator, stop_rx, period))
            .map_err(|e| Error::Other(format!("Failed to spawn watchdog thread: {}", e)))?;

        log::info!("Watchdog started (poll every {:?})", period);
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the loop to exit and wait for it
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the channel and wakes the sleep
        self.stop_tx.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Watchdog thread panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watchdog_loop(translator: Arc<CommandTranslator>, stop_rx: Receiver<()>, period: Duration) {
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if translator.stop_if_stale() {
            log::warn!(
                "Watchdog: no command for {:?}, motors stopped",
                translator.watchdog().timeout()
            );
        }
    }

    log::info!("Watchdog thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_tripped_without_pending_stop() {
        let state = WatchdogState::new(Duration::from_millis(10));
        assert!(!state.is_armed());
        assert!(state.age().is_none());
        thread::sleep(Duration::from_millis(20));
        assert!(!state.try_trip());
    }

    #[test]
    fn test_trips_once_per_episode() {
        let state = WatchdogState::new(Duration::from_millis(20));
        state.refresh();
        assert!(!state.try_trip());
        thread::sleep(Duration::from_millis(30));
        assert!(state.try_trip());
        assert!(!state.try_trip());
        assert!(!state.try_trip());

        state.refresh();
        assert!(state.is_armed());
        thread::sleep(Duration::from_millis(30));
        assert!(state.try_trip());
    }

    #[test]
    fn test_refresh_rearms_immediately() {
        let state = WatchdogState::new(Duration::from_millis(20));
        state.refresh();
        thread::sleep(Duration::from_millis(30));
        state.refresh();
        assert!(!state.try_trip());
        assert!(state.age().unwrap() < Duration::from_millis(20));
    }

    #[test]
    fn test_poll_period_bounds() {
        let timeout = Duration::from_secs(1);
        assert_eq!(poll_period(timeout, 10), Duration::from_millis(100));
        assert_eq!(poll_period(timeout, 1), Duration::from_millis(250));
        assert_eq!(poll_period(timeout, 100), Duration::from_millis(50));
    }
}
