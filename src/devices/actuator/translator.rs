//! Command translation for the actuator link
//!
//! Turns a [`MotorCommandSet`] into one motor line and pushes it through the
//! [`ActuatorLink`]. Called concurrently by the session handler (per inbound
//! command) and the watchdog (periodic check); one lock covers
//! "update state + build line + write" so lines never interleave and a
//! watchdog trip can never overtake a fresher command.

use super::protocol::{LineFormat, format_motor_line};
use super::{ActuatorLink, SendOutcome};
use crate::core::types::MotorCommandSet;
use crate::watchdog::WatchdogState;
use parking_lot::Mutex;
use std::sync::Arc;

struct TranslatorState {
    /// Last command handed to the link
    current: MotorCommandSet,
    /// Set by the final shutdown stop; later commands are rejected
    sealed: bool,
}

/// Serializes motor commands onto the actuator link
pub struct CommandTranslator {
    link: Arc<ActuatorLink>,
    watchdog: Arc<WatchdogState>,
    format: LineFormat,
    state: Mutex<TranslatorState>,
}

impl CommandTranslator {
    pub fn new(link: Arc<ActuatorLink>, watchdog: Arc<WatchdogState>, format: LineFormat) -> Self {
        Self {
            link,
            watchdog,
            format,
            state: Mutex::new(TranslatorState {
                current: MotorCommandSet::all_stop(),
                sealed: false,
            }),
        }
    }

    pub fn link(&self) -> &Arc<ActuatorLink> {
        &self.link
    }

    pub fn watchdog(&self) -> &WatchdogState {
        &self.watchdog
    }

    /// Apply an operator command: refresh the watchdog clock, then write
    pub fn apply(&self, set: impl Into<MotorCommandSet>) -> SendOutcome {
        let set = set.into();
        let mut state = self.state.lock();
        if state.sealed {
            log::debug!("Translator sealed, ignoring command");
            return SendOutcome::Rejected;
        }

        self.watchdog.refresh();
        let outcome = self.emit(&mut state, set);
        log::debug!("Applied {:?} -> {:?}", set, outcome);
        outcome
    }

    /// Write the all-zero command. Repeated calls emit the same line.
    pub fn stop_all(&self) -> SendOutcome {
        let mut state = self.state.lock();
        self.emit(&mut state, MotorCommandSet::all_stop())
    }

    /// Watchdog hook: stop if the last command went stale (once per episode)
    pub fn stop_if_stale(&self) -> bool {
        let mut state = self.state.lock();
        if !self.watchdog.try_trip() {
            return false;
        }
        self.emit(&mut state, MotorCommandSet::all_stop());
        true
    }

    /// Final stop for process shutdown; seals the translator
    pub fn shutdown(&self) -> SendOutcome {
        let mut state = self.state.lock();
        state.sealed = true;
        self.emit(&mut state, MotorCommandSet::all_stop())
    }

    /// Last command handed to the link
    pub fn current(&self) -> MotorCommandSet {
        self.state.lock().current
    }

    fn emit(&self, state: &mut TranslatorState, set: MotorCommandSet) -> SendOutcome {
        let line = format_motor_line(&set, self.format);
        state.current = set;
        self.link.send(&line)
    }
}
