//! Device implementations

pub mod actuator;

pub use actuator::{ActuatorLink, CommandTranslator, SendOutcome};
