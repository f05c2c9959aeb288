//! Core data types shared by the actuator link, the session handler and capture.
//!
//! Key types:
//! - [`MotorCommandSet`]: five named thruster channels, built fresh per inbound command
//! - [`LegacyCommandSet`]: two-channel tank-drive shape, expanded by mirroring
//! - [`TelemetrySnapshot`]: last reading from the actuator controller
//! - [`ImageFrame`]: one encoded camera frame

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the UNIX epoch as a float (wire timestamp format)
#[inline]
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Thruster spin direction.
///
/// Wire value `1` is forward, `0` is reverse. The all-stop set carries
/// `Reverse` at zero speed so it encodes as `0,0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub enum Direction {
    #[default]
    Reverse,
    Forward,
}

impl Direction {
    /// Actuator bus digit
    pub fn as_digit(self) -> u8 {
        match self {
            Direction::Reverse => 0,
            Direction::Forward => 1,
        }
    }
}

impl TryFrom<i64> for Direction {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Reverse),
            1 => Ok(Direction::Forward),
            other => Err(format!("direction must be 0 or 1, got {}", other)),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction.as_digit()
    }
}

/// One thruster's direction + speed pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorChannel {
    pub direction: Direction,
    /// PWM duty, 0-255
    pub speed: u8,
}

impl MotorChannel {
    /// Zero-speed channel
    pub const STOPPED: MotorChannel = MotorChannel {
        direction: Direction::Reverse,
        speed: 0,
    };

    /// Build a channel, clamping `speed` into 0..=255
    pub fn new(direction: Direction, speed: f64) -> Self {
        Self {
            direction,
            speed: speed.clamp(0.0, 255.0).round() as u8,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.speed == 0
    }
}

/// Canonical motor names, in actuator bus order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorName {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
    Vertical,
}

impl MotorName {
    /// Emission order on the actuator bus
    pub const ORDER: [MotorName; 5] = [
        MotorName::FrontLeft,
        MotorName::FrontRight,
        MotorName::RearLeft,
        MotorName::RearRight,
        MotorName::Vertical,
    ];

    /// Key used in the JSON command object
    pub fn as_str(self) -> &'static str {
        match self {
            MotorName::FrontLeft => "front_left_motor",
            MotorName::FrontRight => "front_right_motor",
            MotorName::RearLeft => "rear_left_motor",
            MotorName::RearRight => "rear_right_motor",
            MotorName::Vertical => "vertical_motor",
        }
    }
}

/// Full five-channel command: four corner thrusters plus vertical.
///
/// Constructed fresh from each decoded message and never mutated after it
/// is handed to the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorCommandSet {
    #[serde(rename = "front_left_motor")]
    pub front_left: MotorChannel,
    #[serde(rename = "front_right_motor")]
    pub front_right: MotorChannel,
    #[serde(rename = "rear_left_motor")]
    pub rear_left: MotorChannel,
    #[serde(rename = "rear_right_motor")]
    pub rear_right: MotorChannel,
    #[serde(rename = "vertical_motor")]
    pub vertical: MotorChannel,
}

impl MotorCommandSet {
    /// Every channel at zero speed
    pub fn all_stop() -> Self {
        Self::default()
    }

    pub fn channel(&self, name: MotorName) -> MotorChannel {
        match name {
            MotorName::FrontLeft => self.front_left,
            MotorName::FrontRight => self.front_right,
            MotorName::RearLeft => self.rear_left,
            MotorName::RearRight => self.rear_right,
            MotorName::Vertical => self.vertical,
        }
    }

    /// Channels in bus order
    pub fn channels(&self) -> [(MotorName, MotorChannel); 5] {
        MotorName::ORDER.map(|name| (name, self.channel(name)))
    }

    pub fn is_all_stop(&self) -> bool {
        self.channels().iter().all(|(_, ch)| ch.is_stopped())
    }
}

/// Two-channel tank-drive command from older operator clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegacyCommandSet {
    pub left: MotorChannel,
    pub right: MotorChannel,
    pub vertical: MotorChannel,
}

impl LegacyCommandSet {
    /// Mirror left onto both left corners and right onto both right corners
    pub fn expand(self) -> MotorCommandSet {
        MotorCommandSet {
            front_left: self.left,
            front_right: self.right,
            rear_left: self.left,
            rear_right: self.right,
            vertical: self.vertical,
        }
    }
}

impl From<LegacyCommandSet> for MotorCommandSet {
    fn from(legacy: LegacyCommandSet) -> Self {
        legacy.expand()
    }
}

/// Last telemetry reading from the actuator controller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub voltage: f64,
    pub current: f64,
    pub depth: f64,
    pub temperature: f64,
    /// Seconds since UNIX epoch at parse time
    pub timestamp: f64,
}

/// Raw values from one `R,` line, before stamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub voltage: f64,
    pub current: f64,
    pub depth: f64,
    pub temperature: f64,
}

impl TelemetryReading {
    pub fn stamped(self, timestamp: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            voltage: self.voltage,
            current: self.current,
            depth: self.depth,
            temperature: self.temperature,
            timestamp,
        }
    }
}

/// One encoded camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub payload: Vec<u8>,
    pub timestamp: f64,
}

impl ImageFrame {
    /// Wrap encoded bytes, stamped now
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            timestamp: unix_timestamp(),
        }
    }
}
