//! Actuator bus line protocol
//!
//! ASCII, newline-terminated, in both directions.
//!
//! ```text
//! relay -> controller   M,<dir_fl>,<spd_fl>,<dir_fr>,<spd_fr>,<dir_rl>,<spd_rl>,<dir_rr>,<spd_rr>,<dir_v>,<spd_v>
//!                       M,<dir_l>,<spd_l>,<dir_r>,<spd_r>,<dir_v>,<spd_v>      (legacy firmware)
//!                       S                                                     (telemetry request)
//! controller -> relay   R,<voltage>,<current>,<depth>,<temperature>
//!                       anything else is diagnostic text
//! ```

use crate::core::types::{MotorCommandSet, TelemetryReading};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Motor command marker
pub const MOTOR_PREFIX: &str = "M";
/// Telemetry response marker (including separator)
pub const TELEMETRY_PREFIX: &str = "R,";
/// Bare telemetry request line
pub const TELEMETRY_REQUEST: &str = "S\n";

/// Longest line the reader will buffer before discarding
pub const MAX_LINE_LEN: usize = 256;

/// Motor line layout understood by the controller firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineFormat {
    /// Eleven fields: four corners plus vertical
    #[default]
    FiveChannel,
    /// Seven fields: left, right, vertical (front corners stand for each side)
    Legacy,
}

/// Encode a command set as one motor line
pub fn format_motor_line(set: &MotorCommandSet, format: LineFormat) -> String {
    let mut line = String::with_capacity(48);
    line.push_str(MOTOR_PREFIX);

    match format {
        LineFormat::FiveChannel => {
            for (_, ch) in set.channels() {
                let _ = write!(line, ",{},{}", ch.direction.as_digit(), ch.speed);
            }
        }
        LineFormat::Legacy => {
            for ch in [set.front_left, set.front_right, set.vertical] {
                let _ = write!(line, ",{},{}", ch.direction.as_digit(), ch.speed);
            }
        }
    }

    line.push('\n');
    line
}

/// All-zero motor line
pub fn all_stop_line(format: LineFormat) -> String {
    format_motor_line(&MotorCommandSet::all_stop(), format)
}

/// Parse a telemetry line: `R,` followed by exactly four numeric fields
pub fn parse_telemetry_line(line: &str) -> Result<TelemetryReading> {
    let body = line
        .trim()
        .strip_prefix(TELEMETRY_PREFIX)
        .ok_or_else(|| Error::InvalidTelemetry(format!("missing marker: {:?}", line)))?;

    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(Error::InvalidTelemetry(format!(
            "expected 4 fields, got {}: {:?}",
            fields.len(),
            line
        )));
    }

    let mut values = [0.0f64; 4];
    for (value, field) in values.iter_mut().zip(&fields) {
        *value = field
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::InvalidTelemetry(format!("bad number {:?}", field)))?;
    }

    Ok(TelemetryReading {
        voltage: values[0],
        current: values[1],
        depth: values[2],
        temperature: values[3],
    })
}

/// Splits a byte stream into newline-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them (without terminator)
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                if self.overflowed {
                    log::warn!("Discarded over-long actuator line");
                    self.overflowed = false;
                } else {
                    if self.pending.last() == Some(&b'\r') {
                        self.pending.pop();
                    }
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                }
                self.pending.clear();
            } else if self.pending.len() >= MAX_LINE_LEN {
                self.overflowed = true;
                self.pending.clear();
            } else if !self.overflowed {
                self.pending.push(byte);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Direction, LegacyCommandSet, MotorChannel};

    fn forward(speed: f64) -> MotorChannel {
        MotorChannel::new(Direction::Forward, speed)
    }

    #[test]
    fn test_five_channel_line() {
        let set = MotorCommandSet {
            front_left: forward(200.0),
            front_right: forward(200.0),
            rear_left: forward(200.0),
            rear_right: forward(200.0),
            vertical: MotorChannel::STOPPED,
        };
        assert_eq!(
            format_motor_line(&set, LineFormat::FiveChannel),
            "M,1,200,1,200,1,200,1,200,0,0\n"
        );
    }

    #[test]
    fn test_all_stop_line() {
        assert_eq!(
            all_stop_line(LineFormat::FiveChannel),
            "M,0,0,0,0,0,0,0,0,0,0\n"
        );
        assert_eq!(all_stop_line(LineFormat::Legacy), "M,0,0,0,0,0,0\n");
    }

    #[test]
    fn test_legacy_line_uses_front_corners() {
        let set = LegacyCommandSet {
            left: forward(10.0),
            right: MotorChannel::new(Direction::Reverse, 20.0),
            vertical: forward(30.0),
        }
        .expand();
        assert_eq!(
            format_motor_line(&set, LineFormat::Legacy),
            "M,1,10,0,20,1,30\n"
        );
    }

    #[test]
    fn test_parse_telemetry() {
        let reading = parse_telemetry_line("R,12.6,1.25,3.5,18.0").unwrap();
        assert_eq!(reading.voltage, 12.6);
        assert_eq!(reading.current, 1.25);
        assert_eq!(reading.depth, 3.5);
        assert_eq!(reading.temperature, 18.0);
    }

    #[test]
    fn test_parse_telemetry_rejects_malformed() {
        assert!(parse_telemetry_line("R,12.6,1.25,3.5").is_err());
        assert!(parse_telemetry_line("R,12.6,1.25,3.5,18.0,7").is_err());
        assert!(parse_telemetry_line("R,12.6,abc,3.5,18.0").is_err());
        assert!(parse_telemetry_line("R,NaN,1,1,1").is_err());
        assert!(parse_telemetry_line("Booting...").is_err());
    }

    #[test]
    fn test_line_buffer_reassembles_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"R,12.0,1").is_empty());
        let lines = buf.push(b".0,2.0,20.0\r\nREADY\npart");
        assert_eq!(lines, vec!["R,12.0,1.0,2.0,20.0", "READY"]);
        assert_eq!(buf.push(b"ial\n"), vec!["partial"]);
    }

    #[test]
    fn test_line_buffer_discards_overlong() {
        let mut buf = LineBuffer::new();
        let noise = vec![b'x'; MAX_LINE_LEN + 10];
        assert!(buf.push(&noise).is_empty());
        assert!(buf.push(b"\n").is_empty());
        assert_eq!(buf.push(b"ok\n"), vec!["ok"]);
    }
}
