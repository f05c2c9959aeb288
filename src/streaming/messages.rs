//! Typed control-connection messages
//!
//! Payloads are JSON objects. Inbound (client -> relay):
//!
//! | Shape | Meaning |
//! |-------|---------|
//! | any of `front_left_motor`, `front_right_motor`, `rear_left_motor`, `rear_right_motor`, `vertical_motor` | five-channel command |
//! | `left_motor` / `right_motor` (+ optional `vertical_motor`) | legacy tank-drive command, mirrored onto the corners |
//! | `{"type": "stop"}` | explicit all-stop |
//!
//! Each channel is `{"direction": 0|1, "speed": 0..255}`; missing channels are
//! stopped. Outbound (relay -> client): a bare telemetry snapshot (no `type`)
//! or `{"type": "image", "data": <base64>, "timestamp": <float>}`.
//!
//! Validation happens here; everything downstream works on typed values.

use crate::core::types::{
    Direction, ImageFrame, LegacyCommandSet, MotorChannel, MotorCommandSet, TelemetrySnapshot,
};
use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Decoded client message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Motor command (legacy shapes already expanded)
    Command(MotorCommandSet),
    /// Explicit operator stop
    Stop,
    /// Well-formed object with a `type` the relay does not handle
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(default)]
    direction: i64,
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: Option<String>,
    front_left_motor: Option<RawChannel>,
    front_right_motor: Option<RawChannel>,
    rear_left_motor: Option<RawChannel>,
    rear_right_motor: Option<RawChannel>,
    vertical_motor: Option<RawChannel>,
    left_motor: Option<RawChannel>,
    right_motor: Option<RawChannel>,
}

impl RawCommand {
    fn has_corners(&self) -> bool {
        self.front_left_motor.is_some()
            || self.front_right_motor.is_some()
            || self.rear_left_motor.is_some()
            || self.rear_right_motor.is_some()
    }

    fn has_legacy(&self) -> bool {
        self.left_motor.is_some() || self.right_motor.is_some()
    }
}

fn channel(raw: Option<RawChannel>) -> Result<MotorChannel> {
    let Some(raw) = raw else {
        return Ok(MotorChannel::STOPPED);
    };
    let direction = Direction::try_from(raw.direction).map_err(Error::InvalidMessage)?;
    if !raw.speed.is_finite() {
        return Err(Error::InvalidMessage(format!("speed must be finite, got {}", raw.speed)));
    }
    Ok(MotorChannel::new(direction, raw.speed))
}

/// Decode one inbound payload
pub fn decode_inbound(payload: &[u8]) -> Result<InboundMessage> {
    let raw: RawCommand = serde_json::from_slice(payload)?;

    if let Some(kind) = raw.kind {
        return Ok(match kind.as_str() {
            "stop" => InboundMessage::Stop,
            _ => InboundMessage::Unknown(kind),
        });
    }

    if raw.has_corners() {
        if raw.has_legacy() {
            log::debug!("Command mixes five-channel and legacy keys, using five-channel");
        }
        return Ok(InboundMessage::Command(MotorCommandSet {
            front_left: channel(raw.front_left_motor)?,
            front_right: channel(raw.front_right_motor)?,
            rear_left: channel(raw.rear_left_motor)?,
            rear_right: channel(raw.rear_right_motor)?,
            vertical: channel(raw.vertical_motor)?,
        }));
    }

    if raw.has_legacy() {
        let legacy = LegacyCommandSet {
            left: channel(raw.left_motor)?,
            right: channel(raw.right_motor)?,
            vertical: channel(raw.vertical_motor)?,
        };
        return Ok(InboundMessage::Command(legacy.expand()));
    }

    if raw.vertical_motor.is_some() {
        return Ok(InboundMessage::Command(MotorCommandSet {
            vertical: channel(raw.vertical_motor)?,
            ..MotorCommandSet::all_stop()
        }));
    }

    Err(Error::InvalidMessage("no motor channels in command".to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageTag {
    Image,
}

/// Camera frame as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMessage {
    #[serde(rename = "type")]
    pub kind: ImageTag,
    /// Base64 (standard alphabet) of the encoded image
    pub data: String,
    pub timestamp: f64,
}

impl ImageMessage {
    pub fn from_frame(frame: &ImageFrame) -> Self {
        Self {
            kind: ImageTag::Image,
            data: STANDARD.encode(&frame.payload),
            timestamp: frame.timestamp,
        }
    }

    /// Decoded image bytes
    pub fn payload(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| Error::InvalidMessage(format!("bad image data: {}", e)))
    }
}

/// Relay -> client message
///
/// Telemetry carries no `type` field, so older clients keep reading it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Image(ImageMessage),
    Telemetry(TelemetrySnapshot),
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl From<TelemetrySnapshot> for OutboundMessage {
    fn from(snapshot: TelemetrySnapshot) -> Self {
        OutboundMessage::Telemetry(snapshot)
    }
}

impl From<&ImageFrame> for OutboundMessage {
    fn from(frame: &ImageFrame) -> Self {
        OutboundMessage::Image(ImageMessage::from_frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(json: &str) -> MotorCommandSet {
        match decode_inbound(json.as_bytes()).unwrap() {
            InboundMessage::Command(set) => set,
            other => panic!("expected command, got {:?}", other),
        }
    }

    #[test]
    fn test_five_channel_command() {
        let set = command(
            r#"{"front_left_motor":{"direction":1,"speed":200},
                "front_right_motor":{"direction":1,"speed":200},
                "rear_left_motor":{"direction":1,"speed":200},
                "rear_right_motor":{"direction":1,"speed":200},
                "vertical_motor":{"direction":0,"speed":0}}"#,
        );
        let ahead = MotorChannel::new(Direction::Forward, 200.0);
        assert_eq!(set.front_left, ahead);
        assert_eq!(set.rear_right, ahead);
        assert_eq!(set.vertical, MotorChannel::STOPPED);
    }

    #[test]
    fn test_missing_channels_are_stopped() {
        let set = command(r#"{"front_left_motor":{"direction":1,"speed":10}}"#);
        assert_eq!(set.front_left.speed, 10);
        assert!(set.front_right.is_stopped());
        assert!(set.vertical.is_stopped());
    }

    #[test]
    fn test_legacy_command_is_mirrored() {
        let set = command(
            r#"{"left_motor":{"direction":1,"speed":90},
                "right_motor":{"direction":0,"speed":40},
                "vertical_motor":{"direction":1,"speed":5}}"#,
        );
        assert_eq!(set.front_left, set.rear_left);
        assert_eq!(set.front_right, set.rear_right);
        assert_eq!(set.front_left, MotorChannel::new(Direction::Forward, 90.0));
        assert_eq!(set.front_right, MotorChannel::new(Direction::Reverse, 40.0));
        assert_eq!(set.vertical.speed, 5);
    }

    #[test]
    fn test_speed_clamped_and_rounded() {
        let set = command(r#"{"vertical_motor":{"direction":1,"speed":999.0}}"#);
        assert_eq!(set.vertical.speed, 255);
        let set = command(r#"{"vertical_motor":{"direction":1,"speed":12.5}}"#);
        assert_eq!(set.vertical.speed, 13);
        let set = command(r#"{"vertical_motor":{"direction":0,"speed":-4}}"#);
        assert_eq!(set.vertical.speed, 0);
    }

    #[test]
    fn test_rejected_payloads() {
        for bad in [
            "not json",
            "[1,2,3]",
            "{}",
            r#"{"front_left_motor":{"direction":2,"speed":10}}"#,
            r#"{"left_motor":{"direction":-1,"speed":10}}"#,
            r#"{"front_left_motor":{"direction":1,"speed":"fast"}}"#,
        ] {
            assert!(decode_inbound(bad.as_bytes()).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_typed_messages() {
        assert_eq!(
            decode_inbound(br#"{"type":"stop"}"#).unwrap(),
            InboundMessage::Stop
        );
        assert_eq!(
            decode_inbound(br#"{"type":"ping"}"#).unwrap(),
            InboundMessage::Unknown("ping".to_string())
        );
    }

    #[test]
    fn test_telemetry_has_no_type_field() {
        let snapshot = TelemetrySnapshot {
            voltage: 12.1,
            current: 0.4,
            depth: 1.5,
            temperature: 18.0,
            timestamp: 1700000000.25,
        };
        let bytes = OutboundMessage::from(snapshot).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("type").is_none());
        assert_eq!(value["voltage"], 12.1);
        assert_eq!(
            OutboundMessage::decode(&bytes).unwrap(),
            OutboundMessage::Telemetry(snapshot)
        );
    }

    #[test]
    fn test_image_message() {
        let frame = ImageFrame {
            payload: vec![0xFF, 0xD8, 0x00, 0x01],
            timestamp: 42.0,
        };
        let bytes = OutboundMessage::from(&frame).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["data"], "/9gAAQ==");

        match OutboundMessage::decode(&bytes).unwrap() {
            OutboundMessage::Image(image) => {
                assert_eq!(image.payload().unwrap(), frame.payload);
                assert_eq!(image.timestamp, 42.0);
            }
            other => panic!("expected image, got {:?}", other),
        }
    }
}
