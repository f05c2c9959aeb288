//! Error types for SetuIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SetuIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be written back out
    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// JSON payload encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Length prefix exceeds the frame limit
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Length announced by the prefix
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Peer closed the connection in the middle of a frame
    #[error("Truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame {
        /// Bytes announced (prefix + payload)
        expected: usize,
        /// Bytes actually received before EOF
        received: usize,
    },

    /// Decoded payload is not a message the relay understands
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Telemetry line from the actuator controller could not be parsed
    #[error("Invalid telemetry line: {0}")]
    InvalidTelemetry(String),

    /// No actuator controller answered on any candidate port
    #[error("No actuator controller found")]
    NoActuatorFound,

    /// Capture source failure
    #[error("Capture error: {0}")]
    Capture(String),

    /// Image encoding failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the error means the peer went away (orderly or not)
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}
