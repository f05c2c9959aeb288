//! Configuration for the SetuIO relay
//!
//! Loads configuration from a TOML file. Every field has a default, so a
//! partial file (or no file at all) yields a usable configuration.

use crate::devices::actuator::LineFormat;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/setu-io.toml";

/// Largest accepted test pattern width or height
pub const MAX_CAPTURE_DIM: u32 = 4096;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub actuator: ActuatorConfig,
    pub watchdog: WatchdogConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

/// Operator-facing TCP listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address
    ///
    /// Examples:
    /// - `[::]:5000` - All interfaces, IPv4 and IPv6 when `dual_stack` is set
    /// - `0.0.0.0:5000` - All IPv4 interfaces
    /// - `127.0.0.1:5000` - Localhost only
    pub bind_address: String,
    /// Accept IPv4-mapped connections on an IPv6 wildcard socket
    pub dual_stack: bool,
    /// Session socket read timeout; bounds how fast a session notices takeover
    pub read_timeout_ms: u64,
    /// Session socket write timeout
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "[::]:5000".to_string(),
            dual_stack: true,
            read_timeout_ms: 200,
            write_timeout_ms: 1000,
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Actuator controller serial link
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Serial device path; auto-discovered when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Wait after opening the port (controller resets on line open)
    pub settle_ms: u64,
    /// Port read timeout for the background reader
    pub read_timeout_ms: u64,
    /// Motor line layout expected by the controller firmware
    pub line_format: LineFormat,
    /// Send a telemetry request after each applied command
    pub request_telemetry: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 115_200,
            settle_ms: 2000,
            read_timeout_ms: 100,
            line_format: LineFormat::FiveChannel,
            request_telemetry: false,
        }
    }
}

/// Command staleness watchdog
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Maximum age of an applied command before all motors are stopped
    pub timeout_ms: u64,
    /// Poll period = timeout / poll_divisor (4..=20)
    pub poll_divisor: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            poll_divisor: 10,
        }
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_period(&self) -> Duration {
        crate::watchdog::poll_period(self.timeout(), self.poll_divisor)
    }
}

/// Which capture source to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSourceKind {
    /// Synthetic moving test pattern
    #[default]
    Pattern,
    /// Cycle through image files in `directory`
    Directory,
}

/// Camera capture
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub source: CaptureSourceKind,
    /// Frame directory for [`CaptureSourceKind::Directory`]
    pub directory: String,
    /// Pause between capture attempts
    pub interval_ms: u64,
    /// Test pattern size
    pub width: u32,
    pub height: u32,
    /// JPEG quality for the test pattern (1-100)
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: CaptureSourceKind::Pattern,
            directory: "/var/lib/setu-io/frames".to_string(),
            interval_ms: 100,
            width: 320,
            height: 240,
            jpeg_quality: 70,
        }
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use setu_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("setu-io.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the default path is missing
    ///
    /// An explicitly given path that does not exist is an error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        let nonzero = [
            ("network.read_timeout_ms", self.network.read_timeout_ms),
            ("network.write_timeout_ms", self.network.write_timeout_ms),
            ("actuator.read_timeout_ms", self.actuator.read_timeout_ms),
            ("watchdog.timeout_ms", self.watchdog.timeout_ms),
            ("capture.interval_ms", self.capture.interval_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.actuator.baud_rate == 0 {
            return Err(Error::Config("actuator.baud_rate must be greater than zero".into()));
        }
        if !(4..=20).contains(&self.watchdog.poll_divisor) {
            return Err(Error::Config(format!(
                "watchdog.poll_divisor must be within 4..=20, got {}",
                self.watchdog.poll_divisor
            )));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(Error::Config(format!(
                "capture.jpeg_quality must be within 1..=100, got {}",
                self.capture.jpeg_quality
            )));
        }
        for (name, value) in [
            ("capture.width", self.capture.width),
            ("capture.height", self.capture.height),
        ] {
            if !(1..=MAX_CAPTURE_DIM).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within 1..={}, got {}",
                    name, MAX_CAPTURE_DIM, value
                )));
            }
        }
        Ok(())
    }

    /// Parsed listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.network.bind_address.parse().map_err(|e| {
            Error::Config(format!(
                "Invalid network.bind_address '{}': {}",
                self.network.bind_address, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.network.bind_address, "[::]:5000");
        assert!(config.network.dual_stack);
        assert_eq!(config.actuator.port, None);
        assert_eq!(config.actuator.baud_rate, 115_200);
        assert_eq!(config.actuator.settle_ms, 2000);
        assert_eq!(config.watchdog.timeout(), Duration::from_secs(1));
        assert_eq!(config.watchdog.poll_period(), Duration::from_millis(100));
        assert!(!config.capture.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[actuator]"));
        assert!(toml_string.contains("[watchdog]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[logging]"));

        assert!(toml_string.contains("timeout_ms = 1000"));
        assert!(toml_string.contains("line_format = \"five_channel\""));
        assert!(!toml_string.contains("port ="));
    }

    #[test]
    fn test_partial_toml() {
        let toml_content = r#"
[actuator]
port = "/dev/ttyACM0"
line_format = "legacy"

[watchdog]
timeout_ms = 500

[capture]
enabled = true
source = "directory"
directory = "/tmp/frames"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.actuator.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.actuator.line_format, LineFormat::Legacy);
        assert_eq!(config.actuator.baud_rate, 115_200);
        assert_eq!(config.watchdog.timeout_ms, 500);
        assert_eq!(config.watchdog.poll_divisor, 10);
        assert_eq!(config.capture.source, CaptureSourceKind::Directory);
        assert_eq!(config.network.bind_address, "[::]:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setu-io.toml");

        let mut config = AppConfig::default();
        config.network.bind_address = "127.0.0.1:6000".to_string();
        config.actuator.port = Some("/dev/ttyUSB1".to_string());
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.network.bind_address, "127.0.0.1:6000");
        assert_eq!(loaded.actuator.port.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.watchdog.poll_divisor = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.watchdog.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.jpeg_quality = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.height = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.width = 100_000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = AppConfig::default();
        config.capture.width = MAX_CAPTURE_DIM;
        config.capture.height = MAX_CAPTURE_DIM;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: AppConfig = toml::from_str(include_str!("../config/setu-io.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.bind_address, "[::]:5000");
        assert_eq!(config.actuator.port, None);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(AppConfig::load(Some("/nonexistent/setu-io.toml")).is_err());
    }
}
