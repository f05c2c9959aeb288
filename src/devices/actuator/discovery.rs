//! Actuator controller port discovery
//!
//! Candidates come from the OS port enumeration plus a scan of `/dev` for
//! USB CDC/serial adapters. Ports that look like a microcontroller board are
//! tried first.

use serialport::SerialPortType;
use std::collections::HashSet;
use std::path::Path;

/// Device name prefixes scanned under `/dev`
const DEV_PREFIXES: [&str; 2] = ["ttyACM", "ttyUSB"];

/// Name fragments that suggest a controller board
const PREFERRED_HINTS: [&str; 3] = ["usb", "acm", "arduino"];

/// A port that may host the actuator controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub usb: bool,
    pub hint: Option<String>,
}

impl Candidate {
    fn score(&self) -> u8 {
        let name = self.path.to_lowercase();
        let hinted = PREFERRED_HINTS.iter().any(|h| name.contains(h))
            || self
                .hint
                .as_deref()
                .is_some_and(|h| h.to_lowercase().contains("arduino"));
        match (self.usb, hinted) {
            (true, true) => 0,
            (true, false) | (false, true) => 1,
            (false, false) => 2,
        }
    }
}

/// Enumerate candidate ports, most likely first
pub fn candidate_ports() -> Vec<Candidate> {
    let mut candidates = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let (usb, hint) = match info.port_type {
                    SerialPortType::UsbPort(usb) => (true, usb.manufacturer.or(usb.product)),
                    _ => (false, None),
                };
                candidates.push(Candidate {
                    path: info.port_name,
                    usb,
                    hint,
                });
            }
        }
        Err(e) => log::debug!("Serial port enumeration failed: {}", e),
    }

    candidates.extend(scan_dev(Path::new("/dev")));
    rank(candidates)
}

/// Scan a device directory for USB serial nodes
fn scan_dev(dir: &Path) -> Vec<Candidate> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            DEV_PREFIXES
                .iter()
                .any(|p| name.starts_with(p))
                .then(|| Candidate {
                    path: entry.path().to_string_lossy().into_owned(),
                    usb: true,
                    hint: None,
                })
        })
        .collect()
}

/// Drop duplicate paths (first seen wins) and sort by preference
pub fn rank(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| seen.insert(c.path.clone()))
        .collect();
    unique.sort_by(|a, b| a.score().cmp(&b.score()).then_with(|| a.path.cmp(&b.path)));
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, usb: bool, hint: Option<&str>) -> Candidate {
        Candidate {
            path: path.to_string(),
            usb,
            hint: hint.map(str::to_string),
        }
    }

    #[test]
    fn test_rank_prefers_usb_boards() {
        let ranked = rank(vec![
            candidate("/dev/ttyS0", false, None),
            candidate("/dev/ttyUSB0", true, None),
            candidate("/dev/ttyAMA0", true, Some("Arduino (www.arduino.cc)")),
            candidate("/dev/ttyACM0", true, None),
        ]);
        let paths: Vec<&str> = ranked.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/dev/ttyACM0", "/dev/ttyAMA0", "/dev/ttyUSB0", "/dev/ttyS0"]
        );
    }

    #[test]
    fn test_rank_dedups() {
        let ranked = rank(vec![
            candidate("/dev/ttyACM0", true, Some("Arduino")),
            candidate("/dev/ttyACM0", true, None),
        ]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].hint.as_deref(), Some("Arduino"));
    }

    #[test]
    fn test_scan_dev_filters_names() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["ttyACM0", "ttyUSB3", "ttyS0", "null"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let mut found: Vec<String> = scan_dev(dir.path())
            .into_iter()
            .map(|c| c.path.rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["ttyACM0", "ttyUSB3"]);
    }
}
