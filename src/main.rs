//! SetuIO - Vehicle-side relay daemon
//!
//! - **TCP (port 5000)**: length-prefixed JSON, one active operator at a time
//! - **Serial**: `M,...` motor lines out, `R,...` telemetry lines in

use setu_io::{AppConfig, RelayApp, Result};
use std::env;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `setu-io <path>` (positional)
/// - `setu-io --config <path>` (flag-based)
/// - `setu-io -c <path>` (short flag)
///
/// Returns `None` when not given; the default path is then used if present.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Filter used until the configured level is known
const DEFAULT_LOG_LEVEL: &str = "info";

/// `RUST_LOG` takes precedence over `level`
fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logger(DEFAULT_LOG_LEVEL);
            log::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    init_logger(&config.logging.level);

    log::info!("SetuIO v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => log::info!("Using config: {}", path),
        None => log::info!("Using config: {} (or built-in defaults)", setu_io::config::DEFAULT_CONFIG_PATH),
    }

    let app = RelayApp::new(config)?;
    app.install_signal_handler()?;
    app.run()
}
