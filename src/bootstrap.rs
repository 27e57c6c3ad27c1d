//! Process startup: argument parsing, logging, config resolution

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::EmulatorConfig;
use crate::error::Result;

/// Command-line arguments for locksrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "locksrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "CU48 lock controller emulator (Modbus RTU slave)",
    long_about = None
)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "config/locksrv.yaml")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Serial port path, overrides the configuration file
    #[arg(short = 'p', long)]
    pub port: Option<String>,

    /// Baud rate, overrides the configuration file
    #[arg(short = 'b', long)]
    pub baud_rate: Option<u32>,

    /// Number of emulated devices, overrides the configuration file
    #[arg(short = 'n', long)]
    pub devices: Option<u8>,

    /// Validation mode, only check the configuration and exit
    #[arg(long)]
    pub validate: bool,
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over the command-line level when set.
pub fn initialize_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load the configuration and apply command-line overrides
pub fn resolve_config(args: &Args) -> Result<EmulatorConfig> {
    let mut config = EmulatorConfig::load(&args.config)?;

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(baud_rate) = args.baud_rate {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(devices) = args.devices {
        config.devices.count = devices;
    }
    config.validate()?;

    info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        devices = config.devices.count,
        base_address = config.devices.base_address,
        "Configuration resolved"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["locksrv"]);
        assert_eq!(args.config, "config/locksrv.yaml");
        assert_eq!(args.log_level, "info");
        assert!(args.port.is_none());
        assert!(!args.validate);
    }

    #[test]
    fn test_cli_overrides_win() {
        let args = Args::parse_from([
            "locksrv",
            "--config",
            "/nonexistent/locksrv.yaml",
            "--port",
            "/dev/ttyS9",
            "--baud-rate",
            "115200",
            "--devices",
            "4",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyS9");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.devices.count, 4);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from([
            "locksrv",
            "--config",
            "/nonexistent/locksrv.yaml",
            "--devices",
            "0",
        ]);
        assert!(resolve_config(&args).is_err());
    }
}
