//! Emulator configuration
//!
//! Layered figment loading: built-in defaults, then an optional YAML file,
//! then `LOCKSRV_`-prefixed environment variables (`LOCKSRV_SERIAL__PORT`
//! overrides `serial.port`).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{LockSrvError, Result};
use crate::transport::serial::SerialPortConfig;

/// How many devices the emulator can present on one bus
pub const MAX_DEVICES: u8 = 10;

/// Emulated device table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTableConfig {
    /// Number of CU48 controllers to emulate
    pub count: u8,
    /// Slave address of the first controller
    pub base_address: u8,
}

impl Default for DeviceTableConfig {
    fn default() -> Self {
        Self {
            count: 1,
            base_address: 1,
        }
    }
}

/// Protocol behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Treat Read Coils count 0 as "read through lock 48" for pollers that
    /// ship that quirk, instead of answering Illegal Data Value
    pub zero_count_reads_all: bool,
    /// Pause before transmitting a response, milliseconds
    pub turnaround_delay_ms: u64,
    /// Interval between statistics snapshot events, seconds
    pub snapshot_interval_secs: u64,
    /// Receive buffer cap before the synchronizer declares overflow
    pub max_buffer_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            zero_count_reads_all: false,
            turnaround_delay_ms: 2,
            snapshot_interval_secs: 1,
            max_buffer_len: crate::core::frame::MAX_BUFFER_LEN,
        }
    }
}

/// Complete emulator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmulatorConfig {
    #[serde(default)]
    pub serial: SerialPortConfig,
    #[serde(default)]
    pub devices: DeviceTableConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl EmulatorConfig {
    /// Load defaults, then the YAML file if it exists, then the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("LOCKSRV_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;

        if self.devices.count == 0 || self.devices.count > MAX_DEVICES {
            return Err(LockSrvError::config(format!(
                "Device count must be between 1 and {MAX_DEVICES}"
            )));
        }
        if self.devices.base_address == 0 {
            return Err(LockSrvError::config(
                "Base address 0 is the broadcast address",
            ));
        }
        let last = u16::from(self.devices.base_address) + u16::from(self.devices.count) - 1;
        if last > 247 {
            return Err(LockSrvError::config(
                "Device addresses must stay within 1..=247",
            ));
        }
        if self.protocol.snapshot_interval_secs == 0 {
            return Err(LockSrvError::config(
                "Snapshot interval must be at least one second",
            ));
        }
        // Room for at least one maximum-length request plus slack
        if self.protocol.max_buffer_len < 256 {
            return Err(LockSrvError::config(
                "Receive buffer must be at least 256 bytes",
            ));
        }
        Ok(())
    }
}
