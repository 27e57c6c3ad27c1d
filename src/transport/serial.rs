//! Serial port link
//!
//! Opens the port through tokio-serial and adapts it to [`SerialLink`].
//! Reads are wrapped in a timeout so a silent line reports `Ok(0)` instead
//! of blocking the poll loop.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::error::{LockSrvError, Result};
use crate::transport::SerialLink;

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialPortConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM1")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// Bounded read poll duration, milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialPortConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
            read_timeout_ms: 1,
        }
    }
}

impl SerialPortConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(LockSrvError::config("Port path cannot be empty"));
        }
        if !(300..=1_000_000).contains(&self.baud_rate) {
            return Err(LockSrvError::config(
                "Baud rate must be between 300 and 1000000",
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(LockSrvError::config(
                "Read timeout must be at least one millisecond",
            ));
        }
        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(LockSrvError::config("Data bits must be 5, 6, 7, or 8"));
        }
        if ![1, 2].contains(&self.stop_bits) {
            return Err(LockSrvError::config("Stop bits must be 1 or 2"));
        }
        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(LockSrvError::config("Parity must be None, Even, or Odd"));
        }
        Ok(())
    }

    fn parse_parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn parse_data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn parse_stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Real serial port behind the [`SerialLink`] seam
pub struct SerialPortLink {
    config: SerialPortConfig,
    port: SerialStream,
}

impl SerialPortLink {
    /// Validate the configuration and open the port
    pub fn open(config: SerialPortConfig) -> Result<Self> {
        config.validate()?;

        debug!("Opening serial port: {}", config.port);
        #[allow(unused_mut)]
        let mut port = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(config.parse_data_bits())
            .parity(config.parse_parity())
            .stop_bits(config.parse_stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                LockSrvError::transport(format!("Failed to open serial port {}: {e}", config.port))
            })?;

        #[cfg(unix)]
        port.set_exclusive(false)
            .map_err(|e| LockSrvError::transport(format!("Failed to set exclusive mode: {e}")))?;

        info!(
            "Opened serial port {} at {} baud",
            config.port, config.baud_rate
        );
        Ok(Self { config, port })
    }
}

#[async_trait]
impl SerialLink for SerialPortLink {
    async fn read_available(&mut self, buf: &mut [u8], read_timeout: Duration) -> Result<usize> {
        match timeout(read_timeout, self.port.read(buf)).await {
            Ok(Ok(n)) => {
                if n > 0 {
                    debug!(
                        hex_data = %buf[..n].iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
                        length = n,
                        direction = "recv",
                        "[Serial] Raw packet"
                    );
                }
                Ok(n)
            }
            Ok(Err(e)) => Err(LockSrvError::transport(format!("Serial read failed: {e}"))),
            // The line was simply quiet
            Err(_) => Ok(0),
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .await
            .map_err(|e| LockSrvError::transport(format!("Serial write failed: {e}")))?;
        self.port
            .flush()
            .await
            .map_err(|e| LockSrvError::transport(format!("Serial flush failed: {e}")))?;
        debug!(
            hex_data = %bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" "),
            length = bytes.len(),
            direction = "send",
            "[Serial] Raw packet"
        );
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }
}
