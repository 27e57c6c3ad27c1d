//! Transport abstraction for the emulator
//!
//! The protocol engine only needs a byte pipe with a read timeout, so the
//! seam is a single trait. Production uses [`serial::SerialPortLink`];
//! tests plug in an in-memory mock.

pub mod serial;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Half-duplex byte link to the bus
#[async_trait]
pub trait SerialLink: Send {
    /// Read whatever is available within `timeout`.
    ///
    /// `Ok(0)` means the line stayed silent, which is the normal idle case
    /// and what drives frame-gap detection upstream.
    async fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write a complete response frame and flush it onto the wire
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Configured line speed, used to derive the frame gap
    fn baud_rate(&self) -> u32;
}
