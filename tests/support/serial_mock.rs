//! In-memory serial link for testing
//!
//! Stands in for a real port so the full runtime can be driven without
//! hardware. Incoming traffic is queued as chunks; each chunk is handed
//! to one read call, which lets tests reproduce byte-dribble arrival and
//! merged back-to-back frames exactly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use locksrv::transport::SerialLink;
use locksrv::Result;

/// Shared handle the test keeps after the link moves into the runtime
#[derive(Debug, Clone, Default)]
pub struct MockSerialBus {
    incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockSerialBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the emulator will receive on its next read
    pub fn push_incoming(&self, data: &[u8]) {
        self.incoming.lock().unwrap().push_back(data.to_vec());
    }

    /// Everything the emulator has transmitted, one entry per write call
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

/// The [`SerialLink`] half handed to the runtime
pub struct MockSerialLink {
    bus: MockSerialBus,
    baud_rate: u32,
}

impl MockSerialLink {
    pub fn new(bus: MockSerialBus, baud_rate: u32) -> Self {
        Self { bus, baud_rate }
    }
}

#[async_trait]
impl SerialLink for MockSerialLink {
    async fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let chunk = self.bus.incoming.lock().unwrap().pop_front();
        match chunk {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => {
                // Simulate a quiet line
                tokio::time::sleep(timeout).await;
                Ok(0)
            }
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.bus.written.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}
