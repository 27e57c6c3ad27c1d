//! RTU frame delimiting and recovery
//!
//! An RS-485 transport hands over raw byte chunks with no frame boundaries:
//! a single read may contain half a frame or three frames back to back. RTU
//! delimits frames by silence on the wire, so the synchronizer accumulates
//! bytes while they are arriving and only attempts extraction once the caller
//! reports an idle period of at least 3.5 character times.
//!
//! Extraction tests CRC validity on every prefix from the 4-byte minimum
//! upward and accepts the shortest valid one. Scanning shortest-first is what
//! lets two merged frames come apart again instead of being swallowed as one
//! long frame with a coincidentally matching CRC.

use std::time::Duration;

use crate::core::crc;

/// Minimum wire frame: address + function + CRC
pub const MIN_FRAME_LEN: usize = 4;

/// Buffer cap; line noise or a wedged sender must not grow memory unboundedly
pub const MAX_BUFFER_LEN: usize = 4096;

/// Idle period after which a buffer that never validated is flushed as garbage
pub const STALE_FLUSH_AFTER: Duration = Duration::from_millis(250);

/// Inter-frame silence threshold for a given baud rate
///
/// One character is 11 bits (1 start + 8 data + 1 stop, no parity). The RTU
/// gap is 3.5 character times, floored at 1.5 ms for fast links.
pub fn frame_gap(baud_rate: u32) -> Duration {
    let baud = baud_rate.max(300);
    let char_time_us = (11 * 1_000_000) / baud as u64;
    let gap_us = (char_time_us * 35) / 10;
    Duration::from_micros(gap_us.max(1_500))
}

/// Why buffered bytes were thrown away instead of framed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Buffer exceeded [`MAX_BUFFER_LEN`] without a valid prefix
    Overflow,
    /// Bytes sat unvalidated through a prolonged silence
    Stale,
}

/// One extraction result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutput {
    /// A complete, CRC-valid frame (address + function + payload + CRC)
    Frame(Vec<u8>),
    /// Bytes discarded without ever forming a frame
    Discard {
        bytes: Vec<u8>,
        reason: DiscardReason,
    },
}

/// Reassembles discrete RTU frames from a half-duplex byte stream
#[derive(Debug)]
pub struct FrameSynchronizer {
    buffer: Vec<u8>,
    frame_gap: Duration,
    max_buffer: usize,
}

impl FrameSynchronizer {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            buffer: Vec::new(),
            frame_gap: frame_gap(baud_rate),
            max_buffer: MAX_BUFFER_LEN,
        }
    }

    /// Override the buffer cap (tests exercise the overflow path)
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// The silence threshold this synchronizer was configured with
    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }

    /// Bytes currently held back waiting for more data or for silence
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a received chunk; never extracts
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Attempt extraction after `idle` time has passed since the last byte
    ///
    /// Returns nothing while bytes are still arriving (idle below the frame
    /// gap). Otherwise splits the buffer into zero or more complete frames,
    /// in arrival order, plus at most one discard record.
    pub fn extract(&mut self, idle: Duration) -> Vec<SyncOutput> {
        if self.buffer.is_empty() || idle < self.frame_gap {
            return Vec::new();
        }

        if self.buffer.len() > self.max_buffer {
            let bytes = std::mem::take(&mut self.buffer);
            return vec![SyncOutput::Discard {
                bytes,
                reason: DiscardReason::Overflow,
            }];
        }

        let mut outputs = Vec::new();
        while self.buffer.len() >= MIN_FRAME_LEN {
            match self.find_shortest_valid_prefix() {
                Some(len) => {
                    let frame = self.buffer.drain(..len).collect::<Vec<u8>>();
                    outputs.push(SyncOutput::Frame(frame));
                },
                None => break,
            }
        }

        // Whatever is left never validated. Keep it in case the tail of the
        // frame is still in flight, but not forever: after a silence far
        // beyond the frame gap it is line garbage and gets reported.
        if !self.buffer.is_empty() && idle >= STALE_FLUSH_AFTER {
            let bytes = std::mem::take(&mut self.buffer);
            outputs.push(SyncOutput::Discard {
                bytes,
                reason: DiscardReason::Stale,
            });
        }

        outputs
    }

    fn find_shortest_valid_prefix(&self) -> Option<usize> {
        (MIN_FRAME_LEN..=self.buffer.len()).find(|&len| crc::verify(&self.buffer[..len]))
    }
}
