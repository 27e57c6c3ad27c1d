//! Protocol engine for the CU48 lock-controller emulator
//!
//! [`EmulatorCore`] ties the frame synchronizer, device registry,
//! dispatcher, and statistics together behind a transport-agnostic API:
//! the caller feeds raw bytes in, signals idle time, and gets complete
//! response frames back. Nothing in here touches a serial port, which is
//! what makes the whole protocol path testable in-memory.

pub mod crc;
pub mod device;
pub mod dispatcher;
pub mod events;
pub mod frame;
pub mod pdu;
pub mod stats;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::device::DeviceRegistry;
use crate::core::events::{EmulatorEvent, EventSender};
use crate::core::frame::{DiscardReason, FrameSynchronizer, SyncOutput, MIN_FRAME_LEN};
use crate::core::stats::{ErrorDetail, ErrorKind, Statistics};

/// Transport-independent emulator state machine
pub struct EmulatorCore {
    registry: DeviceRegistry,
    synchronizer: FrameSynchronizer,
    stats: Statistics,
    events: EventSender,
}

impl EmulatorCore {
    pub fn new(
        baud_rate: u32,
        base_address: u8,
        device_count: u8,
        zero_count_reads_all: bool,
        events: EventSender,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(base_address, device_count, zero_count_reads_all),
            synchronizer: FrameSynchronizer::new(baud_rate),
            stats: Statistics::new(),
            events,
        }
    }

    /// Override the receive buffer cap
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.synchronizer = self.synchronizer.with_max_buffer(max_buffer);
        self
    }

    /// Bytes read from the bus, in whatever chunks the transport delivers
    pub fn feed(&mut self, bytes: &[u8]) {
        self.stats.bytes_received += bytes.len() as u64;
        self.synchronizer.feed(bytes);
    }

    /// Run extraction after `idle` time with no new bytes; returns the
    /// response frames to transmit, in request order.
    pub fn poll_idle(&mut self, idle: Duration) -> Vec<Vec<u8>> {
        let mut responses = Vec::new();
        for output in self.synchronizer.extract(idle) {
            match output {
                SyncOutput::Frame(frame) => {
                    if let Some(response) = self.process_frame(&frame) {
                        responses.push(response);
                    }
                }
                SyncOutput::Discard { bytes, reason } => self.record_discard(bytes, reason),
            }
        }
        responses
    }

    /// Handle one delimited frame; `None` means answer with silence
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        self.stats.total_requests += 1;

        if frame.len() < MIN_FRAME_LEN {
            self.events.emit(EmulatorEvent::FrameReceived {
                raw: frame.to_vec(),
                crc_valid: false,
            });
            let detail = ErrorDetail::new(
                ErrorKind::Framing,
                frame.to_vec(),
                format!("frame of {} bytes, minimum is {MIN_FRAME_LEN}", frame.len()),
            );
            warn!("framing error: {}", detail.description);
            self.record_error(detail);
            return None;
        }

        let crc_valid = crc::verify(frame);
        self.events.emit(EmulatorEvent::FrameReceived {
            raw: frame.to_vec(),
            crc_valid,
        });

        if !crc_valid {
            let received = &frame[frame.len() - 2..];
            let mut detail = ErrorDetail::new(
                ErrorKind::Crc,
                frame.to_vec(),
                format!("CRC mismatch, got {}", hex::encode_upper(received)),
            );
            if let Some(expected) = crc::expected_bytes(frame) {
                detail = detail.with_crc_mismatch(expected.to_vec(), frame.len() - 2);
            }
            warn!("CRC error on {}-byte frame", frame.len());
            self.record_error(detail);
            return None;
        }

        let address = frame[0];
        let function = frame[1];
        self.stats.record_valid(address, function);

        let body = &frame[..frame.len() - 2];
        let outcome = match self.registry.lookup_mut(address) {
            Some(device) => dispatcher::dispatch(device, body),
            None => {
                debug!(address, "frame for another device, staying silent");
                return None;
            }
        };

        if outcome.unsupported {
            let detail = ErrorDetail::new(
                ErrorKind::Unsupported,
                frame.to_vec(),
                format!("unsupported function code 0x{function:02X}"),
            );
            warn!("unsupported function code 0x{function:02X}");
            self.record_error(detail);
        }

        if let Some(operation) = &outcome.operation {
            info!(device = address, "{operation}");
        }
        for change in &outcome.changes {
            if change.changed {
                self.stats.record_lock_change(change.now_closed);
                self.events.emit(EmulatorEvent::LockStateChanged {
                    device_address: address,
                    lock_index: change.index,
                    now_closed: change.now_closed,
                });
            }
        }

        Some(outcome.response)
    }

    /// Account for a response the transport has written out
    pub fn record_response_sent(&mut self, response: &[u8]) {
        self.stats.responses_sent += 1;
        self.stats.bytes_sent += response.len() as u64;
        self.events.emit(EmulatorEvent::ResponseSent {
            raw: response.to_vec(),
        });
    }

    pub fn emit_statistics_snapshot(&self) {
        self.events
            .emit(EmulatorEvent::StatisticsSnapshot(Box::new(
                self.stats.clone(),
            )));
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Zero the counters; device state is untouched
    pub fn reset_statistics(&mut self) {
        self.stats.reset();
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn frame_gap(&self) -> Duration {
        self.synchronizer.frame_gap()
    }

    fn record_discard(&mut self, bytes: Vec<u8>, reason: DiscardReason) {
        let detail = match reason {
            DiscardReason::Overflow => ErrorDetail::new(
                ErrorKind::Framing,
                bytes,
                "receive buffer overflow, bytes dropped".to_string(),
            ),
            DiscardReason::Stale => ErrorDetail::new(
                ErrorKind::Timeout,
                bytes,
                "stale partial frame flushed".to_string(),
            ),
        };
        warn!("{}", detail.description);
        self.record_error(detail);
    }

    fn record_error(&mut self, detail: ErrorDetail) {
        self.events
            .emit(EmulatorEvent::ErrorOccurred(detail.clone()));
        self.stats.record_error(detail);
    }
}
