//! Observer channel for emulator activity
//!
//! Events are fire-and-forget over an unbounded channel so the protocol
//! path never blocks on a slow consumer. A dropped receiver silences the
//! stream without erroring.

use tokio::sync::mpsc;

use crate::core::stats::{ErrorDetail, Statistics};

/// Something the emulator did or saw on the bus
#[derive(Debug, Clone)]
pub enum EmulatorEvent {
    /// A complete frame was extracted from the receive buffer
    FrameReceived { raw: Vec<u8>, crc_valid: bool },
    /// A response frame was written to the bus
    ResponseSent { raw: Vec<u8> },
    /// A coil write actually flipped a lock
    LockStateChanged {
        device_address: u8,
        lock_index: u8,
        now_closed: bool,
    },
    /// Periodic counter snapshot
    StatisticsSnapshot(Box<Statistics>),
    /// A frame was rejected
    ErrorOccurred(ErrorDetail),
}

/// Sending half handed to the emulator core
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<EmulatorEvent>>,
}

impl EventSender {
    /// Channel pair for a consumer that wants the event stream
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EmulatorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sender that discards everything, for headless use and tests
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit without blocking; a closed receiver is ignored
    pub fn emit(&self, event: EmulatorEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sender, mut rx) = EventSender::channel();
        sender.emit(EmulatorEvent::FrameReceived {
            raw: vec![0x01],
            crc_valid: true,
        });
        sender.emit(EmulatorEvent::ResponseSent { raw: vec![0x02] });

        match rx.recv().await.unwrap() {
            EmulatorEvent::FrameReceived { raw, crc_valid } => {
                assert_eq!(raw, vec![0x01]);
                assert!(crc_valid);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            EmulatorEvent::ResponseSent { raw } => assert_eq!(raw, vec![0x02]),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sender, rx) = EventSender::channel();
        drop(rx);
        sender.emit(EmulatorEvent::ResponseSent { raw: vec![] });
    }

    #[test]
    fn test_disabled_sender_discards() {
        let sender = EventSender::disabled();
        sender.emit(EmulatorEvent::ResponseSent { raw: vec![0xFF] });
    }
}
