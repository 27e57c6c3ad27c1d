//! Emulator run loop
//!
//! Single reader task over the serial link. Bytes feed the core as they
//! arrive; when a read times out the accumulated idle time drives frame
//! extraction. Responses go out after a short turnaround pause so the
//! master has released the half-duplex line.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EmulatorConfig;
use crate::core::events::EventSender;
use crate::core::stats::Statistics;
use crate::core::EmulatorCore;
use crate::error::Result;
use crate::transport::SerialLink;

/// Timing knobs resolved from the configuration
struct LoopTiming {
    /// Poll granularity for the serial read
    read_slice: Duration,
    turnaround: Duration,
    snapshot_interval: Duration,
}

/// Running emulator bound to one serial link
pub struct EmulatorRuntime {
    cancel: CancellationToken,
    handle: JoinHandle<Statistics>,
}

impl EmulatorRuntime {
    /// Spawn the reader task over `link`
    pub fn spawn(
        link: Box<dyn SerialLink>,
        config: &EmulatorConfig,
        events: EventSender,
    ) -> Self {
        let core = EmulatorCore::new(
            link.baud_rate(),
            config.devices.base_address,
            config.devices.count,
            config.protocol.zero_count_reads_all,
            events,
        )
        .with_max_buffer(config.protocol.max_buffer_len);
        let timing = LoopTiming {
            read_slice: Duration::from_millis(config.serial.read_timeout_ms),
            turnaround: Duration::from_millis(config.protocol.turnaround_delay_ms),
            snapshot_interval: Duration::from_secs(config.protocol.snapshot_interval_secs),
        };

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle =
            tokio::spawn(async move { run_loop(link, core, timing, task_cancel).await });

        Self { cancel, handle }
    }

    /// Stop the reader and return the final statistics
    pub async fn stop(self) -> Result<Statistics> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| crate::error::LockSrvError::internal(format!("Reader task panicked: {e}")))
    }
}

async fn run_loop(
    mut link: Box<dyn SerialLink>,
    mut core: EmulatorCore,
    timing: LoopTiming,
    cancel: CancellationToken,
) -> Statistics {
    info!(
        devices = core.registry().len(),
        frame_gap_us = core.frame_gap().as_micros() as u64,
        "Emulator running"
    );

    let mut buf = [0u8; 512];
    let mut last_rx = Instant::now();
    let mut last_snapshot = Instant::now();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            result = link.read_available(&mut buf, timing.read_slice) => result,
        };

        match read {
            Ok(n) if n > 0 => {
                core.feed(&buf[..n]);
                last_rx = Instant::now();
            }
            Ok(_) => {
                let responses = core.poll_idle(last_rx.elapsed());
                for response in responses {
                    // Let the master drop its transmitter first
                    tokio::time::sleep(timing.turnaround).await;
                    match link.write_all(&response).await {
                        Ok(()) => core.record_response_sent(&response),
                        Err(e) => error!("Failed to write response: {e}"),
                    }
                }
            }
            Err(e) => {
                // A dead link is not recoverable from inside the loop
                error!("Serial read failed, stopping emulator: {e}");
                break;
            }
        }

        if last_snapshot.elapsed() >= timing.snapshot_interval {
            core.emit_statistics_snapshot();
            last_snapshot = Instant::now();
        }
    }

    debug!("Reader task stopping");
    core.stats().clone()
}
