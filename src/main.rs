//! locksrv binary entry point

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use locksrv::bootstrap::{self, Args};
use locksrv::core::events::{EmulatorEvent, EventSender};
use locksrv::runtime::EmulatorRuntime;
use locksrv::transport::serial::SerialPortLink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    bootstrap::initialize_logging(&args);

    let config = bootstrap::resolve_config(&args).context("Failed to resolve configuration")?;
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let link = SerialPortLink::open(config.serial.clone())
        .context("Failed to open serial port")?;

    let (events, mut event_rx) = EventSender::channel();
    let runtime = EmulatorRuntime::spawn(Box::new(link), &config, events);

    // Console reporting lives off the protocol path
    let reporter = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                EmulatorEvent::LockStateChanged {
                    device_address,
                    lock_index,
                    now_closed,
                } => {
                    let state = if now_closed { "CLOSED" } else { "OPENED" };
                    info!(device = device_address, "Lock #{} {state}", lock_index + 1);
                }
                EmulatorEvent::ErrorOccurred(detail) => {
                    warn!("\n{}", detail.format_detailed());
                }
                _ => {}
            }
        }
    });

    info!("Emulator started, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    let stats = runtime.stop().await?;
    reporter.abort();
    println!("{}", stats.summary());
    Ok(())
}
