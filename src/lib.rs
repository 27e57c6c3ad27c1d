//! locksrv - CU48 Lock Controller Emulator
//!
//! A Modbus RTU slave emulator for the CU48 48-lock door controller.
//! It sits on a serial line, reassembles silence-delimited RTU frames,
//! and answers the eight standard function codes with CU48 lockstate
//! semantics (coil true = closed, 0xFF00 opens, 0x0000 closes).
//!
//! # Architecture
//!
//! - [`core`] - transport-independent protocol engine: CRC, frame
//!   synchronizer, dispatcher, device model, statistics, events
//! - [`transport`] - the serial seam ([`transport::SerialLink`]) and its
//!   tokio-serial implementation
//! - [`runtime`] - the single reader task tying link and core together
//! - [`config`] / [`bootstrap`] - figment configuration and process startup

pub mod bootstrap;
pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod transport;

pub use self::config::EmulatorConfig;
pub use self::core::events::{EmulatorEvent, EventSender};
pub use self::core::EmulatorCore;
pub use self::error::{LockSrvError, Result};
pub use self::runtime::EmulatorRuntime;
