//! Error handling for the lock emulator service
//!
//! Protocol-level rejections (bad CRC, out-of-range register, unsupported
//! function) are not errors in this sense: they are answered on the wire or
//! recorded in statistics. `LockSrvError` covers the conditions that stop the
//! service itself, such as an unusable configuration or a lost serial port.

use thiserror::Error;

/// Service-level error type
#[derive(Error, Debug, Clone)]
pub enum LockSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Serial port open, read, or write failures
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Operation timeout errors
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Wire protocol errors that cannot be answered in-band
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the lock emulator service
pub type Result<T> = std::result::Result<T, LockSrvError>;

impl LockSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        LockSrvError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        LockSrvError::IoError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        LockSrvError::TransportError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        LockSrvError::TimeoutError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        LockSrvError::ProtocolError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        LockSrvError::InternalError(msg.into())
    }
}

impl From<std::io::Error> for LockSrvError {
    fn from(err: std::io::Error) -> Self {
        LockSrvError::IoError(err.to_string())
    }
}

impl From<figment::Error> for LockSrvError {
    fn from(err: figment::Error) -> Self {
        LockSrvError::ConfigError(err.to_string())
    }
}

impl From<tokio_serial::Error> for LockSrvError {
    fn from(err: tokio_serial::Error) -> Self {
        LockSrvError::TransportError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockSrvError::config("bad baud rate");
        assert_eq!(err.to_string(), "Configuration error: bad baud rate");

        let err = LockSrvError::transport("port gone");
        assert_eq!(err.to_string(), "Transport error: port gone");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such port");
        let err: LockSrvError = io_err.into();
        assert!(matches!(err, LockSrvError::IoError(_)));
    }
}
