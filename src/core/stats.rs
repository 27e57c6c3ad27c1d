//! Request statistics and recent-error log

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::core::pdu;

/// Kept error details, oldest dropped first
pub const ERROR_LOG_CAPACITY: usize = 5;

/// Classification of a rejected frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Checksum mismatch on an otherwise plausible frame
    Crc,
    /// Frame too short or buffer overflow
    Framing,
    /// Function code the emulator does not implement
    Unsupported,
    /// Stale partial frame flushed from the buffer
    Timeout,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Crc => "CRC",
            ErrorKind::Framing => "FRAMING",
            ErrorKind::Unsupported => "UNSUPPORTED",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }
}

/// One rejected frame with enough context to debug the bus
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub timestamp: DateTime<Local>,
    pub kind: ErrorKind,
    pub frame: Vec<u8>,
    pub description: String,
    /// Expected CRC bytes, when the rejection was a checksum mismatch
    pub expected: Option<Vec<u8>>,
    /// Byte offset of the first mismatching byte, for the `^^` marker
    pub offset: Option<usize>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, frame: Vec<u8>, description: String) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            frame,
            description,
            expected: None,
            offset: None,
        }
    }

    pub fn with_crc_mismatch(mut self, expected: Vec<u8>, offset: usize) -> Self {
        self.expected = Some(expected);
        self.offset = Some(offset);
        self
    }

    /// Multi-line report with the raw frame in hex and a marker under the
    /// bytes that failed verification.
    pub fn format_detailed(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "[{}] {} error: {}\n",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.kind.label(),
            self.description
        ));
        let hex_line: Vec<String> = self.frame.iter().map(|b| format!("{b:02X}")).collect();
        out.push_str(&format!("  frame: {}\n", hex_line.join(" ")));
        if let Some(offset) = self.offset {
            // Each byte renders as two hex chars plus a space
            let mut marker = String::from("  frame: ");
            marker.push_str(&"   ".repeat(offset));
            marker.push_str("^^");
            out.push_str(&marker);
            out.push('\n');
        }
        if let Some(expected) = &self.expected {
            let hex: Vec<String> = expected.iter().map(|b| format!("{b:02X}")).collect();
            out.push_str(&format!("  expected CRC: {}\n", hex.join(" ")));
        }
        out
    }
}

/// Running counters for the emulator session
#[derive(Debug, Clone)]
pub struct Statistics {
    pub total_requests: u64,
    pub valid_requests: u64,
    pub invalid_requests: u64,
    pub crc_errors: u64,
    pub framing_errors: u64,
    pub unsupported_requests: u64,
    pub timeout_errors: u64,
    pub responses_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub locks_opened: u64,
    pub locks_closed: u64,
    /// Valid requests per device address
    pub requests_by_device: BTreeMap<u8, u64>,
    /// Valid requests per function code (exception bit stripped)
    pub requests_by_function: BTreeMap<u8, u64>,
    pub recent_errors: VecDeque<ErrorDetail>,
    start_time: Instant,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            total_requests: 0,
            valid_requests: 0,
            invalid_requests: 0,
            crc_errors: 0,
            framing_errors: 0,
            unsupported_requests: 0,
            timeout_errors: 0,
            responses_sent: 0,
            bytes_received: 0,
            bytes_sent: 0,
            locks_opened: 0,
            locks_closed: 0,
            requests_by_device: BTreeMap::new(),
            requests_by_function: BTreeMap::new(),
            recent_errors: VecDeque::with_capacity(ERROR_LOG_CAPACITY),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count a valid request against its device and function code
    pub fn record_valid(&mut self, device_address: u8, function_code: u8) {
        self.valid_requests += 1;
        *self.requests_by_device.entry(device_address).or_insert(0) += 1;
        *self
            .requests_by_function
            .entry(function_code & 0x7F)
            .or_insert(0) += 1;
    }

    /// Count a rejected frame and keep its detail in the ring
    ///
    /// Unsupported function codes still get an exception response, so they
    /// count toward the unsupported tally without inflating the invalid one.
    pub fn record_error(&mut self, detail: ErrorDetail) {
        match detail.kind {
            ErrorKind::Crc => {
                self.crc_errors += 1;
                self.invalid_requests += 1;
            }
            ErrorKind::Framing => {
                self.framing_errors += 1;
                self.invalid_requests += 1;
            }
            ErrorKind::Timeout => {
                self.timeout_errors += 1;
                self.invalid_requests += 1;
            }
            ErrorKind::Unsupported => self.unsupported_requests += 1,
        }
        if self.recent_errors.len() == ERROR_LOG_CAPACITY {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(detail);
    }

    pub fn record_lock_change(&mut self, now_closed: bool) {
        if now_closed {
            self.locks_closed += 1;
        } else {
            self.locks_opened += 1;
        }
    }

    /// Zero the counters without touching device state
    pub fn reset(&mut self) {
        *self = Statistics::new();
    }

    /// Multi-section text report for the console
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Emulator Statistics ===\n");
        out.push_str(&format!("uptime: {}s\n", self.uptime_secs()));
        out.push_str(&format!(
            "requests: {} total, {} valid, {} invalid\n",
            self.total_requests, self.valid_requests, self.invalid_requests
        ));
        out.push_str(&format!(
            "errors: {} CRC, {} framing, {} unsupported, {} timeout\n",
            self.crc_errors, self.framing_errors, self.unsupported_requests, self.timeout_errors
        ));
        out.push_str(&format!(
            "traffic: {} responses, {} bytes in, {} bytes out\n",
            self.responses_sent, self.bytes_received, self.bytes_sent
        ));
        out.push_str(&format!(
            "locks: {} opened, {} closed\n",
            self.locks_opened, self.locks_closed
        ));

        if !self.requests_by_device.is_empty() {
            out.push_str("by device:\n");
            for (addr, count) in &self.requests_by_device {
                out.push_str(&format!("  device {addr}: {count}\n"));
            }
        }
        if !self.requests_by_function.is_empty() {
            out.push_str("by function:\n");
            for (code, count) in &self.requests_by_function {
                out.push_str(&format!(
                    "  0x{code:02X} {}: {count}\n",
                    pdu::function_name(*code)
                ));
            }
        }
        if !self.recent_errors.is_empty() {
            out.push_str("recent errors:\n");
            for detail in &self.recent_errors {
                for line in detail.format_detailed().lines() {
                    out.push_str(&format!("  {line}\n"));
                }
            }
        }
        out
    }
}
