//! Function-code dispatch for a single CRC-verified frame
//!
//! The input frame has already had its CRC stripped; the output is a
//! complete wire frame with the CRC appended, or `None` when the request
//! is a broadcast-style write the device answers silently (never the case
//! for the implemented codes, but exceptions and echoes both go out).

use crate::core::crc;
use crate::core::device::{Cu48Device, LockChange};
use crate::core::pdu::{self, ExceptionCode, FunctionCode};

/// Outcome of handling one addressed frame
#[derive(Debug)]
pub struct Dispatch {
    /// Full response frame, CRC included
    pub response: Vec<u8>,
    /// Log line for write operations ("Lock #5 OPENED/UNLOCKED")
    pub operation: Option<String>,
    /// Locks touched by the request
    pub changes: Vec<LockChange>,
    /// The function code was not one the emulator implements
    pub unsupported: bool,
}

impl Dispatch {
    fn reply(address: u8, function: u8, payload: Vec<u8>) -> Self {
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.push(address);
        frame.push(function);
        frame.extend_from_slice(&payload);
        Self {
            response: crc::append_crc(&frame),
            operation: None,
            changes: Vec::new(),
            unsupported: false,
        }
    }

    fn exception(address: u8, function: u8, code: ExceptionCode) -> Self {
        let frame = vec![address, function | 0x80, code as u8];
        Self {
            response: crc::append_crc(&frame),
            operation: None,
            changes: Vec::new(),
            unsupported: false,
        }
    }
}

/// Handle one frame addressed to `device`
///
/// `frame` is `[address][function][payload]` with the CRC already removed
/// and verified by the caller.
pub fn dispatch(device: &mut Cu48Device, frame: &[u8]) -> Dispatch {
    let address = frame[0];
    let function_raw = frame[1];
    let payload = &frame[2..];

    let Some(function) = FunctionCode::from_u8(function_raw) else {
        let mut out = Dispatch::exception(address, function_raw, ExceptionCode::IllegalFunction);
        out.unsupported = true;
        return out;
    };

    let result = match function {
        FunctionCode::ReadCoils => pdu::parse_read_request(payload)
            .and_then(|req| device.read_coils(req.start_address, req.quantity)),
        FunctionCode::ReadDiscreteInputs => pdu::parse_read_request(payload)
            .and_then(|req| device.read_discrete_inputs(req.start_address, req.quantity)),
        FunctionCode::ReadHoldingRegisters => pdu::parse_read_request(payload)
            .and_then(|req| device.read_holding_registers(req.start_address, req.quantity)),
        FunctionCode::ReadInputRegisters => pdu::parse_read_request(payload)
            .and_then(|req| device.read_input_registers(req.start_address, req.quantity)),
        FunctionCode::WriteSingleCoil => {
            return write_single_coil(device, address, function_raw, payload)
        }
        FunctionCode::WriteMultipleCoils => {
            return write_multiple_coils(device, address, function_raw, payload)
        }
        FunctionCode::WriteSingleRegister => pdu::parse_write_single_request(payload)
            .and_then(|req| device.write_single_register(req.address, req.value)),
        FunctionCode::WriteMultipleRegisters => pdu::parse_write_multiple_registers_request(payload)
            .and_then(|req| device.write_multiple_registers(req.start_address, &req.values)),
    };

    match result {
        Ok(payload) => Dispatch::reply(address, function_raw, payload),
        Err(code) => Dispatch::exception(address, function_raw, code),
    }
}

fn write_single_coil(
    device: &mut Cu48Device,
    address: u8,
    function_raw: u8,
    payload: &[u8],
) -> Dispatch {
    let result = pdu::parse_write_single_request(payload)
        .and_then(|req| device.write_single_coil(req.address, req.value));
    match result {
        Ok((echo, changes)) => {
            let mut out = Dispatch::reply(address, function_raw, echo);
            out.operation = changes.first().map(LockChange::describe);
            out.changes = changes;
            out
        }
        Err(code) => Dispatch::exception(address, function_raw, code),
    }
}

fn write_multiple_coils(
    device: &mut Cu48Device,
    address: u8,
    function_raw: u8,
    payload: &[u8],
) -> Dispatch {
    let result = pdu::parse_write_multiple_coils_request(payload)
        .and_then(|req| device.write_multiple_coils(req.start_address, req.quantity, &req.data));
    match result {
        Ok((echo, changes)) => {
            let described: Vec<String> = changes
                .iter()
                .filter(|c| c.changed)
                .map(LockChange::describe)
                .collect();
            let mut out = Dispatch::reply(address, function_raw, echo);
            if !described.is_empty() {
                out.operation = Some(described.join(", "));
            }
            out.changes = changes;
            out
        }
        Err(code) => Dispatch::exception(address, function_raw, code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Cu48Device {
        Cu48Device::new(1, false)
    }

    #[test]
    fn test_read_coils_all_closed() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x00, 0x00, 0x30]);
        assert_eq!(
            out.response,
            vec![0x01, 0x01, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xA1, 0x23]
        );
        assert!(out.operation.is_none());
    }

    #[test]
    fn test_write_single_coil_open_and_echo() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x05, 0x00, 0x00, 0xFF, 0x00]);
        assert_eq!(
            out.response,
            vec![0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]
        );
        assert_eq!(out.operation.as_deref(), Some("Lock #1 OPENED/UNLOCKED"));
        assert_eq!(out.changes.len(), 1);
        assert!(!out.changes[0].now_closed);

        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x00, 0x00, 0x08]);
        assert_eq!(out.response, vec![0x01, 0x01, 0x01, 0xFE, 0xD0, 0x08]);
    }

    #[test]
    fn test_read_past_last_lock_is_illegal_address() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x30, 0x00, 0x01]);
        assert_eq!(out.response, vec![0x01, 0x81, 0x02, 0xC1, 0x91]);
        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x2F, 0x00, 0x01]);
        assert_eq!(out.response, vec![0x01, 0x01, 0x01, 0x01, 0x90, 0x48]);
    }

    #[test]
    fn test_zero_count_read_is_illegal_value() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(out.response, vec![0x01, 0x81, 0x03, 0x00, 0x51]);
    }

    #[test]
    fn test_write_coil_out_of_range_and_bad_value() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x05, 0x00, 0x30, 0xFF, 0x00]);
        assert_eq!(out.response, vec![0x01, 0x85, 0x02, 0xC3, 0x51]);
        let out = dispatch(&mut dev, &[0x01, 0x05, 0x00, 0x00, 0x12, 0x34]);
        assert_eq!(out.response, vec![0x01, 0x85, 0x03, 0x02, 0x91]);
    }

    #[test]
    fn test_unknown_function_code() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x07]);
        assert_eq!(out.response, vec![0x01, 0x87, 0x01, 0x82, 0x30]);
        assert!(out.unsupported);
    }

    #[test]
    fn test_malformed_payload_is_device_failure() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x01, 0x00, 0x00]);
        assert_eq!(out.response[1], 0x81);
        assert_eq!(out.response[2], ExceptionCode::SlaveDeviceFailure as u8);
    }

    #[test]
    fn test_register_round_trip() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x03, 0x00, 0x03, 0x00, 0x01]);
        assert_eq!(out.response, vec![0x01, 0x03, 0x02, 0x02, 0x26, 0x38, 0xFE]);

        let out = dispatch(&mut dev, &[0x01, 0x06, 0x00, 0x10, 0x12, 0x34]);
        assert_eq!(
            out.response,
            vec![0x01, 0x06, 0x00, 0x10, 0x12, 0x34, 0x85, 0x78]
        );
        assert_eq!(dev.holding_register(0x10), 0x1234);
    }

    #[test]
    fn test_write_multiple_coils_echo_and_changes() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x0F, 0x00, 0x00, 0x00, 0x02, 0x01, 0x01]);
        assert_eq!(
            out.response,
            vec![0x01, 0x0F, 0x00, 0x00, 0x00, 0x02, 0xD4, 0x0A]
        );
        // bit 1 = 0 opened lock 2; lock 1 stayed closed
        assert_eq!(out.operation.as_deref(), Some("Lock #2 OPENED/UNLOCKED"));
        assert_eq!(out.changes.iter().filter(|c| c.changed).count(), 1);

        // All-zero data opens every addressed lock
        let out = dispatch(&mut dev, &[0x01, 0x0F, 0x00, 0x02, 0x00, 0x02, 0x01, 0x00]);
        assert_eq!(out.changes.iter().filter(|c| c.changed).count(), 2);
        assert_eq!(
            out.operation.as_deref(),
            Some("Lock #3 OPENED/UNLOCKED, Lock #4 OPENED/UNLOCKED")
        );
    }

    #[test]
    fn test_write_multiple_registers() {
        let mut dev = device();
        let out = dispatch(
            &mut dev,
            &[0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x00, 0x0B],
        );
        assert_eq!(
            out.response,
            vec![0x01, 0x10, 0x00, 0x00, 0x00, 0x02, 0x41, 0xC8]
        );
        assert_eq!(dev.holding_register(0), 0x000A);
        assert_eq!(dev.holding_register(1), 0x000B);
    }

    #[test]
    fn test_discrete_and_input_reads() {
        let mut dev = device();
        let out = dispatch(&mut dev, &[0x01, 0x02, 0x00, 0x00, 0x00, 0x08]);
        assert_eq!(out.response, vec![0x01, 0x02, 0x01, 0x00, 0xA1, 0x88]);
        let out = dispatch(&mut dev, &[0x01, 0x04, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(out.response, vec![0x01, 0x04, 0x02, 0x00, 0x00, 0xB9, 0x30]);
    }
}
