//! Modbus PDU decoding and response construction
//!
//! Request parsing and response building for the eight function codes the
//! CU48 controller speaks. Parsers take the payload that follows the function
//! code byte; a payload too short for its function code maps to the Slave
//! Device Failure exception rather than an `Err` that could escape the
//! dispatch path.

/// Modbus function codes supported by the emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteSingleCoil = 0x05,
    WriteSingleRegister = 0x06,
    WriteMultipleCoils = 0x0F,
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Decode a raw function code; `None` means Illegal Function
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FunctionCode::ReadCoils),
            0x02 => Some(FunctionCode::ReadDiscreteInputs),
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x04 => Some(FunctionCode::ReadInputRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            0x0F => Some(FunctionCode::WriteMultipleCoils),
            0x10 => Some(FunctionCode::WriteMultipleRegisters),
            _ => None,
        }
    }

}

/// Display name for a raw function code, used in logs and statistics reports
pub fn function_name(code: u8) -> &'static str {
    match code {
        0x01 => "Read Coils",
        0x02 => "Read Discrete Inputs",
        0x03 => "Read Holding Registers",
        0x04 => "Read Input Registers",
        0x05 => "Write Single Coil",
        0x06 => "Write Single Register",
        0x0F => "Write Multiple Coils",
        0x10 => "Write Multiple Registers",
        _ => "Unknown",
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> u8 {
        code as u8
    }
}

/// Modbus exception codes the emulator can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    SlaveDeviceFailure = 0x04,
}

impl From<ExceptionCode> for u8 {
    fn from(code: ExceptionCode) -> u8 {
        code as u8
    }
}

/// Read request payload (0x01, 0x02, 0x03, 0x04)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub start_address: u16,
    pub quantity: u16,
}

/// Write single coil/register payload (0x05, 0x06)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRequest {
    pub address: u16,
    pub value: u16,
}

/// Write multiple coils payload (0x0F), bit data kept packed as received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest {
    pub start_address: u16,
    pub quantity: u16,
    pub data: Vec<u8>,
}

/// Write multiple registers payload (0x10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest {
    pub start_address: u16,
    pub quantity: u16,
    pub values: Vec<u16>,
}

pub fn parse_read_request(data: &[u8]) -> Result<ReadRequest, ExceptionCode> {
    if data.len() < 4 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    Ok(ReadRequest {
        start_address: u16::from_be_bytes([data[0], data[1]]),
        quantity: u16::from_be_bytes([data[2], data[3]]),
    })
}

pub fn parse_write_single_request(data: &[u8]) -> Result<WriteSingleRequest, ExceptionCode> {
    if data.len() < 4 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    Ok(WriteSingleRequest {
        address: u16::from_be_bytes([data[0], data[1]]),
        value: u16::from_be_bytes([data[2], data[3]]),
    })
}

pub fn parse_write_multiple_coils_request(
    data: &[u8],
) -> Result<WriteMultipleCoilsRequest, ExceptionCode> {
    if data.len() < 5 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    let byte_count = data[4] as usize;
    if data.len() < 5 + byte_count {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    Ok(WriteMultipleCoilsRequest {
        start_address: u16::from_be_bytes([data[0], data[1]]),
        quantity: u16::from_be_bytes([data[2], data[3]]),
        data: data[5..5 + byte_count].to_vec(),
    })
}

pub fn parse_write_multiple_registers_request(
    data: &[u8],
) -> Result<WriteMultipleRegistersRequest, ExceptionCode> {
    if data.len() < 5 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    let quantity = u16::from_be_bytes([data[2], data[3]]);
    let byte_count = data[4] as usize;
    if data.len() < 5 + byte_count || byte_count != quantity as usize * 2 {
        return Err(ExceptionCode::SlaveDeviceFailure);
    }
    let values = data[5..5 + byte_count]
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect();
    Ok(WriteMultipleRegistersRequest {
        start_address: u16::from_be_bytes([data[0], data[1]]),
        quantity,
        values,
    })
}

/// Pack boolean values into LSB-first coil response bytes
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let byte_count = values.len().div_ceil(8);
    let mut data = vec![0u8; byte_count];
    for (i, &value) in values.iter().enumerate() {
        if value {
            data[i / 8] |= 1 << (i % 8);
        }
    }
    data
}

/// Encode register values as big-endian response bytes
pub fn registers_to_be_bytes(values: &[u16]) -> Vec<u8> {
    let mut data = Vec::with_capacity(values.len() * 2);
    for &value in values {
        data.extend_from_slice(&value.to_be_bytes());
    }
    data
}

/// Read response payload after the function code: byte count + data
pub fn build_read_payload(data: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + data.len());
    payload.push(data.len() as u8);
    payload.extend_from_slice(data);
    payload
}

/// Write echo payload (0x05/0x06 echo the pair; 0x0F/0x10 echo start + count)
pub fn build_echo_payload(first: u16, second: u16) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    payload.extend_from_slice(&first.to_be_bytes());
    payload.extend_from_slice(&second.to_be_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_decoding() {
        assert_eq!(FunctionCode::from_u8(0x01), Some(FunctionCode::ReadCoils));
        assert_eq!(
            FunctionCode::from_u8(0x10),
            Some(FunctionCode::WriteMultipleRegisters)
        );
        assert_eq!(FunctionCode::from_u8(0x07), None);
        assert_eq!(FunctionCode::from_u8(0x2B), None);
        assert_eq!(u8::from(FunctionCode::WriteSingleCoil), 0x05);
    }

    #[test]
    fn test_function_names() {
        assert_eq!(function_name(0x01), "Read Coils");
        assert_eq!(function_name(0x10), "Write Multiple Registers");
        assert_eq!(function_name(0x07), "Unknown");
    }

    #[test]
    fn test_read_request_parsing() {
        let request = parse_read_request(&[0x00, 0x2F, 0x00, 0x01]).unwrap();
        assert_eq!(request.start_address, 47);
        assert_eq!(request.quantity, 1);

        assert_eq!(
            parse_read_request(&[0x00, 0x01]),
            Err(ExceptionCode::SlaveDeviceFailure)
        );
    }

    #[test]
    fn test_write_single_parsing() {
        let request = parse_write_single_request(&[0x00, 0x05, 0xFF, 0x00]).unwrap();
        assert_eq!(request.address, 5);
        assert_eq!(request.value, 0xFF00);
    }

    #[test]
    fn test_write_multiple_coils_parsing() {
        // start 0, count 10, 2 data bytes
        let request =
            parse_write_multiple_coils_request(&[0x00, 0x00, 0x00, 0x0A, 0x02, 0xFF, 0x03])
                .unwrap();
        assert_eq!(request.start_address, 0);
        assert_eq!(request.quantity, 10);
        assert_eq!(request.data, vec![0xFF, 0x03]);

        // byte count promises more data than present
        assert_eq!(
            parse_write_multiple_coils_request(&[0x00, 0x00, 0x00, 0x0A, 0x02, 0xFF]),
            Err(ExceptionCode::SlaveDeviceFailure)
        );
    }

    #[test]
    fn test_write_multiple_registers_parsing() {
        let request = parse_write_multiple_registers_request(&[
            0x00, 0x10, 0x00, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78,
        ])
        .unwrap();
        assert_eq!(request.start_address, 16);
        assert_eq!(request.quantity, 2);
        assert_eq!(request.values, vec![0x1234, 0x5678]);

        // byte count inconsistent with quantity
        assert_eq!(
            parse_write_multiple_registers_request(&[0x00, 0x00, 0x00, 0x02, 0x02, 0x12, 0x34]),
            Err(ExceptionCode::SlaveDeviceFailure)
        );
    }

    #[test]
    fn test_pack_bits_lsb_first() {
        let values = [true, false, true, true, false, false, true, false, true];
        assert_eq!(pack_bits(&values), vec![0x4D, 0x01]);
        assert_eq!(pack_bits(&[true; 48]), vec![0xFF; 6]);
    }

    #[test]
    fn test_register_encoding() {
        assert_eq!(
            registers_to_be_bytes(&[0x1234, 0x5678]),
            vec![0x12, 0x34, 0x56, 0x78]
        );
    }

    #[test]
    fn test_payload_builders() {
        assert_eq!(build_read_payload(&[0xFF, 0x01]), vec![0x02, 0xFF, 0x01]);
        assert_eq!(
            build_echo_payload(0x0005, 0xFF00),
            vec![0x00, 0x05, 0xFF, 0x00]
        );
    }
}
