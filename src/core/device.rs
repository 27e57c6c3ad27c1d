//! CU48 device model and multi-device registry
//!
//! A CU48 door controller exposes 48 locks as Modbus coils. The lockstate
//! convention is the inverse of generic Modbus: coil true means the lock is
//! CLOSED, writing 0xFF00 drives the bit to 0 (open/unlock) and 0x0000
//! drives it to 1 (close/lock). The controller also mirrors the 48 coils
//! into a 6-byte status register which Read Coils answers from; the mirror
//! is re-synchronized from the coil array before every read payload is built.
//!
//! Generic discrete-input and register spaces are carried for protocol
//! completeness so a standard Modbus poller can talk to the device without
//! tripping exceptions.

use crate::core::pdu::{self, ExceptionCode};

/// Locks per CU48 controller
pub const LOCK_COUNT: usize = 48;

/// Bytes in the bit-packed lock status register
pub const STATUS_REGISTER_LEN: usize = LOCK_COUNT / 8;

/// Size of the generic register and discrete-input spaces
pub const REGISTER_SPACE: usize = 256;

/// One lock touched by a coil write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockChange {
    /// Zero-based lock index within the device
    pub index: u8,
    pub now_closed: bool,
    /// Whether the write actually flipped the stored value
    pub changed: bool,
}

impl LockChange {
    /// Human-readable operation text, 1-based lock numbering as on the unit
    pub fn describe(&self) -> String {
        if self.now_closed {
            format!("Lock #{} CLOSED/LOCKED", self.index + 1)
        } else {
            format!("Lock #{} OPENED/UNLOCKED", self.index + 1)
        }
    }
}

/// Emulated CU48 48-lock controller
#[derive(Debug, Clone)]
pub struct Cu48Device {
    address: u8,
    /// Compat mode: Read Coils with count 0 reads through to lock 48
    zero_count_reads_all: bool,
    /// true = closed/locked
    coils: [bool; LOCK_COUNT],
    /// Bit-packed mirror of `coils`, bit 1 = closed
    status_register: [u8; STATUS_REGISTER_LEN],
    discrete_inputs: [bool; REGISTER_SPACE],
    holding_registers: [u16; REGISTER_SPACE],
    input_registers: [u16; REGISTER_SPACE],
}

impl Cu48Device {
    /// Create a device with every lock closed and registers at power-on values
    pub fn new(address: u8, zero_count_reads_all: bool) -> Self {
        let mut holding_registers = [0u16; REGISTER_SPACE];
        // Power-on identification/parameter registers of the real unit
        holding_registers[0x03] = 550;
        holding_registers[0x0F] = 0xE230;
        holding_registers[0xF5] = 0x0002;
        holding_registers[0xF6] = 0x0004;

        Self {
            address,
            zero_count_reads_all,
            coils: [true; LOCK_COUNT],
            status_register: [0xFF; STATUS_REGISTER_LEN],
            discrete_inputs: [false; REGISTER_SPACE],
            holding_registers,
            input_registers: [0u16; REGISTER_SPACE],
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current state of one lock (true = closed); out of range reads as open
    pub fn lock_state(&self, index: usize) -> bool {
        self.coils.get(index).copied().unwrap_or(false)
    }

    pub fn holding_register(&self, address: usize) -> u16 {
        self.holding_registers.get(address).copied().unwrap_or(0)
    }

    fn set_status_bit(&mut self, index: usize, closed: bool) {
        let byte = index / 8;
        let bit = index % 8;
        if closed {
            self.status_register[byte] |= 1 << bit;
        } else {
            self.status_register[byte] &= !(1 << bit);
        }
    }

    fn sync_status_register(&mut self) {
        for i in 0..LOCK_COUNT {
            let closed = self.coils[i];
            self.set_status_bit(i, closed);
        }
    }

    /// Drive one lock directly (operator action, not a bus write)
    pub fn set_lock(&mut self, index: usize, closed: bool) {
        if index < LOCK_COUNT {
            self.coils[index] = closed;
            self.set_status_bit(index, closed);
        }
    }

    /// Close every lock
    pub fn close_all(&mut self) {
        self.coils = [true; LOCK_COUNT];
        self.status_register = [0xFF; STATUS_REGISTER_LEN];
    }

    /// Open every lock
    pub fn open_all(&mut self) {
        self.coils = [false; LOCK_COUNT];
        self.status_register = [0x00; STATUS_REGISTER_LEN];
    }

    /// Read Coils (0x01), answered from the status register
    pub fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<u8>, ExceptionCode> {
        let count = if count == 0 {
            if !self.zero_count_reads_all {
                return Err(ExceptionCode::IllegalDataValue);
            }
            (LOCK_COUNT as u16).saturating_sub(start)
        } else {
            count
        };
        let start = start as usize;
        let count = count as usize;
        if start >= LOCK_COUNT || start + count > LOCK_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }

        self.sync_status_register();

        let mut bits = Vec::with_capacity(count);
        for i in start..start + count {
            bits.push((self.status_register[i / 8] >> (i % 8)) & 1 != 0);
        }
        Ok(pdu::build_read_payload(&pdu::pack_bits(&bits)))
    }

    /// Read Discrete Inputs (0x02)
    pub fn read_discrete_inputs(&self, start: u16, count: u16) -> Result<Vec<u8>, ExceptionCode> {
        if count == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = start as usize;
        let count = count as usize;
        if start + count > REGISTER_SPACE {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let bits = &self.discrete_inputs[start..start + count];
        Ok(pdu::build_read_payload(&pdu::pack_bits(bits)))
    }

    /// Read Holding Registers (0x03)
    pub fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u8>, ExceptionCode> {
        if count == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = start as usize;
        let count = count as usize;
        if start + count > REGISTER_SPACE {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let values = &self.holding_registers[start..start + count];
        Ok(pdu::build_read_payload(&pdu::registers_to_be_bytes(values)))
    }

    /// Read Input Registers (0x04)
    pub fn read_input_registers(&self, start: u16, count: u16) -> Result<Vec<u8>, ExceptionCode> {
        if count == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start = start as usize;
        let count = count as usize;
        if start + count > REGISTER_SPACE {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let values = &self.input_registers[start..start + count];
        Ok(pdu::build_read_payload(&pdu::registers_to_be_bytes(values)))
    }

    /// Write Single Coil (0x05), lockstate polarity
    ///
    /// 0xFF00 opens the lock (bit to 0), 0x0000 closes it (bit to 1).
    pub fn write_single_coil(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(Vec<u8>, Vec<LockChange>), ExceptionCode> {
        let index = address as usize;
        if index >= LOCK_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        let closed = match value {
            0xFF00 => false,
            0x0000 => true,
            _ => return Err(ExceptionCode::IllegalDataValue),
        };
        let changed = self.coils[index] != closed;
        self.coils[index] = closed;
        self.set_status_bit(index, closed);

        let change = LockChange {
            index: index as u8,
            now_closed: closed,
            changed,
        };
        Ok((pdu::build_echo_payload(address, value), vec![change]))
    }

    /// Write Multiple Coils (0x0F); incoming bit 1 = close, 0 = open
    pub fn write_multiple_coils(
        &mut self,
        start: u16,
        count: u16,
        data: &[u8],
    ) -> Result<(Vec<u8>, Vec<LockChange>), ExceptionCode> {
        if count == 0 {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start_idx = start as usize;
        let count_n = count as usize;
        if start_idx >= LOCK_COUNT || start_idx + count_n > LOCK_COUNT {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        if data.len() < count_n.div_ceil(8) {
            return Err(ExceptionCode::IllegalDataValue);
        }

        let mut changes = Vec::with_capacity(count_n);
        for i in 0..count_n {
            let closed = (data[i / 8] >> (i % 8)) & 1 != 0;
            let index = start_idx + i;
            let changed = self.coils[index] != closed;
            self.coils[index] = closed;
            self.set_status_bit(index, closed);
            changes.push(LockChange {
                index: index as u8,
                now_closed: closed,
                changed,
            });
        }
        Ok((pdu::build_echo_payload(start, count), changes))
    }

    /// Write Single Register (0x06)
    pub fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<Vec<u8>, ExceptionCode> {
        let index = address as usize;
        if index >= REGISTER_SPACE {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        self.holding_registers[index] = value;
        Ok(pdu::build_echo_payload(address, value))
    }

    /// Write Multiple Registers (0x10)
    pub fn write_multiple_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<Vec<u8>, ExceptionCode> {
        if values.is_empty() {
            return Err(ExceptionCode::IllegalDataValue);
        }
        let start_idx = start as usize;
        if start_idx + values.len() > REGISTER_SPACE {
            return Err(ExceptionCode::IllegalDataAddress);
        }
        self.holding_registers[start_idx..start_idx + values.len()].copy_from_slice(values);
        Ok(pdu::build_echo_payload(start, values.len() as u16))
    }
}

/// Fixed table of emulated devices on a contiguous address range
#[derive(Debug)]
pub struct DeviceRegistry {
    base_address: u8,
    devices: Vec<Cu48Device>,
}

impl DeviceRegistry {
    /// Build `count` devices at addresses `base_address..base_address+count`
    ///
    /// Panics when the address range would run past `u8::MAX`.
    pub fn new(base_address: u8, count: u8, zero_count_reads_all: bool) -> Self {
        assert!(
            count == 0 || u16::from(base_address) + u16::from(count) - 1 <= u16::from(u8::MAX),
            "device address range {base_address}..{base_address}+{count} overflows u8"
        );
        let devices = (0..count)
            .map(|i| Cu48Device::new(base_address + i, zero_count_reads_all))
            .collect();
        Self {
            base_address,
            devices,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, address: u8) -> bool {
        self.index_of(address).is_some()
    }

    pub fn lookup(&self, address: u8) -> Option<&Cu48Device> {
        self.index_of(address).map(|i| &self.devices[i])
    }

    pub fn lookup_mut(&mut self, address: u8) -> Option<&mut Cu48Device> {
        self.index_of(address).map(move |i| &mut self.devices[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cu48Device> {
        self.devices.iter()
    }

    fn index_of(&self, address: u8) -> Option<usize> {
        let index = address.checked_sub(self.base_address)? as usize;
        (index < self.devices.len()).then_some(index)
    }
}
