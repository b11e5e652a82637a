//! Typed data access layered on `AddressHandle`: scalar reads and writes in
//! the backing device's byte order, mirroring the byte-cursor surface so the
//! coding layer works identically against files and live memory.

use std::sync::Arc;

use crate::soc::device::Endianness;

use super::address::AddressHandle;
use super::device_bus::DeviceBus;
use super::error::{BusError, BusResult};

pub struct DataHandle {
    address: AddressHandle,
}

impl DataHandle {
    pub fn new(bus: Arc<DeviceBus>) -> Self {
        Self {
            address: AddressHandle::new(bus),
        }
    }

    pub fn address(&self) -> &AddressHandle {
        &self.address
    }

    pub fn address_mut(&mut self) -> &mut AddressHandle {
        &mut self.address
    }

    pub fn jump(&mut self, address: u64) -> BusResult<()> {
        self.address.jump(address)
    }

    pub fn available(&self, len: u64) -> bool {
        self.address.available(len)
    }

    fn endianness(&self) -> Endianness {
        self.address.device_endianness().unwrap_or(Endianness::Little)
    }

    // Scalar readers ----------------------------------------------------------

    pub fn read_unsigned(&mut self, size: usize) -> BusResult<u64> {
        assert!((1..=8).contains(&size), "word length must be 1..=8 bytes");
        let mut buf = [0u8; 8];
        self.address.read(&mut buf[..size])?;
        Ok(self.endianness().decode_word(&buf[..size]))
    }

    pub fn read_signed(&mut self, size: usize) -> BusResult<i64> {
        let raw = self.read_unsigned(size)?;
        let shift = 64 - (size * 8) as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn read_u8(&mut self) -> BusResult<u8> {
        self.read_unsigned(1).map(|value| value as u8)
    }

    pub fn read_u16(&mut self) -> BusResult<u16> {
        self.read_unsigned(2).map(|value| value as u16)
    }

    pub fn read_u32(&mut self) -> BusResult<u32> {
        self.read_unsigned(4).map(|value| value as u32)
    }

    pub fn read_u64(&mut self) -> BusResult<u64> {
        self.read_unsigned(8)
    }

    pub fn read_f32(&mut self) -> BusResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    pub fn read_f64(&mut self) -> BusResult<f64> {
        self.read_u64().map(f64::from_bits)
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) -> BusResult<()> {
        self.address.read(out)
    }

    /// UTF-8 text of at most `len` bytes, truncated at the first NUL.
    pub fn read_utf8(&mut self, len: usize) -> BusResult<String> {
        let mut buf = vec![0u8; len];
        self.address.read(&mut buf)?;
        let text = buf.split(|byte| *byte == 0).next().unwrap_or(&[]);
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    pub fn read_uleb128(&mut self) -> BusResult<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut consumed = 0usize;
        loop {
            let byte = self.read_u8()?;
            consumed += 1;
            if shift < 64 {
                result |= ((byte & 0x7F) as u64) << shift;
            }
            if (byte & 0x80) == 0 {
                return Ok(result);
            }
            if consumed >= 10 {
                return Err(BusError::DeviceFault {
                    device: self.address.device_name().unwrap_or_default(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "variable-length integer exceeds ten bytes",
                    )),
                });
            }
            shift += 7;
        }
    }

    // Scalar writers ----------------------------------------------------------

    pub fn write_unsigned(&mut self, value: u64, size: usize) -> BusResult<()> {
        assert!((1..=8).contains(&size), "word length must be 1..=8 bytes");
        let mut buf = [0u8; 8];
        self.endianness().encode_word(value, &mut buf[..size]);
        self.address.write(&buf[..size])
    }

    pub fn write_u8(&mut self, value: u8) -> BusResult<()> {
        self.write_unsigned(value as u64, 1)
    }

    pub fn write_u16(&mut self, value: u16) -> BusResult<()> {
        self.write_unsigned(value as u64, 2)
    }

    pub fn write_u32(&mut self, value: u32) -> BusResult<()> {
        self.write_unsigned(value as u64, 4)
    }

    pub fn write_u64(&mut self, value: u64) -> BusResult<()> {
        self.write_unsigned(value, 8)
    }

    pub fn write_f32(&mut self, value: f32) -> BusResult<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> BusResult<()> {
        self.write_u64(value.to_bits())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> BusResult<()> {
        self.address.write(data)
    }
}
