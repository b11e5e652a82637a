//! Cursor-style navigation over the bus. A handle caches its last resolved
//! range so in-range movement and sequential access never touch the bus lock;
//! only boundary crossings re-resolve.

use std::sync::Arc;

use crate::soc::device::Endianness;

use super::device_bus::DeviceBus;
use super::error::{BusError, BusResult};
use super::range::ResolvedRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleStatus {
    Unpositioned,
    Positioned,
    NotMapped,
}

pub struct AddressHandle {
    bus: Arc<DeviceBus>,
    cached: Option<ResolvedRange>,
    address: u64,
    status: HandleStatus,
}

impl AddressHandle {
    pub fn new(bus: Arc<DeviceBus>) -> Self {
        Self {
            bus,
            cached: None,
            address: 0,
            status: HandleStatus::Unpositioned,
        }
    }

    pub fn bus(&self) -> &Arc<DeviceBus> {
        &self.bus
    }

    pub fn status(&self) -> HandleStatus {
        self.status
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    /// Positions the handle. Jumps inside the cached range keep the cache;
    /// crossing a boundary re-resolves. An unmapped target records
    /// `NotMapped` on the handle and surfaces the same error to the caller —
    /// nothing panics and the handle stays usable.
    pub fn jump(&mut self, address: u64) -> BusResult<()> {
        self.address = address;
        if let Some(cached) = &self.cached {
            if cached.contains(address) {
                self.status = HandleStatus::Positioned;
                return Ok(());
            }
        }
        match self.bus.resolve(address) {
            Ok(range) => {
                self.cached = Some(range);
                self.status = HandleStatus::Positioned;
                Ok(())
            }
            Err(err) => {
                self.cached = None;
                self.status = HandleStatus::NotMapped;
                Err(err)
            }
        }
    }

    pub fn jump_relative(&mut self, delta: i64) -> BusResult<()> {
        let target = if delta >= 0 {
            self.address.wrapping_add(delta as u64)
        } else {
            self.address.wrapping_sub(delta.unsigned_abs())
        };
        self.jump(target)
    }

    pub fn advance(&mut self, bytes: u64) -> BusResult<()> {
        self.jump(self.address.wrapping_add(bytes))
    }

    /// Bytes between the current position and the cached range end.
    pub fn bytes_remaining(&self) -> u64 {
        match (&self.cached, self.status) {
            (Some(range), HandleStatus::Positioned) => range.bus_end.saturating_sub(self.address),
            _ => 0,
        }
    }

    pub fn available(&self, len: u64) -> bool {
        self.bytes_remaining() >= len
    }

    pub fn device_endianness(&self) -> Option<Endianness> {
        self.cached.as_ref().map(|range| range.device.endianness())
    }

    pub fn device_name(&self) -> Option<String> {
        self.cached
            .as_ref()
            .map(|range| range.device.name().to_string())
    }

    fn positioned(&self) -> BusResult<&ResolvedRange> {
        match self.status {
            HandleStatus::Positioned => {
                self.cached.as_ref().ok_or(BusError::HandleNotPositioned)
            }
            HandleStatus::Unpositioned => Err(BusError::HandleNotPositioned),
            HandleStatus::NotMapped => Err(BusError::NotMapped {
                address: self.address,
            }),
        }
    }

    /// Reads at the current position and advances. A read crossing the cached
    /// range end fails without moving the cursor.
    pub fn read(&mut self, out: &mut [u8]) -> BusResult<()> {
        let range = self.positioned()?;
        if (out.len() as u64) > range.bus_end - self.address {
            return Err(BusError::OutOfRange {
                address: self.address,
                end: range.bus_end,
            });
        }
        let offset = range.offset_of(self.address);
        let name = range.device.name().to_string();
        range
            .device
            .read(offset, out)
            .map_err(|err| BusError::DeviceFault {
                device: name,
                source: Box::new(err),
            })?;
        self.address += out.len() as u64;
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> BusResult<()> {
        let range = self.positioned()?;
        if (data.len() as u64) > range.bus_end - self.address {
            return Err(BusError::OutOfRange {
                address: self.address,
                end: range.bus_end,
            });
        }
        let offset = range.offset_of(self.address);
        let name = range.device.name().to_string();
        range
            .device
            .write(offset, data)
            .map_err(|err| BusError::DeviceFault {
                device: name,
                source: Box::new(err),
            })?;
        self.address += data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::device::{BasicMemory, Endianness};

    fn make_bus() -> Arc<DeviceBus> {
        let bus = Arc::new(DeviceBus::new(32));
        bus.register_device(
            Arc::new(BasicMemory::new("ram", 0x2000, Endianness::Little)),
            0x1000,
        )
        .unwrap();
        bus
    }

    #[test]
    fn jump_and_advance_track_remaining() {
        let mut handle = AddressHandle::new(make_bus());
        handle.jump(0x1000).unwrap();
        assert_eq!(handle.bytes_remaining(), 0x2000);
        handle.advance(0x10).unwrap();
        assert_eq!(handle.address(), 0x1010);
        assert_eq!(handle.bytes_remaining(), 0x1FF0);
        handle.jump_relative(-0x8).unwrap();
        assert_eq!(handle.address(), 0x1008);
    }

    #[test]
    fn unmapped_jump_sets_status_and_recovers() {
        let mut handle = AddressHandle::new(make_bus());
        assert!(handle.jump(0x9000).is_err());
        assert_eq!(handle.status(), HandleStatus::NotMapped);
        let mut buf = [0u8; 1];
        assert!(matches!(
            handle.read(&mut buf),
            Err(BusError::NotMapped { address: 0x9000 })
        ));
        handle.jump(0x1000).unwrap();
        assert_eq!(handle.status(), HandleStatus::Positioned);
        assert!(handle.read(&mut buf).is_ok());
    }

    #[test]
    fn reads_advance_and_respect_the_range_end() {
        let mut handle = AddressHandle::new(make_bus());
        handle.jump(0x2FFE).unwrap();
        let mut two = [0u8; 2];
        handle.read(&mut two).unwrap();
        assert_eq!(handle.address(), 0x3000);
        assert_eq!(handle.bytes_remaining(), 0);
        let mut one = [0u8; 1];
        assert!(matches!(handle.read(&mut one), Err(BusError::OutOfRange { .. })));
    }

    #[test]
    fn write_then_read_round_trips_through_the_device() {
        let mut handle = AddressHandle::new(make_bus());
        handle.jump(0x1800).unwrap();
        handle.write(&[0xAA, 0xBB, 0xCC]).unwrap();
        handle.jump(0x1800).unwrap();
        let mut buf = [0u8; 3];
        handle.read(&mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC]);
    }
}
