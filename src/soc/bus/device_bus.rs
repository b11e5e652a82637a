//! DeviceBus owns the global address map: two-level hashed range lookup,
//! priority overlays for redirects, and registration bookkeeping. Resolution
//! takes a read lock; registration, redirect, and removal take the write lock.
//! Registration is rare and resolution is frequent, so the map is optimised
//! for the read path.

use std::sync::{Arc, RwLock};

use crate::soc::device::Device;

use super::error::{BusError, BusResult};
use super::range::{BusRange, RangeKind, ResolvedRange};

pub const DEVICE_PRIORITY: u8 = 0;
pub const REDIRECT_PRIORITY: u8 = 10;

const HASH_BITS: u32 = 8;
const BUCKET_COUNT: usize = 1 << HASH_BITS;

/// Bookkeeping entry for one registered device, addressable by name or index.
#[derive(Clone)]
pub struct Registration {
    pub name: String,
    pub device: Arc<dyn Device>,
    pub bus_address: u64,
    pub size: u64,
}

struct BusState {
    registrations: Vec<Option<Registration>>,
    /// Level-1 hash: `address >> (addr_bits - HASH_BITS)` selects a bucket;
    /// level 2 is a linear scan of the bucket's ranges sorted by `bus_start`.
    buckets: Vec<Vec<BusRange>>,
}

pub struct DeviceBus {
    addr_bits: u32,
    bucket_shift: u32,
    state: RwLock<BusState>,
}

impl DeviceBus {
    /// Builds a bus spanning `addr_bits` of address space (1..=64).
    pub fn new(addr_bits: u32) -> Self {
        assert!(
            (1..=64).contains(&addr_bits),
            "bus address width must be 1..=64 bits"
        );
        Self {
            addr_bits,
            bucket_shift: addr_bits.saturating_sub(HASH_BITS),
            state: RwLock::new(BusState {
                registrations: Vec::new(),
                buckets: vec![Vec::new(); BUCKET_COUNT],
            }),
        }
    }

    pub fn addr_bits(&self) -> u32 {
        self.addr_bits
    }

    fn bucket_of(&self, address: u64) -> usize {
        ((address >> self.bucket_shift) as usize).min(BUCKET_COUNT - 1)
    }

    fn check_fits(&self, address: u64, end: u64) -> BusResult<()> {
        let limit = if self.addr_bits >= 64 {
            u64::MAX
        } else {
            1u64 << self.addr_bits
        };
        if address >= limit || end > limit {
            return Err(BusError::AddressBits {
                address: end.max(address),
                bits: self.addr_bits,
            });
        }
        Ok(())
    }

    pub fn register_device(&self, device: Arc<dyn Device>, address: u64) -> BusResult<()> {
        self.register_device_with_priority(device, address, DEVICE_PRIORITY)
    }

    pub fn register_device_with_priority(
        &self,
        device: Arc<dyn Device>,
        address: u64,
        priority: u8,
    ) -> BusResult<()> {
        let span = device.span();
        let size = span.end.saturating_sub(span.start);
        if size == 0 {
            return Err(BusError::InvalidDeviceSpan {
                device: device.name().to_string(),
            });
        }
        let end = address.checked_add(size).ok_or(BusError::AddressBits {
            address,
            bits: self.addr_bits,
        })?;
        self.check_fits(address, end)?;

        let mut state = self.state.write().unwrap();
        Self::check_overlap(&state, address, end, priority)?;
        let device_id = state.registrations.len();
        state.registrations.push(Some(Registration {
            name: device.name().to_string(),
            device: Arc::clone(&device),
            bus_address: address,
            size,
        }));
        let range = BusRange {
            bus_start: address,
            bus_end: end,
            device_id,
            device_offset: span.start,
            priority,
            kind: RangeKind::Device,
        };
        self.insert_range(&mut state, range);
        Ok(())
    }

    /// Creates a higher-priority overlay mapping `[source, source+size)` onto
    /// the device window that currently backs `[target, target+size)`.
    pub fn redirect(&self, source: u64, size: u64, target: u64) -> BusResult<()> {
        if size == 0 {
            return Err(BusError::RedirectInvalid {
                source,
                size,
                target,
                reason: "zero-length range",
            });
        }
        let source_end = source.checked_add(size).ok_or(BusError::RedirectInvalid {
            source,
            size,
            target,
            reason: "source range overflow",
        })?;
        let target_end = target.checked_add(size).ok_or(BusError::RedirectInvalid {
            source,
            size,
            target,
            reason: "target range overflow",
        })?;
        self.check_fits(source, source_end)?;

        let mut state = self.state.write().unwrap();
        let target_range = Self::best_range(&state, self.bucket_of(target), target)
            .cloned()
            .ok_or(BusError::RedirectInvalid {
                source,
                size,
                target,
                reason: "redirect target is unmapped",
            })?;
        if target_end > target_range.bus_end {
            return Err(BusError::RedirectInvalid {
                source,
                size,
                target,
                reason: "target window crosses a mapping boundary",
            });
        }
        Self::check_overlap(&state, source, source_end, REDIRECT_PRIORITY)?;
        let range = BusRange {
            bus_start: source,
            bus_end: source_end,
            device_id: target_range.device_id,
            device_offset: target_range.device_offset + (target - target_range.bus_start),
            priority: REDIRECT_PRIORITY,
            kind: RangeKind::Redirect,
        };
        self.insert_range(&mut state, range);
        Ok(())
    }

    /// Average O(1): hash to a bucket, scan its sorted ranges, highest
    /// priority wins at the address.
    pub fn resolve(&self, address: u64) -> BusResult<ResolvedRange> {
        let state = self.state.read().unwrap();
        let range = Self::best_range(&state, self.bucket_of(address), address)
            .ok_or(BusError::NotMapped { address })?;
        let registration = state.registrations[range.device_id]
            .as_ref()
            .expect("range must reference a live registration");
        Ok(ResolvedRange {
            device: Arc::clone(&registration.device),
            device_id: range.device_id,
            bus_start: range.bus_start,
            bus_end: range.bus_end,
            device_offset: range.device_offset,
            priority: range.priority,
            kind: range.kind,
        })
    }

    /// Removes the named device along with every redirect that targets it.
    pub fn unregister(&self, name: &str) -> BusResult<()> {
        let mut state = self.state.write().unwrap();
        let device_id = state
            .registrations
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|reg| reg.name == name))
            .ok_or(BusError::NotMapped { address: 0 })?;
        Self::remove_device(&mut state, device_id);
        Ok(())
    }

    /// Removes the device whose range backs `address` (plus its redirects).
    pub fn unregister_at(&self, address: u64) -> BusResult<()> {
        let mut state = self.state.write().unwrap();
        let device_id = Self::best_range(&state, self.bucket_of(address), address)
            .map(|range| range.device_id)
            .ok_or(BusError::NotMapped { address })?;
        Self::remove_device(&mut state, device_id);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Registration> {
        let state = self.state.read().unwrap();
        state
            .registrations
            .iter()
            .flatten()
            .find(|reg| reg.name == name)
            .cloned()
    }

    pub fn lookup_index(&self, index: usize) -> Option<Registration> {
        let state = self.state.read().unwrap();
        state.registrations.get(index)?.clone()
    }

    pub fn device_count(&self) -> usize {
        let state = self.state.read().unwrap();
        state.registrations.iter().flatten().count()
    }
}

impl DeviceBus {
    fn insert_range(&self, state: &mut BusState, range: BusRange) {
        let first = self.bucket_of(range.bus_start);
        let last = self.bucket_of(range.bus_end - 1);
        for bucket_index in first..=last {
            let bucket = &mut state.buckets[bucket_index];
            let position = bucket
                .binary_search_by(|entry| entry.bus_start.cmp(&range.bus_start))
                .unwrap_or_else(|insert_at| insert_at);
            bucket.insert(position, range.clone());
        }
    }

    fn check_overlap(state: &BusState, start: u64, end: u64, priority: u8) -> BusResult<()> {
        for bucket in &state.buckets {
            for existing in bucket {
                if existing.priority == priority
                    && existing.bus_start < end
                    && start < existing.bus_end
                {
                    return Err(BusError::Overlap {
                        address: start,
                        details: format!(
                            "0x{:X}..0x{:X} already mapped at priority {priority}",
                            existing.bus_start, existing.bus_end
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn best_range(state: &BusState, bucket_index: usize, address: u64) -> Option<&BusRange> {
        let bucket = &state.buckets[bucket_index];
        let mut best: Option<&BusRange> = None;
        for range in bucket {
            if range.bus_start > address {
                break;
            }
            if range.contains(address)
                && best.is_none_or(|current| range.priority > current.priority)
            {
                best = Some(range);
            }
        }
        best
    }

    fn remove_device(state: &mut BusState, device_id: usize) {
        state.registrations[device_id] = None;
        for bucket in &mut state.buckets {
            bucket.retain(|range| range.device_id != device_id);
        }
    }
}
