//! Plain byte-backed memory device used for RAM, ROM images, and test
//! fixtures. Interior mutability keeps `read`/`write` at `&self` so the same
//! instance can sit behind several handles at once.

use std::ops::Range;
use std::sync::RwLock;

use super::{Device, DeviceError, DeviceResult, Endianness};

pub struct BasicMemory {
    name: String,
    bytes: RwLock<Vec<u8>>,
    endian: Endianness,
}

impl BasicMemory {
    pub fn new(name: impl Into<String>, size: usize, endian: Endianness) -> Self {
        Self {
            name: name.into(),
            bytes: RwLock::new(vec![0_u8; size]),
            endian,
        }
    }

    /// Builds a memory device preloaded with an image, padded to `size` when
    /// the image is shorter.
    pub fn with_image(
        name: impl Into<String>,
        size: usize,
        endian: Endianness,
        image: &[u8],
    ) -> Self {
        let mut bytes = vec![0_u8; size.max(image.len())];
        bytes[..image.len()].copy_from_slice(image);
        Self {
            name: name.into(),
            bytes: RwLock::new(bytes),
            endian,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.read().unwrap().len()
    }
}

impl Device for BasicMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn span(&self) -> Range<u64> {
        0..self.size() as u64
    }

    fn endianness(&self) -> Endianness {
        self.endian
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> DeviceResult<()> {
        if out.is_empty() {
            return Ok(());
        }
        let data = self
            .bytes
            .read()
            .map_err(|_| DeviceError::LockPoisoned(format!("read from {}", self.name)))?;
        let start = offset as usize;
        let end = start + out.len();
        if end > data.len() {
            return Err(DeviceError::OutOfRange {
                offset,
                len: out.len(),
                capacity: data.len() as u64,
            });
        }
        out.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, data_in: &[u8]) -> DeviceResult<()> {
        if data_in.is_empty() {
            return Ok(());
        }
        let mut data = self
            .bytes
            .write()
            .map_err(|_| DeviceError::LockPoisoned(format!("write to {}", self.name)))?;
        let start = offset as usize;
        let end = start + data_in.len();
        if end > data.len() {
            return Err(DeviceError::OutOfRange {
                offset,
                len: data_in.len(),
                capacity: data.len() as u64,
            });
        }
        data[start..end].copy_from_slice(data_in);
        Ok(())
    }
}
