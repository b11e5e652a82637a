use std::{error::Error, fmt};

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Debug)]
pub enum DeviceError {
    OutOfRange {
        offset: u64,
        len: usize,
        capacity: u64,
    },
    LockPoisoned(String),
    Unsupported(&'static str),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OutOfRange {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "access of {len} bytes at offset 0x{offset:X} exceeds device capacity 0x{capacity:X}"
            ),
            DeviceError::LockPoisoned(what) => write!(f, "device lock poisoned during {what}"),
            DeviceError::Unsupported(op) => write!(f, "device does not support '{op}'"),
        }
    }
}

impl Error for DeviceError {}
