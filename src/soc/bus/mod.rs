//! Address bus: hashed range resolution over registered devices, redirect
//! overlays, and the lightweight handle family that traverses the map.

pub mod address;
pub mod bits;
pub mod data;
pub mod device_bus;
pub mod error;
pub mod range;
pub mod register;
pub mod symbol;

pub use address::{AddressHandle, HandleStatus};
pub use bits::{BitConstruct, BitSegment, BitSlice, BitSpecError};
pub use data::DataHandle;
pub use device_bus::{DeviceBus, Registration, DEVICE_PRIORITY, REDIRECT_PRIORITY};
pub use error::{BusError, BusResult};
pub use range::{BusRange, RangeKind, ResolvedRange};
pub use register::{RegisterFile, RegisterHandle, RegisterTable, ResolvedRegister};
pub use symbol::{ResolvedMember, SymbolAccessError, SymbolHandle, SymbolValue};
