//! Live-target side of the crate: devices, the address bus and its handles,
//! the program type/symbol model, and the ISA machine description.

pub mod bus;
pub mod device;
pub mod isa;
pub mod prog;
