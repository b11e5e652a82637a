//! Canonical record structures stored inside the type arena.

use super::aggregate::AggregateType;
use super::arena::{StringId, TypeId};
use super::bitfield::BitFieldSpec;
use super::callable::CallableType;
use super::dynamic::DynamicAggregate;
use super::enum_scalar::EnumType;
use super::pointer::PointerType;
use super::scalar::{FixedScalar, ScalarType};
use super::sequence::SequenceType;

/// Byte size plus trailing bit padding of a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutSize {
    pub bytes: usize,
    pub trailing_bits: usize,
}

impl LayoutSize {
    pub const ZERO: Self = Self {
        bytes: 0,
        trailing_bits: 0,
    };

    pub fn bytes(bytes: usize) -> Self {
        Self {
            bytes,
            trailing_bits: 0,
        }
    }

    pub fn total_bits(self) -> usize {
        (self.bytes << 3) + self.trailing_bits
    }
}

/// Contiguous slice of member or field records in the arena side pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaSpan {
    start: u32,
    len: u32,
}

impl ArenaSpan {
    pub fn empty() -> Self {
        Self { start: 0, len: 0 }
    }

    pub fn new(start: usize, len: usize) -> Self {
        Self {
            start: start as u32,
            len: len as u32,
        }
    }

    pub fn start(&self) -> usize {
        self.start as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// POD metadata for one aggregate member, kept in the arena member pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRecord {
    pub name_id: Option<StringId>,
    pub ty: TypeId,
    /// Offset from the start of the parent aggregate.
    pub offset_bits: usize,
    /// Declaration-order index assigned when the aggregate finalizes.
    pub index: u32,
}

impl MemberRecord {
    pub fn new(name_id: Option<StringId>, ty: TypeId, offset_bits: usize) -> Self {
        Self {
            name_id,
            ty,
            offset_bits,
            index: 0,
        }
    }

    pub fn offset_bytes(&self) -> usize {
        self.offset_bits / 8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRecord {
    pub name_id: StringId,
    pub ty: TypeId,
}

/// Fallback for debugger entries the model cannot yet express precisely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueType {
    pub name_id: Option<StringId>,
    pub byte_size: usize,
}

/// All supported type shapes. `Pending` marks a reserved slot that is still
/// under construction.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeRecord {
    Pending,
    Scalar(ScalarType),
    Fixed(FixedScalar),
    Enum(EnumType),
    BitField(BitFieldSpec),
    Pointer(PointerType),
    Sequence(SequenceType),
    Aggregate(AggregateType),
    Callable(CallableType),
    Dynamic(DynamicAggregate),
    Opaque(OpaqueType),
}

impl TypeRecord {
    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match self {
            TypeRecord::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateType> {
        match self {
            TypeRecord::Aggregate(value) => Some(value),
            _ => None,
        }
    }
}
