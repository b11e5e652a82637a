//! Arena-backed type graph: descriptors for every shape the debug-info reader
//! produces, builders for manual construction, and value coding against a
//! [`ByteCursor`](crate::soc::prog::cursor::ByteCursor).

pub mod aggregate;
pub mod arena;
pub mod bitfield;
pub mod builder;
pub mod callable;
pub mod coding;
pub mod dynamic;
pub mod enum_scalar;
pub mod expr;
pub mod pointer;
pub mod record;
pub mod scalar;
pub mod sequence;

pub use aggregate::{AggregateBuilder, AggregateKind, AggregateType};
pub use arena::{StringId, TypeArena, TypeId};
pub use bitfield::{BitFieldSegment, BitFieldSpec, BitFieldSpecBuilder, PadKind, PadSpec};
pub use builder::TypeBuilder;
pub use callable::CallableType;
pub use coding::CoercionStatus;
pub use dynamic::{DynamicAggregate, DynamicCache, DynamicField};
pub use enum_scalar::{EnumBuilder, EnumType, EnumVariant};
pub use expr::{EvalContext, ExprProgram, OpCode};
pub use pointer::PointerType;
pub use record::{ArenaSpan, FieldRecord, LayoutSize, MemberRecord, OpaqueType, TypeRecord};
pub use scalar::{DisplayFormat, FixedScalar, ScalarEncoding, ScalarType};
pub use sequence::{SequenceCount, SequenceType};
