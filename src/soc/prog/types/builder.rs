//! Fluent construction helpers bridging debug-info ingestion and manual test
//! fixtures into the arena.

use super::arena::{StringId, TypeArena, TypeId};
use super::bitfield::BitFieldSpec;
use super::callable::CallableType;
use super::dynamic::DynamicAggregate;
use super::enum_scalar::EnumBuilder;
use super::pointer::PointerType;
use super::record::{OpaqueType, TypeRecord};
use super::scalar::{DisplayFormat, FixedScalar, ScalarEncoding, ScalarType};
use super::sequence::{SequenceCount, SequenceType};

pub struct TypeBuilder<'arena> {
    pub(super) arena: &'arena mut TypeArena,
}

impl<'arena> TypeBuilder<'arena> {
    pub fn new(arena: &'arena mut TypeArena) -> Self {
        Self { arena }
    }

    pub fn arena_mut(&mut self) -> &mut TypeArena {
        self.arena
    }

    pub fn intern<S: AsRef<str>>(&mut self, name: S) -> StringId {
        self.arena.intern_string(name)
    }

    pub fn reserve(&mut self) -> TypeId {
        self.arena.reserve()
    }

    pub fn declare_scalar(
        &mut self,
        name: Option<StringId>,
        byte_size: usize,
        encoding: ScalarEncoding,
        display: DisplayFormat,
    ) -> TypeId {
        let scalar = ScalarType::new(name, byte_size, encoding, display);
        self.arena.push_record(TypeRecord::Scalar(scalar))
    }

    pub fn scalar(
        &mut self,
        name: Option<&str>,
        byte_size: usize,
        encoding: ScalarEncoding,
        display: DisplayFormat,
    ) -> TypeId {
        let name_id = name.map(|value| self.intern(value));
        self.declare_scalar(name_id, byte_size, encoding, display)
    }

    pub fn fixed(&mut self, base: ScalarType, scale: f64, offset: f64) -> TypeId {
        self.arena
            .push_record(TypeRecord::Fixed(FixedScalar::new(base, scale, offset)))
    }

    pub fn pointer(&mut self, target: Option<TypeId>, byte_size: usize) -> TypeId {
        self.arena
            .push_record(TypeRecord::Pointer(PointerType::new(target, byte_size)))
    }

    pub fn sequence(
        &mut self,
        element: TypeId,
        stride_bytes: usize,
        count: SequenceCount,
    ) -> TypeId {
        let sequence = SequenceType::new(element, stride_bytes, count);
        self.arena.push_record(TypeRecord::Sequence(sequence))
    }

    pub fn sequence_static(
        &mut self,
        element: TypeId,
        stride_bytes: usize,
        count: usize,
    ) -> TypeId {
        self.sequence(element, stride_bytes, SequenceCount::Static(count))
    }

    pub fn bitfield(&mut self, spec: BitFieldSpec) -> TypeId {
        self.arena.push_record(TypeRecord::BitField(spec))
    }

    pub fn opaque(&mut self, name: Option<&str>, byte_size: usize) -> TypeId {
        let name_id = name.map(|value| self.intern(value));
        self.arena.push_record(TypeRecord::Opaque(OpaqueType {
            name_id,
            byte_size,
        }))
    }

    pub fn callable(&mut self, callable: CallableType) -> TypeId {
        self.arena.push_record(TypeRecord::Callable(callable))
    }

    pub fn dynamic(&mut self, dynamic: DynamicAggregate) -> TypeId {
        self.arena.push_record(TypeRecord::Dynamic(dynamic))
    }

    pub fn enumeration(&mut self, base: ScalarType) -> EnumBuilder<'_, 'arena> {
        EnumBuilder::new(self, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_scalar_returns_valid_id() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let name = builder.intern("pc_t");
        let id = builder.declare_scalar(Some(name), 8, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        assert_eq!(
            arena.get(id).as_scalar().unwrap().byte_size,
            8,
            "scalar should honor requested byte size"
        );
    }

    #[test]
    fn sequence_builder_stores_stride_and_count() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let seq_id = builder.sequence_static(word, 4, 8);
        let TypeRecord::Sequence(seq) = arena.get(seq_id) else {
            panic!("expected sequence type");
        };
        assert_eq!(seq.stride_bytes, 4);
        assert_eq!(seq.element_count(), Some(8));
    }
}
