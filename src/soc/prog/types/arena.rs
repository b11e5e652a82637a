//! Index-based storage for the type graph. Child references are `TypeId`
//! indices rather than shared pointers, so cyclic graphs (self-referential
//! pointers, mutually recursive aggregates) are representable: callers intern
//! a pending slot first, build children, then replace the slot.

use ahash::AHashMap;

use super::record::{ArenaSpan, FieldRecord, MemberRecord, TypeRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StringId(u32);

#[derive(Default)]
pub struct TypeArena {
    records: Vec<TypeRecord>,
    members: Vec<MemberRecord>,
    fields: Vec<FieldRecord>,
    strings: Vec<String>,
    string_index: AHashMap<String, StringId>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push_record(&mut self, record: TypeRecord) -> TypeId {
        let id = TypeId(self.records.len() as u32);
        self.records.push(record);
        id
    }

    /// Interns a placeholder slot so recursive construction can reference the
    /// type before its definition is complete.
    pub fn reserve(&mut self) -> TypeId {
        self.push_record(TypeRecord::Pending)
    }

    /// Fills a previously reserved slot. Replacing a non-pending record is an
    /// internal invariant violation.
    pub fn replace(&mut self, id: TypeId, record: TypeRecord) {
        let slot = &mut self.records[id.index()];
        debug_assert!(
            matches!(slot, TypeRecord::Pending),
            "replace() target must be a reserved slot"
        );
        *slot = record;
    }

    pub fn get(&self, id: TypeId) -> &TypeRecord {
        &self.records[id.index()]
    }

    pub fn is_pending(&self, id: TypeId) -> bool {
        matches!(self.get(id), TypeRecord::Pending)
    }

    pub fn intern_string<S: AsRef<str>>(&mut self, value: S) -> StringId {
        let value = value.as_ref();
        if let Some(id) = self.string_index.get(value) {
            return *id;
        }
        let id = StringId(self.strings.len() as u32);
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), id);
        id
    }

    pub fn resolve_string(&self, id: StringId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn find_string(&self, value: &str) -> Option<StringId> {
        self.string_index.get(value).copied()
    }

    pub fn alloc_members(&mut self, records: impl IntoIterator<Item = MemberRecord>) -> ArenaSpan {
        let start = self.members.len();
        self.members.extend(records);
        ArenaSpan::new(start, self.members.len() - start)
    }

    pub fn members(&self, span: ArenaSpan) -> &[MemberRecord] {
        &self.members[span.start()..span.start() + span.len()]
    }

    pub fn alloc_fields(&mut self, records: impl IntoIterator<Item = FieldRecord>) -> ArenaSpan {
        let start = self.fields.len();
        self.fields.extend(records);
        ArenaSpan::new(start, self.fields.len() - start)
    }

    pub fn fields(&self, span: ArenaSpan) -> &[FieldRecord] {
        &self.fields[span.start()..span.start() + span.len()]
    }

    /// Total byte footprint of a type, `None` for shapes without a static
    /// layout (pending, callable, dynamic without resolution).
    pub fn byte_size_of(&self, id: TypeId) -> Option<usize> {
        match self.get(id) {
            TypeRecord::Scalar(scalar) => Some(scalar.byte_size),
            TypeRecord::Fixed(fixed) => Some(fixed.base.byte_size),
            TypeRecord::Enum(enum_ty) => Some(enum_ty.base.byte_size),
            // Bitfields read their whole container word.
            TypeRecord::BitField(spec) => Some((spec.container_bits as usize).div_ceil(8)),
            TypeRecord::Pointer(pointer) => Some(pointer.byte_size),
            TypeRecord::Sequence(seq) => seq.byte_size(),
            TypeRecord::Aggregate(agg) => Some(agg.byte_size.bytes),
            TypeRecord::Opaque(opaque) => Some(opaque.byte_size),
            TypeRecord::Callable(_) | TypeRecord::Dynamic(_) | TypeRecord::Pending => None,
        }
    }

    /// Display name, synthesizing pointer spellings (`referent*` / `void*`).
    pub fn name_of(&self, id: TypeId) -> String {
        match self.get(id) {
            TypeRecord::Scalar(scalar) => self.option_name(scalar.name_id),
            TypeRecord::Fixed(fixed) => self.option_name(fixed.base.name_id),
            TypeRecord::Enum(enum_ty) => self.option_name(enum_ty.base.name_id),
            TypeRecord::BitField(_) => "<bits>".into(),
            TypeRecord::Pointer(pointer) => match pointer.target {
                Some(target) => format!("{}*", self.name_of(target)),
                None => "void*".into(),
            },
            TypeRecord::Sequence(seq) => self.option_name(seq.name_id),
            TypeRecord::Aggregate(agg) => self.option_name(agg.name_id),
            TypeRecord::Callable(callable) => self.option_name(callable.name_id),
            TypeRecord::Dynamic(dynamic) => self.option_name(dynamic.name_id),
            TypeRecord::Opaque(opaque) => self.option_name(opaque.name_id),
            TypeRecord::Pending => "<pending>".into(),
        }
    }

    fn option_name(&self, id: Option<StringId>) -> String {
        id.map(|id| self.resolve_string(id).to_string())
            .unwrap_or_else(|| "<anon>".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::pointer::PointerType;
    use crate::soc::prog::types::scalar::{DisplayFormat, ScalarEncoding, ScalarType};

    #[test]
    fn interned_strings_deduplicate() {
        let mut arena = TypeArena::new();
        let a = arena.intern_string("value");
        let b = arena.intern_string("value");
        assert_eq!(a, b);
        assert_eq!(arena.resolve_string(a), "value");
    }

    #[test]
    fn reserve_and_replace_support_self_reference() {
        let mut arena = TypeArena::new();
        let slot = arena.reserve();
        assert!(arena.is_pending(slot));
        // A pointer whose referent is the slot being defined.
        let ptr = arena.push_record(TypeRecord::Pointer(PointerType::new(Some(slot), 4)));
        arena.replace(slot, TypeRecord::Pointer(PointerType::new(Some(ptr), 4)));
        assert!(!arena.is_pending(slot));
    }

    #[test]
    fn pointer_names_spell_void_and_referent() {
        let mut arena = TypeArena::new();
        let name = arena.intern_string("node");
        let node = arena.push_record(TypeRecord::Scalar(ScalarType::new(
            Some(name),
            4,
            ScalarEncoding::Unsigned,
            DisplayFormat::Default,
        )));
        let ptr = arena.push_record(TypeRecord::Pointer(PointerType::new(Some(node), 4)));
        let void_ptr = arena.push_record(TypeRecord::Pointer(PointerType::new(None, 4)));
        assert_eq!(arena.name_of(ptr), "node*");
        assert_eq!(arena.name_of(void_ptr), "void*");
    }
}
