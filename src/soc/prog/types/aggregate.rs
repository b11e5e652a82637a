//! Aggregate descriptors for structs, unions, and classes. A union is an
//! aggregate whose members all sit at offset zero.

use ahash::AHashMap;

use super::arena::{StringId, TypeArena, TypeId};
use super::builder::TypeBuilder;
use super::record::{ArenaSpan, LayoutSize, MemberRecord, TypeRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Class,
    Union,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregateType {
    pub kind: AggregateKind,
    pub name_id: Option<StringId>,
    /// Member records live in the arena member pool, sorted by offset and
    /// re-indexed at finalization.
    pub members: ArenaSpan,
    pub byte_size: LayoutSize,
    pub has_dynamic: bool,
    by_name: AHashMap<StringId, u32>,
}

impl AggregateType {
    pub fn is_union(&self) -> bool {
        matches!(self.kind, AggregateKind::Union)
    }

    /// O(1) member lookup by interned name.
    pub fn member_index(&self, name: StringId) -> Option<usize> {
        self.by_name.get(&name).map(|index| *index as usize)
    }

    pub fn member<'arena>(
        &self,
        arena: &'arena TypeArena,
        name: StringId,
    ) -> Option<&'arena MemberRecord> {
        self.member_index(name)
            .map(|index| &arena.members(self.members)[index])
    }

    pub fn member_at<'arena>(
        &self,
        arena: &'arena TypeArena,
        index: usize,
    ) -> Option<&'arena MemberRecord> {
        arena.members(self.members).get(index)
    }
}

pub struct AggregateBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    kind: AggregateKind,
    name_id: Option<StringId>,
    members: Vec<MemberRecord>,
    layout: Option<LayoutSize>,
    has_dynamic: bool,
    reserved: Option<TypeId>,
}

impl<'builder, 'arena> AggregateBuilder<'builder, 'arena> {
    pub(super) fn new(builder: &'builder mut TypeBuilder<'arena>, kind: AggregateKind) -> Self {
        Self {
            builder,
            kind,
            name_id: None,
            members: Vec::new(),
            layout: None,
            has_dynamic: false,
            reserved: None,
        }
    }

    pub fn named(mut self, name: impl AsRef<str>) -> Self {
        self.name_id = Some(self.builder.intern(name));
        self
    }

    /// Pins the layout explicitly instead of deriving it from the members.
    pub fn layout(mut self, bytes: usize, trailing_bits: usize) -> Self {
        self.layout = Some(LayoutSize {
            bytes,
            trailing_bits,
        });
        self
    }

    pub fn mark_dynamic(mut self) -> Self {
        self.has_dynamic = true;
        self
    }

    /// Targets a previously reserved arena slot so cyclic member types can
    /// reference this aggregate while it is still being built.
    pub fn into_reserved(mut self, id: TypeId) -> Self {
        self.reserved = Some(id);
        self
    }

    pub fn member(mut self, name: impl AsRef<str>, ty: TypeId, byte_offset: usize) -> Self {
        let name_id = Some(self.builder.intern(name));
        self.members
            .push(MemberRecord::new(name_id, ty, byte_offset * 8));
        self
    }

    pub fn member_bits(
        mut self,
        name: impl AsRef<str>,
        ty: TypeId,
        offset_bits: usize,
    ) -> Self {
        let name_id = Some(self.builder.intern(name));
        self.members.push(MemberRecord::new(name_id, ty, offset_bits));
        self
    }

    pub fn member_record(mut self, record: MemberRecord) -> Self {
        self.members.push(record);
        self
    }

    pub fn finish(self) -> TypeId {
        let arena = &mut *self.builder.arena;
        let mut members = self.members;
        members.sort_by_key(|member| member.offset_bits);
        for (index, member) in members.iter_mut().enumerate() {
            member.index = index as u32;
        }

        let layout = self.layout.unwrap_or_else(|| {
            let mut end_bits = 0usize;
            for member in &members {
                let size_bits = arena
                    .byte_size_of(member.ty)
                    .map(|bytes| bytes * 8)
                    .unwrap_or(0);
                end_bits = end_bits.max(member.offset_bits + size_bits);
            }
            LayoutSize {
                bytes: end_bits.div_ceil(8),
                trailing_bits: 0,
            }
        });

        let mut by_name = AHashMap::with_capacity(members.len());
        for member in &members {
            if let Some(name_id) = member.name_id {
                by_name.entry(name_id).or_insert(member.index);
            }
        }

        let span = if members.is_empty() {
            ArenaSpan::empty()
        } else {
            arena.alloc_members(members)
        };
        let aggregate = AggregateType {
            kind: self.kind,
            name_id: self.name_id,
            members: span,
            byte_size: layout,
            has_dynamic: self.has_dynamic,
            by_name,
        };
        match self.reserved {
            Some(id) => {
                arena.replace(id, TypeRecord::Aggregate(aggregate));
                id
            }
            None => arena.push_record(TypeRecord::Aggregate(aggregate)),
        }
    }
}

impl<'arena> TypeBuilder<'arena> {
    pub fn aggregate(&mut self, kind: AggregateKind) -> AggregateBuilder<'_, 'arena> {
        AggregateBuilder::new(self, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::{DisplayFormat, ScalarEncoding};

    #[test]
    fn finalize_sorts_members_and_derives_size() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let byte = builder.scalar(None, 1, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let id = builder
            .aggregate(AggregateKind::Struct)
            .member("tail", byte, 8)
            .member("head", word, 0)
            .finish();

        let TypeRecord::Aggregate(agg) = arena.get(id) else {
            panic!("expected aggregate record");
        };
        let members = arena.members(agg.members);
        assert_eq!(members[0].offset_bits, 0, "members re-sorted by offset");
        assert_eq!(members[1].index, 1, "indices follow the sorted order");
        assert_eq!(
            agg.byte_size.bytes, 9,
            "derived size covers the furthest member end"
        );
    }

    #[test]
    fn name_lookup_is_index_backed() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let id = builder
            .aggregate(AggregateKind::Struct)
            .member("x", word, 0)
            .member("y", word, 4)
            .finish();
        let TypeRecord::Aggregate(agg) = arena.get(id) else {
            panic!("expected aggregate record");
        };
        let y = arena.find_string("y").unwrap();
        let member = agg.member(&arena, y).expect("member y");
        assert_eq!(member.offset_bytes(), 4);
        assert!(agg.member_index(arena.find_string("x").unwrap()) == Some(0));
    }

    #[test]
    fn explicit_layout_overrides_derivation() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let id = builder
            .aggregate(AggregateKind::Struct)
            .layout(16, 0)
            .member("head", word, 0)
            .finish();
        let TypeRecord::Aggregate(agg) = arena.get(id) else {
            panic!("expected aggregate record");
        };
        assert_eq!(agg.byte_size.bytes, 16, "padding retained from explicit layout");
    }

    #[test]
    fn union_members_share_offset_zero() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let float = builder.scalar(None, 4, ScalarEncoding::Floating, DisplayFormat::Default);
        let id = builder
            .aggregate(AggregateKind::Union)
            .member("as_u32", word, 0)
            .member("as_f32", float, 0)
            .finish();
        let TypeRecord::Aggregate(agg) = arena.get(id) else {
            panic!("expected aggregate record");
        };
        assert!(agg.is_union());
        assert_eq!(agg.byte_size.bytes, 4);
        assert!(arena.members(agg.members).iter().all(|m| m.offset_bits == 0));
    }
}
