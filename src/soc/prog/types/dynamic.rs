//! Self-describing records whose member counts depend on values read earlier
//! in the same record. A dynamic aggregate resolves into a concrete aggregate
//! against a live cursor, and the resolution is cached by the cursor's
//! absolute address.

use ahash::AHashMap;

use crate::soc::prog::cursor::{ByteCursor, CursorResult};

use super::aggregate::AggregateKind;
use super::arena::{StringId, TypeArena, TypeId};
use super::builder::TypeBuilder;
use super::expr::{EvalContext, ExprProgram};
use super::record::MemberRecord;
use super::sequence::{SequenceCount, SequenceType};

#[derive(Clone, Debug, PartialEq)]
pub struct DynamicField {
    pub name_id: Option<StringId>,
    pub ty: TypeId,
    /// Element count computed from earlier members; `None` keeps the field a
    /// single value of `ty`.
    pub count: Option<ExprProgram>,
}

impl DynamicField {
    pub fn scalar(name_id: Option<StringId>, ty: TypeId) -> Self {
        Self {
            name_id,
            ty,
            count: None,
        }
    }

    pub fn counted(name_id: Option<StringId>, ty: TypeId, count: ExprProgram) -> Self {
        Self {
            name_id,
            ty,
            count: Some(count),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DynamicAggregate {
    pub name_id: Option<StringId>,
    pub fields: Vec<DynamicField>,
}

impl DynamicAggregate {
    pub fn new(name_id: Option<StringId>) -> Self {
        Self {
            name_id,
            fields: Vec::new(),
        }
    }

    pub fn push_field(&mut self, field: DynamicField) {
        self.fields.push(field);
    }

    /// Builds the concrete aggregate for the record at the cursor's current
    /// position. Field offsets accumulate in declaration order; count
    /// expressions see the values of already-placed scalar members by index.
    pub fn resolve(&self, arena: &mut TypeArena, cursor: &mut ByteCursor) -> CursorResult<TypeId> {
        let record_start = cursor.index();

        struct Placed {
            name_id: Option<StringId>,
            ty: TypeId,
            offset: usize,
            count: Option<usize>,
            value: u64,
        }

        let mut placed: Vec<Placed> = Vec::new();
        let mut offset = 0usize;
        for field in &self.fields {
            let element_size = arena.byte_size_of(field.ty).unwrap_or(0);
            let count = match &field.count {
                Some(program) => {
                    let values: Vec<u64> = placed.iter().map(|entry| entry.value).collect();
                    let mut ctx = PlacedContext {
                        arena,
                        values: &values,
                    };
                    Some(program.evaluate(&mut ctx) as usize)
                }
                None => None,
            };
            let span = element_size * count.unwrap_or(1);
            let value = if count.is_none() && (1..=8).contains(&element_size) {
                cursor.set_index(record_start + offset)?;
                cursor.get_unsigned(element_size)?
            } else {
                0
            };
            placed.push(Placed {
                name_id: field.name_id,
                ty: field.ty,
                offset,
                count,
                value,
            });
            offset += span;
        }

        // Materialise member records: counted fields become static sequences
        // sized by the evaluated count.
        let mut records = Vec::with_capacity(placed.len());
        for entry in &placed {
            let member_ty = match entry.count {
                Some(count) => {
                    let stride = arena.byte_size_of(entry.ty).unwrap_or(0);
                    let seq = SequenceType::new(entry.ty, stride, SequenceCount::Static(count));
                    arena.push_record(super::record::TypeRecord::Sequence(seq))
                }
                None => entry.ty,
            };
            records.push(MemberRecord::new(entry.name_id, member_ty, entry.offset * 8));
        }
        let mut builder = TypeBuilder::new(arena);
        let mut agg = builder.aggregate(AggregateKind::Struct).mark_dynamic();
        for record in records {
            agg = agg.member_record(record);
        }
        let resolved = agg.finish();
        cursor.set_index(record_start)?;
        Ok(resolved)
    }
}

struct PlacedContext<'a> {
    arena: &'a TypeArena,
    values: &'a [u64],
}

impl EvalContext for PlacedContext<'_> {
    fn read_member(&mut self, index: u32) -> u64 {
        self.values.get(index as usize).copied().unwrap_or(0)
    }

    fn sizeof(&self, ty: TypeId) -> u64 {
        self.arena.byte_size_of(ty).unwrap_or(0) as u64
    }

    fn deref(&mut self, _address: u64) -> u64 {
        // Dynamic layout counts come from in-record values; indirection is not
        // part of the record format.
        0
    }
}

/// Resolution cache keyed by the record's absolute address.
#[derive(Default)]
pub struct DynamicCache {
    resolved: AHashMap<u64, TypeId>,
}

impl DynamicCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        dynamic: &DynamicAggregate,
        arena: &mut TypeArena,
        cursor: &mut ByteCursor,
    ) -> CursorResult<TypeId> {
        let key = cursor.address();
        if let Some(ty) = self.resolved.get(&key) {
            return Ok(*ty);
        }
        let ty = dynamic.resolve(arena, cursor)?;
        self.resolved.insert(key, ty);
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;
    use crate::soc::prog::types::record::TypeRecord;
    use crate::soc::prog::types::{DisplayFormat, ScalarEncoding};

    #[test]
    fn counted_field_resolves_from_header_value() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let count_ty = builder.scalar(None, 1, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let elem_ty = builder.scalar(None, 2, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        let len_name = builder.intern("len");
        let data_name = builder.intern("data");

        let mut dynamic = DynamicAggregate::new(None);
        dynamic.push_field(DynamicField::scalar(Some(len_name), count_ty));
        dynamic.push_field(DynamicField::counted(
            Some(data_name),
            elem_ty,
            ExprProgram::member(0),
        ));

        // Record: len = 3, then three u16 payload slots.
        let mut cursor = ByteCursor::new(vec![3, 0x11, 0x11, 0x22, 0x22, 0x33, 0x33], ByteOrder::Little);
        let resolved = dynamic.resolve(&mut arena, &mut cursor).expect("resolve");
        let TypeRecord::Aggregate(agg) = arena.get(resolved) else {
            panic!("expected concrete aggregate");
        };
        assert_eq!(agg.byte_size.bytes, 1 + 3 * 2, "layout follows the header count");
        let members = arena.members(agg.members);
        assert_eq!(members.len(), 2);
        let TypeRecord::Sequence(seq) = arena.get(members[1].ty) else {
            panic!("counted field should resolve to a sequence");
        };
        assert_eq!(seq.element_count(), Some(3));
    }

    #[test]
    fn cache_reuses_resolution_per_address() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let count_ty = builder.scalar(None, 1, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let name = builder.intern("len");
        let mut dynamic = DynamicAggregate::new(None);
        dynamic.push_field(DynamicField::scalar(Some(name), count_ty));

        let mut cache = DynamicCache::new();
        let mut cursor = ByteCursor::new(vec![1, 2, 3], ByteOrder::Little);
        let first = cache.resolve(&dynamic, &mut arena, &mut cursor).unwrap();
        let again = cache.resolve(&dynamic, &mut arena, &mut cursor).unwrap();
        assert_eq!(first, again, "same address should hit the cache");
    }
}
