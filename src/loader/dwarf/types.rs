//! Maps debug-info entries onto the type arena. Construction interns a
//! placeholder at the entry's defining offset before recursing into children,
//! so self-referential pointers and mutually recursive aggregates terminate.

use ahash::AHashMap;
use tracing::warn;

use crate::soc::prog::cursor::ByteOrder;
use crate::soc::prog::symbols::SymbolTableBuilder;
use crate::soc::prog::types::{
    AggregateKind, BitFieldSpec, CallableType, DisplayFormat, EnumType, EnumVariant,
    MemberRecord, PointerType, ScalarEncoding, ScalarType, SequenceCount, SequenceType,
    TypeBuilder, TypeId, TypeRecord,
};

use super::consts::*;
use super::die::Die;
use super::expr;

pub struct TypeFactory<'dies> {
    dies: AHashMap<u64, &'dies Die>,
    by_offset: AHashMap<u64, TypeId>,
    order: ByteOrder,
    address_size: usize,
    degraded: bool,
}

impl<'dies> TypeFactory<'dies> {
    pub fn new(order: ByteOrder, address_size: usize) -> Self {
        Self {
            dies: AHashMap::new(),
            by_offset: AHashMap::new(),
            order,
            address_size,
            degraded: false,
        }
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// Indexes a unit's whole tree by section offset so references resolve in
    /// O(1).
    pub fn index_unit(&mut self, root: &'dies Die) {
        self.index_die(root);
    }

    fn index_die(&mut self, die: &'dies Die) {
        self.dies.insert(die.offset, die);
        for child in &die.children {
            self.index_die(child);
        }
    }

    pub fn die_at(&self, offset: u64) -> Option<&'dies Die> {
        self.dies.get(&offset).copied()
    }

    /// Resolves the type defined at a section offset, building it (and its
    /// dependencies) on first use.
    pub fn resolve(
        &mut self,
        builder: &mut SymbolTableBuilder,
        offset: u64,
    ) -> Option<TypeId> {
        if let Some(id) = self.by_offset.get(&offset) {
            return Some(*id);
        }
        let die = match self.dies.get(&offset) {
            Some(die) => *die,
            None => {
                warn!(offset, "type reference points outside the parsed units");
                self.degraded = true;
                return None;
            }
        };
        self.build(builder, die)
    }

    fn resolve_attr_type(
        &mut self,
        builder: &mut SymbolTableBuilder,
        die: &Die,
    ) -> Option<TypeId> {
        die.try_get_die(AT_TYPE)
            .and_then(|offset| self.resolve(builder, offset))
    }

    fn build(&mut self, builder: &mut SymbolTableBuilder, die: &'dies Die) -> Option<TypeId> {
        match die.tag {
            TAG_BASE_TYPE => {
                let byte_size = die.try_get_udata(AT_BYTE_SIZE).unwrap_or(0) as usize;
                let encoding = match die.try_get_udata(AT_ENCODING).unwrap_or(ATE_UNSIGNED) {
                    ATE_SIGNED | ATE_SIGNED_CHAR => ScalarEncoding::Signed,
                    ATE_FLOAT => ScalarEncoding::Floating,
                    ATE_UNSIGNED | ATE_UNSIGNED_CHAR | ATE_BOOLEAN | ATE_ADDRESS => {
                        ScalarEncoding::Unsigned
                    }
                    _ => ScalarEncoding::None,
                };
                let name_id = die
                    .label
                    .as_deref()
                    .map(|name| builder.arena_mut().intern_string(name));
                let ty = builder.arena_mut().push_record(TypeRecord::Scalar(
                    ScalarType::new(name_id, byte_size, encoding, DisplayFormat::Default),
                ));
                self.by_offset.insert(die.offset, ty);
                Some(ty)
            }
            TAG_POINTER_TYPE => {
                // Interned before the referent so pointer-to-self terminates.
                let slot = builder.arena_mut().reserve();
                self.by_offset.insert(die.offset, slot);
                let target = self.resolve_attr_type(builder, die);
                let byte_size = die
                    .try_get_udata(AT_BYTE_SIZE)
                    .map(|size| size as usize)
                    .unwrap_or(self.address_size);
                builder
                    .arena_mut()
                    .replace(slot, TypeRecord::Pointer(PointerType::new(target, byte_size)));
                Some(slot)
            }
            TAG_TYPEDEF | TAG_CONST_TYPE | TAG_VOLATILE_TYPE => {
                // Transparent rename of the referent.
                let referent = self
                    .resolve_attr_type(builder, die)
                    .unwrap_or_else(|| {
                        TypeBuilder::new(builder.arena_mut()).opaque(die.label.as_deref(), 0)
                    });
                self.by_offset.insert(die.offset, referent);
                Some(referent)
            }
            TAG_ARRAY_TYPE => {
                let slot = builder.arena_mut().reserve();
                self.by_offset.insert(die.offset, slot);
                let element = self.resolve_attr_type(builder, die)?;
                let stride = builder.arena_mut().byte_size_of(element).unwrap_or(0);
                let (lower, upper) = die
                    .children_with_tag(TAG_SUBRANGE_TYPE)
                    .next()
                    .map(|subrange| {
                        (
                            subrange.try_get_udata(AT_LOWER_BOUND).unwrap_or(0),
                            subrange.try_get_udata(AT_UPPER_BOUND),
                        )
                    })
                    .unwrap_or((0, None));
                // The sentinel upper bound means "recover the count from the
                // bound symbol's size" at link time.
                let count = match upper {
                    Some(UNKNOWN_UPPER_BOUND) | None => 0,
                    Some(upper) => (upper - lower + 1) as usize,
                };
                let mut sequence =
                    SequenceType::new(element, stride, SequenceCount::Static(count))
                        .with_start_index(lower as i64);
                if let Some(name) = die.label.as_deref() {
                    let name_id = builder.arena_mut().intern_string(name);
                    sequence = sequence.with_name(name_id);
                }
                builder
                    .arena_mut()
                    .replace(slot, TypeRecord::Sequence(sequence));
                Some(slot)
            }
            TAG_STRUCTURE_TYPE | TAG_UNION_TYPE | TAG_CLASS_TYPE => {
                let slot = builder.arena_mut().reserve();
                self.by_offset.insert(die.offset, slot);
                let kind = match die.tag {
                    TAG_UNION_TYPE => AggregateKind::Union,
                    TAG_CLASS_TYPE => AggregateKind::Class,
                    _ => AggregateKind::Struct,
                };
                let byte_size = die.try_get_udata(AT_BYTE_SIZE);

                let mut records = Vec::new();
                for child in die.children_with_tag(TAG_MEMBER) {
                    if let Some(record) = self.build_member(builder, child) {
                        records.push(record);
                    }
                }

                let mut tb = TypeBuilder::new(builder.arena_mut());
                let mut agg = tb.aggregate(kind).into_reserved(slot);
                if let Some(name) = die.label.as_deref() {
                    agg = agg.named(name);
                }
                if let Some(bytes) = byte_size {
                    agg = agg.layout(bytes as usize, 0);
                }
                for record in records {
                    agg = agg.member_record(record);
                }
                agg.finish();
                Some(slot)
            }
            TAG_ENUMERATION_TYPE => {
                let byte_size = die.try_get_udata(AT_BYTE_SIZE).unwrap_or(4) as usize;
                let name_id = die
                    .label
                    .as_deref()
                    .map(|name| builder.arena_mut().intern_string(name));
                let base = ScalarType::new(
                    name_id,
                    byte_size,
                    ScalarEncoding::Signed,
                    DisplayFormat::Default,
                );
                let mut enum_ty = EnumType::new(base);
                for child in die.children_with_tag(TAG_ENUMERATOR) {
                    let Some(label) = child.label.as_deref() else {
                        continue;
                    };
                    let value = child.try_get_sdata(AT_CONST_VALUE).unwrap_or(0);
                    let label_id = builder.arena_mut().intern_string(label);
                    enum_ty.push_variant(EnumVariant {
                        label: label_id,
                        value,
                    });
                }
                let ty = builder.arena_mut().push_record(TypeRecord::Enum(enum_ty));
                self.by_offset.insert(die.offset, ty);
                Some(ty)
            }
            TAG_SUBPROGRAM | TAG_SUBROUTINE_TYPE => {
                let slot = builder.arena_mut().reserve();
                self.by_offset.insert(die.offset, slot);
                let name_id = die
                    .label
                    .as_deref()
                    .map(|name| builder.arena_mut().intern_string(name));
                let mut callable = CallableType::new(name_id);
                if let Some(ret) = self.resolve_attr_type(builder, die) {
                    callable.push_return(ret);
                }
                callable.low_pc = die.try_get_udata(AT_LOW_PC);
                callable.high_pc = die.try_get_udata(AT_HIGH_PC);
                for child in die.children_with_tag(TAG_FORMAL_PARAMETER) {
                    // Abstract-origin chains lead to the concrete parameter.
                    let concrete = child
                        .try_get_die(AT_ABSTRACT_ORIGIN)
                        .and_then(|origin| self.die_at(origin))
                        .unwrap_or(child);
                    if let Some(input) = self.resolve_attr_type(builder, concrete) {
                        callable.push_input(input);
                    }
                }
                builder
                    .arena_mut()
                    .replace(slot, TypeRecord::Callable(callable));
                Some(slot)
            }
            _ => {
                let byte_size = die.try_get_udata(AT_BYTE_SIZE).unwrap_or(0) as usize;
                let ty = TypeBuilder::new(builder.arena_mut())
                    .opaque(die.label.as_deref(), byte_size);
                self.by_offset.insert(die.offset, ty);
                Some(ty)
            }
        }
    }

    fn build_member(
        &mut self,
        builder: &mut SymbolTableBuilder,
        die: &'dies Die,
    ) -> Option<MemberRecord> {
        let mut ty = self.resolve_attr_type(builder, die)?;
        // Byte offset comes from a location expression evaluated against 0,
        // or directly from a constant-class attribute.
        let byte_offset = match die.try_get_expression(AT_DATA_MEMBER_LOCATION) {
            Some(block) => expr::evaluate(&block, 0, self.order).unwrap_or_else(|| {
                warn!(member = die.label.as_deref().unwrap_or("<anon>"), "member offset expression failed");
                self.degraded = true;
                0
            }),
            None => die.try_get_udata(AT_DATA_MEMBER_LOCATION).unwrap_or(0),
        };

        if let Some(bit_size) = die.try_get_udata(AT_BIT_SIZE) {
            let container_bytes = die
                .try_get_udata(AT_BYTE_SIZE)
                .map(|size| size as usize)
                .or_else(|| builder.arena_mut().byte_size_of(ty))
                .unwrap_or(4);
            let container_bits = (container_bytes * 8) as u64;
            let bit_offset = die.try_get_udata(AT_BIT_OFFSET).unwrap_or(0);
            // Bit offsets count from the container's MSB; segments store
            // LSB-relative positions.
            let lsb_offset = container_bits.saturating_sub(bit_offset + bit_size);
            let signed = self.member_base_is_signed(builder, ty);
            let mut spec =
                BitFieldSpec::from_range(container_bits as u16, lsb_offset as u16, bit_size as u16);
            spec.signed = signed;
            ty = builder.arena_mut().push_record(TypeRecord::BitField(spec));
        }

        let name_id = die
            .label
            .as_deref()
            .map(|name| builder.arena_mut().intern_string(name));
        Some(MemberRecord::new(name_id, ty, byte_offset as usize * 8))
    }

    fn member_base_is_signed(&self, builder: &mut SymbolTableBuilder, ty: TypeId) -> bool {
        matches!(
            builder.arena_mut().get(ty),
            TypeRecord::Scalar(ScalarType {
                encoding: ScalarEncoding::Signed,
                ..
            })
        )
    }
}
