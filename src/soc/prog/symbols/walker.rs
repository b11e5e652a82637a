//! Type-driven depth-first traversal emitting the primitive leaves of a
//! symbol's type tree along with their paths and bit offsets.

use smallvec::SmallVec;

use crate::soc::prog::types::{
    AggregateType, ScalarEncoding, ScalarType, SequenceType, StringId, TypeArena, TypeId,
    TypeRecord,
};

/// Primitive leaf shapes emitted by the walker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Unsigned { bytes: usize },
    Signed { bytes: usize },
    Float32,
    Float64,
    Utf8 { bytes: usize },
    Enum,
    Fixed,
    BitField,
    Pointer { bytes: usize, target: Option<TypeId> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolWalkEntry {
    pub ty: TypeId,
    pub path: SymbolPath,
    pub offset_bits: usize,
    pub bit_len: usize,
    pub kind: ValueKind,
}

impl SymbolWalkEntry {
    pub fn byte_len(&self) -> usize {
        self.bit_len.div_ceil(8)
    }

    pub fn offset_bytes(&self) -> usize {
        self.offset_bits / 8
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolPath {
    segments: SmallVec<[PathSegment; 8]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PathSegment {
    Member(Option<StringId>),
    Index(usize),
}

impl SymbolPath {
    pub fn root() -> Self {
        Self {
            segments: SmallVec::new(),
        }
    }

    pub fn push_member(&self, name: Option<StringId>) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Member(name));
        next
    }

    pub fn push_index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(index));
        next
    }

    pub fn render(&self, arena: &TypeArena) -> String {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Member(Some(id)) => {
                    if !text.is_empty() {
                        text.push('.');
                    }
                    text.push_str(arena.resolve_string(*id));
                }
                PathSegment::Member(None) => {
                    if !text.is_empty() {
                        text.push('.');
                    }
                    text.push_str("<unnamed>");
                }
                PathSegment::Index(index) => {
                    text.push('[');
                    text.push_str(&index.to_string());
                    text.push(']');
                }
            }
        }
        if text.is_empty() { "<root>".into() } else { text }
    }
}

#[derive(Clone, Debug)]
struct FrameState {
    ty: TypeId,
    offset_bits: usize,
    path: SymbolPath,
}

/// Stateful iterator over the leaves of `root`, in declaration order.
pub struct SymbolWalker<'arena> {
    arena: &'arena TypeArena,
    stack: SmallVec<[FrameState; 8]>,
}

impl<'arena> SymbolWalker<'arena> {
    pub fn new(arena: &'arena TypeArena, root: TypeId) -> Self {
        let mut stack = SmallVec::new();
        stack.push(FrameState {
            ty: root,
            offset_bits: 0,
            path: SymbolPath::root(),
        });
        Self { arena, stack }
    }

    fn push_sequence(&mut self, frame: &FrameState, sequence: &SequenceType) {
        let Some(count) = sequence.element_count() else {
            return;
        };
        let stride_bits = sequence.stride_bytes * 8;
        for index in (0..count).rev() {
            self.stack.push(FrameState {
                ty: sequence.element,
                offset_bits: frame.offset_bits + index * stride_bits,
                path: frame.path.push_index(index),
            });
        }
    }

    fn push_aggregate(&mut self, frame: &FrameState, aggregate: &AggregateType) {
        if aggregate.members.is_empty() {
            return;
        }
        let members = self.arena.members(aggregate.members);
        for member in members.iter().rev() {
            self.stack.push(FrameState {
                ty: member.ty,
                offset_bits: frame.offset_bits + member.offset_bits,
                path: frame.path.push_member(member.name_id),
            });
        }
    }
}

impl Iterator for SymbolWalker<'_> {
    type Item = SymbolWalkEntry;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match self.arena.get(frame.ty) {
                TypeRecord::Scalar(scalar) => {
                    if let Some(entry) = leaf_scalar(frame.ty, scalar, &frame) {
                        return Some(entry);
                    }
                }
                TypeRecord::Enum(enum_ty) => {
                    return Some(SymbolWalkEntry {
                        ty: frame.ty,
                        offset_bits: frame.offset_bits,
                        bit_len: enum_ty.base.byte_size * 8,
                        path: frame.path,
                        kind: ValueKind::Enum,
                    });
                }
                TypeRecord::Fixed(fixed) => {
                    return Some(SymbolWalkEntry {
                        ty: frame.ty,
                        offset_bits: frame.offset_bits,
                        bit_len: fixed.base.byte_size * 8,
                        path: frame.path,
                        kind: ValueKind::Fixed,
                    });
                }
                TypeRecord::Pointer(pointer) => {
                    return Some(SymbolWalkEntry {
                        ty: frame.ty,
                        offset_bits: frame.offset_bits,
                        bit_len: pointer.byte_size * 8,
                        path: frame.path,
                        kind: ValueKind::Pointer {
                            bytes: pointer.byte_size,
                            target: pointer.target,
                        },
                    });
                }
                TypeRecord::BitField(spec) => {
                    return Some(SymbolWalkEntry {
                        ty: frame.ty,
                        offset_bits: frame.offset_bits,
                        bit_len: spec.total_width() as usize,
                        path: frame.path,
                        kind: ValueKind::BitField,
                    });
                }
                TypeRecord::Sequence(sequence) => self.push_sequence(&frame, sequence),
                TypeRecord::Aggregate(aggregate) => self.push_aggregate(&frame, aggregate),
                // Shapes without a static footprint produce no leaves.
                TypeRecord::Callable(_)
                | TypeRecord::Dynamic(_)
                | TypeRecord::Opaque(_)
                | TypeRecord::Pending => {}
            }
        }
        None
    }
}

fn leaf_scalar(ty: TypeId, scalar: &ScalarType, frame: &FrameState) -> Option<SymbolWalkEntry> {
    let kind = match scalar.encoding {
        ScalarEncoding::Unsigned | ScalarEncoding::None => ValueKind::Unsigned {
            bytes: scalar.byte_size,
        },
        ScalarEncoding::Signed => ValueKind::Signed {
            bytes: scalar.byte_size,
        },
        ScalarEncoding::Floating => match scalar.byte_size {
            4 => ValueKind::Float32,
            8 => ValueKind::Float64,
            _ => return None,
        },
        ScalarEncoding::Utf8String => ValueKind::Utf8 {
            bytes: scalar.byte_size,
        },
    };
    Some(SymbolWalkEntry {
        ty,
        path: frame.path.clone(),
        offset_bits: frame.offset_bits,
        bit_len: scalar.byte_size * 8,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::{AggregateKind, DisplayFormat, TypeBuilder};

    #[test]
    fn aggregate_walks_members_in_order() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        let agg = builder
            .aggregate(AggregateKind::Struct)
            .member("a", word, 0)
            .member("b", word, 4)
            .finish();
        let paths: Vec<String> = SymbolWalker::new(&arena, agg)
            .map(|entry| entry.path.render(&arena))
            .collect();
        assert_eq!(paths, vec!["a", "b"]);
    }

    #[test]
    fn sequences_expand_indexed_elements() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 2, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        let seq = builder.sequence_static(word, 2, 3);
        let agg = builder
            .aggregate(AggregateKind::Struct)
            .member("data", seq, 0)
            .finish();
        let entries: Vec<SymbolWalkEntry> = SymbolWalker::new(&arena, agg).collect();
        let paths: Vec<String> = entries.iter().map(|e| e.path.render(&arena)).collect();
        assert_eq!(paths, vec!["data[0]", "data[1]", "data[2]"]);
        assert_eq!(entries[2].offset_bits, 32, "stride accumulates per index");
    }

    #[test]
    fn nested_offsets_accumulate() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        let inner = builder
            .aggregate(AggregateKind::Struct)
            .member("x", word, 0)
            .member("y", word, 4)
            .finish();
        let outer = builder
            .aggregate(AggregateKind::Struct)
            .member("head", word, 0)
            .member("point", inner, 4)
            .finish();
        let entries: Vec<SymbolWalkEntry> = SymbolWalker::new(&arena, outer).collect();
        assert_eq!(entries[2].path.render(&arena), "point.y");
        assert_eq!(entries[2].offset_bytes(), 8);
    }

    #[test]
    fn pointer_leaves_expose_their_target() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let word = builder.scalar(None, 4, ScalarEncoding::Unsigned, DisplayFormat::Hex);
        let ptr = builder.pointer(Some(word), 4);
        let mut walker = SymbolWalker::new(&arena, ptr);
        let entry = walker.next().expect("pointer leaf");
        assert!(matches!(entry.kind, ValueKind::Pointer { bytes: 4, target: Some(t) } if t == word));
        assert!(walker.next().is_none());
    }

    #[test]
    fn empty_aggregates_yield_nothing() {
        let mut arena = TypeArena::new();
        let agg = TypeBuilder::new(&mut arena)
            .aggregate(AggregateKind::Struct)
            .finish();
        assert!(SymbolWalker::new(&arena, agg).next().is_none());
    }
}
