use smallvec::SmallVec;

use super::arena::{StringId, TypeId};
use super::builder::TypeBuilder;
use super::record::TypeRecord;
use super::scalar::ScalarType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumVariant {
    pub label: StringId,
    pub value: i64,
}

/// Enumeration over an integer base. Values need not be unique; lookups return
/// the first matching label.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumType {
    pub base: ScalarType,
    pub variants: SmallVec<[EnumVariant; 4]>,
}

impl EnumType {
    pub fn new(base: ScalarType) -> Self {
        Self {
            base,
            variants: SmallVec::new(),
        }
    }

    pub fn push_variant(&mut self, variant: EnumVariant) {
        self.variants.push(variant);
    }

    pub fn label_for(&self, value: i64) -> Option<StringId> {
        self.variants
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.label)
    }

    pub fn value_for(&self, label: StringId) -> Option<i64> {
        self.variants
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.value)
    }
}

pub struct EnumBuilder<'builder, 'arena> {
    builder: &'builder mut TypeBuilder<'arena>,
    ty: EnumType,
}

impl<'builder, 'arena> EnumBuilder<'builder, 'arena> {
    pub(super) fn new(builder: &'builder mut TypeBuilder<'arena>, base: ScalarType) -> Self {
        Self {
            builder,
            ty: EnumType::new(base),
        }
    }

    pub fn variant(mut self, label: impl AsRef<str>, value: i64) -> Self {
        let label_id = self.builder.intern(label);
        self.ty.push_variant(EnumVariant {
            label: label_id,
            value,
        });
        self
    }

    pub fn finish(self) -> TypeId {
        self.builder.arena.push_record(TypeRecord::Enum(self.ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::{DisplayFormat, ScalarEncoding, TypeArena};

    #[test]
    fn lookup_finds_first_matching_label() {
        let mut arena = TypeArena::new();
        let ready = arena.intern_string("Ready");
        let alias = arena.intern_string("Go");
        let base = ScalarType::new(None, 1, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let mut ty = EnumType::new(base);
        ty.push_variant(EnumVariant { label: ready, value: 1 });
        ty.push_variant(EnumVariant { label: alias, value: 1 });
        assert_eq!(ty.label_for(1), Some(ready), "first declaration wins");
        assert_eq!(ty.value_for(alias), Some(1));
    }

    #[test]
    fn builder_collects_variants() {
        let mut arena = TypeArena::new();
        let mut builder = TypeBuilder::new(&mut arena);
        let base = ScalarType::new(None, 1, ScalarEncoding::Unsigned, DisplayFormat::Default);
        let id = builder
            .enumeration(base)
            .variant("Ready", 1)
            .variant("Busy", 2)
            .finish();
        let TypeRecord::Enum(ty) = arena.get(id) else {
            panic!("expected enum record");
        };
        assert_eq!(ty.variants.len(), 2);
    }
}
