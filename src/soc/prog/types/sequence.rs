//! Array descriptor with support for compiler-truncated layouts where the
//! stored byte size overrides the declared element count.

use super::arena::{StringId, TypeId};
use super::expr::ExprProgram;

#[derive(Clone, Debug, PartialEq)]
pub enum SequenceCount {
    Static(usize),
    /// Count resolved at traversal time from earlier member values.
    Dynamic(ExprProgram),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceType {
    pub name_id: Option<StringId>,
    pub element: TypeId,
    pub stride_bytes: usize,
    pub start_index: i64,
    pub count: SequenceCount,
    /// Explicit byte size, set when an image knows better than the declared
    /// count (truncated constant tables).
    byte_size_override: Option<usize>,
}

impl SequenceType {
    pub fn new(element: TypeId, stride_bytes: usize, count: SequenceCount) -> Self {
        Self {
            name_id: None,
            element,
            stride_bytes,
            start_index: 0,
            count,
            byte_size_override: None,
        }
    }

    pub fn with_name(mut self, name_id: StringId) -> Self {
        self.name_id = Some(name_id);
        self
    }

    pub fn with_start_index(mut self, start_index: i64) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn element_count(&self) -> Option<usize> {
        match &self.count {
            SequenceCount::Static(count) => Some(*count),
            SequenceCount::Dynamic(_) => None,
        }
    }

    pub fn byte_size(&self) -> Option<usize> {
        if let Some(size) = self.byte_size_override {
            return Some(size);
        }
        self.element_count()
            .map(|count| count * self.stride_bytes)
    }

    /// Forces the byte footprint and re-derives the element count from the
    /// stride, keeping the element type untouched.
    pub fn set_byte_size(&mut self, byte_size: usize) {
        self.byte_size_override = Some(byte_size);
        if self.stride_bytes > 0 {
            self.count = SequenceCount::Static(byte_size / self.stride_bytes);
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.count, SequenceCount::Dynamic(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::arena::TypeId;

    #[test]
    fn byte_size_derives_from_stride_and_count() {
        let seq = SequenceType::new(TypeId::from_index(0), 4, SequenceCount::Static(8));
        assert_eq!(seq.byte_size(), Some(32));
        assert_eq!(seq.element_count(), Some(8));
    }

    #[test]
    fn crushing_rederives_the_count() {
        let mut seq = SequenceType::new(TypeId::from_index(0), 4, SequenceCount::Static(64));
        seq.set_byte_size(40);
        assert_eq!(seq.element_count(), Some(10), "count follows the stored size");
        assert_eq!(seq.byte_size(), Some(40));
    }
}
