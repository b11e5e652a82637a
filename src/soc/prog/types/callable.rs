use smallvec::SmallVec;

use super::arena::{StringId, TypeId};

/// Subroutine signature recovered from debug info: return and parameter types
/// plus the code window the body occupies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallableType {
    pub name_id: Option<StringId>,
    pub returns: SmallVec<[TypeId; 2]>,
    pub inputs: SmallVec<[TypeId; 4]>,
    pub low_pc: Option<u64>,
    pub high_pc: Option<u64>,
}

impl CallableType {
    pub fn new(name_id: Option<StringId>) -> Self {
        Self {
            name_id,
            returns: SmallVec::new(),
            inputs: SmallVec::new(),
            low_pc: None,
            high_pc: None,
        }
    }

    pub fn push_return(&mut self, ty: TypeId) {
        self.returns.push(ty);
    }

    pub fn push_input(&mut self, ty: TypeId) {
        self.inputs.push(ty);
    }

    pub fn code_window(&self) -> Option<(u64, u64)> {
        match (self.low_pc, self.high_pc) {
            (Some(low), Some(high)) => Some((low, high)),
            _ => None,
        }
    }
}
