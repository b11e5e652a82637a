use super::arena::TypeId;

/// Typed pointer. A missing target models `void*`; a target may also point
/// back at an ancestor type, which the arena representation makes safe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerType {
    pub target: Option<TypeId>,
    pub byte_size: usize,
}

impl PointerType {
    pub fn new(target: Option<TypeId>, byte_size: usize) -> Self {
        Self { target, byte_size }
    }

    pub fn is_void(&self) -> bool {
        self.target.is_none()
    }
}
