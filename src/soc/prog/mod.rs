//! Program model: byte cursors over loaded images, the type arena, and the
//! symbol table shared between the loader and the bus handles.

pub mod cursor;
pub mod symbols;
pub mod types;
