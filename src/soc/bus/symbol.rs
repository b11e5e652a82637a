//! Symbol-aware bus access: path resolution through the type graph,
//! depth-first value traversal, and pointer chasing, all reading live memory
//! through a `DataHandle`.

use std::sync::Arc;

use crate::soc::device::Endianness;
use crate::soc::prog::cursor::{ByteCursor, ByteOrder, CursorError};
use crate::soc::prog::symbols::{SymbolTable, SymbolWalkEntry, SymbolWalker, ValueKind};
use crate::soc::prog::types::{
    DisplayFormat, ScalarEncoding, TypeArena, TypeId, TypeRecord,
};

use super::data::DataHandle;
use super::device_bus::DeviceBus;
use super::error::BusError;

#[derive(Clone, Debug, PartialEq)]
pub enum SymbolValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Utf8(String),
    Enum { label: Option<String>, value: i64 },
    Bytes(Vec<u8>),
}

#[derive(Debug)]
pub enum SymbolAccessError {
    UnknownSymbol { label: String },
    UnknownPath { path: String },
    MissingAddress { label: String },
    UnsupportedTraversal { path: String },
    Bus(BusError),
    Cursor(CursorError),
}

impl From<BusError> for SymbolAccessError {
    fn from(value: BusError) -> Self {
        SymbolAccessError::Bus(value)
    }
}

impl From<CursorError> for SymbolAccessError {
    fn from(value: CursorError) -> Self {
        SymbolAccessError::Cursor(value)
    }
}

impl std::fmt::Display for SymbolAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolAccessError::UnknownSymbol { label } => {
                write!(f, "symbol '{label}' is not in the table")
            }
            SymbolAccessError::UnknownPath { path } => {
                write!(f, "path '{path}' does not resolve through the type graph")
            }
            SymbolAccessError::MissingAddress { label } => {
                write!(f, "symbol '{label}' has no runtime or file address")
            }
            SymbolAccessError::UnsupportedTraversal { path } => {
                write!(f, "'{path}' has no type metadata to drive traversal")
            }
            SymbolAccessError::Bus(err) => err.fmt(f),
            SymbolAccessError::Cursor(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for SymbolAccessError {}

/// Outcome of a symbolic path descent: the type and bus address of the node.
#[derive(Clone, Debug)]
pub struct ResolvedMember {
    pub ty: TypeId,
    pub address: u64,
    pub path: String,
}

/// Combines the frozen symbol table with a live bus view.
pub struct SymbolHandle<'table> {
    table: &'table SymbolTable,
    data: DataHandle,
}

pub struct SymbolWalkRead {
    pub entry: SymbolWalkEntry,
    pub value: SymbolValue,
    pub address: u64,
}

impl<'table> SymbolHandle<'table> {
    pub fn new(table: &'table SymbolTable, bus: Arc<DeviceBus>) -> Self {
        Self {
            table,
            data: DataHandle::new(bus),
        }
    }

    pub fn table(&self) -> &'table SymbolTable {
        self.table
    }

    /// Descends `"sym.member[3].leaf"` through the type graph and returns the
    /// node's type and bus address.
    pub fn resolve_path(&self, path: &str) -> Result<ResolvedMember, SymbolAccessError> {
        let arena = self.table.arena().as_ref();
        let mut segments = PathSegments::new(path);
        let label = segments
            .next_member()
            .ok_or_else(|| SymbolAccessError::UnknownPath { path: path.into() })?;
        let record = self
            .table
            .lookup(label)
            .ok_or_else(|| SymbolAccessError::UnknownSymbol {
                label: label.to_string(),
            })?;
        let mut address = record
            .address()
            .ok_or_else(|| SymbolAccessError::MissingAddress {
                label: label.to_string(),
            })?;
        let mut ty = record
            .type_id
            .ok_or_else(|| SymbolAccessError::UnsupportedTraversal { path: path.into() })?;

        loop {
            match segments.next() {
                None => {
                    return Ok(ResolvedMember {
                        ty,
                        address,
                        path: path.to_string(),
                    });
                }
                Some(PathStep::Member(name)) => {
                    let TypeRecord::Aggregate(agg) = arena.get(ty) else {
                        return Err(SymbolAccessError::UnknownPath { path: path.into() });
                    };
                    let name_id = arena
                        .find_string(name)
                        .ok_or_else(|| SymbolAccessError::UnknownPath { path: path.into() })?;
                    let member = agg
                        .member(arena, name_id)
                        .ok_or_else(|| SymbolAccessError::UnknownPath { path: path.into() })?;
                    address += member.offset_bytes() as u64;
                    ty = member.ty;
                }
                Some(PathStep::Index(index)) => {
                    let TypeRecord::Sequence(seq) = arena.get(ty) else {
                        return Err(SymbolAccessError::UnknownPath { path: path.into() });
                    };
                    let count = seq.element_count().unwrap_or(usize::MAX);
                    if index >= count {
                        return Err(SymbolAccessError::UnknownPath { path: path.into() });
                    }
                    address += (index * seq.stride_bytes) as u64;
                    ty = seq.element;
                }
            }
        }
    }

    /// Reads the typed value at the end of a symbolic path.
    pub fn read_path(&mut self, path: &str) -> Result<SymbolValue, SymbolAccessError> {
        let resolved = self.resolve_path(path)?;
        self.read_typed(resolved.ty, resolved.address)
    }

    /// Renders the value at the end of a symbolic path.
    pub fn format_path(
        &mut self,
        path: &str,
        format: DisplayFormat,
    ) -> Result<String, SymbolAccessError> {
        let resolved = self.resolve_path(path)?;
        let arena = self.table.arena().clone();
        let mut cursor = self.snapshot(resolved.ty, resolved.address)?;
        let (text, _) = arena.get_string(resolved.ty, &mut cursor, format)?;
        Ok(text)
    }

    /// Starts a depth-first traversal over every primitive leaf of a symbol.
    pub fn value_cursor(
        &mut self,
        label: &str,
    ) -> Result<SymbolValueCursor<'_, 'table>, SymbolAccessError> {
        let record = self
            .table
            .lookup(label)
            .ok_or_else(|| SymbolAccessError::UnknownSymbol {
                label: label.to_string(),
            })?;
        let base = record
            .address()
            .ok_or_else(|| SymbolAccessError::MissingAddress {
                label: label.to_string(),
            })?;
        let ty = record
            .type_id
            .ok_or_else(|| SymbolAccessError::UnsupportedTraversal {
                path: label.to_string(),
            })?;
        let arena = self.table.arena().as_ref();
        Ok(SymbolValueCursor {
            walker: SymbolWalker::new(arena, ty),
            arena,
            handle: self,
            base,
        })
    }

    /// Copies the type's backing bytes into a cursor carrying the device's
    /// byte order, so the coding layer sees the same view as a file load.
    fn snapshot(&mut self, ty: TypeId, address: u64) -> Result<ByteCursor, SymbolAccessError> {
        let arena = self.table.arena();
        let size = arena
            .byte_size_of(ty)
            .ok_or_else(|| SymbolAccessError::UnsupportedTraversal {
                path: arena.name_of(ty),
            })?;
        self.data.jump(address)?;
        let mut buf = vec![0u8; size];
        if size > 0 {
            self.data.read_bytes(&mut buf)?;
        }
        let order = match self.data.address().device_endianness() {
            Some(Endianness::Big) => ByteOrder::Big,
            _ => ByteOrder::Little,
        };
        Ok(ByteCursor::new(buf, order).with_base(address))
    }

    fn read_typed(&mut self, ty: TypeId, address: u64) -> Result<SymbolValue, SymbolAccessError> {
        let arena = self.table.arena().clone();
        let mut cursor = self.snapshot(ty, address)?;
        read_value(arena.as_ref(), ty, &mut cursor).map_err(Into::into)
    }

    /// Writes raw bytes at the location a path resolves to.
    pub fn write_path_bytes(
        &mut self,
        path: &str,
        bytes: &[u8],
    ) -> Result<(), SymbolAccessError> {
        let resolved = self.resolve_path(path)?;
        self.data.jump(resolved.address)?;
        self.data.write_bytes(bytes)?;
        Ok(())
    }
}

/// Depth-first leaf traversal bound to one symbol.
pub struct SymbolValueCursor<'handle, 'table> {
    handle: &'handle mut SymbolHandle<'table>,
    walker: SymbolWalker<'table>,
    arena: &'table TypeArena,
    base: u64,
}

impl<'handle, 'table> SymbolValueCursor<'handle, 'table> {
    /// Yields the next primitive leaf in declaration order with its value and
    /// bus address.
    pub fn next_value(&mut self) -> Result<Option<SymbolWalkRead>, SymbolAccessError> {
        for entry in self.walker.by_ref() {
            // Sub-byte offsets only make sense for bitfield leaves, which
            // read their whole container word.
            if entry.offset_bits % 8 != 0
                && !matches!(self.arena.get(entry.ty), TypeRecord::BitField(_))
            {
                continue;
            }
            let address = self.base + (entry.offset_bits / 8) as u64;
            let arena = self.handle.table.arena().clone();
            let mut cursor = self.handle.snapshot(entry.ty, address)?;
            let value = read_value(arena.as_ref(), entry.ty, &mut cursor)?;
            return Ok(Some(SymbolWalkRead {
                entry,
                value,
                address,
            }));
        }
        Ok(None)
    }

    /// Follows a pointer leaf: reads its value as a bus address, re-resolves,
    /// and returns a cursor that descends into the referent type.
    pub fn deref(
        self,
        read: &SymbolWalkRead,
    ) -> Result<SymbolValueCursor<'handle, 'table>, SymbolAccessError> {
        let ValueKind::Pointer { target, .. } = read.entry.kind else {
            return Err(SymbolAccessError::UnsupportedTraversal {
                path: read.entry.path.render(self.arena),
            });
        };
        let Some(target) = target else {
            return Err(SymbolAccessError::UnsupportedTraversal {
                path: read.entry.path.render(self.arena),
            });
        };
        let SymbolValue::Unsigned(address) = &read.value else {
            return Err(SymbolAccessError::UnsupportedTraversal {
                path: read.entry.path.render(self.arena),
            });
        };
        Ok(SymbolValueCursor {
            walker: SymbolWalker::new(self.arena, target),
            arena: self.arena,
            handle: self.handle,
            base: *address,
        })
    }

    /// Reads the value a pointer leaf refers to, without descending.
    pub fn deref_value(
        &mut self,
        read: &SymbolWalkRead,
    ) -> Result<SymbolValue, SymbolAccessError> {
        let ValueKind::Pointer { target: Some(target), .. } = read.entry.kind else {
            return Err(SymbolAccessError::UnsupportedTraversal {
                path: read.entry.path.render(self.arena),
            });
        };
        let SymbolValue::Unsigned(address) = &read.value else {
            return Err(SymbolAccessError::UnsupportedTraversal {
                path: read.entry.path.render(self.arena),
            });
        };
        self.handle.read_typed(target, *address)
    }

    /// Writes a raw byte image into the location of a walk entry.
    pub fn write_bytes(
        &mut self,
        entry: &SymbolWalkEntry,
        data: &[u8],
    ) -> Result<(), SymbolAccessError> {
        let address = self.base + (entry.offset_bits / 8) as u64;
        self.handle.data.jump(address)?;
        self.handle.data.write_bytes(data)?;
        Ok(())
    }
}

fn read_value(
    arena: &TypeArena,
    ty: TypeId,
    cursor: &mut ByteCursor,
) -> Result<SymbolValue, CursorError> {
    let value = match arena.get(ty) {
        TypeRecord::Scalar(scalar) => match scalar.encoding {
            ScalarEncoding::Signed => SymbolValue::Signed(arena.get_signed(ty, cursor)?.0),
            ScalarEncoding::Floating => SymbolValue::Float(arena.get_float(ty, cursor)?.0),
            ScalarEncoding::Utf8String => {
                SymbolValue::Utf8(arena.get_string(ty, cursor, DisplayFormat::Default)?.0)
            }
            _ => SymbolValue::Unsigned(arena.get_unsigned(ty, cursor)?.0),
        },
        TypeRecord::Fixed(_) => SymbolValue::Float(arena.get_float(ty, cursor)?.0),
        TypeRecord::Enum(enum_ty) => {
            let labels = enum_ty.clone();
            let (value, _) = arena.get_signed(ty, cursor)?;
            SymbolValue::Enum {
                label: labels
                    .label_for(value)
                    .map(|id| arena.resolve_string(id).to_string()),
                value,
            }
        }
        TypeRecord::Pointer(_) => SymbolValue::Unsigned(arena.get_unsigned(ty, cursor)?.0),
        TypeRecord::BitField(spec) => {
            if spec.is_signed() {
                SymbolValue::Signed(arena.get_signed(ty, cursor)?.0)
            } else {
                SymbolValue::Unsigned(arena.get_unsigned(ty, cursor)?.0)
            }
        }
        _ => {
            let size = arena.byte_size_of(ty).unwrap_or(0);
            let mut buf = vec![0u8; size];
            cursor.read_exact(&mut buf)?;
            SymbolValue::Bytes(buf)
        }
    };
    Ok(value)
}

enum PathStep<'a> {
    Member(&'a str),
    Index(usize),
}

/// Tokenizes `a.b[3].c` into member and index steps.
struct PathSegments<'a> {
    rest: &'a str,
}

impl<'a> PathSegments<'a> {
    fn new(path: &'a str) -> Self {
        Self { rest: path }
    }

    fn next_member(&mut self) -> Option<&'a str> {
        match self.next() {
            Some(PathStep::Member(name)) => Some(name),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<PathStep<'a>> {
        self.rest = self.rest.trim_start_matches('.');
        if self.rest.is_empty() {
            return None;
        }
        if let Some(stripped) = self.rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let index = stripped[..close].trim().parse::<usize>().ok()?;
            self.rest = &stripped[close + 1..];
            return Some(PathStep::Index(index));
        }
        let end = self
            .rest
            .find(['.', '['])
            .unwrap_or(self.rest.len());
        let name = &self.rest[..end];
        self.rest = &self.rest[end..];
        Some(PathStep::Member(name))
    }
}
