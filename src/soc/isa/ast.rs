//! Parsed representation of the `.isa` file family: one document per file,
//! items in declaration order.

use std::path::PathBuf;

use crate::soc::device::Endianness;

use super::diagnostic::SourceSpan;

#[derive(Clone, Debug)]
pub struct IsaDocument {
    pub path: PathBuf,
    pub items: Vec<IsaItem>,
}

impl IsaDocument {
    pub fn new(path: PathBuf, items: Vec<IsaItem>) -> Self {
        Self { path, items }
    }
}

#[derive(Clone, Debug)]
pub enum IsaItem {
    Parameter(ParamDecl),
    Space(SpaceDecl),
    Bus(BusDecl),
    Field(FieldDecl),
    BusRange(BusRangeDecl),
    Form(FormDecl),
    Instruction(InstructionDecl),
    Include(IncludeDecl),
    Attach(AttachDecl),
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub value: String,
    pub span: SourceSpan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceKind {
    ReadWrite,
    ReadOnly,
    MemIo,
    Register,
    Logic,
}

#[derive(Clone, Debug)]
pub struct SpaceDecl {
    pub tag: String,
    pub addr_bits: Option<u32>,
    pub word_bits: Option<u32>,
    pub kind: SpaceKind,
    pub align: Option<u32>,
    pub endian: Option<Endianness>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct BusDecl {
    pub tag: String,
    pub addr_bits: u32,
    pub span: SourceSpan,
}

/// A named storage field (register or memory cell) declared inside a space.
/// Bracketed declarations expand into `tag<i>` instances downstream.
#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub space: String,
    pub name: String,
    /// Inclusive array bounds from `name[a-b]`.
    pub range: Option<(u32, u32)>,
    pub offset: Option<u64>,
    pub size: Option<u32>,
    pub reset: Option<u64>,
    pub redirect: Option<RedirectRef>,
    pub subfields: Vec<SubFieldDecl>,
    pub descr: Option<String>,
    pub span: SourceSpan,
}

/// `redirect=TARGET` or `redirect=TARGET::SUBFIELD`.
#[derive(Clone, Debug)]
pub struct RedirectRef {
    pub target: String,
    pub sub: Option<String>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct BusRangeDecl {
    pub bus: String,
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub priority: u8,
    pub span: SourceSpan,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperandRole {
    Func,
    Target,
    Source,
    Immediate,
    Address,
    Register { space: String, file: String },
}

#[derive(Clone, Debug)]
pub struct SubFieldDecl {
    pub name: String,
    /// Raw `@(...)` text, decoded once the container width is known.
    pub bit_spec: String,
    pub bit_spec_span: SourceSpan,
    pub role: OperandRole,
    /// Mnemonic postfix appended when the (hidden) subfield reads 1.
    pub postfix: Option<String>,
    pub descr: Option<String>,
    pub span: SourceSpan,
}

impl SubFieldDecl {
    pub fn is_hidden(&self) -> bool {
        self.postfix.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct FormDecl {
    pub space: String,
    pub name: String,
    pub parent: Option<String>,
    pub subfields: Vec<SubFieldDecl>,
    pub descr: Option<String>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct MaskField {
    pub field: String,
    pub value: u64,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct InstructionDecl {
    pub space: String,
    pub form: Option<String>,
    pub name: String,
    pub mask: Vec<MaskField>,
    pub operands: Vec<String>,
    pub descr: Option<String>,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct IncludeDecl {
    pub path: String,
    pub span: SourceSpan,
}

#[derive(Clone, Debug)]
pub struct AttachDecl {
    pub name: String,
    pub path: String,
    pub span: SourceSpan,
}
