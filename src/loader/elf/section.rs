//! Section header model for the 32-bit container format.

use bitflags::bitflags;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionType {
    Null,
    ProgBits,
    SymTab,
    StrTab,
    Rela,
    Hash,
    Dynamic,
    Note,
    NoBits,
    Rel,
    ShLib,
    DynSym,
    Other(u32),
}

impl From<u32> for SectionType {
    fn from(value: u32) -> Self {
        match value {
            0 => SectionType::Null,
            1 => SectionType::ProgBits,
            2 => SectionType::SymTab,
            3 => SectionType::StrTab,
            4 => SectionType::Rela,
            5 => SectionType::Hash,
            6 => SectionType::Dynamic,
            7 => SectionType::Note,
            8 => SectionType::NoBits,
            9 => SectionType::Rel,
            10 => SectionType::ShLib,
            11 => SectionType::DynSym,
            other => SectionType::Other(other),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct SectionFlags: u32 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
    }
}

/// One parsed section header plus its resolved name.
#[derive(Clone, Debug)]
pub struct Section {
    pub name: String,
    pub name_index: u32,
    pub section_type: SectionType,
    pub flags: SectionFlags,
    pub address: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addr_align: u32,
    pub entry_size: u32,
}

impl Section {
    /// Sections whose bytes live in the file (not BSS-like).
    pub fn has_file_data(&self) -> bool {
        !matches!(self.section_type, SectionType::Null | SectionType::NoBits) && self.size > 0
    }

    pub fn file_window(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + if self.has_file_data() { self.size } else { 0 }
    }
}
