//! 32-bit ELF container parsing: header, section and segment tables, string
//! tables, and the bookkeeping the symbol and debug readers build on.

pub mod section;
pub mod segment;
mod symtab;

pub use section::{Section, SectionFlags, SectionType};
pub use segment::{SectionPlacement, Segment};

use std::{error::Error, fmt};

use tracing::{debug, warn};

use crate::soc::prog::cursor::{ByteCursor, ByteOrder, CursorError};

use super::LoadTrust;

const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const CLASS_32: u8 = 1;
const DATA_LSB: u8 = 1;
const DATA_MSB: u8 = 2;
/// `e_phnum` escape value: the real count lives in section 0's `info`.
const PN_XNUM: u16 = 0xFFFF;
/// Section indices at or above this are reserved markers, not real sections.
const SHN_LORESERVE: u16 = 0xFF00;

#[derive(Debug)]
pub enum ElfError {
    BadMagic,
    UnsupportedClass(u8),
    UnsupportedEncoding(u8),
    Truncated(CursorError),
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::BadMagic => write!(f, "missing ELF magic"),
            ElfError::UnsupportedClass(class) => {
                write!(f, "unsupported ELF class {class} (32-bit expected)")
            }
            ElfError::UnsupportedEncoding(data) => {
                write!(f, "unsupported ELF data encoding {data}")
            }
            ElfError::Truncated(err) => write!(f, "container truncated: {err}"),
        }
    }
}

impl Error for ElfError {}

impl From<CursorError> for ElfError {
    fn from(value: CursorError) -> Self {
        ElfError::Truncated(value)
    }
}

#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub order: ByteOrder,
    pub file_type: u16,
    pub machine: u16,
    pub entry: u64,
    pub ph_offset: u64,
    pub sh_offset: u64,
    pub flags: u32,
    pub ph_entry_size: u16,
    pub sh_entry_size: u16,
    pub shstr_index: u16,
}

pub struct ElfImage {
    pub header: ElfHeader,
    pub sections: Vec<Section>,
    pub segments: Vec<Segment>,
    pub placements: Vec<SectionPlacement>,
    pub symtab: Option<usize>,
    pub dynsym: Option<usize>,
    pub hash: Option<usize>,
    pub dynamic: Option<usize>,
    pub trust: LoadTrust,
    data: Vec<u8>,
}

impl ElfImage {
    pub fn empty() -> Self {
        Self {
            header: ElfHeader {
                order: ByteOrder::Little,
                file_type: 0,
                machine: 0,
                entry: 0,
                ph_offset: 0,
                sh_offset: 0,
                flags: 0,
                ph_entry_size: 0,
                sh_entry_size: 0,
                shstr_index: 0,
            },
            sections: Vec::new(),
            segments: Vec::new(),
            placements: Vec::new(),
            symtab: None,
            dynsym: None,
            hash: None,
            dynamic: None,
            trust: LoadTrust::Error,
            data: Vec::new(),
        }
    }

    pub fn parse(bytes: Vec<u8>) -> Result<ElfImage, ElfError> {
        if bytes.len() < 16 || bytes[..4] != MAGIC {
            return Err(ElfError::BadMagic);
        }
        if bytes[4] != CLASS_32 {
            return Err(ElfError::UnsupportedClass(bytes[4]));
        }
        let order = match bytes[5] {
            DATA_LSB => ByteOrder::Little,
            DATA_MSB => ByteOrder::Big,
            other => return Err(ElfError::UnsupportedEncoding(other)),
        };

        let mut cursor = ByteCursor::new(bytes, order);
        cursor.set_index(16)?;
        let file_type = cursor.get_u16()?;
        let machine = cursor.get_u16()?;
        let _version = cursor.get_u32()?;
        let entry = cursor.get_u32()? as u64;
        let ph_offset = cursor.get_u32()? as u64;
        let sh_offset = cursor.get_u32()? as u64;
        let flags = cursor.get_u32()?;
        let _eh_size = cursor.get_u16()?;
        let ph_entry_size = cursor.get_u16()?;
        let mut ph_count = cursor.get_u16()? as u64;
        let sh_entry_size = cursor.get_u16()?;
        let mut sh_count = cursor.get_u16()? as u64;
        let shstr_index = cursor.get_u16()?;

        let mut trust = LoadTrust::Full;
        let header = ElfHeader {
            order,
            file_type,
            machine,
            entry,
            ph_offset,
            sh_offset,
            flags,
            ph_entry_size,
            sh_entry_size,
            shstr_index,
        };

        // Escape hatches: counts that overflow the 16-bit header fields live
        // in section header zero.
        let needs_zeroth = sh_count == 0 || ph_count == PN_XNUM as u64;
        if needs_zeroth && sh_offset != 0 {
            let zeroth = read_section_header(&mut cursor, sh_offset)?;
            if sh_count == 0 {
                sh_count = zeroth.size;
            }
            if ph_count == PN_XNUM as u64 {
                ph_count = zeroth.info as u64;
            }
        }

        let mut raw_sections = Vec::with_capacity(sh_count as usize);
        for index in 0..sh_count {
            let offset = sh_offset + index * sh_entry_size as u64;
            match read_section_header(&mut cursor, offset) {
                Ok(raw) => raw_sections.push(raw),
                Err(err) => {
                    warn!(section = index, error = %err, "section header unreadable");
                    trust.downgrade();
                    break;
                }
            }
        }

        let mut segments = Vec::with_capacity(ph_count as usize);
        for index in 0..ph_count {
            let offset = ph_offset + index * ph_entry_size as u64;
            match read_program_header(&mut cursor, offset) {
                Ok(segment) => segments.push(segment),
                Err(err) => {
                    warn!(segment = index, error = %err, "program header unreadable");
                    trust.downgrade();
                    break;
                }
            }
        }

        let data: Vec<u8> = cursor.as_slice().to_vec();

        // Label every section from the header-designated name table.
        let mut sections: Vec<Section> = raw_sections
            .iter()
            .map(|raw| Section {
                name: String::new(),
                name_index: raw.name_index,
                section_type: SectionType::from(raw.section_type),
                flags: SectionFlags::from_bits_truncate(raw.flags),
                address: raw.address,
                offset: raw.offset,
                size: raw.size,
                link: raw.link,
                info: raw.info,
                addr_align: raw.addr_align,
                entry_size: raw.entry_size,
            })
            .collect();
        if let Some(strtab) = raw_sections.get(shstr_index as usize) {
            for section in &mut sections {
                section.name =
                    string_at(&data, strtab.offset, strtab.size, section.name_index as u64)
                        .unwrap_or_default();
            }
        } else if !sections.is_empty() {
            warn!(index = shstr_index, "section name table index out of range");
            trust.downgrade();
        }

        let mut image = ElfImage {
            header,
            placements: segment::map_sections(&sections, &segments),
            sections,
            segments,
            symtab: None,
            dynsym: None,
            hash: None,
            dynamic: None,
            trust,
            data,
        };
        image.index_special_sections();
        image.prefetch_unallocated();
        Ok(image)
    }

    /// At most one of each bookkeeping section; extras are ignored with a
    /// trust downgrade.
    fn index_special_sections(&mut self) {
        for (index, section) in self.sections.iter().enumerate() {
            let slot = match section.section_type {
                SectionType::SymTab => &mut self.symtab,
                SectionType::DynSym => &mut self.dynsym,
                SectionType::Hash => &mut self.hash,
                SectionType::Dynamic => &mut self.dynamic,
                _ => continue,
            };
            if slot.is_some() {
                warn!(section = %section.name, "duplicate bookkeeping section ignored");
                self.trust.downgrade();
            } else {
                *slot = Some(index);
            }
        }
    }

    /// Touches unallocated data sections in increasing file-offset order so
    /// truncation surfaces as one coherent downgrade instead of scattered
    /// read failures later.
    fn prefetch_unallocated(&mut self) {
        let mut order: Vec<usize> = (0..self.sections.len())
            .filter(|&index| {
                let section = &self.sections[index];
                section.has_file_data() && section.address == 0
            })
            .collect();
        order.sort_by_key(|&index| self.sections[index].offset);
        for index in order {
            let section = &self.sections[index];
            let end = section.offset + section.size;
            if end > self.data.len() as u64 {
                warn!(section = %section.name, "section data extends past the file end");
                self.trust.downgrade();
            } else {
                debug!(section = %section.name, size = section.size, "section data loaded");
            }
        }
    }

    pub fn section_by_name(&self, name: &str) -> Option<(usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .find(|(_, section)| section.name == name)
    }

    pub fn section_data(&self, index: usize) -> Option<&[u8]> {
        let section = self.sections.get(index)?;
        if !section.has_file_data() {
            return None;
        }
        let start = section.offset as usize;
        let end = start + section.size as usize;
        self.data.get(start..end)
    }

    /// Cursor over a section's bytes in the container's byte order.
    pub fn section_cursor(&self, index: usize) -> Option<ByteCursor> {
        self.section_data(index)
            .map(|data| ByteCursor::new(data.to_vec(), self.header.order))
    }

    pub fn string_from(&self, strtab_index: usize, offset: u64) -> Option<String> {
        let strtab = self.sections.get(strtab_index)?;
        string_at(&self.data, strtab.offset, strtab.size, offset)
    }

    pub(super) fn is_reserved_section_index(index: u16) -> bool {
        index == 0 || index >= SHN_LORESERVE
    }
}

struct RawSectionHeader {
    name_index: u32,
    section_type: u32,
    flags: u32,
    address: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addr_align: u32,
    entry_size: u32,
}

fn read_section_header(
    cursor: &mut ByteCursor,
    offset: u64,
) -> Result<RawSectionHeader, ElfError> {
    cursor.set_index(offset as usize)?;
    Ok(RawSectionHeader {
        name_index: cursor.get_u32()?,
        section_type: cursor.get_u32()?,
        flags: cursor.get_u32()?,
        address: cursor.get_u32()? as u64,
        offset: cursor.get_u32()? as u64,
        size: cursor.get_u32()? as u64,
        link: cursor.get_u32()?,
        info: cursor.get_u32()?,
        addr_align: cursor.get_u32()?,
        entry_size: cursor.get_u32()?,
    })
}

fn read_program_header(cursor: &mut ByteCursor, offset: u64) -> Result<Segment, ElfError> {
    cursor.set_index(offset as usize)?;
    Ok(Segment {
        segment_type: cursor.get_u32()?,
        offset: cursor.get_u32()? as u64,
        vaddr: cursor.get_u32()? as u64,
        paddr: cursor.get_u32()? as u64,
        file_size: cursor.get_u32()? as u64,
        mem_size: cursor.get_u32()? as u64,
        flags: cursor.get_u32()?,
        align: cursor.get_u32()?,
    })
}

fn string_at(data: &[u8], table_offset: u64, table_size: u64, offset: u64) -> Option<String> {
    if offset >= table_size {
        return None;
    }
    let start = (table_offset + offset) as usize;
    let window = data.get(start..(table_offset + table_size) as usize)?;
    let text = window.split(|byte| *byte == 0).next()?;
    Some(String::from_utf8_lossy(text).into_owned())
}
