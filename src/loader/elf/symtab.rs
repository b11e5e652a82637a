//! Symbol table extraction: fixed-size entries decoded into image symbols
//! with addresses and storage classes derived from the segment mapping.

use tracing::warn;

use crate::soc::prog::symbols::{ImageSymbol, StorageFlags, SymbolBinding, SymbolKind};

use super::ElfImage;

/// Size of one 32-bit symbol entry.
const SYM_ENTRY_SIZE: u64 = 16;

const STB_LOCAL: u8 = 0;
const STB_GLOBAL: u8 = 1;
const STB_WEAK: u8 = 2;

const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;
const STT_SECTION: u8 = 3;
const STT_FILE: u8 = 4;

impl ElfImage {
    /// Decodes the symbol table (when present) into image symbols. Bad
    /// entries are skipped with a warning rather than aborting the table.
    pub fn symbols(&self) -> Vec<ImageSymbol> {
        let Some(symtab_index) = self.symtab.or(self.dynsym) else {
            return Vec::new();
        };
        let section = &self.sections[symtab_index];
        let strtab_index = section.link as usize;
        let Some(mut cursor) = self.section_cursor(symtab_index) else {
            return Vec::new();
        };
        let entry_size = if section.entry_size != 0 {
            section.entry_size as u64
        } else {
            SYM_ENTRY_SIZE
        };
        let count = section.size / entry_size;

        let mut symbols = Vec::new();
        // Entry zero is the reserved undefined symbol.
        for index in 1..count {
            if cursor.set_index((index * entry_size) as usize).is_err() {
                warn!(index, "symbol entry out of section bounds");
                break;
            }
            let Ok(name_index) = cursor.get_u32() else { break };
            let Ok(value) = cursor.get_u32() else { break };
            let Ok(size) = cursor.get_u32() else { break };
            let Ok(info) = cursor.get_u8() else { break };
            let Ok(_other) = cursor.get_u8() else { break };
            let Ok(section_index) = cursor.get_u16() else {
                break;
            };

            let Some(label) = self.string_from(strtab_index, name_index as u64) else {
                continue;
            };
            if label.is_empty() {
                continue;
            }

            let binding = match info >> 4 {
                STB_LOCAL => SymbolBinding::Local,
                STB_WEAK => SymbolBinding::Weak,
                STB_GLOBAL => SymbolBinding::Global,
                other => {
                    warn!(symbol = %label, binding = other, "unknown binding treated as global");
                    SymbolBinding::Global
                }
            };
            let kind = match info & 0xF {
                STT_OBJECT => SymbolKind::Object,
                STT_FUNC => SymbolKind::Function,
                STT_SECTION => SymbolKind::Section,
                STT_FILE => SymbolKind::File,
                _ => SymbolKind::None,
            };

            let (file_addr, storage) = self.locate(value as u64, section_index);
            symbols.push(ImageSymbol {
                label,
                numeric_id: Some(index),
                file_addr,
                runtime_addr: Some(value as u64),
                size: Some(size as u64),
                section_index: Some(section_index),
                binding,
                kind,
                storage,
            });
        }
        symbols
    }

    /// Derives the load-memory address and storage class of a value from the
    /// segment that owns its section.
    fn locate(&self, value: u64, section_index: u16) -> (Option<u64>, StorageFlags) {
        if Self::is_reserved_section_index(section_index) {
            return (None, StorageFlags::RUNTIME_ONLY);
        }
        let Some(placement) = self.placements.get(section_index as usize) else {
            return (None, StorageFlags::empty());
        };
        let mut storage = StorageFlags::empty();
        let mut file_addr = None;
        if let Some(mem_index) = placement.memory_segment {
            let segment = &self.segments[mem_index];
            storage |= if segment.is_writable() {
                StorageFlags::RAM
            } else {
                StorageFlags::ROM
            };
        }
        if let Some(file_index) = placement.file_segment {
            let file_segment = &self.segments[file_index];
            // For the ROM-copy alias the runtime address lives in the paired
            // physical segment's load image.
            let source_vaddr = placement
                .memory_segment
                .map(|mem| self.segments[mem].vaddr)
                .unwrap_or(file_segment.vaddr);
            file_addr = Some(file_segment.paddr + (value - source_vaddr));
        }
        (file_addr, storage)
    }
}
