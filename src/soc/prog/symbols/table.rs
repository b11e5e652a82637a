//! Symbol records and the two-phase table that owns them: a single-writer
//! builder during load, an immutable `Arc`-shared table afterwards.

use std::sync::Arc;

use ahash::AHashMap;
use bitflags::bitflags;

use crate::soc::prog::types::{StringId, TypeArena, TypeId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    None,
    Object,
    Function,
    Section,
    File,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct StorageFlags: u8 {
        /// Backed by read-only storage in the image.
        const ROM = 1 << 0;
        /// Lives in writable memory at runtime.
        const RAM = 1 << 1;
        /// Described by a metadata source rather than the image itself.
        const METADATA = 1 << 2;
        /// Has no file presence; exists only once the target is running.
        const RUNTIME_ONLY = 1 << 3;
    }
}

#[derive(Clone, Debug)]
pub struct SymbolRecord {
    /// Secondary numeric key; the label is the primary key.
    pub numeric_id: u64,
    pub label: StringId,
    pub file_addr: Option<u64>,
    pub runtime_addr: Option<u64>,
    pub size: Option<u64>,
    pub section_index: Option<u16>,
    pub binding: SymbolBinding,
    pub kind: SymbolKind,
    pub storage: StorageFlags,
    pub parent: Option<SymbolId>,
    pub type_id: Option<TypeId>,
}

impl SymbolRecord {
    /// Preferred address for live access, falling back to the file address.
    pub fn address(&self) -> Option<u64> {
        self.runtime_addr.or(self.file_addr)
    }
}

/// Frozen symbol table: query-only, shared read-only across threads.
pub struct SymbolTable {
    arena: Arc<TypeArena>,
    records: Vec<SymbolRecord>,
    by_label: AHashMap<StringId, SymbolId>,
    by_numeric: AHashMap<u64, SymbolId>,
    /// Duplicate labels (typically locals from different compilation units).
    duplicates: AHashMap<StringId, Vec<SymbolId>>,
}

impl SymbolTable {
    pub fn arena(&self) -> &Arc<TypeArena> {
        &self.arena
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: SymbolId) -> &SymbolRecord {
        &self.records[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SymbolRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| (SymbolId(index as u32), record))
    }

    pub fn resolve_label(&self, id: StringId) -> &str {
        self.arena.resolve_string(id)
    }

    pub fn lookup(&self, label: &str) -> Option<&SymbolRecord> {
        self.lookup_id(label).map(|id| self.get(id))
    }

    pub fn lookup_id(&self, label: &str) -> Option<SymbolId> {
        let label_id = self.arena.find_string(label)?;
        self.by_label.get(&label_id).copied()
    }

    pub fn lookup_numeric(&self, numeric_id: u64) -> Option<&SymbolRecord> {
        self.by_numeric
            .get(&numeric_id)
            .map(|id| &self.records[id.index()])
    }

    /// Every symbol carrying the label, for locals that collide across units.
    pub fn lookup_all(&self, label: &str) -> Vec<SymbolId> {
        let Some(label_id) = self.arena.find_string(label) else {
            return Vec::new();
        };
        match self.duplicates.get(&label_id) {
            Some(ids) => ids.clone(),
            None => self
                .by_label
                .get(&label_id)
                .map(|id| vec![*id])
                .unwrap_or_default(),
        }
    }

    /// Symbols whose span intersects `[start, end)`.
    pub fn in_address_range(&self, start: u64, end: u64) -> Vec<SymbolId> {
        self.iter()
            .filter(|(_, record)| {
                record.address().is_some_and(|addr| {
                    let span = record.size.unwrap_or(1).max(1);
                    addr < end && addr + span > start
                })
            })
            .map(|(id, _)| id)
            .collect()
    }
}

/// Construction-phase view: owns the arena mutably so merge rules can mint
/// reconciled types, then freezes into the shared table.
pub struct SymbolTableBuilder {
    arena: TypeArena,
    records: Vec<SymbolRecord>,
    by_label: AHashMap<StringId, SymbolId>,
    duplicates: AHashMap<StringId, Vec<SymbolId>>,
    next_numeric: u64,
}

impl SymbolTableBuilder {
    pub fn new(arena: TypeArena) -> Self {
        Self {
            arena,
            records: Vec::new(),
            by_label: AHashMap::new(),
            duplicates: AHashMap::new(),
            next_numeric: 0,
        }
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut TypeArena {
        &mut self.arena
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: SymbolId) -> &SymbolRecord {
        &self.records[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolRecord {
        &mut self.records[id.index()]
    }

    pub fn lookup_id(&self, label: &str) -> Option<SymbolId> {
        let label_id = self.arena.find_string(label)?;
        self.by_label.get(&label_id).copied()
    }

    pub fn symbol(&mut self, label: &str) -> SymbolBuilder<'_> {
        let label_id = self.arena.intern_string(label);
        SymbolBuilder {
            table: self,
            record: SymbolRecord {
                numeric_id: 0,
                label: label_id,
                file_addr: None,
                runtime_addr: None,
                size: None,
                section_index: None,
                binding: SymbolBinding::Global,
                kind: SymbolKind::None,
                storage: StorageFlags::empty(),
                parent: None,
                type_id: None,
            },
            explicit_numeric: false,
        }
    }

    pub(super) fn insert(&mut self, mut record: SymbolRecord, explicit_numeric: bool) -> SymbolId {
        if !explicit_numeric {
            record.numeric_id = self.next_numeric;
        }
        self.next_numeric = self.next_numeric.max(record.numeric_id + 1);
        let id = SymbolId(self.records.len() as u32);
        let label = record.label;
        self.records.push(record);
        if let Some(existing) = self.by_label.get(&label) {
            let bucket = self
                .duplicates
                .entry(label)
                .or_insert_with(|| vec![*existing]);
            bucket.push(id);
        } else {
            self.by_label.insert(label, id);
        }
        id
    }

    /// Lazy type binding during the link phase, before freeze.
    pub fn bind_type(&mut self, id: SymbolId, ty: TypeId) {
        self.records[id.index()].type_id = Some(ty);
    }

    pub fn freeze(self) -> SymbolTable {
        let mut by_numeric = AHashMap::with_capacity(self.records.len());
        for (index, record) in self.records.iter().enumerate() {
            by_numeric
                .entry(record.numeric_id)
                .or_insert(SymbolId(index as u32));
        }
        SymbolTable {
            arena: Arc::new(self.arena),
            records: self.records,
            by_label: self.by_label,
            by_numeric,
            duplicates: self.duplicates,
        }
    }
}

pub struct SymbolBuilder<'table> {
    table: &'table mut SymbolTableBuilder,
    record: SymbolRecord,
    explicit_numeric: bool,
}

impl SymbolBuilder<'_> {
    pub fn numeric_id(mut self, id: u64) -> Self {
        self.record.numeric_id = id;
        self.explicit_numeric = true;
        self
    }

    pub fn file_addr(mut self, addr: u64) -> Self {
        self.record.file_addr = Some(addr);
        self
    }

    pub fn runtime_addr(mut self, addr: u64) -> Self {
        self.record.runtime_addr = Some(addr);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.record.size = Some(size);
        self
    }

    pub fn section_index(mut self, index: u16) -> Self {
        self.record.section_index = Some(index);
        self
    }

    pub fn binding(mut self, binding: SymbolBinding) -> Self {
        self.record.binding = binding;
        self
    }

    pub fn kind(mut self, kind: SymbolKind) -> Self {
        self.record.kind = kind;
        self
    }

    pub fn storage(mut self, storage: StorageFlags) -> Self {
        self.record.storage = storage;
        self
    }

    pub fn parent(mut self, parent: SymbolId) -> Self {
        self.record.parent = Some(parent);
        self
    }

    pub fn type_id(mut self, ty: TypeId) -> Self {
        self.record.type_id = Some(ty);
        self
    }

    pub fn finish(self) -> SymbolId {
        let SymbolBuilder {
            table,
            record,
            explicit_numeric,
        } = self;
        table.insert(record, explicit_numeric)
    }
}
