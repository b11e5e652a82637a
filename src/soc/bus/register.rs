//! Register table: named register files expanded into instances, sub-field
//! slices, and the handle that reads `FILE.FIELD` paths through the bus.

use std::sync::Arc;

use ahash::AHashMap;

use super::bits::BitConstruct;
use super::data::DataHandle;
use super::device_bus::DeviceBus;
use super::error::{BusError, BusResult};

/// Stride between expanded register instances. Registers are laid out on
/// 64-bit slots regardless of their architectural width.
const INSTANCE_STRIDE: u64 = 8;

/// Describes one named register or register array within a register space.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    pub name: String,
    /// Device offset of instance 0.
    pub offset: u64,
    pub count: u32,
    /// Instance naming: `{}` is replaced by the index ("r{}" -> "r5"). A
    /// single-instance file keeps its own name.
    pub name_format: String,
    /// Architectural width of the register word.
    pub word_bytes: usize,
    pub fields: Vec<(String, BitConstruct)>,
}

impl RegisterFile {
    pub fn single(name: impl Into<String>, offset: u64, word_bytes: usize) -> Self {
        let name = name.into();
        Self {
            name_format: name.clone(),
            name,
            offset,
            count: 1,
            word_bytes,
            fields: Vec::new(),
        }
    }

    pub fn array(
        name: impl Into<String>,
        offset: u64,
        count: u32,
        name_format: impl Into<String>,
        word_bytes: usize,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            count,
            name_format: name_format.into(),
            word_bytes,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, construct: BitConstruct) -> Self {
        self.fields.push((name.into(), construct));
        self
    }

    pub fn instance_name(&self, index: u32) -> String {
        if self.count == 1 {
            self.name.clone()
        } else {
            self.name_format.replacen("{}", &index.to_string(), 1)
        }
    }

    pub fn field(&self, name: &str) -> Option<&BitConstruct> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, construct)| construct)
    }
}

#[derive(Debug, Clone)]
struct RegisterInstance {
    offset: u64,
    file: Arc<RegisterFile>,
}

/// Fully resolved `FILE[.FIELD]` reference.
pub struct ResolvedRegister {
    pub name: String,
    pub offset: u64,
    pub word_bytes: usize,
    pub field: Option<BitConstruct>,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterTable {
    instances: AHashMap<String, RegisterInstance>,
    files: AHashMap<String, Arc<RegisterFile>>,
    order: Vec<String>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands a file into its instances at `offset + i * 8`.
    pub fn register(&mut self, file: RegisterFile) {
        let file = Arc::new(file);
        self.files.insert(file.name.clone(), Arc::clone(&file));
        for index in 0..file.count {
            let name = file.instance_name(index);
            let instance = RegisterInstance {
                offset: file.offset + index as u64 * INSTANCE_STRIDE,
                file: Arc::clone(&file),
            };
            if self.instances.insert(name.clone(), instance).is_none() {
                self.order.push(name);
            }
        }
    }

    pub fn file(&self, name: &str) -> Option<&RegisterFile> {
        self.files.get(name).map(Arc::as_ref)
    }

    /// Display name of one instance of a file, e.g. `r3` for file `r`.
    pub fn instance_label(&self, file: &str, index: u32) -> Option<String> {
        self.files.get(file).map(|file| file.instance_name(index))
    }

    /// Rebinds a file's definition onto another instance's offset, exposing
    /// the same storage under a second name and field layout.
    pub fn alias(&mut self, file: RegisterFile, target: &str) -> BusResult<()> {
        let target_offset = self
            .instances
            .get(target)
            .map(|instance| instance.offset)
            .ok_or_else(|| BusError::UnknownRegister {
                name: target.to_string(),
            })?;
        let mut rebased = file;
        rebased.offset = target_offset;
        rebased.count = 1;
        self.register(rebased);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Resolves `"X"` or `"X.Y"` into an instance offset plus optional field
    /// slice.
    pub fn resolve_name(&self, path: &str) -> BusResult<ResolvedRegister> {
        let (instance_name, field_name) = match path.split_once('.') {
            Some((instance, field)) => (instance, Some(field)),
            None => (path, None),
        };
        let instance =
            self.instances
                .get(instance_name)
                .ok_or_else(|| BusError::UnknownRegister {
                    name: instance_name.to_string(),
                })?;
        let field = match field_name {
            Some(name) => Some(instance.file.field(name).cloned().ok_or_else(|| {
                BusError::UnknownRegister {
                    name: path.to_string(),
                }
            })?),
            None => None,
        };
        Ok(ResolvedRegister {
            name: instance_name.to_string(),
            offset: instance.offset,
            word_bytes: instance.file.word_bytes,
            field,
        })
    }
}

/// Data handle bound to a register space: a register table plus the bus
/// address where the register device is mapped.
pub struct RegisterHandle {
    data: DataHandle,
    base: u64,
    table: Arc<RegisterTable>,
}

impl RegisterHandle {
    pub fn new(bus: Arc<DeviceBus>, base: u64, table: Arc<RegisterTable>) -> Self {
        Self {
            data: DataHandle::new(bus),
            base,
            table,
        }
    }

    pub fn table(&self) -> &RegisterTable {
        &self.table
    }

    /// Reads `"CR.SO"`-style paths: resolves the name, jumps to the register,
    /// reads the containing word, and extracts the field.
    pub fn get(&mut self, path: &str) -> BusResult<u64> {
        let resolved = self.table.resolve_name(path)?;
        self.data.jump(self.base + resolved.offset)?;
        let word = self.data.read_unsigned(resolved.word_bytes)?;
        Ok(match resolved.field {
            Some(field) => field.read(word),
            None => word,
        })
    }

    /// Field-preserving write: read-modify-write for sub-fields, whole-word
    /// store otherwise.
    pub fn set(&mut self, path: &str, value: u64) -> BusResult<()> {
        let resolved = self.table.resolve_name(path)?;
        let address = self.base + resolved.offset;
        match resolved.field {
            Some(field) => {
                self.data.jump(address)?;
                let word = self.data.read_unsigned(resolved.word_bytes)?;
                self.data.jump(address)?;
                self.data
                    .write_unsigned(field.write(word, value), resolved.word_bytes)
            }
            None => {
                self.data.jump(address)?;
                self.data.write_unsigned(value, resolved.word_bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::device::{BasicMemory, Endianness};

    fn gpr_table() -> RegisterTable {
        let mut table = RegisterTable::new();
        table.register(RegisterFile::array("GPR", 0x0, 32, "r{}", 8));
        let cr = RegisterFile::single("CR", 0x100, 4)
            .with_field("LT", BitConstruct::single(32, 0, 0).unwrap())
            .with_field("SO", BitConstruct::single(32, 3, 3).unwrap());
        table.register(cr);
        table
    }

    #[test]
    fn arrays_expand_with_stride_eight() {
        let table = gpr_table();
        let r0 = table.resolve_name("r0").unwrap();
        let r5 = table.resolve_name("r5").unwrap();
        assert_eq!(r0.offset, 0);
        assert_eq!(r5.offset, 40);
        assert!(table.resolve_name("r32").is_err(), "index past count is unknown");
    }

    #[test]
    fn field_paths_resolve_through_the_file() {
        let table = gpr_table();
        let so = table.resolve_name("CR.SO").unwrap();
        assert_eq!(so.offset, 0x100);
        assert!(so.field.is_some());
        assert!(table.resolve_name("CR.XX").is_err());
    }

    #[test]
    fn alias_rebinds_onto_the_target_offset() {
        let mut table = gpr_table();
        let shadow = RegisterFile::single("SP", 0xDEAD, 8);
        table.alias(shadow, "r1").unwrap();
        let sp = table.resolve_name("SP").unwrap();
        assert_eq!(sp.offset, 8, "alias adopts the target instance offset");
    }

    #[test]
    fn handle_extracts_and_updates_fields() {
        let bus = Arc::new(DeviceBus::new(32));
        bus.register_device(
            Arc::new(BasicMemory::new("regs", 0x200, Endianness::Big)),
            0x8000_0000u64,
        )
        .unwrap();
        let table = Arc::new(gpr_table());
        let mut handle = RegisterHandle::new(bus, 0x8000_0000, table);

        handle.set("CR", 0x1000_0000).unwrap();
        assert_eq!(handle.get("CR.SO").unwrap(), 1, "MSB-0 bit 3 reads back");
        assert_eq!(handle.get("CR.LT").unwrap(), 0);

        handle.set("CR.LT", 1).unwrap();
        assert_eq!(handle.get("CR").unwrap(), 0x9000_0000, "field write preserves neighbors");

        handle.set("r3", 0x1234_5678_9ABC_DEF0).unwrap();
        assert_eq!(handle.get("r3").unwrap(), 0x1234_5678_9ABC_DEF0);
    }
}
