//! Debug-information reader: dispatches on section presence (legacy `.debug`
//! versus `.debug_info`), walks compilation units into the type arena, and
//! binds the recovered types onto image symbols by label.

pub mod abbrev;
pub mod consts;
pub mod die;
pub mod expr;
pub mod line;
pub mod types;
pub mod v1;

pub use line::LineRow;

use ahash::AHashMap;
use tracing::{debug, warn};

use crate::soc::prog::symbols::SymbolTableBuilder;
use crate::soc::prog::types::{TypeId, TypeRecord};

use super::elf::ElfImage;
use super::LoadTrust;

use abbrev::AbbrevIndex;
use consts::*;
use die::{Die, UnitParser};
use types::TypeFactory;

pub struct DwarfInfo {
    pub trust: LoadTrust,
    pub lines: Vec<LineRow>,
    /// Label-to-type bindings recovered from the debug entries.
    named_types: AHashMap<String, TypeId>,
}

impl DwarfInfo {
    pub fn empty() -> Self {
        Self {
            trust: LoadTrust::Full,
            lines: Vec::new(),
            named_types: AHashMap::new(),
        }
    }

    pub fn named_type(&self, label: &str) -> Option<TypeId> {
        self.named_types.get(label).copied()
    }

    /// Version dispatch by section presence: `.debug` marks the legacy
    /// format, `.debug_info` the current one.
    pub fn parse(elf: &ElfImage, builder: &mut SymbolTableBuilder) -> DwarfInfo {
        let mut info = if elf.section_by_name(".debug_info").is_some() {
            Self::parse_v2(elf, builder)
        } else if let Some((index, _)) = elf.section_by_name(".debug") {
            let mut info = DwarfInfo::empty();
            if let Some(mut cursor) = elf.section_cursor(index) {
                let legacy = v1::parse(&mut cursor, builder);
                if legacy.degraded {
                    info.trust.downgrade();
                }
                info.named_types = legacy.named_types;
            }
            info
        } else {
            DwarfInfo::empty()
        };

        if let Some((index, _)) = elf.section_by_name(".debug_line") {
            if let Some(mut cursor) = elf.section_cursor(index) {
                match line::parse_line_section(&mut cursor) {
                    Ok(rows) => info.lines = rows,
                    Err(err) => {
                        warn!(error = %err, "line table unreadable");
                        info.trust.downgrade();
                    }
                }
            }
        }
        info
    }

    fn parse_v2(elf: &ElfImage, builder: &mut SymbolTableBuilder) -> DwarfInfo {
        let mut info = DwarfInfo::empty();

        let abbrev = match elf
            .section_by_name(".debug_abbrev")
            .and_then(|(index, _)| elf.section_cursor(index))
        {
            Some(mut cursor) => match AbbrevIndex::parse(&mut cursor) {
                Ok(abbrev) => abbrev,
                Err(err) => {
                    warn!(error = %err, "abbreviation table unreadable");
                    info.trust = LoadTrust::Error;
                    return info;
                }
            },
            None => {
                warn!("info section present without an abbreviation table");
                info.trust = LoadTrust::Error;
                return info;
            }
        };
        let strings = elf
            .section_by_name(".debug_str")
            .and_then(|(index, _)| elf.section_cursor(index));

        let Some((info_index, _)) = elf.section_by_name(".debug_info") else {
            return info;
        };
        let Some(mut cursor) = elf.section_cursor(info_index) else {
            return info;
        };

        let parser = UnitParser::new(&abbrev, strings);
        let mut roots: Vec<(Die, u8)> = Vec::new();
        while !cursor.end_of_stream() {
            let header = match parser.read_header(&mut cursor) {
                Ok(header) => header,
                Err(err) => {
                    warn!(error = %err, "compilation-unit header unreadable");
                    info.trust.downgrade();
                    break;
                }
            };
            if !(2..=4).contains(&header.version) {
                warn!(version = header.version, "unsupported unit version skipped");
                info.trust.downgrade();
                let _ = cursor.set_index(header.end() as usize);
                continue;
            }
            match parser.read_die(&mut cursor, &header) {
                Ok(Some(root)) => {
                    debug!(
                        offset = header.offset,
                        unit = root.label.as_deref().unwrap_or("<unnamed>"),
                        "compilation unit parsed"
                    );
                    roots.push((root, header.address_size));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(offset = header.offset, error = %err, "unit tree truncated");
                    info.trust.downgrade();
                }
            }
            if cursor.set_index(header.end() as usize).is_err() {
                break;
            }
        }

        let address_size = roots
            .first()
            .map(|(_, size)| *size as usize)
            .unwrap_or(4);
        let mut factory = TypeFactory::new(elf.header.order, address_size);
        for (root, _) in &roots {
            factory.index_unit(root);
        }
        for (root, _) in &roots {
            if root.tag != TAG_COMPILE_UNIT {
                continue;
            }
            for child in &root.children {
                Self::collect_named(&mut factory, builder, child, &mut info.named_types);
            }
        }
        if factory.degraded() {
            info.trust.downgrade();
        }
        info
    }

    /// Registers label-to-type bindings for variables, subprograms, and named
    /// type definitions at unit scope.
    fn collect_named(
        factory: &mut TypeFactory<'_>,
        builder: &mut SymbolTableBuilder,
        die: &Die,
        named: &mut AHashMap<String, TypeId>,
    ) {
        let binding = match die.tag {
            TAG_VARIABLE => die
                .try_get_die(AT_TYPE)
                .and_then(|offset| factory.resolve(builder, offset)),
            TAG_SUBPROGRAM => factory.resolve(builder, die.offset),
            TAG_STRUCTURE_TYPE
            | TAG_UNION_TYPE
            | TAG_CLASS_TYPE
            | TAG_ENUMERATION_TYPE
            | TAG_TYPEDEF
            | TAG_BASE_TYPE => factory.resolve(builder, die.offset),
            _ => None,
        };
        if let (Some(label), Some(ty)) = (Self::link_label(die), binding) {
            named.entry(label).or_insert(ty);
        }
    }

    /// The primary label, falling back to the data-location link name used by
    /// metadata-driven lookups. Both are cached on the entry during the walk.
    fn link_label(die: &Die) -> Option<String> {
        if let Some(label) = &die.label {
            return Some(label.clone());
        }
        die.link_label.clone()
    }

    /// Binds recovered types to the matching image symbols and reconciles
    /// size conflicts: debug info wins for aggregates, the image wins for
    /// arrays (the count follows the stored bytes).
    pub fn bind_symbols(&self, builder: &mut SymbolTableBuilder) {
        for (label, ty) in &self.named_types {
            let Some(id) = builder.lookup_id(label) else {
                continue;
            };
            let elf_size = builder.get(id).size;
            let record = builder.arena_mut().get(*ty).clone();
            let bound = match record {
                TypeRecord::Sequence(mut seq) => match elf_size {
                    Some(size) if seq.byte_size() != Some(size as usize) && size > 0 => {
                        seq.set_byte_size(size as usize);
                        builder.arena_mut().push_record(TypeRecord::Sequence(seq))
                    }
                    _ => *ty,
                },
                TypeRecord::Aggregate(agg) => {
                    let debug_size = agg.byte_size.bytes as u64;
                    if elf_size != Some(debug_size) {
                        builder.get_mut(id).size = Some(debug_size);
                    }
                    *ty
                }
                _ => *ty,
            };
            builder.bind_type(id, bound);
        }
    }
}
