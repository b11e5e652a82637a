//! End-to-end program ingestion: a synthetic 32-bit ELF with debug info is
//! assembled byte-by-byte, loaded, and queried through the symbol handles.

use std::sync::Arc;

use nanoscope::loader::{LoadTrust, ProgramImage};
use nanoscope::soc::bus::{DataHandle, DeviceBus, SymbolHandle, SymbolValue};
use nanoscope::soc::device::{BasicMemory, Endianness};
use nanoscope::soc::prog::symbols::{MetadataSymbol, SymbolSource};
use nanoscope::soc::prog::types::{
    DisplayFormat, FixedScalar, ScalarEncoding, ScalarType, TypeRecord,
};

// Section header type/flag constants used by the builder.
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHF_WRITE_ALLOC: u32 = 0x3;

struct SectionSpec {
    name: &'static str,
    section_type: u32,
    flags: u32,
    address: u32,
    data: Vec<u8>,
    link: u32,
    entry_size: u32,
}

/// Assembles a minimal little-endian 32-bit ELF: header, one loadable
/// segment, section table, and the provided section bodies.
fn build_elf(sections: Vec<SectionSpec>, segment_of: usize) -> Vec<u8> {
    let ehsize = 52u32;
    let phentsize = 32u32;
    let shentsize = 40u32;
    let phnum = 1u32;

    // Section name table comes last; build it first so offsets are known.
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for spec in &sections {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(spec.name.as_bytes());
        shstrtab.push(0);
    }
    let shstr_name = shstrtab.len() as u32;
    shstrtab.extend_from_slice(b".shstrtab\0");

    // Data blobs are laid out after the headers, in declaration order.
    let mut offset = ehsize + phentsize * phnum;
    let mut data_offsets = Vec::new();
    for spec in &sections {
        data_offsets.push(offset);
        offset += spec.data.len() as u32;
    }
    let shstr_offset = offset;
    offset += shstrtab.len() as u32;
    let shoff = offset;
    let shnum = sections.len() as u32 + 2; // + null + .shstrtab

    let mut image = Vec::new();
    // ELF header
    image.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
    image.extend_from_slice(&[0u8; 8]);
    image.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    image.extend_from_slice(&20u16.to_le_bytes()); // EM_PPC
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes()); // entry
    image.extend_from_slice(&ehsize.to_le_bytes()); // phoff
    image.extend_from_slice(&shoff.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes()); // flags
    image.extend_from_slice(&(ehsize as u16).to_le_bytes());
    image.extend_from_slice(&(phentsize as u16).to_le_bytes());
    image.extend_from_slice(&(phnum as u16).to_le_bytes());
    image.extend_from_slice(&(shentsize as u16).to_le_bytes());
    image.extend_from_slice(&(shnum as u16).to_le_bytes());
    image.extend_from_slice(&((shnum - 1) as u16).to_le_bytes()); // shstrndx

    // One writable load segment backing the data section.
    let seg = &sections[segment_of];
    image.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
    image.extend_from_slice(&data_offsets[segment_of].to_le_bytes());
    image.extend_from_slice(&seg.address.to_le_bytes()); // vaddr
    image.extend_from_slice(&seg.address.to_le_bytes()); // paddr
    image.extend_from_slice(&(seg.data.len() as u32).to_le_bytes());
    image.extend_from_slice(&(seg.data.len() as u32).to_le_bytes());
    image.extend_from_slice(&6u32.to_le_bytes()); // RW
    image.extend_from_slice(&4u32.to_le_bytes());

    for spec in &sections {
        image.extend_from_slice(&spec.data);
    }
    image.extend_from_slice(&shstrtab);

    // Null section header.
    image.extend_from_slice(&[0u8; 40]);
    for (index, spec) in sections.iter().enumerate() {
        image.extend_from_slice(&name_offsets[index].to_le_bytes());
        image.extend_from_slice(&spec.section_type.to_le_bytes());
        image.extend_from_slice(&spec.flags.to_le_bytes());
        image.extend_from_slice(&spec.address.to_le_bytes());
        image.extend_from_slice(&data_offsets[index].to_le_bytes());
        image.extend_from_slice(&(spec.data.len() as u32).to_le_bytes());
        image.extend_from_slice(&spec.link.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes());
        image.extend_from_slice(&4u32.to_le_bytes());
        image.extend_from_slice(&spec.entry_size.to_le_bytes());
    }
    // .shstrtab header
    image.extend_from_slice(&shstr_name.to_le_bytes());
    image.extend_from_slice(&SHT_STRTAB.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&shstr_offset.to_le_bytes());
    image.extend_from_slice(&(shstrtab.len() as u32).to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image
}

fn symbol_entry(name_offset: u32, value: u32, size: u32, info: u8, shndx: u16) -> Vec<u8> {
    let mut entry = Vec::with_capacity(16);
    entry.extend_from_slice(&name_offset.to_le_bytes());
    entry.extend_from_slice(&value.to_le_bytes());
    entry.extend_from_slice(&size.to_le_bytes());
    entry.push(info);
    entry.push(0);
    entry.extend_from_slice(&shndx.to_le_bytes());
    entry
}

/// Debug-entry stream builder that records offsets and patches forward type
/// references once every entry has been placed.
struct InfoBuilder {
    bytes: Vec<u8>,
    patches: Vec<(usize, usize)>,
}

impl InfoBuilder {
    fn new() -> Self {
        // Unit header: length patched at the end, version 2, abbrev offset 0,
        // 4-byte addresses.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(4);
        Self {
            bytes,
            patches: Vec::new(),
        }
    }

    fn offset(&self) -> usize {
        self.bytes.len()
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn name(&mut self, text: &str) {
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
    }

    /// Emits a 4-byte reference slot to be patched with a DIE offset later.
    fn type_ref(&mut self, slot: usize) {
        self.patches.push((self.bytes.len(), slot));
        self.bytes.extend_from_slice(&0u32.to_le_bytes());
    }

    fn finish(mut self, offsets: &[usize]) -> Vec<u8> {
        for (position, slot) in &self.patches {
            let value = offsets[*slot] as u32;
            self.bytes[*position..*position + 4].copy_from_slice(&value.to_le_bytes());
        }
        let length = (self.bytes.len() - 4) as u32;
        self.bytes[0..4].copy_from_slice(&length.to_le_bytes());
        self.bytes
    }
}

/// Builds `.debug_abbrev` and `.debug_info` describing:
/// `int`, `struct point { int x; int y; }`, `p: point`,
/// `struct node { node *next; int value; }`, `head: node`.
fn build_debug_sections() -> (Vec<u8>, Vec<u8>) {
    let abbrev: Vec<u8> = vec![
        1, 0x11, 1, 0x00, 0x00, // compile unit, children
        2, 0x24, 0, 0x03, 0x08, 0x0B, 0x0B, 0x3E, 0x0B, 0x00, 0x00, // base type
        3, 0x13, 1, 0x03, 0x08, 0x0B, 0x0B, 0x00, 0x00, // structure
        4, 0x0D, 0, 0x03, 0x08, 0x49, 0x13, 0x38, 0x0A, 0x00, 0x00, // member
        5, 0x34, 0, 0x03, 0x08, 0x49, 0x13, 0x00, 0x00, // variable
        6, 0x0F, 0, 0x49, 0x13, 0x0B, 0x0B, 0x00, 0x00, // pointer
        0,
    ];

    const INT: usize = 0;
    const POINT: usize = 1;
    const NODE: usize = 2;
    const NODE_PTR: usize = 3;
    let mut offsets = [0usize; 4];

    let mut info = InfoBuilder::new();
    info.raw(&[1]); // compile unit, no attributes

    offsets[INT] = info.offset();
    info.raw(&[2]);
    info.name("int");
    info.raw(&[4, 0x05]); // four bytes, signed

    offsets[POINT] = info.offset();
    info.raw(&[3]);
    info.name("point");
    info.raw(&[8]);
    {
        info.raw(&[4]);
        info.name("x");
        info.type_ref(INT);
        info.raw(&[2, 0x23, 0x00]); // block1: plus_uconst 0
        info.raw(&[4]);
        info.name("y");
        info.type_ref(INT);
        info.raw(&[2, 0x23, 0x04]); // block1: plus_uconst 4
        info.raw(&[0]); // end of members
    }

    info.raw(&[5]);
    info.name("p");
    info.type_ref(POINT);

    offsets[NODE] = info.offset();
    info.raw(&[3]);
    info.name("node");
    info.raw(&[8]);
    {
        info.raw(&[4]);
        info.name("next");
        info.type_ref(NODE_PTR);
        info.raw(&[2, 0x23, 0x00]);
        info.raw(&[4]);
        info.name("value");
        info.type_ref(INT);
        info.raw(&[2, 0x23, 0x04]);
        info.raw(&[0]);
    }

    offsets[NODE_PTR] = info.offset();
    info.raw(&[6]);
    info.type_ref(NODE);
    info.raw(&[4]);

    info.raw(&[5]);
    info.name("head");
    info.type_ref(NODE);

    info.raw(&[0]); // end of unit children

    (abbrev, info.finish(&offsets))
}

fn build_image() -> Vec<u8> {
    let strtab = b"\0p\0head\0speed\0".to_vec();
    let mut symtab = vec![0u8; 16];
    symtab.extend_from_slice(&symbol_entry(1, 0x2000, 8, 0x11, 1)); // p -> .data
    symtab.extend_from_slice(&symbol_entry(3, 0x3000, 8, 0x11, 1)); // head -> .data
    symtab.extend_from_slice(&symbol_entry(8, 0x4000_1000, 4, 0x11, 0xFFF1)); // speed, absolute

    let (abbrev, info) = build_debug_sections();
    build_elf(
        vec![
            SectionSpec {
                name: ".data",
                section_type: SHT_PROGBITS,
                flags: SHF_WRITE_ALLOC,
                address: 0x2000,
                data: vec![0u8; 0x1800],
                link: 0,
                entry_size: 0,
            },
            SectionSpec {
                name: ".symtab",
                section_type: SHT_SYMTAB,
                flags: 0,
                address: 0,
                data: symtab,
                link: 3, // .strtab header index
                entry_size: 16,
            },
            SectionSpec {
                name: ".strtab",
                section_type: SHT_STRTAB,
                flags: 0,
                address: 0,
                data: strtab,
                link: 0,
                entry_size: 0,
            },
            SectionSpec {
                name: ".debug_info",
                section_type: SHT_PROGBITS,
                flags: 0,
                address: 0,
                data: info,
                link: 0,
                entry_size: 0,
            },
            SectionSpec {
                name: ".debug_abbrev",
                section_type: SHT_PROGBITS,
                flags: 0,
                address: 0,
                data: abbrev,
                link: 0,
                entry_size: 0,
            },
        ],
        0,
    )
}

#[test]
fn struct_members_bind_and_resolve_addresses() {
    let image = ProgramImage::load_bytes(build_image());
    assert_eq!(image.trust, LoadTrust::Full, "clean image loads at full trust");

    let record = image.symbols.lookup("p").expect("symbol p");
    assert_eq!(record.runtime_addr, Some(0x2000));
    let arena = image.symbols.arena();
    let TypeRecord::Aggregate(point) = arena.get(record.type_id.expect("bound type")) else {
        panic!("p should bind to a struct type");
    };
    assert_eq!(point.byte_size.bytes, 8);
    let members = arena.members(point.members);
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].offset_bytes(), 0);
    assert_eq!(members[1].offset_bytes(), 4);
    for member in members {
        let TypeRecord::Scalar(scalar) = arena.get(member.ty) else {
            panic!("point members should be base values");
        };
        assert_eq!(scalar.byte_size, 4);
        assert_eq!(scalar.encoding, ScalarEncoding::Signed);
    }

    let bus = Arc::new(DeviceBus::new(32));
    bus.register_device(
        Arc::new(BasicMemory::new("ram", 0x4000, Endianness::Little)),
        0x0,
    )
    .unwrap();
    let handle = SymbolHandle::new(&image.symbols, bus);
    let resolved = handle.resolve_path("p.y").expect("p.y resolves");
    assert_eq!(resolved.address, 0x2004, "member offset lands past x");
}

#[test]
fn recursive_struct_construction_terminates_with_identity() {
    let image = ProgramImage::load_bytes(build_image());
    let record = image.symbols.lookup("head").expect("symbol head");
    let node_id = record.type_id.expect("head binds to node");
    let arena = image.symbols.arena();

    let TypeRecord::Aggregate(node) = arena.get(node_id) else {
        panic!("head should bind to a struct");
    };
    let next = node
        .member(arena, arena.find_string("next").expect("interned name"))
        .expect("member next");
    let TypeRecord::Pointer(pointer) = arena.get(next.ty) else {
        panic!("next should be a pointer member");
    };
    assert_eq!(
        pointer.target,
        Some(node_id),
        "the pointer referent is the very struct being defined"
    );
}

#[test]
fn metadata_merge_keeps_image_address_and_renders_fixed_point() {
    // Metadata types live in the image's arena, so the source is fed through
    // the loader's merge hook.
    let image = ProgramImage::load_bytes_with_metadata(
        build_image(),
        |builder| {
            let base =
                ScalarType::new(None, 2, ScalarEncoding::Unsigned, DisplayFormat::Default);
            let fixed = builder
                .arena_mut()
                .push_record(TypeRecord::Fixed(FixedScalar::new(base, 0.01, 0.0)));
            vec![SymbolSource::Metadata(MetadataSymbol {
                label: "speed".into(),
                type_id: Some(fixed),
                size: None,
            })]
        },
    );

    let record = image.symbols.lookup("speed").expect("merged symbol");
    assert_eq!(record.runtime_addr, Some(0x4000_1000), "address from the image side");
    assert_eq!(record.size, Some(4), "size from the image side");

    let bus = Arc::new(DeviceBus::new(32));
    bus.register_device(
        Arc::new(BasicMemory::new("cal", 0x8000, Endianness::Big)),
        0x4000_0000,
    )
    .unwrap();
    {
        let mut seed = DataHandle::new(bus.clone());
        seed.jump(0x4000_1000).unwrap();
        seed.write_bytes(&[0x01, 0x2C]).unwrap(); // big-endian 300
    }
    let mut handle = SymbolHandle::new(&image.symbols, bus);
    assert_eq!(
        handle.format_path("speed", DisplayFormat::Default).unwrap(),
        "3.00",
        "raw 300 under a 0.01 scale renders with two digits"
    );
    assert_eq!(
        handle.read_path("speed").unwrap(),
        SymbolValue::Float(3.0),
        "typed read applies the fixed-point scaling"
    );
}

#[test]
fn walker_visits_point_members_through_the_bus() {
    let image = ProgramImage::load_bytes(build_image());
    let bus = Arc::new(DeviceBus::new(32));
    bus.register_device(
        Arc::new(BasicMemory::new("ram", 0x4000, Endianness::Little)),
        0x0,
    )
    .unwrap();
    {
        let mut seed = DataHandle::new(bus.clone());
        seed.jump(0x2000).unwrap();
        seed.write_u32(11).unwrap();
        seed.write_u32((-7i32) as u32).unwrap();
    }
    let mut handle = SymbolHandle::new(&image.symbols, bus);
    let mut cursor = handle.value_cursor("p").unwrap();
    let mut seen = Vec::new();
    while let Some(read) = cursor.next_value().unwrap() {
        seen.push((read.entry.path.render(image.symbols.arena()), read.value));
    }
    assert_eq!(
        seen,
        vec![
            ("x".to_string(), SymbolValue::Signed(11)),
            ("y".to_string(), SymbolValue::Signed(-7)),
        ]
    );
}

#[test]
fn malformed_containers_degrade_to_error_trust() {
    let image = ProgramImage::load_bytes(vec![0x7F, b'E', b'L', b'F', 9, 9]);
    assert_eq!(image.trust, LoadTrust::Error);
    assert!(image.symbols.is_empty(), "empty tables stay queryable");
}
