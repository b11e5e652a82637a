//! Legacy (version 1) debug-section walker: length-prefixed entries with
//! two-byte tags, attribute words whose low nibble carries the form, and
//! sibling references knitting the tree together.

use ahash::AHashMap;
use tracing::warn;

use crate::soc::prog::cursor::{ByteCursor, CursorResult};
use crate::soc::prog::symbols::SymbolTableBuilder;
use crate::soc::prog::types::{
    AggregateKind, DisplayFormat, PointerType, ScalarEncoding, ScalarType, TypeBuilder, TypeId,
    TypeRecord,
};

use super::consts::*;

#[derive(Clone, Debug)]
enum V1Value {
    Addr(u32),
    Ref(u32),
    Data(u64),
    Block(Vec<u8>),
    Text(String),
}

#[derive(Clone, Debug)]
struct V1Die {
    offset: u64,
    end: u64,
    tag: u16,
    attrs: Vec<(u16, V1Value)>,
    children: Vec<V1Die>,
}

impl V1Die {
    fn attr(&self, name: u16) -> Option<&V1Value> {
        self.attrs
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, value)| value)
    }

    fn name(&self) -> Option<&str> {
        match self.attr(V1_AT_NAME)? {
            V1Value::Text(text) => Some(text),
            _ => None,
        }
    }

    fn data(&self, name: u16) -> Option<u64> {
        match self.attr(name)? {
            V1Value::Data(value) => Some(*value),
            V1Value::Addr(value) | V1Value::Ref(value) => Some(*value as u64),
            _ => None,
        }
    }

    fn sibling(&self) -> Option<u64> {
        match self.attr(V1_AT_SIBLING)? {
            V1Value::Ref(offset) => Some(*offset as u64),
            _ => None,
        }
    }
}

pub struct V1Info {
    pub named_types: AHashMap<String, TypeId>,
    pub degraded: bool,
}

/// Walks the legacy debug section and registers every named type it can
/// recover.
pub fn parse(cursor: &mut ByteCursor, builder: &mut SymbolTableBuilder) -> V1Info {
    let mut info = V1Info {
        named_types: AHashMap::new(),
        degraded: false,
    };
    let roots = match parse_tree(cursor, cursor.len() as u64) {
        Ok(roots) => roots,
        Err(err) => {
            warn!(error = %err, "legacy debug section truncated");
            info.degraded = true;
            Vec::new()
        }
    };

    let mut index = AHashMap::new();
    for root in &roots {
        index_die(root, &mut index);
    }
    let mut by_offset: AHashMap<u64, TypeId> = AHashMap::new();

    for root in &roots {
        let entries = if root.tag == V1_TAG_COMPILE_UNIT {
            &root.children
        } else {
            std::slice::from_ref(root)
        };
        for die in entries {
            match die.tag {
                V1_TAG_GLOBAL_VARIABLE | V1_TAG_LOCAL_VARIABLE => {
                    let Some(name) = die.name() else { continue };
                    if let Some(ty) = resolve_value_type(builder, die, &index, &mut by_offset) {
                        info.named_types.insert(name.to_string(), ty);
                    }
                }
                V1_TAG_STRUCTURE_TYPE
                | V1_TAG_UNION_TYPE
                | V1_TAG_TYPEDEF
                | V1_TAG_ENUMERATION_TYPE => {
                    if let (Some(name), Some(ty)) = (
                        die.name(),
                        resolve_type(builder, die.offset, &index, &mut by_offset),
                    ) {
                        info.named_types.insert(name.to_string(), ty);
                    }
                }
                _ => {}
            }
        }
    }
    info
}

fn index_die<'tree>(die: &'tree V1Die, index: &mut AHashMap<u64, &'tree V1Die>) {
    index.insert(die.offset, die);
    for child in &die.children {
        index_die(child, index);
    }
}

/// Entries between a record's end and its sibling offset are its children.
fn parse_tree(cursor: &mut ByteCursor, end: u64) -> CursorResult<Vec<V1Die>> {
    let mut dies = Vec::new();
    while (cursor.index() as u64) < end {
        let Some(mut die) = parse_die(cursor)? else {
            continue;
        };
        if let Some(sibling) = die.sibling() {
            if sibling > die.end && sibling <= end {
                die.children = parse_tree(cursor, sibling)?;
                cursor.set_index(sibling as usize)?;
            }
        }
        dies.push(die);
    }
    Ok(dies)
}

fn parse_die(cursor: &mut ByteCursor) -> CursorResult<Option<V1Die>> {
    let offset = cursor.index() as u64;
    let length = cursor.get_u32()? as u64;
    // Entries shorter than a tag are padding.
    if length < 6 {
        let end = (offset + length.max(4)) as usize;
        cursor.set_index(end.min(cursor.len()))?;
        return Ok(None);
    }
    let end = offset + length;
    let tag = cursor.get_u16()?;
    let mut attrs = Vec::new();
    while (cursor.index() as u64) < end {
        let attr = cursor.get_u16()?;
        let name = attr >> 4;
        let value = match attr & 0xF {
            V1_FORM_ADDR => V1Value::Addr(cursor.get_u32()?),
            V1_FORM_REF => V1Value::Ref(cursor.get_u32()?),
            V1_FORM_BLOCK2 => {
                let len = cursor.get_u16()? as usize;
                V1Value::Block(cursor.get_bytes(len)?.collect())
            }
            V1_FORM_BLOCK4 => {
                let len = cursor.get_u32()? as usize;
                V1Value::Block(cursor.get_bytes(len)?.collect())
            }
            V1_FORM_DATA2 => V1Value::Data(cursor.get_u16()? as u64),
            V1_FORM_DATA4 => V1Value::Data(cursor.get_u32()? as u64),
            V1_FORM_DATA8 => V1Value::Data(cursor.get_u64()?),
            V1_FORM_STRING => V1Value::Text(cursor.get_string(-1)?),
            _ => break,
        };
        attrs.push((name, value));
    }
    cursor.set_index(end as usize)?;
    Ok(Some(V1Die {
        offset,
        end,
        tag,
        attrs,
        children: Vec::new(),
    }))
}

fn resolve_value_type(
    builder: &mut SymbolTableBuilder,
    die: &V1Die,
    index: &AHashMap<u64, &V1Die>,
    by_offset: &mut AHashMap<u64, TypeId>,
) -> Option<TypeId> {
    if let Some(fund) = die.data(V1_AT_FUND_TYPE) {
        return Some(fundamental_type(builder, fund as u16));
    }
    if let Some(V1Value::Ref(target)) = die.attr(V1_AT_USER_DEF_TYPE) {
        return resolve_type(builder, *target as u64, index, by_offset);
    }
    if let Some(V1Value::Block(block)) = die.attr(V1_AT_MOD_FUND_TYPE) {
        return Some(modified_fundamental(builder, block));
    }
    None
}

fn resolve_type(
    builder: &mut SymbolTableBuilder,
    offset: u64,
    index: &AHashMap<u64, &V1Die>,
    by_offset: &mut AHashMap<u64, TypeId>,
) -> Option<TypeId> {
    if let Some(ty) = by_offset.get(&offset) {
        return Some(*ty);
    }
    let die = *index.get(&offset)?;
    match die.tag {
        V1_TAG_STRUCTURE_TYPE | V1_TAG_UNION_TYPE => {
            let slot = builder.arena_mut().reserve();
            by_offset.insert(offset, slot);
            let byte_size = die.data(V1_AT_BYTE_SIZE);
            let kind = if die.tag == V1_TAG_UNION_TYPE {
                AggregateKind::Union
            } else {
                AggregateKind::Struct
            };
            struct PendingMember {
                name: Option<String>,
                ty: TypeId,
                offset: u64,
            }
            let mut members = Vec::new();
            for child in &die.children {
                if child.tag != V1_TAG_MEMBER {
                    continue;
                }
                let Some(ty) = resolve_value_type(builder, child, index, by_offset) else {
                    continue;
                };
                let byte_offset = child
                    .attr(V1_AT_LOCATION)
                    .or(child.attr(V1_AT_MEMBER))
                    .and_then(|value| match value {
                        V1Value::Block(block) => evaluate_location(block),
                        V1Value::Data(value) => Some(*value),
                        _ => None,
                    })
                    .unwrap_or(0);
                members.push(PendingMember {
                    name: child.name().map(str::to_string),
                    ty,
                    offset: byte_offset,
                });
            }
            let mut tb = TypeBuilder::new(builder.arena_mut());
            let mut agg = tb.aggregate(kind).into_reserved(slot);
            if let Some(name) = die.name() {
                agg = agg.named(name);
            }
            if let Some(bytes) = byte_size {
                agg = agg.layout(bytes as usize, 0);
            }
            for member in members {
                agg = match member.name {
                    Some(name) => agg.member(name, member.ty, member.offset as usize),
                    None => agg.member_record(
                        crate::soc::prog::types::MemberRecord::new(
                            None,
                            member.ty,
                            member.offset as usize * 8,
                        ),
                    ),
                };
            }
            agg.finish();
            Some(slot)
        }
        V1_TAG_POINTER_TYPE => {
            let slot = builder.arena_mut().reserve();
            by_offset.insert(offset, slot);
            let target = resolve_value_type(builder, die, index, by_offset);
            builder
                .arena_mut()
                .replace(slot, TypeRecord::Pointer(PointerType::new(target, 4)));
            Some(slot)
        }
        V1_TAG_TYPEDEF => {
            let referent = resolve_value_type(builder, die, index, by_offset)?;
            by_offset.insert(offset, referent);
            Some(referent)
        }
        _ => resolve_value_type(builder, die, index, by_offset),
    }
}

fn fundamental_type(builder: &mut SymbolTableBuilder, fund: u16) -> TypeId {
    let (name, bytes, encoding) = match fund {
        V1_FT_CHAR | V1_FT_SIGNED_CHAR => ("char", 1, ScalarEncoding::Signed),
        V1_FT_UNSIGNED_CHAR => ("unsigned char", 1, ScalarEncoding::Unsigned),
        V1_FT_SHORT | V1_FT_SIGNED_SHORT => ("short", 2, ScalarEncoding::Signed),
        V1_FT_UNSIGNED_SHORT => ("unsigned short", 2, ScalarEncoding::Unsigned),
        V1_FT_INTEGER | V1_FT_SIGNED_INTEGER => ("int", 4, ScalarEncoding::Signed),
        V1_FT_UNSIGNED_INTEGER => ("unsigned int", 4, ScalarEncoding::Unsigned),
        V1_FT_LONG | V1_FT_SIGNED_LONG => ("long", 4, ScalarEncoding::Signed),
        V1_FT_UNSIGNED_LONG => ("unsigned long", 4, ScalarEncoding::Unsigned),
        V1_FT_POINTER => ("void*", 4, ScalarEncoding::Unsigned),
        V1_FT_FLOAT => ("float", 4, ScalarEncoding::Floating),
        V1_FT_DBL_PREC_FLOAT => ("double", 8, ScalarEncoding::Floating),
        V1_FT_BOOLEAN => ("bool", 1, ScalarEncoding::Unsigned),
        V1_FT_VOID => ("void", 0, ScalarEncoding::None),
        _ => ("<unknown>", 4, ScalarEncoding::Unsigned),
    };
    let name_id = builder.arena_mut().intern_string(name);
    builder.arena_mut().push_record(TypeRecord::Scalar(ScalarType::new(
        Some(name_id),
        bytes,
        encoding,
        DisplayFormat::Default,
    )))
}

/// Modified fundamental type: leading modifier bytes, trailing two-byte
/// fundamental id. Only the pointer modifier changes the shape here.
fn modified_fundamental(builder: &mut SymbolTableBuilder, block: &[u8]) -> TypeId {
    const MOD_POINTER_TO: u8 = 0x01;
    if block.len() < 2 {
        return fundamental_type(builder, 0);
    }
    let fund = u16::from_le_bytes([block[block.len() - 2], block[block.len() - 1]]);
    let base = fundamental_type(builder, fund);
    let pointer_depth = block[..block.len() - 2]
        .iter()
        .filter(|modifier| **modifier == MOD_POINTER_TO)
        .count();
    let mut ty = base;
    for _ in 0..pointer_depth {
        ty = builder
            .arena_mut()
            .push_record(TypeRecord::Pointer(PointerType::new(Some(ty), 4)));
    }
    ty
}

/// Legacy location atoms: `CONST n ADD` for member offsets, `ADDR a` for
/// variables.
fn evaluate_location(block: &[u8]) -> Option<u64> {
    let mut stack: Vec<u64> = Vec::new();
    let mut index = 0usize;
    while index < block.len() {
        let op = block[index];
        index += 1;
        match op {
            V1_OP_ADDR | V1_OP_CONST => {
                let bytes = block.get(index..index + 4)?;
                stack.push(u32::from_le_bytes(bytes.try_into().ok()?) as u64);
                index += 4;
            }
            V1_OP_ADD => {
                let rhs = stack.pop()?;
                let lhs = stack.pop().unwrap_or(0);
                stack.push(lhs.wrapping_add(rhs));
            }
            V1_OP_DEREF | V1_OP_DEREF2 => {}
            V1_OP_REG | V1_OP_BASEREG => {
                index += 4;
            }
            _ => return None,
        }
    }
    stack.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;
    use crate::soc::prog::types::TypeArena;

    fn attr(name: u16, form: u16) -> u16 {
        (name << 4) | form
    }

    /// Hand-builds a tiny legacy section: one global variable of fundamental
    /// int type.
    fn variable_section() -> Vec<u8> {
        let mut die = Vec::new();
        die.extend_from_slice(&0u32.to_le_bytes()); // length patched below
        die.extend_from_slice(&V1_TAG_GLOBAL_VARIABLE.to_le_bytes());
        die.extend_from_slice(&attr(V1_AT_NAME, V1_FORM_STRING).to_le_bytes());
        die.extend_from_slice(b"rpm\0");
        die.extend_from_slice(&attr(V1_AT_FUND_TYPE, V1_FORM_DATA2).to_le_bytes());
        die.extend_from_slice(&V1_FT_UNSIGNED_INTEGER.to_le_bytes());
        let len = die.len() as u32;
        die[..4].copy_from_slice(&len.to_le_bytes());
        die
    }

    #[test]
    fn legacy_variables_register_named_types() {
        let mut builder = SymbolTableBuilder::new(TypeArena::new());
        let mut cursor = ByteCursor::new(variable_section(), ByteOrder::Little);
        let info = parse(&mut cursor, &mut builder);
        assert!(!info.degraded);
        let ty = info.named_types.get("rpm").copied().expect("rpm type");
        let TypeRecord::Scalar(scalar) = builder.arena().get(ty) else {
            panic!("expected scalar");
        };
        assert_eq!(scalar.byte_size, 4);
        assert_eq!(scalar.encoding, ScalarEncoding::Unsigned);
    }

    #[test]
    fn member_offsets_come_from_location_atoms() {
        let block = [V1_OP_CONST, 0x08, 0, 0, 0, V1_OP_ADD];
        assert_eq!(evaluate_location(&block), Some(8));
    }
}
