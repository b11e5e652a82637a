//! Debugging-information-entry parsing for the v2+ format. The tree walk is
//! abbreviation-driven and skips every attribute payload by its form, keeping
//! only `(attribute, form, payload offset)` descriptors plus an opportunistic
//! cache of the hot fields (name, sibling, data-location link, declaration).
//! Everything else is decoded on demand from the recorded offset.

use std::fmt;
use std::sync::Arc;

use crate::soc::prog::cursor::{ByteCursor, CursorError, CursorResult};

use super::abbrev::{AbbrevEntry, AbbrevIndex};
use super::consts::*;

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Address(u64),
    Udata(u64),
    Sdata(i64),
    Text(String),
    Flag(bool),
    /// Section-absolute offset of the referenced entry.
    Ref(u64),
    Block(Vec<u8>),
}

/// Shared view a unit's entries re-read attribute payloads through: the info
/// section, the string table, and the unit geometry reference forms need.
pub struct UnitContext {
    section: ByteCursor,
    strings: Option<ByteCursor>,
    unit_offset: u64,
    address_size: u8,
}

impl fmt::Debug for UnitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitContext")
            .field("unit_offset", &self.unit_offset)
            .field("address_size", &self.address_size)
            .finish_non_exhaustive()
    }
}

/// Attribute descriptor recorded during the skip pass.
#[derive(Clone, Copy, Debug)]
pub struct AttrRef {
    pub at: u64,
    pub form: u64,
    /// Payload start within the info section.
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct Die {
    /// Section offset; doubles as the identity key for type interning.
    pub offset: u64,
    pub tag: u64,
    /// Cached `AT_name`, the most frequently consulted attribute.
    pub label: Option<String>,
    /// Cached `AT_data_location` link name used by metadata-driven lookups.
    pub link_label: Option<String>,
    /// Cached `AT_sibling` target offset.
    pub sibling: Option<u64>,
    /// Cached `AT_declaration` flag.
    pub declaration: bool,
    attrs: Vec<AttrRef>,
    pub children: Vec<Die>,
    ctx: Arc<UnitContext>,
}

impl Die {
    pub fn attrs(&self) -> &[AttrRef] {
        &self.attrs
    }

    fn attr_ref(&self, at: u64) -> Option<&AttrRef> {
        self.attrs.iter().find(|attr| attr.at == at)
    }

    /// Re-reads one attribute from its recorded payload offset.
    fn decode_attr(&self, at: u64) -> Option<AttrValue> {
        let attr = self.attr_ref(at)?;
        let mut cursor = self.ctx.section.fork();
        cursor.set_index(attr.offset as usize).ok()?;
        decode_form(&mut cursor, attr.form, &self.ctx).ok()
    }

    pub fn try_get_udata(&self, at: u64) -> Option<u64> {
        match self.decode_attr(at)? {
            AttrValue::Udata(value) | AttrValue::Address(value) | AttrValue::Ref(value) => {
                Some(value)
            }
            AttrValue::Sdata(value) => Some(value as u64),
            AttrValue::Flag(flag) => Some(flag as u64),
            _ => None,
        }
    }

    pub fn try_get_sdata(&self, at: u64) -> Option<i64> {
        match self.decode_attr(at)? {
            AttrValue::Sdata(value) => Some(value),
            AttrValue::Udata(value) | AttrValue::Address(value) => Some(value as i64),
            _ => None,
        }
    }

    pub fn try_get_string(&self, at: u64) -> Option<String> {
        match self.decode_attr(at)? {
            AttrValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn try_get_flag(&self, at: u64) -> Option<bool> {
        match self.decode_attr(at)? {
            AttrValue::Flag(flag) => Some(flag),
            AttrValue::Udata(value) => Some(value != 0),
            _ => None,
        }
    }

    pub fn try_get_die(&self, at: u64) -> Option<u64> {
        match self.decode_attr(at)? {
            AttrValue::Ref(offset) => Some(offset),
            _ => None,
        }
    }

    pub fn try_get_block(&self, at: u64) -> Option<Vec<u8>> {
        match self.decode_attr(at)? {
            AttrValue::Block(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// A block attribute interpreted as a location expression.
    pub fn try_get_expression(&self, at: u64) -> Option<Vec<u8>> {
        self.try_get_block(at)
    }

    pub fn children_with_tag(&self, tag: u64) -> impl Iterator<Item = &Die> {
        self.children.iter().filter(move |child| child.tag == tag)
    }
}

/// Compilation-unit header for the v2+ info section.
#[derive(Clone, Copy, Debug)]
pub struct UnitHeader {
    pub offset: u64,
    pub length: u64,
    pub version: u16,
    pub abbrev_offset: u64,
    pub address_size: u8,
}

impl UnitHeader {
    pub fn end(&self) -> u64 {
        // length excludes its own four bytes
        self.offset + 4 + self.length
    }
}

pub struct UnitParser<'index> {
    abbrev: &'index AbbrevIndex,
    strings: Option<ByteCursor>,
}

impl<'index> UnitParser<'index> {
    pub fn new(abbrev: &'index AbbrevIndex, strings: Option<ByteCursor>) -> Self {
        Self { abbrev, strings }
    }

    pub fn read_header(&self, cursor: &mut ByteCursor) -> CursorResult<UnitHeader> {
        let offset = cursor.index() as u64;
        let length = cursor.get_u32()? as u64;
        let version = cursor.get_u16()?;
        let abbrev_offset = cursor.get_u32()? as u64;
        let address_size = cursor.get_u8()?;
        Ok(UnitHeader {
            offset,
            length,
            version,
            abbrev_offset,
            address_size,
        })
    }

    /// Parses one DIE and its subtree. `None` marks a null entry (sibling
    /// chain terminator).
    pub fn read_die(
        &self,
        cursor: &mut ByteCursor,
        unit: &UnitHeader,
    ) -> CursorResult<Option<Die>> {
        let ctx = Arc::new(UnitContext {
            section: cursor.fork(),
            strings: self.strings.clone(),
            unit_offset: unit.offset,
            address_size: unit.address_size,
        });
        self.read_die_in(cursor, unit, &ctx)
    }

    fn read_die_in(
        &self,
        cursor: &mut ByteCursor,
        unit: &UnitHeader,
        ctx: &Arc<UnitContext>,
    ) -> CursorResult<Option<Die>> {
        let offset = cursor.index() as u64;
        let code = cursor.get_uleb128()?;
        if code == 0 {
            return Ok(None);
        }
        let entry = self
            .abbrev
            .entry(unit.abbrev_offset, code)
            .ok_or(CursorError::OutOfRange {
                index: offset as usize,
                len: 0,
                end: cursor.len(),
            })?
            .clone();

        let mut die = Die {
            offset,
            tag: entry.tag,
            label: None,
            link_label: None,
            sibling: None,
            declaration: false,
            attrs: Vec::with_capacity(entry.attrs.len()),
            children: Vec::new(),
            ctx: Arc::clone(ctx),
        };
        self.skip_attrs(cursor, &entry, ctx, &mut die)?;

        if entry.has_children {
            while let Some(child) = self.read_die_in(cursor, unit, ctx)? {
                die.children.push(child);
            }
        }
        Ok(Some(die))
    }

    /// Skips each payload by its form, recording the descriptor and caching
    /// the handful of attributes every later pass consults.
    fn skip_attrs(
        &self,
        cursor: &mut ByteCursor,
        entry: &AbbrevEntry,
        ctx: &Arc<UnitContext>,
        die: &mut Die,
    ) -> CursorResult<()> {
        for (at, form) in &entry.attrs {
            let offset = cursor.index() as u32;
            match *at {
                AT_NAME | AT_DATA_LOCATION => {
                    if let AttrValue::Text(text) = decode_form(cursor, *form, ctx)? {
                        if *at == AT_NAME {
                            die.label = Some(text);
                        } else {
                            die.link_label = Some(text);
                        }
                    }
                }
                AT_SIBLING => {
                    if let AttrValue::Ref(target) = decode_form(cursor, *form, ctx)? {
                        die.sibling = Some(target);
                    }
                }
                AT_DECLARATION => match decode_form(cursor, *form, ctx)? {
                    AttrValue::Flag(flag) => die.declaration = flag,
                    AttrValue::Udata(value) => die.declaration = value != 0,
                    _ => {}
                },
                _ => skip_form(cursor, *form, ctx.address_size)?,
            }
            die.attrs.push(AttrRef {
                at: *at,
                form: *form,
                offset,
            });
        }
        Ok(())
    }
}

fn address_bytes(address_size: u8) -> usize {
    match address_size {
        8 => 8,
        2 => 2,
        _ => 4,
    }
}

/// Advances past one payload without materialising it.
fn skip_form(cursor: &mut ByteCursor, form: u64, address_size: u8) -> CursorResult<()> {
    match form {
        FORM_ADDR => cursor.skip(address_bytes(address_size)),
        FORM_DATA1 | FORM_REF1 | FORM_FLAG => cursor.skip(1),
        FORM_DATA2 | FORM_REF2 => cursor.skip(2),
        FORM_DATA4 | FORM_REF4 | FORM_STRP | FORM_REF_ADDR => cursor.skip(4),
        FORM_DATA8 | FORM_REF8 => cursor.skip(8),
        FORM_SDATA => cursor.get_sleb128().map(|_| ()),
        FORM_UDATA | FORM_REF_UDATA => cursor.get_uleb128().map(|_| ()),
        FORM_STRING => cursor.get_string(-1).map(|_| ()),
        FORM_BLOCK1 => {
            let len = cursor.get_u8()? as usize;
            cursor.skip(len)
        }
        FORM_BLOCK2 => {
            let len = cursor.get_u16()? as usize;
            cursor.skip(len)
        }
        FORM_BLOCK4 => {
            let len = cursor.get_u32()? as usize;
            cursor.skip(len)
        }
        FORM_BLOCK => {
            let len = cursor.get_uleb128()? as usize;
            cursor.skip(len)
        }
        FORM_INDIRECT => {
            let actual = cursor.get_uleb128()?;
            skip_form(cursor, actual, address_size)
        }
        _ => Err(CursorError::OutOfRange {
            index: cursor.index(),
            len: 0,
            end: cursor.len(),
        }),
    }
}

fn decode_form(cursor: &mut ByteCursor, form: u64, ctx: &UnitContext) -> CursorResult<AttrValue> {
    let value = match form {
        FORM_ADDR => AttrValue::Address(match ctx.address_size {
            8 => cursor.get_u64()?,
            2 => cursor.get_u16()? as u64,
            _ => cursor.get_u32()? as u64,
        }),
        FORM_DATA1 => AttrValue::Udata(cursor.get_u8()? as u64),
        FORM_DATA2 => AttrValue::Udata(cursor.get_u16()? as u64),
        FORM_DATA4 => AttrValue::Udata(cursor.get_u32()? as u64),
        FORM_DATA8 => AttrValue::Udata(cursor.get_u64()?),
        FORM_SDATA => AttrValue::Sdata(cursor.get_sleb128()?),
        FORM_UDATA => AttrValue::Udata(cursor.get_uleb128()?),
        FORM_STRING => AttrValue::Text(cursor.get_string(-1)?),
        FORM_STRP => {
            let offset = cursor.get_u32()? as usize;
            AttrValue::Text(string_at(ctx, offset))
        }
        FORM_FLAG => AttrValue::Flag(cursor.get_u8()? != 0),
        FORM_REF1 => AttrValue::Ref(ctx.unit_offset + cursor.get_u8()? as u64),
        FORM_REF2 => AttrValue::Ref(ctx.unit_offset + cursor.get_u16()? as u64),
        FORM_REF4 => AttrValue::Ref(ctx.unit_offset + cursor.get_u32()? as u64),
        FORM_REF8 => AttrValue::Ref(ctx.unit_offset + cursor.get_u64()?),
        FORM_REF_UDATA => AttrValue::Ref(ctx.unit_offset + cursor.get_uleb128()?),
        FORM_REF_ADDR => AttrValue::Ref(cursor.get_u32()? as u64),
        FORM_BLOCK1 => {
            let len = cursor.get_u8()? as usize;
            AttrValue::Block(cursor.get_bytes(len)?.collect())
        }
        FORM_BLOCK2 => {
            let len = cursor.get_u16()? as usize;
            AttrValue::Block(cursor.get_bytes(len)?.collect())
        }
        FORM_BLOCK4 => {
            let len = cursor.get_u32()? as usize;
            AttrValue::Block(cursor.get_bytes(len)?.collect())
        }
        FORM_BLOCK => {
            let len = cursor.get_uleb128()? as usize;
            AttrValue::Block(cursor.get_bytes(len)?.collect())
        }
        FORM_INDIRECT => {
            let actual = cursor.get_uleb128()?;
            decode_form(cursor, actual, ctx)?
        }
        _ => {
            return Err(CursorError::OutOfRange {
                index: cursor.index(),
                len: 0,
                end: cursor.len(),
            });
        }
    };
    Ok(value)
}

fn string_at(ctx: &UnitContext, offset: usize) -> String {
    let Some(strings) = &ctx.strings else {
        return String::new();
    };
    let mut cursor = strings.fork();
    if cursor.set_index(offset).is_err() {
        return String::new();
    }
    cursor.get_string(-1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;

    fn abbrevs() -> AbbrevIndex {
        let bytes = vec![
            // code 1: base_type, no children, name(string) + byte_size(data1)
            0x01, 0x24, 0x00, 0x03, 0x08, 0x0B, 0x0B, 0x00, 0x00, //
            // code 2: member, no children, sibling(ref4) + declaration(flag)
            //         + data_member_location(block1)
            0x02, 0x0D, 0x00, 0x01, 0x13, 0x3C, 0x0C, 0x38, 0x0A, 0x00, 0x00, //
            0x00,
        ];
        let mut cursor = ByteCursor::new(bytes, ByteOrder::Little);
        AbbrevIndex::parse(&mut cursor).unwrap()
    }

    fn unit() -> UnitHeader {
        UnitHeader {
            offset: 0,
            length: 0,
            version: 2,
            abbrev_offset: 0,
            address_size: 4,
        }
    }

    #[test]
    fn attributes_skip_by_form_and_reread_on_demand() {
        let abbrev = abbrevs();
        let parser = UnitParser::new(&abbrev, None);
        let bytes = vec![0x01, b'i', b'n', b't', 0x00, 0x04];
        let mut cursor = ByteCursor::new(bytes, ByteOrder::Little);
        let die = parser
            .read_die(&mut cursor, &unit())
            .unwrap()
            .expect("non-null entry");
        assert_eq!(die.tag, TAG_BASE_TYPE);
        assert_eq!(die.label.as_deref(), Some("int"), "name caches during the walk");
        assert_eq!(die.attrs().len(), 2);
        assert_eq!(
            die.attrs()[1].offset,
            5,
            "descriptors record where each payload starts"
        );
        // On-demand decoding is repeatable: nothing is consumed by a read.
        assert_eq!(die.try_get_udata(AT_BYTE_SIZE), Some(4));
        assert_eq!(die.try_get_udata(AT_BYTE_SIZE), Some(4));
        assert_eq!(die.try_get_string(AT_NAME).as_deref(), Some("int"));
    }

    #[test]
    fn hot_fields_cache_and_blocks_reread_from_their_offsets() {
        let abbrev = abbrevs();
        let parser = UnitParser::new(&abbrev, None);
        // sibling = 0x40, declaration = 1, location block [0x23, 0x08]
        let bytes = vec![0x02, 0x40, 0, 0, 0, 0x01, 0x02, 0x23, 0x08];
        let mut cursor = ByteCursor::new(bytes, ByteOrder::Little);
        let die = parser
            .read_die(&mut cursor, &unit())
            .unwrap()
            .expect("non-null entry");
        assert_eq!(die.sibling, Some(0x40), "sibling offset caches during the walk");
        assert!(die.declaration, "declaration flag caches during the walk");
        assert_eq!(
            die.try_get_expression(AT_DATA_MEMBER_LOCATION),
            Some(vec![0x23, 0x08]),
            "block payloads decode on demand"
        );
        assert_eq!(die.try_get_die(AT_SIBLING), Some(0x40));
    }

    #[test]
    fn null_code_terminates_a_sibling_chain() {
        let abbrev = abbrevs();
        let parser = UnitParser::new(&abbrev, None);
        let mut cursor = ByteCursor::new(vec![0x00], ByteOrder::Little);
        assert!(parser.read_die(&mut cursor, &unit()).unwrap().is_none());
    }
}
