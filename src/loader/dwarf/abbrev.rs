//! Abbreviation-table index: `(table_offset, code)` resolves to the tag,
//! children flag, and attribute/form list a DIE is encoded with.

use ahash::AHashMap;

use crate::soc::prog::cursor::{ByteCursor, CursorResult};

#[derive(Clone, Debug)]
pub struct AbbrevEntry {
    pub tag: u64,
    pub has_children: bool,
    pub attrs: Vec<(u64, u64)>,
}

#[derive(Default)]
pub struct AbbrevIndex {
    tables: AHashMap<u64, AHashMap<u64, AbbrevEntry>>,
}

impl AbbrevIndex {
    /// Parses every table in the abbreviation section up front; compilation
    /// units then index by their declared table offset.
    pub fn parse(cursor: &mut ByteCursor) -> CursorResult<Self> {
        let mut index = Self::default();
        while !cursor.end_of_stream() {
            let table_offset = cursor.index() as u64;
            let mut table = AHashMap::new();
            loop {
                let code = cursor.get_uleb128()?;
                if code == 0 {
                    break;
                }
                let tag = cursor.get_uleb128()?;
                let has_children = cursor.get_u8()? != 0;
                let mut attrs = Vec::new();
                loop {
                    let at = cursor.get_uleb128()?;
                    let form = cursor.get_uleb128()?;
                    if at == 0 && form == 0 {
                        break;
                    }
                    attrs.push((at, form));
                }
                table.insert(
                    code,
                    AbbrevEntry {
                        tag,
                        has_children,
                        attrs,
                    },
                );
            }
            index.tables.insert(table_offset, table);
        }
        Ok(index)
    }

    pub fn entry(&self, table_offset: u64, code: u64) -> Option<&AbbrevEntry> {
        self.tables.get(&table_offset)?.get(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;

    #[test]
    fn parses_entries_until_the_terminator() {
        // code 1: tag 0x11 (compile unit), children, [(name=0x03, string=0x08)]
        // code 2: tag 0x24 (base type), no children, [(byte_size=0x0b, data1=0x0b)]
        let bytes = vec![
            0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, //
            0x02, 0x24, 0x00, 0x0B, 0x0B, 0x00, 0x00, //
            0x00,
        ];
        let mut cursor = ByteCursor::new(bytes, ByteOrder::Little);
        let index = AbbrevIndex::parse(&mut cursor).expect("abbrev parse");
        let cu = index.entry(0, 1).expect("compile unit entry");
        assert_eq!(cu.tag, 0x11);
        assert!(cu.has_children);
        assert_eq!(cu.attrs, vec![(0x03, 0x08)]);
        let base = index.entry(0, 2).expect("base type entry");
        assert!(!base.has_children);
        assert!(index.entry(0, 3).is_none());
    }
}
