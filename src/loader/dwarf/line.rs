//! Line-number program decoding: the state machine is executed to produce
//! flat `(address, file, line)` rows for address-to-source queries.

use tracing::warn;

use crate::soc::prog::cursor::{ByteCursor, CursorResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRow {
    pub address: u64,
    pub file: String,
    pub line: u32,
}

const OPCODE_COPY: u8 = 1;
const OPCODE_ADVANCE_PC: u8 = 2;
const OPCODE_ADVANCE_LINE: u8 = 3;
const OPCODE_SET_FILE: u8 = 4;
const OPCODE_SET_COLUMN: u8 = 5;
const OPCODE_NEGATE_STMT: u8 = 6;
const OPCODE_BASIC_BLOCK: u8 = 7;
const OPCODE_CONST_ADD_PC: u8 = 8;
const OPCODE_FIXED_ADVANCE_PC: u8 = 9;

const EXT_END_SEQUENCE: u64 = 1;
const EXT_SET_ADDRESS: u64 = 2;
const EXT_DEFINE_FILE: u64 = 3;

/// Decodes every line program in the section.
pub fn parse_line_section(cursor: &mut ByteCursor) -> CursorResult<Vec<LineRow>> {
    let mut rows = Vec::new();
    while !cursor.end_of_stream() {
        let start = cursor.index();
        let unit_length = cursor.get_u32()? as usize;
        let unit_end = start + 4 + unit_length;
        let id = cursor.push_range(cursor.index(), unit_end)?;
        if let Err(err) = parse_program(cursor, &mut rows) {
            warn!(offset = start, error = %err, "line program abandoned");
        }
        cursor.desync_range(id, false)?;
        cursor.set_index(unit_end)?;
    }
    Ok(rows)
}

fn parse_program(cursor: &mut ByteCursor, rows: &mut Vec<LineRow>) -> CursorResult<()> {
    let _version = cursor.get_u16()?;
    let header_length = cursor.get_u32()? as usize;
    let program_start = cursor.index() + header_length;
    let min_inst_len = cursor.get_u8()? as u64;
    let _default_is_stmt = cursor.get_u8()?;
    let line_base = cursor.get_i8()? as i64;
    let line_range = cursor.get_u8()? as u64;
    let opcode_base = cursor.get_u8()?;
    let mut std_lengths = Vec::with_capacity(opcode_base.saturating_sub(1) as usize);
    for _ in 1..opcode_base {
        std_lengths.push(cursor.get_u8()?);
    }

    // Include directories: NUL-terminated strings ended by an empty one.
    loop {
        let dir = cursor.get_string(-1)?;
        if dir.is_empty() {
            break;
        }
    }
    let mut files = vec!["<unknown>".to_string()];
    loop {
        let name = cursor.get_string(-1)?;
        if name.is_empty() {
            break;
        }
        let _dir = cursor.get_uleb128()?;
        let _mtime = cursor.get_uleb128()?;
        let _length = cursor.get_uleb128()?;
        files.push(name);
    }
    cursor.set_index(program_start)?;

    let mut address = 0u64;
    let mut file = 1u64;
    let mut line = 1i64;
    while !cursor.end_of_range() {
        let opcode = cursor.get_u8()?;
        match opcode {
            0 => {
                let length = cursor.get_uleb128()? as usize;
                let end = cursor.index() + length;
                let sub = cursor.get_uleb128()?;
                match sub {
                    EXT_END_SEQUENCE => {
                        emit(rows, &files, address, file, line);
                        address = 0;
                        file = 1;
                        line = 1;
                    }
                    EXT_SET_ADDRESS => {
                        address = cursor.get_u32()? as u64;
                    }
                    EXT_DEFINE_FILE => {
                        let name = cursor.get_string(-1)?;
                        let _dir = cursor.get_uleb128()?;
                        let _mtime = cursor.get_uleb128()?;
                        let _length = cursor.get_uleb128()?;
                        files.push(name);
                    }
                    _ => {}
                }
                cursor.set_index(end)?;
            }
            OPCODE_COPY => emit(rows, &files, address, file, line),
            OPCODE_ADVANCE_PC => {
                address += cursor.get_uleb128()? * min_inst_len;
            }
            OPCODE_ADVANCE_LINE => {
                line += cursor.get_sleb128()?;
            }
            OPCODE_SET_FILE => {
                file = cursor.get_uleb128()?;
            }
            OPCODE_SET_COLUMN => {
                let _column = cursor.get_uleb128()?;
            }
            OPCODE_NEGATE_STMT | OPCODE_BASIC_BLOCK => {}
            OPCODE_CONST_ADD_PC => {
                let adjusted = (255 - opcode_base) as u64;
                address += (adjusted / line_range) * min_inst_len;
            }
            OPCODE_FIXED_ADVANCE_PC => {
                address += cursor.get_u16()? as u64;
            }
            special if special >= opcode_base => {
                let adjusted = (special - opcode_base) as u64;
                address += (adjusted / line_range) * min_inst_len;
                line += line_base + (adjusted % line_range) as i64;
                emit(rows, &files, address, file, line);
            }
            unknown => {
                // Vendor opcode: skip its declared operand count.
                let count = std_lengths
                    .get((unknown - 1) as usize)
                    .copied()
                    .unwrap_or(0);
                for _ in 0..count {
                    cursor.get_uleb128()?;
                }
            }
        }
    }
    Ok(())
}

fn emit(rows: &mut Vec<LineRow>, files: &[String], address: u64, file: u64, line: i64) {
    let name = files
        .get(file as usize)
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_string());
    rows.push(LineRow {
        address,
        file: name,
        line: line.max(0) as u32,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;

    /// Builds a tiny line program: set_address 0x1000, one special-opcode row,
    /// advance, end_sequence.
    fn sample_section() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&2u16.to_le_bytes()); // version
        let mut header = Vec::new();
        header.push(1); // min_inst_len
        header.push(1); // default_is_stmt
        header.push((-5i8) as u8); // line_base
        header.push(14); // line_range
        header.push(10); // opcode_base
        header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1]); // std lengths
        header.push(0); // empty include dirs
        header.extend_from_slice(b"main.c\0");
        header.push(0); // dir index
        header.push(0); // mtime
        header.push(0); // length
        header.push(0); // end of file table
        body.extend_from_slice(&(header.len() as u32).to_le_bytes());
        body.extend_from_slice(&header);

        // program
        body.extend_from_slice(&[0x00, 0x05, 0x02]); // extended: set_address
        body.extend_from_slice(&0x1000u32.to_le_bytes());
        // special opcode: advance 1 address unit, advance line by +2:
        // adjusted = (1 * 14) + (2 - (-5)) = 21 -> opcode 31
        body.push(10 + 21);
        body.extend_from_slice(&[0x00, 0x01, 0x01]); // extended: end_sequence

        let mut section = Vec::new();
        section.extend_from_slice(&(body.len() as u32).to_le_bytes());
        section.extend_from_slice(&body);
        section
    }

    #[test]
    fn rows_follow_the_state_machine() {
        let mut cursor = ByteCursor::new(sample_section(), ByteOrder::Little);
        let rows = parse_line_section(&mut cursor).expect("line parse");
        assert_eq!(rows.len(), 2, "one copy row plus the end-of-sequence row");
        assert_eq!(rows[0].address, 0x1001);
        assert_eq!(rows[0].line, 3);
        assert_eq!(rows[0].file, "main.c");
    }
}
