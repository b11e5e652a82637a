//! LEB128 variable-length integer codecs shared by the DWARF walker and the
//! symbol tooling.

use super::{ByteCursor, CursorError, CursorResult};

/// Encoded ULEB128 of any 64-bit value fits in ten bytes; anything longer is a
/// malformed stream.
const MAX_LEB_BYTES: usize = 10;

impl ByteCursor {
    pub fn get_uleb128(&mut self) -> CursorResult<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut consumed = 0usize;
        loop {
            let byte = self.get_u8()?;
            consumed += 1;
            if shift < 64 {
                result |= ((byte & 0x7F) as u64) << shift;
            }
            if (byte & 0x80) == 0 {
                break;
            }
            if consumed >= MAX_LEB_BYTES {
                return Err(CursorError::Overflow);
            }
            shift += 7;
        }
        Ok(result)
    }

    pub fn get_sleb128(&mut self) -> CursorResult<i64> {
        let mut result = 0i64;
        let mut shift = 0u32;
        let mut consumed = 0usize;
        let mut byte;
        loop {
            byte = self.get_u8()? as i64;
            consumed += 1;
            if shift < 64 {
                result |= (byte & 0x7F) << shift;
            }
            shift += 7;
            if (byte & 0x80) == 0 {
                break;
            }
            if consumed >= MAX_LEB_BYTES {
                return Err(CursorError::Overflow);
            }
        }
        if shift < 64 && (byte & 0x40) != 0 {
            result |= !0 << shift;
        }
        Ok(result)
    }

    pub fn put_uleb128(&mut self, mut value: u64) -> CursorResult<()> {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.put_u8(byte)?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    pub fn put_sleb128(&mut self, mut value: i64) -> CursorResult<()> {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            let sign_clear = (byte & 0x40) == 0;
            let done = (value == 0 && sign_clear) || (value == -1 && !sign_clear);
            self.put_u8(if done { byte } else { byte | 0x80 })?;
            if done {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::cursor::ByteOrder;
    use quickcheck_macros::quickcheck;

    fn scratch(len: usize) -> ByteCursor {
        ByteCursor::new(vec![0u8; len], ByteOrder::Little)
    }

    #[test]
    fn uleb_decodes_dwarf_reference_vector() {
        let mut c = ByteCursor::new(vec![0xE5, 0x8E, 0x26], ByteOrder::Little);
        assert_eq!(c.get_uleb128().unwrap(), 624485);
        assert_eq!(c.index(), 3, "should consume three bytes");
    }

    #[test]
    fn sleb_decodes_negative_reference_vector() {
        let mut c = ByteCursor::new(vec![0x9B, 0xF1, 0x59], ByteOrder::Little);
        assert_eq!(c.get_sleb128().unwrap(), -624485);
    }

    #[test]
    fn unterminated_sequences_overflow() {
        let mut c = ByteCursor::new(vec![0x80; 12], ByteOrder::Little);
        assert_eq!(c.get_uleb128(), Err(CursorError::Overflow));
        let mut c = ByteCursor::new(vec![0x80; 12], ByteOrder::Little);
        assert_eq!(c.get_sleb128(), Err(CursorError::Overflow));
    }

    #[quickcheck]
    fn uleb_round_trips_and_bounds_length(value: u64) -> bool {
        let mut c = scratch(16);
        c.put_uleb128(value).unwrap();
        let written = c.index();
        c.set_index(0).unwrap();
        c.get_uleb128().unwrap() == value && written <= 10
    }

    #[quickcheck]
    fn sleb_round_trips(value: i64) -> bool {
        let mut c = scratch(16);
        c.put_sleb128(value).unwrap();
        c.set_index(0).unwrap();
        c.get_sleb128().unwrap() == value
    }
}
