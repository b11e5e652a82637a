//! Seekable, endianness-aware view over a byte buffer with a stack of scoped
//! working ranges. Cursors are handed out by the binary loaders and consumed
//! by the type-coding layer, which reads and writes values at the cursor's
//! current position.

mod checksum;
mod leb128;

use std::{error::Error, fmt, sync::Arc};

use smallvec::SmallVec;

use crate::soc::device::Endianness;

pub type CursorResult<T> = Result<T, CursorError>;

#[derive(Debug, PartialEq, Eq)]
pub enum CursorError {
    OutOfRange { index: usize, len: usize, end: usize },
    Overflow,
    UnknownRange { id: RangeId },
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::OutOfRange { index, len, end } => write!(
                f,
                "read of {len} bytes at index 0x{index:X} crosses range end 0x{end:X}"
            ),
            CursorError::Overflow => write!(f, "variable-length integer exceeds ten bytes"),
            CursorError::UnknownRange { id } => {
                write!(f, "range id {} is not on the cursor stack", id.0)
            }
        }
    }
}

impl Error for CursorError {}

/// Byte ordering requested by a caller; `Native` resolves once against the
/// host when the cursor is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
    Native,
}

impl ByteOrder {
    pub fn resolve(self) -> Endianness {
        match self {
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
            ByteOrder::Native => Endianness::host(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RangeId(u32);

#[derive(Clone, Copy, Debug)]
struct WorkingRange {
    start: usize,
    end: usize,
    id: RangeId,
    /// Index the parent scope held when this range was pushed, restored on
    /// desync unless the caller passes the inner index up.
    saved_index: usize,
}

/// Cursor over an in-memory byte buffer. The buffer is shared copy-on-write so
/// section views and re-reads stay cheap while `put_*` writers remain
/// available for image synthesis.
#[derive(Clone)]
pub struct ByteCursor {
    data: Arc<Vec<u8>>,
    base: u64,
    index: usize,
    order: Endianness,
    ranges: SmallVec<[WorkingRange; 4]>,
    next_range_id: u32,
}

impl ByteCursor {
    pub fn new(data: Vec<u8>, order: ByteOrder) -> Self {
        Self {
            data: Arc::new(data),
            base: 0,
            index: 0,
            order: order.resolve(),
            ranges: SmallVec::new(),
            next_range_id: 0,
        }
    }

    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Cheap second view over the same buffer, starting back at index zero
    /// with an empty range stack.
    pub fn fork(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            base: self.base,
            index: 0,
            order: self.order,
            ranges: SmallVec::new(),
            next_range_id: 0,
        }
    }

    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline(always)]
    pub fn base_address(&self) -> u64 {
        self.base
    }

    /// Abstract address represented by the current index.
    #[inline(always)]
    pub fn address(&self) -> u64 {
        self.base + self.index as u64
    }

    #[inline(always)]
    pub fn order(&self) -> Endianness {
        self.order
    }

    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = order.resolve();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn range_end(&self) -> usize {
        self.ranges
            .last()
            .map(|range| range.end)
            .unwrap_or(self.data.len())
    }

    fn range_start(&self) -> usize {
        self.ranges.last().map(|range| range.start).unwrap_or(0)
    }

    pub fn set_index(&mut self, index: usize) -> CursorResult<()> {
        if index < self.range_start() || index > self.range_end() {
            return Err(CursorError::OutOfRange {
                index,
                len: 0,
                end: self.range_end(),
            });
        }
        self.index = index;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> CursorResult<()> {
        self.take(count).map(|_| ())
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.range_end().saturating_sub(self.index)
    }

    pub fn end_of_range(&self) -> bool {
        self.index >= self.range_end()
    }

    pub fn end_of_stream(&self) -> bool {
        self.index >= self.data.len()
    }

    // Working-range stack -----------------------------------------------------

    /// Acquires a sub-range scope: the cursor seeks to `start` and reads are
    /// bounded by `end` until the matching `desync_range`. A nested range must
    /// sit inside the active window, the same bound `expand_range` enforces
    /// when growing one.
    pub fn push_range(&mut self, start: usize, end: usize) -> CursorResult<RangeId> {
        if start > end || start < self.range_start() || end > self.range_end() {
            return Err(CursorError::OutOfRange {
                index: start,
                len: end.saturating_sub(start),
                end: self.range_end(),
            });
        }
        let id = RangeId(self.next_range_id);
        self.next_range_id += 1;
        self.ranges.push(WorkingRange {
            start,
            end,
            id,
            saved_index: self.index,
        });
        self.index = start;
        Ok(id)
    }

    /// Rewinds the cursor to the start of the identified range, which must
    /// still be on the stack.
    pub fn sync_range(&mut self, id: RangeId) -> CursorResult<()> {
        let range = self
            .ranges
            .iter()
            .find(|range| range.id == id)
            .ok_or(CursorError::UnknownRange { id })?;
        self.index = range.start;
        Ok(())
    }

    /// Pops ranges until the identified range is released, restoring the scope
    /// that was active before its push. With `pass_index` the parent scope
    /// adopts the inner cursor position instead of its saved index.
    pub fn desync_range(&mut self, id: RangeId, pass_index: bool) -> CursorResult<()> {
        let depth = self
            .ranges
            .iter()
            .position(|range| range.id == id)
            .ok_or(CursorError::UnknownRange { id })?;
        let final_index = self.index;
        let released = self.ranges.drain(depth..).next().expect("range at depth");
        self.index = if pass_index {
            final_index
        } else {
            released.saved_index
        };
        Ok(())
    }

    /// Grows the top-of-stack range end by `delta`, clamped to the enclosing
    /// scope.
    pub fn expand_range(&mut self, delta: usize) -> CursorResult<()> {
        let outer_end = if self.ranges.len() >= 2 {
            self.ranges[self.ranges.len() - 2].end
        } else {
            self.data.len()
        };
        let Some(top) = self.ranges.last_mut() else {
            return Err(CursorError::OutOfRange {
                index: 0,
                len: delta,
                end: self.data.len(),
            });
        };
        let grown = top.end.saturating_add(delta);
        if grown > outer_end {
            return Err(CursorError::OutOfRange {
                index: top.end,
                len: delta,
                end: outer_end,
            });
        }
        top.end = grown;
        Ok(())
    }

    /// Runs `body` inside a scoped range and guarantees the pop, whatever the
    /// body returns.
    pub fn with_range<T>(
        &mut self,
        start: usize,
        end: usize,
        body: impl FnOnce(&mut Self) -> CursorResult<T>,
    ) -> CursorResult<T> {
        let id = self.push_range(start, end)?;
        let result = body(self);
        self.desync_range(id, false)?;
        result
    }

    // Primitive readers -------------------------------------------------------

    fn take(&mut self, len: usize) -> CursorResult<&[u8]> {
        let end = self.range_end();
        if self.index + len > end {
            return Err(CursorError::OutOfRange {
                index: self.index,
                len,
                end,
            });
        }
        let window = &self.data[self.index..self.index + len];
        self.index += len;
        Ok(window)
    }

    fn get_word(&mut self, len: usize) -> CursorResult<u64> {
        let order = self.order;
        self.take(len).map(|window| order.decode_word(window))
    }

    pub fn get_u8(&mut self) -> CursorResult<u8> {
        self.get_word(1).map(|value| value as u8)
    }

    pub fn get_u16(&mut self) -> CursorResult<u16> {
        self.get_word(2).map(|value| value as u16)
    }

    pub fn get_u32(&mut self) -> CursorResult<u32> {
        self.get_word(4).map(|value| value as u32)
    }

    pub fn get_u64(&mut self) -> CursorResult<u64> {
        self.get_word(8)
    }

    pub fn get_i8(&mut self) -> CursorResult<i8> {
        self.get_u8().map(|value| value as i8)
    }

    pub fn get_i16(&mut self) -> CursorResult<i16> {
        self.get_u16().map(|value| value as i16)
    }

    pub fn get_i32(&mut self) -> CursorResult<i32> {
        self.get_u32().map(|value| value as i32)
    }

    pub fn get_i64(&mut self) -> CursorResult<i64> {
        self.get_u64().map(|value| value as i64)
    }

    pub fn get_f32(&mut self) -> CursorResult<f32> {
        self.get_u32().map(f32::from_bits)
    }

    pub fn get_f64(&mut self) -> CursorResult<f64> {
        self.get_u64().map(f64::from_bits)
    }

    /// Reads a word of `len` bytes (1..=8) in the cursor's byte order.
    pub fn get_unsigned(&mut self, len: usize) -> CursorResult<u64> {
        assert!((1..=8).contains(&len), "word length must be 1..=8 bytes");
        self.get_word(len)
    }

    pub fn get_signed(&mut self, len: usize) -> CursorResult<i64> {
        let raw = self.get_unsigned(len)?;
        let shift = 64 - (len * 8) as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Reads until a NUL (consumed, not returned) or until `max` bytes;
    /// `max = -1` reads to the NUL regardless of distance.
    pub fn get_string(&mut self, max: i64) -> CursorResult<String> {
        let mut text = Vec::new();
        let mut taken = 0i64;
        loop {
            if max >= 0 && taken >= max {
                break;
            }
            let byte = self.get_u8()?;
            taken += 1;
            if byte == 0 {
                break;
            }
            text.push(byte);
        }
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// Lazily yields `count` bytes, advancing the cursor per item. Bounds are
    /// validated up front so iteration itself cannot fail.
    pub fn get_bytes(&mut self, count: usize) -> CursorResult<ByteIter<'_>> {
        let end = self.range_end();
        if self.index + count > end {
            return Err(CursorError::OutOfRange {
                index: self.index,
                len: count,
                end,
            });
        }
        Ok(ByteIter {
            cursor: self,
            remaining: count,
        })
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> CursorResult<()> {
        let window = self.take(out.len())?;
        out.copy_from_slice(window);
        Ok(())
    }

    // Primitive writers -------------------------------------------------------

    fn put_word(&mut self, value: u64, len: usize) -> CursorResult<()> {
        let end = self.range_end();
        if self.index + len > end {
            return Err(CursorError::OutOfRange {
                index: self.index,
                len,
                end,
            });
        }
        let order = self.order;
        let index = self.index;
        let data = Arc::make_mut(&mut self.data);
        order.encode_word(value, &mut data[index..index + len]);
        self.index += len;
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> CursorResult<()> {
        self.put_word(value as u64, 1)
    }

    pub fn put_u16(&mut self, value: u16) -> CursorResult<()> {
        self.put_word(value as u64, 2)
    }

    pub fn put_u32(&mut self, value: u32) -> CursorResult<()> {
        self.put_word(value as u64, 4)
    }

    pub fn put_u64(&mut self, value: u64) -> CursorResult<()> {
        self.put_word(value, 8)
    }

    pub fn put_f32(&mut self, value: f32) -> CursorResult<()> {
        self.put_word(value.to_bits() as u64, 4)
    }

    pub fn put_f64(&mut self, value: f64) -> CursorResult<()> {
        self.put_word(value.to_bits(), 8)
    }

    pub fn put_unsigned(&mut self, value: u64, len: usize) -> CursorResult<()> {
        assert!((1..=8).contains(&len), "word length must be 1..=8 bytes");
        self.put_word(value, len)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> CursorResult<()> {
        let end = self.range_end();
        if self.index + bytes.len() > end {
            return Err(CursorError::OutOfRange {
                index: self.index,
                len: bytes.len(),
                end,
            });
        }
        let index = self.index;
        let data = Arc::make_mut(&mut self.data);
        data[index..index + bytes.len()].copy_from_slice(bytes);
        self.index += bytes.len();
        Ok(())
    }
}

pub struct ByteIter<'cursor> {
    cursor: &'cursor mut ByteCursor,
    remaining: usize,
}

impl Iterator for ByteIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let byte = self.cursor.data[self.cursor.index];
        self.cursor.index += 1;
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ByteIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn cursor(bytes: &[u8], order: ByteOrder) -> ByteCursor {
        ByteCursor::new(bytes.to_vec(), order)
    }

    #[test]
    fn scalar_reads_advance_and_honor_order() {
        let mut le = cursor(&[0x78, 0x56, 0x34, 0x12], ByteOrder::Little);
        assert_eq!(le.get_u32().unwrap(), 0x1234_5678);
        assert!(le.end_of_stream());

        let mut be = cursor(&[0x12, 0x34], ByteOrder::Big);
        assert_eq!(be.get_u16().unwrap(), 0x1234);
    }

    #[test]
    fn reads_past_range_end_fail() {
        let mut c = cursor(&[1, 2, 3], ByteOrder::Little);
        c.get_u16().unwrap();
        assert_eq!(
            c.get_u16(),
            Err(CursorError::OutOfRange {
                index: 2,
                len: 2,
                end: 3
            }),
            "two bytes are not available at the tail"
        );
    }

    #[test]
    fn range_stack_restores_previous_scope() {
        let mut c = cursor(&[0; 16], ByteOrder::Little);
        c.set_index(2).unwrap();
        let outer = c.push_range(4, 12).unwrap();
        let inner = c.push_range(6, 8).unwrap();
        c.get_u16().unwrap();
        assert!(c.end_of_range(), "inner scope consumed");
        c.desync_range(inner, false).unwrap();
        assert_eq!(c.index(), 4, "outer scope index restored to its push point");
        c.desync_range(outer, true).unwrap();
        assert_eq!(c.index(), 4, "pass_index commits the inner position");
    }

    #[test]
    fn nested_pushes_cannot_escape_the_active_window() {
        let mut c = cursor(&[0; 16], ByteOrder::Little);
        let outer = c.push_range(4, 12).unwrap();
        assert!(
            c.push_range(2, 8).is_err(),
            "a nested range may not start before the active window"
        );
        assert!(
            c.push_range(8, 14).is_err(),
            "a nested range may not end past the active window"
        );
        let inner = c.push_range(6, 10).unwrap();
        c.desync_range(inner, false).unwrap();
        c.desync_range(outer, false).unwrap();
        assert!(
            c.push_range(0, 16).is_ok(),
            "the full stream is available again once the stack unwinds"
        );
    }

    #[test]
    fn sync_and_expand_adjust_the_top_range() {
        let mut c = cursor(&[0; 8], ByteOrder::Little);
        let id = c.push_range(2, 4).unwrap();
        c.get_u16().unwrap();
        assert!(c.get_u8().is_err(), "range end bounds the read");
        c.expand_range(2).unwrap();
        assert!(c.get_u16().is_ok(), "expanded range admits the read");
        c.sync_range(id).unwrap();
        assert_eq!(c.index(), 2);
        assert!(c.expand_range(16).is_err(), "expansion is clamped to the stream");
    }

    #[test]
    fn strings_stop_at_nul_or_max() {
        let mut c = cursor(b"task\0rest", ByteOrder::Little);
        assert_eq!(c.get_string(-1).unwrap(), "task");
        assert_eq!(c.index(), 5, "the NUL is consumed");
        assert_eq!(c.get_string(2).unwrap(), "re");
    }

    #[test]
    fn byte_iter_is_lazy_and_bounded() {
        let mut c = cursor(&[9, 8, 7, 6], ByteOrder::Little);
        {
            let mut iter = c.get_bytes(3).unwrap();
            assert_eq!(iter.next(), Some(9));
            assert_eq!(iter.len(), 2);
        }
        assert!(c.get_bytes(8).is_err());
    }

    #[test]
    fn writers_mirror_readers() {
        let mut c = cursor(&[0u8; 8], ByteOrder::Big);
        c.put_u32(0xCAFE_F00D).unwrap();
        c.put_f32(1.5).unwrap();
        c.set_index(0).unwrap();
        assert_eq!(c.get_u32().unwrap(), 0xCAFE_F00D);
        assert_eq!(c.get_f32().unwrap(), 1.5);
    }

    #[quickcheck]
    fn u32_round_trips_both_orders(value: u32) -> bool {
        [ByteOrder::Little, ByteOrder::Big].iter().all(|order| {
            let mut c = ByteCursor::new(vec![0u8; 4], *order);
            c.put_u32(value).unwrap();
            c.set_index(0).unwrap();
            c.get_u32().unwrap() == value
        })
    }

    #[quickcheck]
    fn f64_round_trips(value: f64) -> bool {
        let mut c = ByteCursor::new(vec![0u8; 8], ByteOrder::Little);
        c.put_f64(value).unwrap();
        c.set_index(0).unwrap();
        let back = c.get_f64().unwrap();
        back == value || (back.is_nan() && value.is_nan())
    }

    #[quickcheck]
    fn signed_reads_sign_extend(value: i32) -> bool {
        let mut c = ByteCursor::new(vec![0u8; 4], ByteOrder::Big);
        c.put_u32(value as u32).unwrap();
        c.set_index(0).unwrap();
        c.get_signed(4).unwrap() == value as i64
    }
}
