//! Value marshalling: reads and writes typed values at a cursor's current
//! position. Lossy coercions never fail — they clamp or round and report what
//! happened through a [`CoercionStatus`] word so the caller decides severity.

use bitflags::bitflags;

use crate::soc::prog::cursor::{ByteCursor, CursorResult};

use super::arena::{TypeArena, TypeId};
use super::record::TypeRecord;
use super::scalar::{DisplayFormat, ScalarEncoding};

bitflags! {
    /// Side-band report accompanying every coded value.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CoercionStatus: u16 {
        const MIN_CLAMPED = 1 << 0;
        const MAX_CLAMPED = 1 << 1;
        const PRECISION_LOSS = 1 << 2;
        const PARSE_ERROR = 1 << 3;
        const INVALID_CAST = 1 << 4;
        const ADDRESS_OUT_OF_RANGE = 1 << 5;
        const NO_SYMBOL_FOUND = 1 << 6;
    }
}

/// Raw value read straight off the wire before caller-requested coercion.
#[derive(Clone, Debug, PartialEq)]
enum RawValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Composite,
}

impl TypeArena {
    fn read_raw(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
    ) -> CursorResult<(RawValue, CoercionStatus)> {
        let mut status = CoercionStatus::empty();
        let value = match self.get(ty) {
            TypeRecord::Scalar(scalar) => match scalar.encoding {
                ScalarEncoding::Unsigned | ScalarEncoding::None => {
                    RawValue::Unsigned(read_word(cursor, scalar.byte_size, &mut status)?)
                }
                ScalarEncoding::Signed => {
                    RawValue::Signed(read_word_signed(cursor, scalar.byte_size, &mut status)?)
                }
                ScalarEncoding::Floating => match scalar.byte_size {
                    4 => RawValue::Float(cursor.get_f32()? as f64),
                    8 => RawValue::Float(cursor.get_f64()?),
                    other => {
                        cursor.skip(other)?;
                        status |= CoercionStatus::INVALID_CAST;
                        RawValue::Float(0.0)
                    }
                },
                ScalarEncoding::Utf8String => {
                    let mut buf = vec![0u8; scalar.byte_size];
                    cursor.read_exact(&mut buf)?;
                    let text = buf.split(|byte| *byte == 0).next().unwrap_or(&[]);
                    RawValue::Text(String::from_utf8_lossy(text).into_owned())
                }
            },
            TypeRecord::Fixed(fixed) => {
                let raw = read_word_signed(cursor, fixed.base.byte_size, &mut status)?;
                RawValue::Float(fixed.apply(raw))
            }
            TypeRecord::Enum(enum_ty) => {
                RawValue::Signed(read_word_signed(cursor, enum_ty.base.byte_size, &mut status)?)
            }
            TypeRecord::BitField(spec) => {
                let container_bytes = (spec.container_bits as usize).div_ceil(8);
                let word = read_word(cursor, container_bytes, &mut status)?;
                let (value, width) = spec.read_bits(word);
                if spec.is_signed() && width > 0 && width < 64 {
                    let shift = 64 - width as u32;
                    RawValue::Signed(((value << shift) as i64) >> shift)
                } else {
                    RawValue::Unsigned(value)
                }
            }
            TypeRecord::Pointer(pointer) => {
                RawValue::Unsigned(read_word(cursor, pointer.byte_size, &mut status)?)
            }
            _ => {
                status |= CoercionStatus::INVALID_CAST;
                cursor.skip(self.byte_size_of(ty).unwrap_or(0))?;
                RawValue::Composite
            }
        };
        Ok((value, status))
    }

    /// Typed read with coercion toward u64. Consumes exactly the type's byte
    /// size at the cursor.
    pub fn get_unsigned(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
    ) -> CursorResult<(u64, CoercionStatus)> {
        let (raw, mut status) = self.read_raw(ty, cursor)?;
        let value = match raw {
            RawValue::Unsigned(value) => value,
            RawValue::Signed(value) => {
                if value < 0 {
                    status |= CoercionStatus::MIN_CLAMPED;
                    0
                } else {
                    value as u64
                }
            }
            RawValue::Float(value) => {
                if value < 0.0 {
                    status |= CoercionStatus::MIN_CLAMPED;
                    0
                } else if value > u64::MAX as f64 {
                    status |= CoercionStatus::MAX_CLAMPED;
                    u64::MAX
                } else {
                    if value.fract() != 0.0 {
                        status |= CoercionStatus::PRECISION_LOSS;
                    }
                    value as u64
                }
            }
            RawValue::Text(_) | RawValue::Composite => {
                status |= CoercionStatus::INVALID_CAST;
                0
            }
        };
        Ok((value, status))
    }

    pub fn get_signed(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
    ) -> CursorResult<(i64, CoercionStatus)> {
        let (raw, mut status) = self.read_raw(ty, cursor)?;
        let value = match raw {
            RawValue::Signed(value) => value,
            RawValue::Unsigned(value) => {
                if value > i64::MAX as u64 {
                    status |= CoercionStatus::MAX_CLAMPED;
                    i64::MAX
                } else {
                    value as i64
                }
            }
            RawValue::Float(value) => {
                if value.fract() != 0.0 {
                    status |= CoercionStatus::PRECISION_LOSS;
                }
                if value < i64::MIN as f64 {
                    status |= CoercionStatus::MIN_CLAMPED;
                    i64::MIN
                } else if value > i64::MAX as f64 {
                    status |= CoercionStatus::MAX_CLAMPED;
                    i64::MAX
                } else {
                    value as i64
                }
            }
            RawValue::Text(_) | RawValue::Composite => {
                status |= CoercionStatus::INVALID_CAST;
                0
            }
        };
        Ok((value, status))
    }

    pub fn get_float(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
    ) -> CursorResult<(f64, CoercionStatus)> {
        let (raw, mut status) = self.read_raw(ty, cursor)?;
        const EXACT: u64 = 1 << f64::MANTISSA_DIGITS;
        let value = match raw {
            RawValue::Float(value) => value,
            RawValue::Unsigned(value) => {
                if value > EXACT {
                    status |= CoercionStatus::PRECISION_LOSS;
                }
                value as f64
            }
            RawValue::Signed(value) => {
                if value.unsigned_abs() > EXACT {
                    status |= CoercionStatus::PRECISION_LOSS;
                }
                value as f64
            }
            RawValue::Text(_) | RawValue::Composite => {
                status |= CoercionStatus::INVALID_CAST;
                0.0
            }
        };
        Ok((value, status))
    }

    /// Renders the value at the cursor in the requested format, consuming the
    /// type's full byte size.
    pub fn get_string(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
        format: DisplayFormat,
    ) -> CursorResult<(String, CoercionStatus)> {
        match self.get(ty) {
            TypeRecord::Aggregate(agg) => {
                let start = cursor.index();
                let members = self.members(agg.members);
                let mut rendered = Vec::with_capacity(members.len());
                let mut status = CoercionStatus::empty();
                for member in members {
                    cursor.set_index(start + member.offset_bytes())?;
                    let (text, member_status) = self.get_string(member.ty, cursor, format)?;
                    status |= member_status;
                    match format {
                        DisplayFormat::Dotted => rendered.push(text),
                        _ => rendered.push(format!(
                            "{}={}",
                            member
                                .name_id
                                .map(|id| self.resolve_string(id))
                                .unwrap_or("<anon>"),
                            text
                        )),
                    }
                }
                cursor.set_index(start + agg.byte_size.bytes)?;
                let text = match format {
                    DisplayFormat::Dotted => rendered.join("."),
                    _ => format!("{{{}}}", rendered.join(", ")),
                };
                Ok((text, status))
            }
            TypeRecord::Sequence(seq) => {
                let start = cursor.index();
                let count = seq.element_count().unwrap_or(0);
                let stride = seq.stride_bytes;
                let element = seq.element;
                let byte_size = seq.byte_size().unwrap_or(count * stride);
                let mut rendered = Vec::with_capacity(count);
                let mut status = CoercionStatus::empty();
                for index in 0..count {
                    cursor.set_index(start + index * stride)?;
                    let (text, element_status) = self.get_string(element, cursor, format)?;
                    status |= element_status;
                    rendered.push(text);
                }
                cursor.set_index(start + byte_size)?;
                Ok((format!("[{}]", rendered.join(", ")), status))
            }
            TypeRecord::Enum(enum_ty) => {
                let base_size = enum_ty.base.byte_size;
                let mut status = CoercionStatus::empty();
                let value = read_word_signed(cursor, base_size, &mut status)?;
                let text = match format {
                    DisplayFormat::Hex => format!("0x{value:X}"),
                    DisplayFormat::Decimal => value.to_string(),
                    _ => match enum_ty.label_for(value) {
                        Some(label) => self.resolve_string(label).to_string(),
                        None => value.to_string(),
                    },
                };
                Ok((text, status))
            }
            TypeRecord::Fixed(fixed) => {
                let digits = fixed.fraction_digits();
                let mut status = CoercionStatus::empty();
                let raw = read_word_signed(cursor, fixed.base.byte_size, &mut status)?;
                let value = fixed.apply(raw);
                let text = match format {
                    DisplayFormat::Hex => format!("0x{raw:X}"),
                    _ => format!("{value:.digits$}"),
                };
                Ok((text, status))
            }
            TypeRecord::Pointer(pointer) => {
                let width = pointer.byte_size * 2;
                let mut status = CoercionStatus::empty();
                let value = read_word(cursor, pointer.byte_size, &mut status)?;
                Ok((format!("0x{value:0width$X}"), status))
            }
            TypeRecord::Scalar(scalar) => {
                let effective = match format {
                    DisplayFormat::Default => scalar.display,
                    other => other,
                };
                let (raw, status) = self.read_raw(ty, cursor)?;
                let text = match raw {
                    RawValue::Text(text) => text,
                    RawValue::Float(value) => match effective {
                        DisplayFormat::Hex => format!("0x{:X}", value.to_bits()),
                        _ => value.to_string(),
                    },
                    RawValue::Signed(value) => match effective {
                        DisplayFormat::Hex => format!("0x{value:X}"),
                        _ => value.to_string(),
                    },
                    RawValue::Unsigned(value) => match effective {
                        DisplayFormat::Hex => format!("0x{value:X}"),
                        _ => value.to_string(),
                    },
                    RawValue::Composite => String::new(),
                };
                Ok((text, status))
            }
            _ => {
                let (value, status) = self.get_unsigned(ty, cursor)?;
                let text = match format {
                    DisplayFormat::Hex => format!("0x{value:X}"),
                    _ => value.to_string(),
                };
                Ok((text, status))
            }
        }
    }

    /// Symmetric writer: clamps out-of-range inputs and reports the clamp.
    pub fn set_unsigned(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
        value: u64,
    ) -> CursorResult<CoercionStatus> {
        match self.get(ty) {
            TypeRecord::Scalar(scalar) => match scalar.encoding {
                ScalarEncoding::Signed => {
                    let (signed, clamp_status) = clamp_u64_to_i64(value);
                    Ok(clamp_status | self.set_signed(ty, cursor, signed)?)
                }
                ScalarEncoding::Floating => self.set_float(ty, cursor, value as f64),
                _ => {
                    let (clamped, status) = clamp_unsigned(value, scalar.byte_size);
                    write_word(cursor, clamped, scalar.byte_size)?;
                    Ok(status)
                }
            },
            TypeRecord::Pointer(pointer) => {
                let (clamped, status) = clamp_unsigned(value, pointer.byte_size);
                write_word(cursor, clamped, pointer.byte_size)?;
                Ok(status)
            }
            TypeRecord::Enum(enum_ty) => {
                let (clamped, status) = clamp_unsigned(value, enum_ty.base.byte_size);
                write_word(cursor, clamped, enum_ty.base.byte_size)?;
                Ok(status)
            }
            TypeRecord::Fixed(_) => self.set_float(ty, cursor, value as f64),
            TypeRecord::BitField(spec) => {
                let spec = spec.clone();
                let container_bytes = (spec.container_bits as usize).div_ceil(8);
                let start = cursor.index();
                let word = cursor.get_unsigned(container_bytes)?;
                let max = mask_for_width(spec.total_width());
                let mut status = CoercionStatus::empty();
                let clamped = if value > max {
                    status |= CoercionStatus::MAX_CLAMPED;
                    max
                } else {
                    value
                };
                let updated = spec.write_bits(word, clamped);
                cursor.set_index(start)?;
                cursor.put_unsigned(updated, container_bytes)?;
                Ok(status)
            }
            _ => {
                cursor.skip(self.byte_size_of(ty).unwrap_or(0))?;
                Ok(CoercionStatus::INVALID_CAST)
            }
        }
    }

    pub fn set_signed(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
        value: i64,
    ) -> CursorResult<CoercionStatus> {
        match self.get(ty) {
            TypeRecord::Scalar(scalar) => match scalar.encoding {
                ScalarEncoding::Signed => {
                    let (clamped, status) = clamp_signed(value, scalar.byte_size);
                    write_word(cursor, clamped as u64, scalar.byte_size)?;
                    Ok(status)
                }
                ScalarEncoding::Floating => self.set_float(ty, cursor, value as f64),
                _ => {
                    if value < 0 {
                        write_word(cursor, 0, scalar.byte_size)?;
                        return Ok(CoercionStatus::MIN_CLAMPED);
                    }
                    self.set_unsigned(ty, cursor, value as u64)
                }
            },
            TypeRecord::Enum(enum_ty) => {
                let (clamped, status) = clamp_signed(value, enum_ty.base.byte_size);
                write_word(cursor, clamped as u64, enum_ty.base.byte_size)?;
                Ok(status)
            }
            TypeRecord::Fixed(_) => self.set_float(ty, cursor, value as f64),
            _ => self.set_unsigned(ty, cursor, value.max(0) as u64),
        }
    }

    pub fn set_float(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
        value: f64,
    ) -> CursorResult<CoercionStatus> {
        match self.get(ty) {
            TypeRecord::Scalar(scalar) => match scalar.encoding {
                ScalarEncoding::Floating => match scalar.byte_size {
                    4 => {
                        let narrowed = value as f32;
                        cursor.put_f32(narrowed)?;
                        if narrowed as f64 != value && value.is_finite() {
                            Ok(CoercionStatus::PRECISION_LOSS)
                        } else {
                            Ok(CoercionStatus::empty())
                        }
                    }
                    8 => {
                        cursor.put_f64(value)?;
                        Ok(CoercionStatus::empty())
                    }
                    other => {
                        cursor.skip(other)?;
                        Ok(CoercionStatus::INVALID_CAST)
                    }
                },
                ScalarEncoding::Signed => {
                    let mut status = if value.fract() != 0.0 {
                        CoercionStatus::PRECISION_LOSS
                    } else {
                        CoercionStatus::empty()
                    };
                    status |= self.set_signed(ty, cursor, value.round() as i64)?;
                    Ok(status)
                }
                _ => {
                    let mut status = if value.fract() != 0.0 {
                        CoercionStatus::PRECISION_LOSS
                    } else {
                        CoercionStatus::empty()
                    };
                    if value < 0.0 {
                        status |= CoercionStatus::MIN_CLAMPED;
                        status |= self.set_unsigned(ty, cursor, 0)?;
                    } else {
                        status |= self.set_unsigned(ty, cursor, value.round() as u64)?;
                    }
                    Ok(status)
                }
            },
            TypeRecord::Fixed(fixed) => {
                let fixed = fixed.clone();
                let raw = fixed.unapply(value);
                let (clamped, status) = clamp_signed(raw, fixed.base.byte_size);
                write_word(cursor, clamped as u64, fixed.base.byte_size)?;
                Ok(status)
            }
            _ => self.set_signed(ty, cursor, value.round() as i64),
        }
    }

    /// Parses `text` under the type's encoding and writes it. Unparseable
    /// input reports `PARSE_ERROR` and leaves the target untouched.
    pub fn set_string(
        &self,
        ty: TypeId,
        cursor: &mut ByteCursor,
        text: &str,
    ) -> CursorResult<CoercionStatus> {
        let trimmed = text.trim();
        if let TypeRecord::Enum(enum_ty) = self.get(ty) {
            if let Some(label) = self.find_string(trimmed) {
                if let Some(value) = enum_ty.value_for(label) {
                    return self.set_signed(ty, cursor, value);
                }
            }
        }
        if let Ok(value) = parse_numeric(trimmed) {
            return self.set_signed(ty, cursor, value);
        }
        if let Ok(value) = trimmed.parse::<f64>() {
            return self.set_float(ty, cursor, value);
        }
        Ok(CoercionStatus::PARSE_ERROR)
    }

    /// Semantic equality of the values under the cursors. Fixed-point values
    /// compare within one scale step; composites compare their raw footprint.
    pub fn values_equal(
        &self,
        ty: TypeId,
        a: &mut ByteCursor,
        b: &mut ByteCursor,
    ) -> CursorResult<bool> {
        if let TypeRecord::Fixed(fixed) = self.get(ty) {
            let scale = fixed.scale.abs();
            let (left, _) = self.get_float(ty, a)?;
            let (right, _) = self.get_float(ty, b)?;
            return Ok((left - right).abs() <= scale);
        }
        let size = self.byte_size_of(ty).unwrap_or(0);
        match self.get(ty) {
            TypeRecord::Aggregate(_) | TypeRecord::Sequence(_) | TypeRecord::Opaque(_) => {
                let mut left = vec![0u8; size];
                let mut right = vec![0u8; size];
                a.read_exact(&mut left)?;
                b.read_exact(&mut right)?;
                Ok(left == right)
            }
            _ => {
                let (left, _) = self.read_raw(ty, a)?;
                let (right, _) = self.read_raw(ty, b)?;
                Ok(left == right)
            }
        }
    }
}

fn read_word(
    cursor: &mut ByteCursor,
    byte_size: usize,
    status: &mut CoercionStatus,
) -> CursorResult<u64> {
    match byte_size {
        0 => Ok(0),
        1..=8 => cursor.get_unsigned(byte_size),
        other => {
            cursor.skip(other)?;
            *status |= CoercionStatus::INVALID_CAST;
            Ok(0)
        }
    }
}

fn read_word_signed(
    cursor: &mut ByteCursor,
    byte_size: usize,
    status: &mut CoercionStatus,
) -> CursorResult<i64> {
    match byte_size {
        0 => Ok(0),
        1..=8 => cursor.get_signed(byte_size),
        other => {
            cursor.skip(other)?;
            *status |= CoercionStatus::INVALID_CAST;
            Ok(0)
        }
    }
}

fn write_word(cursor: &mut ByteCursor, value: u64, byte_size: usize) -> CursorResult<()> {
    match byte_size {
        0 => Ok(()),
        1..=8 => cursor.put_unsigned(value, byte_size),
        other => cursor.skip(other),
    }
}

fn mask_for_width(bits: u16) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn clamp_unsigned(value: u64, byte_size: usize) -> (u64, CoercionStatus) {
    let max = if byte_size >= 8 {
        u64::MAX
    } else {
        (1u64 << (byte_size * 8)) - 1
    };
    if value > max {
        (max, CoercionStatus::MAX_CLAMPED)
    } else {
        (value, CoercionStatus::empty())
    }
}

fn clamp_signed(value: i64, byte_size: usize) -> (i64, CoercionStatus) {
    if byte_size >= 8 {
        return (value, CoercionStatus::empty());
    }
    let max = (1i64 << (byte_size * 8 - 1)) - 1;
    let min = -(1i64 << (byte_size * 8 - 1));
    if value > max {
        (max, CoercionStatus::MAX_CLAMPED)
    } else if value < min {
        (min, CoercionStatus::MIN_CLAMPED)
    } else {
        (value, CoercionStatus::empty())
    }
}

fn clamp_u64_to_i64(value: u64) -> (i64, CoercionStatus) {
    if value > i64::MAX as u64 {
        (i64::MAX, CoercionStatus::MAX_CLAMPED)
    } else {
        (value as i64, CoercionStatus::empty())
    }
}

fn parse_numeric(text: &str) -> Result<i64, ()> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let cleaned = body.replace('_', "");
    let (radix, digits) = if let Some(stripped) = cleaned.strip_prefix("0x") {
        (16, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0b") {
        (2, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0o") {
        (8, stripped)
    } else {
        (10, cleaned.as_str())
    };
    if digits.is_empty() || digits.contains('.') {
        return Err(());
    }
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| ())?;
    Ok(if negative { -magnitude } else { magnitude })
}
