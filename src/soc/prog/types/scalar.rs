//! Base value descriptors and the fixed-point wrapper.

use super::arena::StringId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarEncoding {
    Unsigned,
    Signed,
    Floating,
    Utf8String,
    None,
}

/// Rendering hint attached to a scalar and honored by the coding layer unless
/// the caller forces a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayFormat {
    Default,
    Decimal,
    Hex,
    Dotted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarType {
    pub name_id: Option<StringId>,
    pub byte_size: usize,
    pub bit_size: u16,
    pub encoding: ScalarEncoding,
    pub display: DisplayFormat,
}

impl ScalarType {
    pub fn new(
        name_id: Option<StringId>,
        byte_size: usize,
        encoding: ScalarEncoding,
        display: DisplayFormat,
    ) -> Self {
        Self {
            name_id,
            byte_size,
            bit_size: (byte_size * 8) as u16,
            encoding,
            display,
        }
    }
}

/// Fixed-point view over an integer base: `value = raw * scale + offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedScalar {
    pub base: ScalarType,
    pub scale: f64,
    pub offset: f64,
}

impl FixedScalar {
    pub fn new(base: ScalarType, scale: f64, offset: f64) -> Self {
        Self {
            base,
            scale,
            offset,
        }
    }

    pub fn apply(&self, raw: i64) -> f64 {
        raw as f64 * self.scale + self.offset
    }

    pub fn unapply(&self, value: f64) -> i64 {
        if self.scale == 0.0 {
            return 0;
        }
        ((value - self.offset) / self.scale).round() as i64
    }

    /// Fraction digits for display, derived from the scale so a 0.01 step
    /// prints two decimals.
    pub fn fraction_digits(&self) -> usize {
        if self.scale <= 0.0 || self.scale >= 1.0 {
            return 0;
        }
        (1.0 / self.scale).log10().ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::prog::types::DisplayFormat;

    fn base() -> ScalarType {
        ScalarType::new(None, 2, ScalarEncoding::Unsigned, DisplayFormat::Default)
    }

    #[test]
    fn fixed_scaling_round_trips() {
        let fixed = FixedScalar::new(base(), 0.01, 0.0);
        assert_eq!(fixed.apply(300), 3.0);
        assert_eq!(fixed.unapply(3.0), 300);
        assert_eq!(fixed.fraction_digits(), 2);
    }

    #[test]
    fn offset_shifts_the_decoded_value() {
        let fixed = FixedScalar::new(base(), 0.5, -40.0);
        assert_eq!(fixed.apply(100), 10.0);
        assert_eq!(fixed.unapply(10.0), 100);
        assert_eq!(fixed.fraction_digits(), 1);
    }
}
