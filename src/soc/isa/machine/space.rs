//! Space and form metadata resolved from declarations, plus the bit-spec
//! decoder shared with the validator.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::soc::bus::bits::{BitConstruct, BitSpecError};
use crate::soc::bus::register::{RegisterFile, RegisterTable};
use crate::soc::device::Endianness;
use crate::soc::isa::ast::{FieldDecl, FormDecl, OperandRole, SpaceDecl, SpaceKind, SubFieldDecl};
use crate::soc::isa::error::IsaError;
use crate::soc::isa::lexer::parse_number;

/// Decodes a raw `@(...)` / `@s(...)` group against a container width.
/// Segments are `hi`, `hi-lo`, or `0b` literals separated by `|`; `hi <= lo`
/// because bits are numbered from the MSB.
pub fn parse_bit_spec(container_bits: u32, raw: &str) -> Result<BitConstruct, String> {
    let mut body = raw.trim();
    body = body
        .strip_prefix('@')
        .ok_or_else(|| format!("bit spec '{raw}' must start with '@'"))?;
    let mut construct = BitConstruct::new(container_bits);
    if let Some(rest) = body.strip_prefix('s') {
        construct.set_sign_extend(true);
        body = rest;
    }
    let inner = body
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| format!("bit spec '{raw}' must be parenthesized"))?;

    let describe = |err: BitSpecError| format!("bit spec '{raw}': {err}");
    for segment in inner.split('|') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(format!("bit spec '{raw}' has an empty segment"));
        }
        if let Some(binary) = segment.strip_prefix("0b") {
            let digits = binary.replace('_', "");
            let width = digits.len() as u32;
            let value = u64::from_str_radix(&digits, 2)
                .map_err(|_| format!("bit spec '{raw}': bad literal '{segment}'"))?;
            construct.push_literal(value, width).map_err(describe)?;
        } else if let Some((hi, lo)) = segment.split_once('-') {
            let hi = parse_bit_index(hi, raw)?;
            let lo = parse_bit_index(lo, raw)?;
            construct.push_range(hi, lo).map_err(describe)?;
        } else {
            let bit = parse_bit_index(segment, raw)?;
            construct.push_range(bit, bit).map_err(describe)?;
        }
    }
    Ok(construct)
}

fn parse_bit_index(text: &str, raw: &str) -> Result<u32, String> {
    parse_number(text.trim())
        .map(|value| value as u32)
        .ok_or_else(|| format!("bit spec '{raw}': bad bit index '{text}'"))
}

#[derive(Clone, Debug)]
pub struct SubfieldInfo {
    pub name: String,
    pub construct: BitConstruct,
    pub role: OperandRole,
    pub postfix: Option<String>,
}

impl SubfieldInfo {
    pub fn is_operand(&self) -> bool {
        self.role != OperandRole::Func && self.postfix.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FormInfo {
    pub name: String,
    /// Inherited subfields first, then the form's own, in declaration order.
    pub subfields: Vec<SubfieldInfo>,
    index: AHashMap<String, usize>,
    /// Count of subfields that came from the parent chain.
    pub inherited: usize,
}

impl FormInfo {
    pub fn subfield(&self, name: &str) -> Option<&SubfieldInfo> {
        self.index.get(name).map(|index| &self.subfields[*index])
    }

    pub fn operand_order(&self) -> Vec<String> {
        self.subfields
            .iter()
            .filter(|subfield| subfield.is_operand())
            .map(|subfield| subfield.name.clone())
            .collect()
    }

    fn push(&mut self, subfield: SubfieldInfo) {
        self.index.insert(subfield.name.clone(), self.subfields.len());
        self.subfields.push(subfield);
    }
}

#[derive(Clone, Debug)]
pub struct SpaceInfo {
    pub name: String,
    pub kind: SpaceKind,
    pub addr_bits: u32,
    pub word_bits: u32,
    pub align: u32,
    pub endianness: Endianness,
    pub forms: BTreeMap<String, FormInfo>,
    pub registers: RegisterTable,
}

impl SpaceInfo {
    pub fn from_decl(decl: &SpaceDecl) -> Self {
        Self {
            name: decl.tag.clone(),
            kind: decl.kind,
            addr_bits: decl.addr_bits.unwrap_or(32),
            word_bits: decl.word_bits.unwrap_or(32),
            align: decl.align.unwrap_or(1),
            endianness: decl.endian.unwrap_or(Endianness::Big),
            forms: BTreeMap::new(),
            registers: RegisterTable::new(),
        }
    }

    pub fn word_bytes(&self) -> usize {
        (self.word_bits as usize).div_ceil(8)
    }

    /// Resolves a form: the parent's subfields (already merged) are copied in
    /// first, then the form's own additions.
    pub fn add_form(&mut self, decl: &FormDecl) -> Result<(), IsaError> {
        let mut info = FormInfo {
            name: decl.name.clone(),
            ..FormInfo::default()
        };
        if let Some(parent) = &decl.parent {
            let parent_info = self.forms.get(parent).ok_or_else(|| {
                IsaError::Machine(format!(
                    "form '{}::{}' inherits undefined form '{parent}'",
                    self.name, decl.name
                ))
            })?;
            for subfield in &parent_info.subfields {
                info.push(subfield.clone());
            }
            info.inherited = info.subfields.len();
        }
        for subfield in &decl.subfields {
            info.push(self.resolve_subfield(subfield)?);
        }
        self.forms.insert(decl.name.clone(), info);
        Ok(())
    }

    fn resolve_subfield(&self, decl: &SubFieldDecl) -> Result<SubfieldInfo, IsaError> {
        let construct = parse_bit_spec(self.word_bits, &decl.bit_spec).map_err(|err| {
            IsaError::Machine(format!("space '{}': {err}", self.name))
        })?;
        Ok(SubfieldInfo {
            name: decl.name.clone(),
            construct,
            role: decl.role.clone(),
            postfix: decl.postfix.clone(),
        })
    }

    /// Materialises a register-space field into the register table: arrays
    /// expand into instances, subfields become named slices.
    pub fn add_register_field(&mut self, decl: &FieldDecl) -> Result<(), IsaError> {
        let word_bits = decl.size.unwrap_or(self.word_bits);
        let word_bytes = (word_bits as usize).div_ceil(8);
        let offset = decl.offset.unwrap_or_else(|| self.next_register_offset());
        let mut file = match decl.range {
            Some((start, end)) => RegisterFile::array(
                decl.name.clone(),
                offset,
                end - start + 1,
                format!("{}{{}}", decl.name),
                word_bytes,
            ),
            None => RegisterFile::single(decl.name.clone(), offset, word_bytes),
        };
        for subfield in &decl.subfields {
            let construct = parse_bit_spec(word_bits, &subfield.bit_spec).map_err(|err| {
                IsaError::Machine(format!("register '{}': {err}", decl.name))
            })?;
            file = file.with_field(subfield.name.clone(), construct);
        }
        if let Some(redirect) = &decl.redirect {
            self.registers
                .alias(file, &redirect.target)
                .map_err(|err| IsaError::Machine(err.to_string()))?;
        } else {
            self.registers.register(file);
        }
        Ok(())
    }

    fn next_register_offset(&self) -> u64 {
        self.registers.names().count() as u64 * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_specs_decode_ranges_literals_and_sign() {
        let construct = parse_bit_spec(32, "@(21-30)").expect("range spec");
        assert_eq!(construct.width(), 10);
        assert!(!construct.sign_extend());

        let construct = parse_bit_spec(32, "@s(16-31)").expect("signed spec");
        assert!(construct.sign_extend());

        let construct = parse_bit_spec(16, "@(0-3|0b01|12-15)").expect("mixed spec");
        assert_eq!(construct.width(), 10);

        let construct = parse_bit_spec(32, "@(31)").expect("single bit");
        assert_eq!(construct.width(), 1);
    }

    #[test]
    fn bit_specs_reject_inverted_and_oversized_ranges() {
        assert!(parse_bit_spec(32, "@(30-21)").is_err(), "inverted range");
        assert!(parse_bit_spec(16, "@(0-16)").is_err(), "past container end");
        assert!(parse_bit_spec(32, "@()").is_err(), "empty spec");
        assert!(parse_bit_spec(32, "(0-5)").is_err(), "missing marker");
    }

    #[test]
    fn forms_merge_parent_subfields_first() {
        use crate::soc::isa::diagnostic::SourceSpan;
        let span = SourceSpan::point(1, 1);
        let mut space = SpaceInfo::from_decl(&SpaceDecl {
            tag: "insn".into(),
            addr_bits: Some(32),
            word_bits: Some(32),
            kind: SpaceKind::Logic,
            align: None,
            endian: None,
            span: span.clone(),
        });
        let base = FormDecl {
            space: "insn".into(),
            name: "X".into(),
            parent: None,
            subfields: vec![subfield("OPCD", "@(0-5)", span.clone())],
            descr: None,
            span: span.clone(),
        };
        space.add_form(&base).unwrap();
        let ext = FormDecl {
            space: "insn".into(),
            name: "XO".into(),
            parent: Some("X".into()),
            subfields: vec![subfield("OE", "@(21)", span.clone())],
            descr: None,
            span,
        };
        space.add_form(&ext).unwrap();
        let form = space.forms.get("XO").unwrap();
        assert_eq!(form.inherited, 1);
        assert_eq!(form.subfields[0].name, "OPCD");
        assert!(form.subfield("OE").is_some());
    }

    fn subfield(
        name: &str,
        spec: &str,
        span: crate::soc::isa::diagnostic::SourceSpan,
    ) -> SubFieldDecl {
        SubFieldDecl {
            name: name.into(),
            bit_spec: spec.into(),
            bit_spec_span: span.clone(),
            role: OperandRole::Func,
            postfix: None,
            descr: None,
            span,
        }
    }
}
