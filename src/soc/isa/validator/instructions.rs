use std::collections::BTreeMap;

use super::Validator;
use crate::soc::isa::ast::{InstructionDecl, IsaDocument, IsaItem, SpaceKind};
use crate::soc::isa::machine::parse_bit_spec;

impl Validator {
    pub(super) fn validate_instruction(&mut self, instr: &InstructionDecl) {
        match self.space_kinds.get(&instr.space) {
            Some(SpaceKind::Logic) => {}
            Some(_) => {
                self.push_error(
                    "validation.logic.instruction-space",
                    format!(
                        "instruction '{}' can only be declared inside logic spaces",
                        instr.name
                    ),
                    Some(instr.span.clone()),
                );
                return;
            }
            None => {
                self.push_error(
                    "validation.logic.instruction-space",
                    format!(
                        "instruction '{}' declared in unknown space '{}'",
                        instr.name, instr.space
                    ),
                    Some(instr.span.clone()),
                );
                return;
            }
        }

        let Some(state) = self.logic_states.get(&instr.space) else {
            return;
        };
        let Some(form_name) = &instr.form else {
            self.push_error(
                "validation.logic.instruction-form-missing",
                format!(
                    "instruction '{}' must reference a form using '::<form>'",
                    instr.name
                ),
                Some(instr.span.clone()),
            );
            return;
        };
        let Some(form) = state.form(form_name) else {
            self.push_error(
                "validation.logic.instruction-form",
                format!(
                    "instruction '{}' references undefined form '{}'",
                    instr.name, form_name
                ),
                Some(instr.span.clone()),
            );
            return;
        };

        // Masks may only name fields of the resolved form, inherited ones
        // included.
        let mut unknown = Vec::new();
        for field in &instr.mask {
            if !form.subfields.contains_key(&field.field) {
                unknown.push((field.field.clone(), field.span.clone()));
            }
        }
        let mut unknown_operands = Vec::new();
        for operand in &instr.operands {
            if !form.subfields.contains_key(operand) {
                unknown_operands.push(operand.clone());
            }
        }
        for operand in unknown_operands {
            self.push_error(
                "validation.logic.operand-field",
                format!(
                    "operand list of '{}' names unknown field '{operand}'",
                    instr.name
                ),
                Some(instr.span.clone()),
            );
        }
        for (name, span) in unknown {
            self.push_error(
                "validation.logic.mask-field",
                format!(
                    "mask references unknown field '{name}' for instruction '{}'",
                    instr.name
                ),
                Some(span),
            );
        }
    }

    /// Instructions sharing a mnemonic must be mutually exclusive: some bit
    /// both patterns constrain must differ, otherwise a word could decode to
    /// either.
    pub(super) fn check_encoding_exclusivity(&mut self, docs: &[IsaDocument]) {
        let mut groups: BTreeMap<(String, String), Vec<(u64, u64, crate::soc::isa::diagnostic::SourceSpan)>> =
            BTreeMap::new();
        for doc in docs {
            for item in &doc.items {
                let IsaItem::Instruction(instr) = item else {
                    continue;
                };
                let Some(pattern) = self.pattern_of(instr) else {
                    continue;
                };
                groups
                    .entry((instr.space.clone(), instr.name.clone()))
                    .or_default()
                    .push((pattern.0, pattern.1, instr.span.clone()));
            }
        }
        for ((space, name), patterns) in groups {
            for (index, (mask_a, value_a, span)) in patterns.iter().enumerate() {
                for (mask_b, value_b, _) in &patterns[index + 1..] {
                    let shared = mask_a & mask_b;
                    if (value_a ^ value_b) & shared == 0 {
                        self.push_error(
                            "validation.ambiguous-encoding",
                            format!(
                                "instructions named '{name}' in space '{space}' share a satisfiable bit pattern"
                            ),
                            Some(span.clone()),
                        );
                    }
                }
            }
        }
    }

    fn pattern_of(&self, instr: &InstructionDecl) -> Option<(u64, u64)> {
        let state = self.logic_states.get(&instr.space)?;
        let form = state.form(instr.form.as_deref()?)?;
        let word_bits = self.space_word_sizes.get(&instr.space).copied().unwrap_or(32);
        let mut mask = 0u64;
        let mut value = 0u64;
        for field in &instr.mask {
            let decl = form.subfields.get(&field.field)?;
            let construct = parse_bit_spec(word_bits, &decl.bit_spec).ok()?;
            let (field_mask, encoded) = construct.encode_constant(field.value).ok()?;
            mask |= field_mask;
            value = (value & !field_mask) | encoded;
        }
        Some((mask, value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    const LOGIC: &str = ":space insn addr=32 word=32 type=logic\n";

    #[test]
    fn instructions_require_an_existing_form() {
        let err = validate_src(&format!(
            "{LOGIC}:insn FORM subfields={{ OPCD @(0-5) }}\n:insn::UNKNOWN add mask={{OPCD=31}}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "references undefined form");
    }

    #[test]
    fn masks_must_name_known_fields() {
        let err = validate_src(&format!(
            "{LOGIC}:insn FORM subfields={{ OPCD @(0-5) }}\n:insn::FORM add mask={{XYZ=1}}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "mask references unknown field");
    }

    #[test]
    fn inherited_fields_satisfy_mask_lookup() {
        validate_src(&format!(
            "{LOGIC}:insn BASE subfields={{ OPCD @(0-5) }}\n\
             :insn::BASE EXT subfields={{ RT @(6-10) op=target }}\n\
             :insn::EXT add mask={{OPCD=31}}"
        ))
        .expect("inherited mask fields validate");
    }

    #[test]
    fn shared_mnemonics_need_disjoint_patterns() {
        let err = validate_src(&format!(
            "{LOGIC}:insn X subfields={{ OPCD @(0-5) XO @(21-30) }}\n\
             :insn::X add mask={{OPCD=31}}\n\
             :insn::X add mask={{OPCD=31, XO=266}}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "share a satisfiable bit pattern");
    }

    #[test]
    fn exclusive_shared_mnemonics_validate() {
        validate_src(&format!(
            "{LOGIC}:insn X subfields={{ OPCD @(0-5) Rc @(31) }}\n\
             :insn::X cmp mask={{OPCD=11, Rc=0}}\n\
             :insn::X cmp mask={{OPCD=12, Rc=0}}"
        ))
        .expect("disjoint opcodes under one mnemonic validate");
    }
}
