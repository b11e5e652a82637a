use std::collections::HashSet;

use super::Validator;
use crate::soc::isa::ast::{FormDecl, SpaceKind};
use crate::soc::isa::logic::{LogicFormError, LogicFormWarning};
use crate::soc::isa::machine::parse_bit_spec;

impl Validator {
    pub(super) fn validate_form(&mut self, form: &FormDecl) {
        match self.space_kinds.get(&form.space) {
            Some(SpaceKind::Logic) => {}
            Some(_) => {
                self.push_error(
                    "validation.form.space-kind",
                    format!(
                        "form '{}' can only be declared inside logic spaces",
                        form.name
                    ),
                    Some(form.span.clone()),
                );
                return;
            }
            None => {
                self.push_error(
                    "validation.form.unknown-space",
                    format!("form '{}' declared in unknown space '{}'", form.name, form.space),
                    Some(form.span.clone()),
                );
                return;
            }
        }

        let mut seen = HashSet::new();
        for subfield in &form.subfields {
            if !seen.insert(subfield.name.as_str()) {
                self.push_error(
                    "validation.duplicate-subfield",
                    format!(
                        "subfield '{}' declared multiple times on form '{}'",
                        subfield.name, form.name
                    ),
                    Some(subfield.span.clone()),
                );
            }
        }
        if let Some(word_bits) = self.space_word_sizes.get(&form.space).copied() {
            for subfield in &form.subfields {
                if let Err(err) = parse_bit_spec(word_bits, &subfield.bit_spec) {
                    self.push_error(
                        "validation.subfield.bit-range",
                        format!("form '{}': {err}", form.name),
                        Some(subfield.bit_spec_span.clone()),
                    );
                }
            }
        }

        let Some(state) = self.logic_states.get_mut(&form.space) else {
            return;
        };
        match state.register_form(form) {
            Ok(warnings) => {
                for warning in warnings {
                    let LogicFormWarning::InheritedOverlap { name } = warning;
                    self.push_warning(
                        "validation.form.inherited-overlap",
                        format!(
                            "subfield '{name}' of form '{}' overlaps bits inherited from '{}'",
                            form.name,
                            form.parent.as_deref().unwrap_or("<none>")
                        ),
                        Some(form.span.clone()),
                    );
                }
            }
            Err(LogicFormError::DuplicateForm { name }) => {
                self.push_error(
                    "validation.form.duplicate",
                    format!("form '{name}' declared multiple times"),
                    Some(form.span.clone()),
                );
            }
            Err(LogicFormError::MissingSubfields { name }) => {
                self.push_error(
                    "validation.form.empty",
                    format!("form '{name}' must declare at least one subfield"),
                    Some(form.span.clone()),
                );
            }
            Err(LogicFormError::MissingParent { parent }) => {
                self.push_error(
                    "validation.form.missing-parent",
                    format!(
                        "form '{}' inherits undefined form '{parent}' (inheritance stays within one logic space)",
                        form.name
                    ),
                    Some(form.span.clone()),
                );
            }
            Err(LogicFormError::DuplicateSubfield { name }) => {
                self.push_error(
                    "validation.form.inherited-immutable",
                    format!(
                        "form '{}' redefines subfield '{name}'; inherited bit ranges are immutable",
                        form.name
                    ),
                    Some(form.span.clone()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;

    const LOGIC: &str = ":space insn addr=32 word=32 type=logic\n";

    #[test]
    fn forms_only_live_in_logic_spaces() {
        let err = validate_src(
            ":space reg addr=32 word=64 type=register\n\
             :space insn addr=32 word=32 type=logic\n\
             :insn X subfields={ OPCD @(0-5) }",
        );
        assert!(err.is_ok(), "logic-space form validates");
    }

    #[test]
    fn inheritance_requires_a_known_parent() {
        let err = validate_src(&format!(
            "{LOGIC}:insn::MISSING EXT subfields={{ OE @(21) }}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "undefined form 'MISSING'");
    }

    #[test]
    fn inherited_ranges_are_immutable() {
        let err = validate_src(&format!(
            "{LOGIC}:insn BASE subfields={{ OPCD @(0-5) }}\n\
             :insn::BASE EXT subfields={{ OPCD @(0-5) }}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "inherited bit ranges are immutable");
    }

    #[test]
    fn overlapping_added_fields_warn_instead_of_failing() {
        let validator = validate_src(&format!(
            "{LOGIC}:insn X subfields={{ XO @(21-30) }}\n\
             :insn::X XO_OE subfields={{ OE @(21) }}"
        ))
        .expect("overlap with inherited bits validates with a warning");
        assert_eq!(validator.warnings().len(), 1);
        assert!(validator.warnings()[0]
            .message
            .contains("overlaps bits inherited"));
    }

    #[test]
    fn duplicate_forms_are_rejected() {
        let err = validate_src(&format!(
            "{LOGIC}:insn X subfields={{ OPCD @(0-5) }}\n:insn X subfields={{ OPCD @(0-5) }}"
        ))
        .unwrap_err();
        expect_validation_diag(err, "declared multiple times");
    }
}
