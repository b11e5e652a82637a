use std::collections::HashSet;

use super::Validator;
use crate::soc::isa::ast::{FieldDecl, SpaceKind};
use crate::soc::isa::machine::parse_bit_spec;
use crate::soc::isa::space::FieldRegistrationError;

/// Bracketed field arrays expand one instance per index; anything larger is
/// almost certainly a typo in the bounds.
const MAX_ARRAY_ELEMENTS: u64 = 65_535;

impl Validator {
    pub(super) fn validate_field(&mut self, field: &FieldDecl) {
        match self.space_kinds.get(&field.space) {
            Some(SpaceKind::Logic) => {
                self.push_error(
                    "validation.logic.field",
                    format!(
                        "field '{}' cannot carry storage attributes in logic space '{}'",
                        field.name, field.space
                    ),
                    Some(field.span.clone()),
                );
                return;
            }
            Some(_) => {}
            None => {
                self.push_error(
                    "validation.unknown-space-field",
                    format!(
                        "field '{}' declared in unknown space '{}'",
                        field.name, field.space
                    ),
                    Some(field.span.clone()),
                );
                return;
            }
        }

        if let Some((start, end)) = field.range {
            if end < start {
                self.push_error(
                    "validation.field.array-bounds",
                    format!("field '{}' array bounds [{start}-{end}] are inverted", field.name),
                    Some(field.span.clone()),
                );
            } else if (end - start) as u64 + 1 > MAX_ARRAY_ELEMENTS {
                self.push_error(
                    "validation.field.array-bounds",
                    format!(
                        "field '{}' expands to more than {MAX_ARRAY_ELEMENTS} instances",
                        field.name
                    ),
                    Some(field.span.clone()),
                );
            }
        }

        if field.redirect.is_some() && (field.offset.is_some() || field.size.is_some()) {
            self.push_error(
                "validation.field.redirect-storage",
                format!(
                    "redirect field '{}' must not also carry 'offset' or 'size'",
                    field.name
                ),
                Some(field.span.clone()),
            );
        }

        self.ensure_subfields_unique(field);
        self.ensure_subfields_within_bounds(field);
        if let Some(redirect) = field.redirect.clone() {
            self.ensure_redirect_target_defined(field, &redirect);
        }

        let Some(state) = self.space_states.get_mut(&field.space) else {
            return;
        };
        match state.register_field(field) {
            Ok(()) => {}
            Err(FieldRegistrationError::DuplicateField { name }) => {
                self.push_error(
                    "validation.duplicate-field",
                    format!("field '{name}' declared multiple times"),
                    Some(field.span.clone()),
                );
            }
        }
    }

    fn ensure_subfields_unique(&mut self, field: &FieldDecl) {
        let mut seen = HashSet::new();
        for subfield in &field.subfields {
            if !seen.insert(subfield.name.as_str()) {
                self.push_error(
                    "validation.duplicate-subfield",
                    format!(
                        "subfield '{}' declared multiple times on field '{}'",
                        subfield.name, field.name
                    ),
                    Some(subfield.span.clone()),
                );
            }
        }
    }

    fn ensure_subfields_within_bounds(&mut self, field: &FieldDecl) {
        let Some(size_bits) = field
            .size
            .or_else(|| self.space_word_sizes.get(&field.space).copied())
        else {
            return;
        };
        for subfield in &field.subfields {
            if let Err(err) = parse_bit_spec(size_bits, &subfield.bit_spec) {
                self.push_error(
                    "validation.subfield.bit-range",
                    format!(
                        "subfield '{}' of {}-bit field '{}': {err}",
                        subfield.name, size_bits, field.name
                    ),
                    Some(subfield.bit_spec_span.clone()),
                );
            }
        }
    }

    fn ensure_redirect_target_defined(
        &mut self,
        field: &FieldDecl,
        redirect: &crate::soc::isa::ast::RedirectRef,
    ) {
        let Some(state) = self.space_states.get(&field.space) else {
            return;
        };
        let Some(target) = state.lookup_field(&redirect.target) else {
            self.push_error(
                "validation.redirect.unknown-field",
                format!(
                    "redirect references undefined field '{}' in space '{}'",
                    redirect.target, field.space
                ),
                Some(redirect.span.clone()),
            );
            return;
        };
        if let Some(sub) = &redirect.sub {
            if !target.has_subfield(sub) {
                self.push_error(
                    "validation.redirect.unknown-subfield",
                    format!(
                        "redirect references undefined subfield '{sub}' on field '{}'",
                        redirect.target
                    ),
                    Some(redirect.span.clone()),
                );
            }
        }
    }
}
