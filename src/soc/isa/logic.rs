//! Per-logic-space form registry used during validation: inheritance merging
//! with immutable inherited bit ranges.

use std::collections::BTreeMap;

use super::ast::{FormDecl, SubFieldDecl};
use super::machine::parse_bit_spec;

#[derive(Debug, Default)]
pub(crate) struct LogicForm {
    /// Subfield declarations keyed by name; insertion order preserved in
    /// `order` for operand enumeration checks.
    pub subfields: BTreeMap<String, SubFieldDecl>,
    pub order: Vec<String>,
    /// Container bits already claimed by inherited subfields.
    inherited_mask: u64,
}

#[derive(Debug)]
pub(crate) enum LogicFormError {
    DuplicateForm { name: String },
    MissingSubfields { name: String },
    MissingParent { parent: String },
    DuplicateSubfield { name: String },
}

/// Non-fatal findings raised while merging a form.
#[derive(Debug)]
pub(crate) enum LogicFormWarning {
    InheritedOverlap { name: String },
}

#[derive(Debug, Default)]
pub(crate) struct LogicSpaceState {
    word_bits: u32,
    forms: BTreeMap<String, LogicForm>,
}

impl LogicSpaceState {
    pub(crate) fn new(word_bits: u32) -> Self {
        Self {
            word_bits,
            forms: BTreeMap::new(),
        }
    }

    pub(crate) fn form(&self, name: &str) -> Option<&LogicForm> {
        self.forms.get(name)
    }

    pub(crate) fn register_form(
        &mut self,
        form: &FormDecl,
    ) -> Result<Vec<LogicFormWarning>, LogicFormError> {
        if self.forms.contains_key(&form.name) {
            return Err(LogicFormError::DuplicateForm {
                name: form.name.clone(),
            });
        }
        if form.subfields.is_empty() {
            return Err(LogicFormError::MissingSubfields {
                name: form.name.clone(),
            });
        }
        let mut merged = LogicForm::default();
        if let Some(parent) = &form.parent {
            let parent_form = self
                .forms
                .get(parent)
                .ok_or_else(|| LogicFormError::MissingParent {
                    parent: parent.clone(),
                })?;
            merged.subfields = parent_form.subfields.clone();
            merged.order = parent_form.order.clone();
            merged.inherited_mask = parent_form.claimed_mask(self.word_bits);
        }

        let mut warnings = Vec::new();
        for sub in &form.subfields {
            // Inherited ranges are immutable: a redefinition is an error, a
            // new field overlapping inherited bits only a warning.
            if merged.subfields.contains_key(&sub.name) {
                return Err(LogicFormError::DuplicateSubfield {
                    name: sub.name.clone(),
                });
            }
            if let Ok(construct) = parse_bit_spec(self.word_bits, &sub.bit_spec) {
                if construct.container_mask() & merged.inherited_mask != 0 {
                    warnings.push(LogicFormWarning::InheritedOverlap {
                        name: sub.name.clone(),
                    });
                }
            }
            merged.subfields.insert(sub.name.clone(), sub.clone());
            merged.order.push(sub.name.clone());
        }
        self.forms.insert(form.name.clone(), merged);
        Ok(warnings)
    }
}

impl LogicForm {
    fn claimed_mask(&self, word_bits: u32) -> u64 {
        self.subfields
            .values()
            .filter_map(|sub| parse_bit_spec(word_bits, &sub.bit_spec).ok())
            .fold(0, |acc, construct| acc | construct.container_mask())
    }
}
