//! Semantic validation over parsed documents. Findings aggregate across the
//! whole input; only error-level findings fail the run, warnings are
//! retrievable afterwards.

mod fields;
mod forms;
mod instructions;
mod spaces;

use std::collections::BTreeMap;

use super::ast::{IsaDocument, IsaItem, SpaceKind};
use super::diagnostic::{DiagnosticLevel, DiagnosticPhase, IsaDiagnostic, SourceSpan};
use super::error::IsaError;
use super::logic::LogicSpaceState;
use super::space::SpaceState;

#[derive(Debug, Default)]
pub struct Validator {
    pub(super) parameters: BTreeMap<String, String>,
    pub(super) space_states: BTreeMap<String, SpaceState>,
    pub(super) logic_states: BTreeMap<String, LogicSpaceState>,
    pub(super) space_kinds: BTreeMap<String, SpaceKind>,
    pub(super) space_word_sizes: BTreeMap<String, u32>,
    pub(super) bus_sizes: BTreeMap<String, u32>,
    pub(super) bus_ranges: BTreeMap<String, Vec<(String, u64, u64, u8, SourceSpan)>>,
    diagnostics: Vec<IsaDiagnostic>,
    warnings: Vec<IsaDiagnostic>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every document; failures aggregate and the run completes before
    /// reporting.
    pub fn validate(&mut self, docs: &[IsaDocument]) -> Result<(), IsaError> {
        for doc in docs {
            for item in &doc.items {
                match item {
                    IsaItem::Parameter(param) => {
                        self.parameters
                            .insert(param.name.clone(), param.value.clone());
                    }
                    IsaItem::Space(space) => self.validate_space(space),
                    IsaItem::Bus(bus) => self.validate_bus(bus),
                    IsaItem::Field(field) => self.validate_field(field),
                    IsaItem::BusRange(range) => self.validate_bus_range(range),
                    IsaItem::Form(form) => self.validate_form(form),
                    IsaItem::Instruction(instr) => self.validate_instruction(instr),
                    IsaItem::Include(_) | IsaItem::Attach(_) => {}
                }
            }
        }
        self.check_encoding_exclusivity(docs);

        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(IsaError::Diagnostics {
                phase: DiagnosticPhase::Validator,
                diagnostics: std::mem::take(&mut self.diagnostics),
            })
        }
    }

    /// Warning-level findings from the last run.
    pub fn warnings(&self) -> &[IsaDiagnostic] {
        &self.warnings
    }

    pub(super) fn push_error(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) {
        self.diagnostics.push(IsaDiagnostic::new(
            DiagnosticPhase::Validator,
            DiagnosticLevel::Error,
            code,
            message,
            span,
        ));
    }

    pub(super) fn push_warning(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) {
        self.warnings.push(IsaDiagnostic::new(
            DiagnosticPhase::Validator,
            DiagnosticLevel::Warning,
            code,
            message,
            span,
        ));
    }
}

#[cfg(test)]
pub(super) mod test_support {
    use std::path::PathBuf;

    use crate::soc::isa::error::IsaError;
    use crate::soc::isa::parser::parse_str;

    use super::Validator;

    pub(crate) fn validate_src(src: &str) -> Result<Validator, IsaError> {
        let doc = parse_str(PathBuf::from("test.isa"), src)?;
        let mut validator = Validator::new();
        validator.validate(&[doc])?;
        Ok(validator)
    }

    pub(crate) fn expect_validation_diag(err: IsaError, needle: &str) {
        let IsaError::Diagnostics { diagnostics, .. } = &err else {
            panic!("expected diagnostics, got: {err:?}");
        };
        assert!(
            diagnostics.iter().any(|d| d.message.contains(needle)),
            "no diagnostic contains '{needle}': {diagnostics:?}"
        );
    }
}
