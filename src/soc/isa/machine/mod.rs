//! Machine description assembled from validated documents: space and form
//! tables, instruction patterns, and the word decoder.

mod decode;
mod format;
mod instruction;
mod space;

pub use decode::{DecodeOutcome, DecodedInstruction, DecodedOperand, Disassembly};
pub use instruction::{Instruction, InstructionPattern};
pub use space::{parse_bit_spec, FormInfo, SpaceInfo, SubfieldInfo};

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::soc::bus::bits::BitConstruct;
use crate::soc::isa::ast::{IsaDocument, IsaItem, OperandRole, SpaceKind};
use crate::soc::isa::error::IsaError;
use crate::soc::isa::validator::Validator;

use decode::DecodeSpace;

#[derive(Default, Debug)]
pub struct MachineDescription {
    pub spaces: BTreeMap<String, SpaceInfo>,
    pub instructions: Vec<Instruction>,
    pub(crate) patterns: Vec<InstructionPattern>,
    pub(crate) decode_spaces: Vec<DecodeSpace>,
    /// Candidate lists bucketed by the primary opcode value; patterns that do
    /// not pin the primary field fall back to a linear list.
    pub(crate) opcode_index: AHashMap<(String, u64), Vec<usize>>,
    pub(crate) unbucketed: AHashMap<String, Vec<usize>>,
    pub(crate) primary_fields: AHashMap<String, BitConstruct>,
}

impl MachineDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the documents, then assembles spaces, register tables,
    /// forms, instructions, and the decode tables.
    pub fn from_documents(docs: Vec<IsaDocument>) -> Result<Self, IsaError> {
        Validator::new().validate(&docs)?;

        let mut machine = MachineDescription::new();
        for doc in &docs {
            for item in &doc.items {
                if let IsaItem::Space(decl) = item {
                    machine
                        .spaces
                        .insert(decl.tag.clone(), SpaceInfo::from_decl(decl));
                }
            }
        }
        for doc in &docs {
            for item in &doc.items {
                match item {
                    IsaItem::Field(decl) => {
                        let space = machine.space_mut(&decl.space)?;
                        if space.kind == SpaceKind::Register {
                            space.add_register_field(decl)?;
                        }
                    }
                    IsaItem::Form(decl) => {
                        machine.space_mut(&decl.space)?.add_form(decl)?;
                    }
                    _ => {}
                }
            }
        }
        for doc in docs {
            for item in doc.items {
                if let IsaItem::Instruction(decl) = item {
                    machine.instructions.push(Instruction::from_decl(decl));
                }
            }
        }
        machine.build_patterns()?;
        machine.build_decode_spaces();
        machine.build_opcode_index();
        Ok(machine)
    }

    fn space_mut(&mut self, name: &str) -> Result<&mut SpaceInfo, IsaError> {
        self.spaces
            .get_mut(name)
            .ok_or_else(|| IsaError::Machine(format!("space '{name}' is not declared")))
    }

    fn build_patterns(&mut self) -> Result<(), IsaError> {
        let mut patterns = Vec::new();
        for (idx, instr) in self.instructions.iter().enumerate() {
            let Some(space) = self.spaces.get(&instr.space) else {
                return Err(IsaError::Machine(format!(
                    "instruction '{}' references unknown space '{}'",
                    instr.name, instr.space
                )));
            };
            if space.kind != SpaceKind::Logic || instr.mask.is_empty() {
                continue;
            }
            let form_name = instr.form.as_deref().ok_or_else(|| {
                IsaError::Machine(format!(
                    "instruction '{}' carries a mask without a form",
                    instr.name
                ))
            })?;
            let form = space.forms.get(form_name).ok_or_else(|| {
                IsaError::Machine(format!(
                    "instruction '{}' references undefined form '{}::{}'",
                    instr.name, instr.space, form_name
                ))
            })?;

            let mut mask = 0u64;
            let mut value = 0u64;
            let mut mask_fields = Vec::with_capacity(instr.mask.len());
            for field in &instr.mask {
                let subfield = form.subfield(&field.field).ok_or_else(|| {
                    IsaError::Machine(format!(
                        "instruction '{}' masks unknown field '{}' on form '{}'",
                        instr.name, field.field, form_name
                    ))
                })?;
                let (field_mask, encoded) = subfield
                    .construct
                    .encode_constant(field.value)
                    .map_err(|err| {
                        IsaError::Machine(format!(
                            "mask literal for instruction '{}' field '{}': {err}",
                            instr.name, field.field
                        ))
                    })?;
                // Overlapping selectors refine earlier ones; the later field
                // wins the shared bits.
                mask |= field_mask;
                value = (value & !field_mask) | encoded;
                mask_fields.push(field.field.clone());
            }

            let operand_names = if !instr.operands.is_empty() {
                instr.operands.clone()
            } else {
                form.operand_order()
            };
            patterns.push(InstructionPattern {
                instruction_idx: idx,
                space: instr.space.clone(),
                form: instr.form.clone(),
                mask,
                value,
                operand_names,
                mask_fields,
            });
        }
        self.patterns = patterns;
        Ok(())
    }

    fn build_decode_spaces(&mut self) {
        let mut spaces: Vec<DecodeSpace> = self
            .spaces
            .values()
            .filter(|space| space.kind == SpaceKind::Logic)
            .map(DecodeSpace::from_space)
            .collect();
        // Widest first: a narrower encoding is only tried when the wide one
        // has no match.
        spaces.sort_by(|a, b| {
            b.word_bits
                .cmp(&a.word_bits)
                .then_with(|| a.name.cmp(&b.name))
        });
        self.decode_spaces = spaces;
    }

    /// The primary opcode slice of a logic space is the first function-role
    /// subfield of its root form; patterns that fully constrain it are
    /// bucketed by the constrained value.
    fn build_opcode_index(&mut self) {
        self.opcode_index.clear();
        self.unbucketed.clear();
        self.primary_fields.clear();
        for space in self.spaces.values() {
            if space.kind != SpaceKind::Logic {
                continue;
            }
            let primary = space
                .forms
                .values()
                .next()
                .and_then(|form| {
                    form.subfields
                        .iter()
                        .find(|subfield| subfield.role == OperandRole::Func)
                })
                .map(|subfield| subfield.construct.clone());
            if let Some(primary) = primary {
                self.primary_fields.insert(space.name.clone(), primary);
            }
        }
        for (index, pattern) in self.patterns.iter().enumerate() {
            match self.primary_fields.get(&pattern.space) {
                Some(primary)
                    if (pattern.mask & primary.container_mask()) == primary.container_mask() =>
                {
                    let opcode = primary.read(pattern.value);
                    self.opcode_index
                        .entry((pattern.space.clone(), opcode))
                        .or_default()
                        .push(index);
                }
                _ => {
                    self.unbucketed
                        .entry(pattern.space.clone())
                        .or_default()
                        .push(index);
                }
            }
        }
    }
}
