//! Rendering of decoded words: operand text by role and mnemonic postfix
//! composition.

use crate::soc::isa::ast::OperandRole;

use super::instruction::InstructionPattern;
use super::space::{FormInfo, SpaceInfo, SubfieldInfo};
use super::MachineDescription;

/// Formats one operand: register roles resolve through the register table of
/// the named space, signed immediates print in decimal with their sign, and
/// everything else prints in hexadecimal.
pub(crate) fn format_operand(
    machine: &MachineDescription,
    space: &SpaceInfo,
    subfield: &SubfieldInfo,
    word: u64,
) -> String {
    let value = subfield.construct.read(word);
    match &subfield.role {
        OperandRole::Register { space: reg_space, file } => {
            let table = machine
                .spaces
                .get(reg_space)
                .map(|info| &info.registers)
                .unwrap_or(&space.registers);
            table
                .instance_label(file, value as u32)
                .unwrap_or_else(|| format!("{file}{value}"))
        }
        OperandRole::Immediate if subfield.construct.sign_extend() => {
            format!("{}", subfield.construct.read_signed(word))
        }
        _ => {
            let width = (subfield.construct.width() as usize).div_ceil(4);
            format!("0x{value:0width$X}")
        }
    }
}

/// Appends the postfix of every hidden subfield whose bit reads 1 and that
/// the winning mask left unconstrained.
pub(crate) fn compose_mnemonic(
    base: &str,
    form: &FormInfo,
    pattern: &InstructionPattern,
    word: u64,
) -> String {
    let mut mnemonic = base.to_string();
    for subfield in &form.subfields {
        let Some(postfix) = &subfield.postfix else {
            continue;
        };
        if pattern
            .mask_fields
            .iter()
            .any(|field| field == &subfield.name)
        {
            continue;
        }
        if subfield.construct.read(word) == 1 {
            mnemonic.push_str(postfix);
        }
    }
    mnemonic
}
