//! Location-expression evaluation: a stack of unsigned 64-bit values seeded
//! with an input (zero for member offsets), final top-of-stack is the result.

use crate::soc::prog::cursor::{ByteCursor, ByteOrder};

use super::consts::*;

/// Evaluates an expression block. Register-relative operations have no
/// machine state here and evaluate as their offset alone; unknown opcodes
/// abort and yield `None`.
pub fn evaluate(block: &[u8], seed: u64, order: ByteOrder) -> Option<u64> {
    let mut cursor = ByteCursor::new(block.to_vec(), order);
    let mut stack: Vec<u64> = vec![seed];
    while !cursor.end_of_stream() {
        let op = cursor.get_u8().ok()?;
        match op {
            OP_ADDR => stack.push(cursor.get_u32().ok()? as u64),
            OP_DEREF => {
                // No live memory during static evaluation; the address value
                // itself stays on the stack.
                let top = stack.pop()?;
                stack.push(top);
            }
            OP_CONST1U => stack.push(cursor.get_u8().ok()? as u64),
            OP_CONST1S => stack.push(cursor.get_i8().ok()? as i64 as u64),
            OP_CONST2U => stack.push(cursor.get_u16().ok()? as u64),
            OP_CONST2S => stack.push(cursor.get_i16().ok()? as i64 as u64),
            OP_CONST4U => stack.push(cursor.get_u32().ok()? as u64),
            OP_CONST4S => stack.push(cursor.get_i32().ok()? as i64 as u64),
            OP_CONST8U => stack.push(cursor.get_u64().ok()?),
            OP_CONST8S => stack.push(cursor.get_i64().ok()? as u64),
            OP_CONSTU => stack.push(cursor.get_uleb128().ok()?),
            OP_CONSTS => stack.push(cursor.get_sleb128().ok()? as u64),
            OP_PLUS => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                stack.push(lhs.wrapping_add(rhs));
            }
            OP_MINUS => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                stack.push(lhs.wrapping_sub(rhs));
            }
            OP_PLUS_UCONST => {
                let addend = cursor.get_uleb128().ok()?;
                let top = stack.pop()?;
                stack.push(top.wrapping_add(addend));
            }
            OP_LIT0..=OP_LIT31 => stack.push((op - OP_LIT0) as u64),
            OP_REG0..=OP_REG31 => stack.push(0),
            OP_BREG0..=OP_BREG31 => {
                let offset = cursor.get_sleb128().ok()?;
                stack.push(offset as u64);
            }
            OP_REGX => {
                let _reg = cursor.get_uleb128().ok()?;
                stack.push(0);
            }
            OP_FBREG => {
                let offset = cursor.get_sleb128().ok()?;
                stack.push(offset as u64);
            }
            _ => return None,
        }
    }
    stack.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_offset_expression_evaluates_against_zero() {
        // plus_uconst 8 over a zero seed, the classic member-offset shape
        let block = [OP_PLUS_UCONST, 0x08];
        assert_eq!(evaluate(&block, 0, ByteOrder::Little), Some(8));
    }

    #[test]
    fn constants_and_arithmetic_compose() {
        let block = [OP_CONST1U, 0x10, OP_LIT0 + 4, OP_PLUS];
        assert_eq!(evaluate(&block, 0, ByteOrder::Little), Some(0x14));
        let block = [OP_CONST2U, 0x00, 0x01, OP_CONST1U, 0x40, OP_MINUS];
        assert_eq!(evaluate(&block, 0, ByteOrder::Big), Some(0xC0));
    }

    #[test]
    fn address_operands_honor_byte_order() {
        let block = [OP_ADDR, 0x00, 0x00, 0x20, 0x00];
        assert_eq!(evaluate(&block, 0, ByteOrder::Big), Some(0x2000));
        assert_eq!(evaluate(&block, 0, ByteOrder::Little), Some(0x20_0000));
    }

    #[test]
    fn unknown_opcodes_abort() {
        assert_eq!(evaluate(&[0xFF], 0, ByteOrder::Little), None);
    }
}
