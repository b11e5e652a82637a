//! Compact expression bytecode used by dynamic layout resolution. The same
//! stack discipline backs the debug-info location expressions in the loader.

use smallvec::SmallVec;

use super::arena::TypeId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpCode {
    PushConst(u64),
    /// Value of an earlier member in the enclosing dynamic record, by index.
    ReadMember(u32),
    SizeOf(TypeId),
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Deref,
}

pub trait EvalContext {
    fn read_member(&mut self, index: u32) -> u64;
    fn sizeof(&self, ty: TypeId) -> u64;
    fn deref(&mut self, address: u64) -> u64;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExprProgram {
    ops: SmallVec<[OpCode; 8]>,
}

impl Default for ExprProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprProgram {
    pub fn new() -> Self {
        Self {
            ops: SmallVec::new(),
        }
    }

    pub fn constant(value: u64) -> Self {
        let mut program = Self::new();
        program.push(OpCode::PushConst(value));
        program
    }

    pub fn member(index: u32) -> Self {
        let mut program = Self::new();
        program.push(OpCode::ReadMember(index));
        program
    }

    pub fn push(&mut self, op: OpCode) {
        self.ops.push(op);
    }

    pub fn evaluate<C: EvalContext>(&self, ctx: &mut C) -> u64 {
        let mut stack: SmallVec<[u64; 8]> = SmallVec::new();
        for op in &self.ops {
            match *op {
                OpCode::PushConst(value) => stack.push(value),
                OpCode::ReadMember(index) => stack.push(ctx.read_member(index)),
                OpCode::SizeOf(ty) => stack.push(ctx.sizeof(ty)),
                OpCode::Add => apply_binary(&mut stack, u64::wrapping_add),
                OpCode::Sub => apply_binary(&mut stack, u64::wrapping_sub),
                OpCode::Mul => apply_binary(&mut stack, u64::wrapping_mul),
                OpCode::Div => apply_binary(&mut stack, |a, b| if b == 0 { 0 } else { a / b }),
                OpCode::Neg => {
                    if let Some(value) = stack.pop() {
                        stack.push(value.wrapping_neg());
                    }
                }
                OpCode::Deref => {
                    if let Some(address) = stack.pop() {
                        stack.push(ctx.deref(address));
                    }
                }
            }
        }
        stack.pop().unwrap_or(0)
    }
}

fn apply_binary<F>(stack: &mut SmallVec<[u64; 8]>, func: F)
where
    F: Fn(u64, u64) -> u64,
{
    if stack.len() >= 2 {
        let rhs = stack.pop().unwrap();
        let lhs = stack.pop().unwrap();
        stack.push(func(lhs, rhs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockContext;

    impl EvalContext for MockContext {
        fn read_member(&mut self, index: u32) -> u64 {
            index as u64 * 10
        }

        fn sizeof(&self, _ty: TypeId) -> u64 {
            4
        }

        fn deref(&mut self, address: u64) -> u64 {
            address + 1
        }
    }

    #[test]
    fn program_executes_stack_ops() {
        let mut program = ExprProgram::new();
        program.push(OpCode::PushConst(4));
        program.push(OpCode::PushConst(1));
        program.push(OpCode::Add);
        program.push(OpCode::PushConst(2));
        program.push(OpCode::Mul);
        assert_eq!(program.evaluate(&mut MockContext), 10, "(4 + 1) * 2");
    }

    #[test]
    fn member_reads_flow_through_context() {
        let mut program = ExprProgram::member(3);
        program.push(OpCode::SizeOf(TypeId::from_index(0)));
        program.push(OpCode::Div);
        assert_eq!(program.evaluate(&mut MockContext), 30 / 4);
    }
}
