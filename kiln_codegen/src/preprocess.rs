//! First pass: stack effects and label requirements.
//!
//! Runs to completion before any instruction is emitted, so every forward
//! branch target is known when the selector reaches it.

use crate::simulate::{SimEnv, StackEffect, StackWalker};
use kiln_core::{CompileResult, IlInstruction, OpCode};

/// Simulate every instruction and mark the ones that need a label.
///
/// `MethodEnd` is labeled whenever the body contains a `ret`; `MethodStart`
/// never is.
pub fn preprocess(
    instructions: &mut [IlInstruction],
    env: &SimEnv<'_>,
) -> CompileResult<Vec<StackEffect>> {
    let mut walker = StackWalker::new(*env, instructions);
    let mut effects = Vec::with_capacity(instructions.len());
    for instr in instructions.iter() {
        effects.push(walker.step(instr)?.effect);
    }

    let targets = walker.branch_targets();
    let returns = instructions.iter().any(|instr| instr.op == OpCode::Ret);
    for instr in instructions.iter_mut() {
        instr.label_required = match instr.op {
            OpCode::MethodStart => false,
            OpCode::MethodEnd => returns,
            _ => targets.contains(&instr.position),
        };
    }
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameLayout;
    use kiln_core::{
        DescriptorTable, InstructionBuilder, MethodDescriptor, MethodId, TypeDescriptor, TypeId,
    };

    fn bracketed(body: Vec<IlInstruction>) -> Vec<IlInstruction> {
        let end = body.last().map_or(0, |instr| instr.next_position);
        let mut start = IlInstruction::new(OpCode::MethodStart, 0);
        start.next_position = 0;
        let mut finish = IlInstruction::new(OpCode::MethodEnd, end);
        finish.next_position = end;
        let mut all = vec![start];
        all.extend(body);
        all.push(finish);
        all
    }

    #[test]
    fn test_marks_targets_and_epilogue() {
        let mut tables = DescriptorTable::new();
        tables.add_type(TypeDescriptor::primitive(TypeId(1), "Int32", 4, true));
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(1), "loop")
            .with_params(&[TypeId(1)]);
        tables.add_method(method.clone());
        let frame = FrameLayout::new(&method, &tables, 4).unwrap();
        let env = SimEnv {
            tables: &tables,
            frame: &frame,
            method: &method,
            pointer_size: 4,
        };

        let body = InstructionBuilder::new()
            .label("top")
            .op(OpCode::Ldarg0)
            .branch(OpCode::BrfalseS, "done")
            .branch(OpCode::BrS, "top")
            .label("done")
            .op(OpCode::Ret)
            .build()
            .unwrap();
        let mut instrs = bracketed(body);
        let effects = preprocess(&mut instrs, &env).unwrap();

        assert_eq!(effects.len(), instrs.len());
        let marked: Vec<_> = instrs
            .iter()
            .filter(|instr| instr.label_required)
            .map(|instr| instr.op)
            .collect();
        assert_eq!(marked, vec![OpCode::Ldarg0, OpCode::Ret, OpCode::MethodEnd]);
        assert!(!instrs[0].label_required);
    }
}
