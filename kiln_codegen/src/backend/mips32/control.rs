//! Branches, `switch` and `leave`.

use super::Ctx;
use super::arith::pop_operands;
use super::compare::{jump_if, jump_if_wide};
use super::inst::Reg;
use crate::backend::Comparison;
use crate::simulate::StackEffect;
use kiln_core::{BranchCondition, CompileResult, IlInstruction};

pub(super) fn branch(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let condition = instr
        .op
        .branch_condition()
        .ok_or_else(|| ctx.unsupported("not a branch opcode"))?;
    let target = ctx.target_label(instr.branch_target()?)?;
    let wide = effect.operand(0).size == 8;

    match condition {
        BranchCondition::Always => ctx.asm.j(target),
        BranchCondition::True | BranchCondition::False => {
            ctx.asm.pop(Reg::T0);
            if wide {
                ctx.asm.pop(Reg::T1);
                ctx.asm.or(Reg::T0, Reg::T0, Reg::T1);
            }
            if condition == BranchCondition::True {
                ctx.asm.bne(Reg::T0, Reg::Zero, target);
            } else {
                ctx.asm.beq(Reg::T0, Reg::Zero, target);
            }
        }
        _ => {
            let cmp = Comparison::from_branch(condition)
                .ok_or_else(|| ctx.unsupported("not a two-operand branch"))?;
            pop_operands(ctx, wide);
            if wide {
                let skip = ctx.new_label("Skip");
                jump_if_wide(ctx, cmp, target, skip.clone());
                ctx.asm.bind(skip);
            } else {
                jump_if(ctx, cmp, Reg::T0, Reg::T2, target);
            }
        }
    }
    Ok(())
}

/// Compare the popped selector against each case index in turn.
pub(super) fn switch(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let targets = instr.switch_targets()?;
    ctx.asm.pop(Reg::T0);
    for (case, target) in targets.into_iter().enumerate() {
        let label = ctx.target_label(target)?;
        ctx.asm.li(Reg::T5, case as i32);
        ctx.asm.beq(Reg::T0, Reg::T5, label);
    }
    Ok(())
}

pub(super) fn leave(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let target = ctx.target_label(instr.branch_target()?)?;
    ctx.asm.drop_bytes(effect.popped_bytes());
    ctx.asm.j(target);
    Ok(())
}
