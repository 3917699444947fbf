//! Comparisons without a flags register.
//!
//! Equality branches directly with `beq`/`bne`. Orderings materialize
//! `a < b` (or `b < a`) into `$t8` with `slt`/`sltu` and branch on it being
//! nonzero or zero.

use super::Ctx;
use super::arith::pop_operands;
use super::inst::Reg;
use crate::backend::{Comparison, Relation};
use crate::label::Label;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction};

/// Branch to `target` when `a <cmp> b`.
pub(super) fn jump_if(ctx: &mut Ctx<'_>, cmp: Comparison, a: Reg, b: Reg, target: Label) {
    let asm = &mut ctx.asm;
    match cmp.relation {
        Relation::Eq => asm.beq(a, b, target),
        Relation::Ne => asm.bne(a, b, target),
        Relation::Lt => {
            asm.slt(Reg::T8, a, b, cmp.unsigned);
            asm.bne(Reg::T8, Reg::Zero, target);
        }
        Relation::Ge => {
            asm.slt(Reg::T8, a, b, cmp.unsigned);
            asm.beq(Reg::T8, Reg::Zero, target);
        }
        Relation::Gt => {
            asm.slt(Reg::T8, b, a, cmp.unsigned);
            asm.bne(Reg::T8, Reg::Zero, target);
        }
        Relation::Le => {
            asm.slt(Reg::T8, b, a, cmp.unsigned);
            asm.beq(Reg::T8, Reg::Zero, target);
        }
    }
}

/// Compare `$t1:$t0` with `$t3:$t2`: high words decide unless equal, then
/// the low words decide unsigned.
pub(super) fn jump_if_wide(ctx: &mut Ctx<'_>, cmp: Comparison, taken: Label, not_taken: Label) {
    if let Some(high) = cmp.high_word() {
        jump_if(ctx, high, Reg::T1, Reg::T3, taken.clone());
    }
    ctx.asm.bne(Reg::T1, Reg::T3, not_taken);
    jump_if(ctx, cmp.low_word(), Reg::T0, Reg::T2, taken);
}

pub(super) fn compare(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let op = instr
        .op
        .compare_op()
        .ok_or_else(|| ctx.unsupported("not a comparison opcode"))?;
    let cmp = Comparison::from_compare(op);
    let wide = effect.operand(0).size == 8;
    let is_true = ctx.new_label("True");
    let is_false = ctx.new_label("False");
    let end = ctx.new_label("End");

    pop_operands(ctx, wide);
    if wide {
        jump_if_wide(ctx, cmp, is_true.clone(), is_false.clone());
    } else {
        jump_if(ctx, cmp, Reg::T0, Reg::T2, is_true.clone());
    }
    ctx.asm.bind(is_false);
    ctx.asm.push(Reg::Zero);
    ctx.asm.j(end.clone());
    ctx.asm.bind(is_true);
    ctx.asm.addiu(Reg::T8, Reg::Zero, 1);
    ctx.asm.push(Reg::T8);
    ctx.asm.bind(end);
    Ok(())
}
