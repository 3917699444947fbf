//! Comparisons through the flags register.
//!
//! Shared by the compare opcodes and the two-operand branches. Double-word
//! comparisons decide on the high words first and only consult the low words
//! (always unsigned) when the high words are equal.

use super::Ctx;
use super::arith::pop_operands;
use super::inst::{Cond, Reg};
use crate::backend::Comparison;
use crate::label::Label;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction};

/// `cmp a, b; j<cc> target`.
pub(super) fn jump_if(ctx: &mut Ctx<'_>, cmp: Comparison, a: Reg, b: Reg, target: Label) {
    ctx.asm.cmp_rr(a, b);
    ctx.asm.jcc(Cond::of(cmp), target);
}

/// Compare `edx:eax` with `ecx:ebx`; jump to `taken` when `cmp` holds, to
/// `not_taken` when the high words already rule it out, and fall through
/// otherwise.
pub(super) fn jump_if_wide(ctx: &mut Ctx<'_>, cmp: Comparison, taken: Label, not_taken: Label) {
    match cmp.high_word() {
        None => {
            ctx.asm.cmp_rr(Reg::Edx, Reg::Ecx);
            ctx.asm.jne(not_taken);
            jump_if(ctx, cmp.low_word(), Reg::Eax, Reg::Ebx, taken);
        }
        Some(high) => {
            ctx.asm.cmp_rr(Reg::Edx, Reg::Ecx);
            ctx.asm.jcc(Cond::of(high), taken.clone());
            ctx.asm.jne(not_taken);
            jump_if(ctx, cmp.low_word(), Reg::Eax, Reg::Ebx, taken);
        }
    }
}

/// `ceq`, `cgt`, `clt` and the unsigned forms: push 1 or 0.
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
        jump_if(ctx, cmp, Reg::Eax, Reg::Ebx, is_true.clone());
    }
    ctx.asm.bind(is_false);
    ctx.asm.push_i(0);
    ctx.asm.jmp(end.clone());
    ctx.asm.bind(is_true);
    ctx.asm.push_i(1);
    ctx.asm.bind(end);
    Ok(())
}
