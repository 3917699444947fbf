//! Shift templates.
//!
//! Word shifts are a single `shl`/`sar`/`shr` by `cl`, which masks the count
//! to five bits. Double-word shifts split on the count:
//!
//! - `< 32`: `shld`/`shrd` carries bits across the word boundary, then the
//!   far word shifts on its own
//! - `32..64`: one word moves into the other, the vacated word is zero- or
//!   sign-filled
//! - `>= 64`, or a double-word count with a nonzero high word: the result is
//!   zero, or all sign bits for an arithmetic right shift

use super::Ctx;
use super::arith::push_result;
use super::inst::{AluOp, Cond, Reg, ShiftKind};
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction, ShiftOp};

pub(super) fn shift(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let op = instr
        .op
        .shift_op()
        .ok_or_else(|| ctx.unsupported("not a shift opcode"))?;
    let wide_count = effect.operand(0).size == 8;
    let wide = effect.operand(1).size == 8;

    ctx.asm.pop_r(Reg::Ecx);
    if wide_count {
        ctx.asm.pop_r(Reg::Esi);
    }
    ctx.asm.pop_r(Reg::Eax);
    if wide {
        ctx.asm.pop_r(Reg::Edx);
        shift_wide(ctx, op, wide_count);
    } else {
        shift_word(ctx, op, wide_count);
    }
    push_result(ctx, wide);
    Ok(())
}

#[inline]
fn kind(op: ShiftOp) -> ShiftKind {
    match op {
        ShiftOp::Shl => ShiftKind::Shl,
        ShiftOp::Shr => ShiftKind::Sar,
        ShiftOp::ShrUn => ShiftKind::Shr,
    }
}

fn shift_word(ctx: &mut Ctx<'_>, op: ShiftOp, wide_count: bool) {
    if !wide_count {
        ctx.asm.shift_cl(kind(op), Reg::Eax);
        return;
    }
    let saturate = ctx.new_label("Saturate");
    let done = ctx.new_label("Done");

    ctx.asm.test_rr(Reg::Esi, Reg::Esi);
    ctx.asm.jne(saturate.clone());
    ctx.asm.shift_cl(kind(op), Reg::Eax);
    ctx.asm.jmp(done.clone());

    ctx.asm.bind(saturate);
    match op {
        ShiftOp::Shr => ctx.asm.shift_ri(ShiftKind::Sar, Reg::Eax, 31),
        ShiftOp::Shl | ShiftOp::ShrUn => ctx.asm.xor_rr(Reg::Eax, Reg::Eax),
    }
    ctx.asm.bind(done);
}

fn shift_wide(ctx: &mut Ctx<'_>, op: ShiftOp, wide_count: bool) {
    let saturate = ctx.new_label("Saturate");
    let big = ctx.new_label("Big");
    let done = ctx.new_label("Done");

    if wide_count {
        ctx.asm.test_rr(Reg::Esi, Reg::Esi);
        ctx.asm.jne(saturate.clone());
    }
    ctx.asm.cmp_ri(Reg::Ecx, 64);
    ctx.asm.jcc(Cond::Ae, saturate.clone());
    ctx.asm.cmp_ri(Reg::Ecx, 32);
    ctx.asm.jcc(Cond::Ae, big.clone());

    // 0..32
    match op {
        ShiftOp::Shl => {
            ctx.asm.shld_cl(Reg::Edx, Reg::Eax);
            ctx.asm.shift_cl(ShiftKind::Shl, Reg::Eax);
        }
        ShiftOp::Shr | ShiftOp::ShrUn => {
            ctx.asm.shrd_cl(Reg::Eax, Reg::Edx);
            ctx.asm.shift_cl(kind(op), Reg::Edx);
        }
    }
    ctx.asm.jmp(done.clone());

    // 32..64
    ctx.asm.bind(big);
    ctx.asm.alu_ri(AluOp::Sub, Reg::Ecx, 32);
    match op {
        ShiftOp::Shl => {
            ctx.asm.mov_rr(Reg::Edx, Reg::Eax);
            ctx.asm.shift_cl(ShiftKind::Shl, Reg::Edx);
            ctx.asm.xor_rr(Reg::Eax, Reg::Eax);
        }
        ShiftOp::Shr => {
            ctx.asm.mov_rr(Reg::Eax, Reg::Edx);
            ctx.asm.shift_cl(ShiftKind::Sar, Reg::Eax);
            ctx.asm.shift_ri(ShiftKind::Sar, Reg::Edx, 31);
        }
        ShiftOp::ShrUn => {
            ctx.asm.mov_rr(Reg::Eax, Reg::Edx);
            ctx.asm.shift_cl(ShiftKind::Shr, Reg::Eax);
            ctx.asm.xor_rr(Reg::Edx, Reg::Edx);
        }
    }
    ctx.asm.jmp(done.clone());

    ctx.asm.bind(saturate);
    match op {
        ShiftOp::Shr => {
            ctx.asm.shift_ri(ShiftKind::Sar, Reg::Edx, 31);
            ctx.asm.mov_rr(Reg::Eax, Reg::Edx);
        }
        ShiftOp::Shl | ShiftOp::ShrUn => {
            ctx.asm.xor_rr(Reg::Eax, Reg::Eax);
            ctx.asm.xor_rr(Reg::Edx, Reg::Edx);
        }
    }
    ctx.asm.bind(done);
}
