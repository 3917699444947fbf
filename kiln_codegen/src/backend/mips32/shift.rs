//! Shift templates.
//!
//! `sllv`/`srlv`/`srav` use the low five bits of the count. Double-word
//! shifts branch on the count: zero leaves the value alone (the cross-word
//! shift by `32 - n` would otherwise be a shift by 32, which masks to 0),
//! `1..32` combines both words, `32..64` moves one word into the other, and
//! anything larger saturates.

use super::Ctx;
use super::arith::push_result;
use super::inst::{Alu3Op, ImmOp, Reg, ShiftImmOp};
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

    ctx.asm.pop(Reg::T2);
    if wide_count {
        ctx.asm.pop(Reg::T3);
    }
    ctx.asm.pop(Reg::T0);
    if wide {
        ctx.asm.pop(Reg::T1);
        shift_wide(ctx, op, wide_count);
    } else {
        shift_word(ctx, op, wide_count);
    }
    push_result(ctx, wide);
    Ok(())
}

#[inline]
fn variable(op: ShiftOp) -> Alu3Op {
    match op {
        ShiftOp::Shl => Alu3Op::Sllv,
        ShiftOp::Shr => Alu3Op::Srav,
        ShiftOp::ShrUn => Alu3Op::Srlv,
    }
}

fn shift_word(ctx: &mut Ctx<'_>, op: ShiftOp, wide_count: bool) {
    if !wide_count {
        ctx.asm.alu3(variable(op), Reg::T0, Reg::T0, Reg::T2);
        return;
    }
    let saturate = ctx.new_label("Saturate");
    let done = ctx.new_label("Done");

    ctx.asm.bne(Reg::T3, Reg::Zero, saturate.clone());
    ctx.asm.alu3(variable(op), Reg::T0, Reg::T0, Reg::T2);
    ctx.asm.j(done.clone());

    ctx.asm.bind(saturate);
    match op {
        ShiftOp::Shr => ctx.asm.shift_imm(ShiftImmOp::Sra, Reg::T0, Reg::T0, 31),
        ShiftOp::Shl | ShiftOp::ShrUn => ctx.asm.mov(Reg::T0, Reg::Zero),
    }
    ctx.asm.bind(done);
}

fn shift_wide(ctx: &mut Ctx<'_>, op: ShiftOp, wide_count: bool) {
    let saturate = ctx.new_label("Saturate");
    let big = ctx.new_label("Big");
    let done = ctx.new_label("Done");

    if wide_count {
        ctx.asm.bne(Reg::T3, Reg::Zero, saturate.clone());
    }
    ctx.asm.alu_imm(ImmOp::Sltiu, Reg::T8, Reg::T2, 64);
    ctx.asm.beq(Reg::T8, Reg::Zero, saturate.clone());
    ctx.asm.beq(Reg::T2, Reg::Zero, done.clone());
    ctx.asm.alu_imm(ImmOp::Sltiu, Reg::T8, Reg::T2, 32);
    ctx.asm.beq(Reg::T8, Reg::Zero, big.clone());

    // 1..32: $t4 = 32 - n is the cross-word shift.
    ctx.asm.addiu(Reg::T4, Reg::Zero, 32);
    ctx.asm.subu(Reg::T4, Reg::T4, Reg::T2);
    match op {
        ShiftOp::Shl => {
            ctx.asm.alu3(Alu3Op::Srlv, Reg::T5, Reg::T0, Reg::T4);
            ctx.asm.alu3(Alu3Op::Sllv, Reg::T1, Reg::T1, Reg::T2);
            ctx.asm.or(Reg::T1, Reg::T1, Reg::T5);
            ctx.asm.alu3(Alu3Op::Sllv, Reg::T0, Reg::T0, Reg::T2);
        }
        ShiftOp::Shr | ShiftOp::ShrUn => {
            ctx.asm.alu3(Alu3Op::Sllv, Reg::T5, Reg::T1, Reg::T4);
            ctx.asm.alu3(Alu3Op::Srlv, Reg::T0, Reg::T0, Reg::T2);
            ctx.asm.or(Reg::T0, Reg::T0, Reg::T5);
            ctx.asm.alu3(variable(op), Reg::T1, Reg::T1, Reg::T2);
        }
    }
    ctx.asm.j(done.clone());

    // 32..64
    ctx.asm.bind(big);
    ctx.asm.addiu(Reg::T2, Reg::T2, -32);
    match op {
        ShiftOp::Shl => {
            ctx.asm.alu3(Alu3Op::Sllv, Reg::T1, Reg::T0, Reg::T2);
            ctx.asm.mov(Reg::T0, Reg::Zero);
        }
        ShiftOp::Shr => {
            ctx.asm.alu3(Alu3Op::Srav, Reg::T0, Reg::T1, Reg::T2);
            ctx.asm.shift_imm(ShiftImmOp::Sra, Reg::T1, Reg::T1, 31);
        }
        ShiftOp::ShrUn => {
            ctx.asm.alu3(Alu3Op::Srlv, Reg::T0, Reg::T1, Reg::T2);
            ctx.asm.mov(Reg::T1, Reg::Zero);
        }
    }
    ctx.asm.j(done.clone());

    ctx.asm.bind(saturate);
    match op {
        ShiftOp::Shr => {
            ctx.asm.shift_imm(ShiftImmOp::Sra, Reg::T1, Reg::T1, 31);
            ctx.asm.mov(Reg::T0, Reg::T1);
        }
        ShiftOp::Shl | ShiftOp::ShrUn => {
            ctx.asm.mov(Reg::T0, Reg::Zero);
            ctx.asm.mov(Reg::T1, Reg::Zero);
        }
    }
    ctx.asm.bind(done);
}
