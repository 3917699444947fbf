//! Integer arithmetic and bitwise templates.
//!
//! There is no carry flag: double-word add and subtract recover the carry
//! (or borrow) of the low words with `sltu` and fold it into the high word.

use super::Ctx;
use super::inst::{Alu3Op, Reg};
use crate::simulate::StackEffect;
use kiln_core::{BinaryOp, CompileResult, IlInstruction, UnaryOp};
use tracing::warn;

/// Pop B then A into `$t2[:$t3]` and `$t0[:$t1]`.
pub(super) fn pop_operands(ctx: &mut Ctx<'_>, wide: bool) {
    ctx.asm.pop(Reg::T2);
    if wide {
        ctx.asm.pop(Reg::T3);
    }
    ctx.asm.pop(Reg::T0);
    if wide {
        ctx.asm.pop(Reg::T1);
    }
}

pub(super) fn push_result(ctx: &mut Ctx<'_>, wide: bool) {
    if wide {
        ctx.asm.push(Reg::T1);
    }
    ctx.asm.push(Reg::T0);
}

pub(super) fn binary(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let op = instr
        .op
        .binary_op()
        .ok_or_else(|| ctx.unsupported("not an arithmetic opcode"))?;
    let wide = effect.operand(0).size == 8;
    if wide && op.is_division() {
        return Err(ctx.unsupported("64-bit division and remainder"));
    }
    pop_operands(ctx, wide);
    if wide {
        binary_wide(ctx, op);
    } else {
        binary_word(ctx, op);
    }
    push_result(ctx, wide);
    Ok(())
}

#[inline]
fn bitwise(op: BinaryOp) -> Option<Alu3Op> {
    match op {
        BinaryOp::And => Some(Alu3Op::And),
        BinaryOp::Or => Some(Alu3Op::Or),
        BinaryOp::Xor => Some(Alu3Op::Xor),
        _ => None,
    }
}

fn binary_word(ctx: &mut Ctx<'_>, op: BinaryOp) {
    let asm = &mut ctx.asm;
    match op {
        BinaryOp::Add => asm.addu(Reg::T0, Reg::T0, Reg::T2),
        BinaryOp::Sub => asm.subu(Reg::T0, Reg::T0, Reg::T2),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
            if let Some(alu) = bitwise(op) {
                asm.alu3(alu, Reg::T0, Reg::T0, Reg::T2);
            }
        }
        BinaryOp::Mul => {
            asm.mult(Reg::T0, Reg::T2, false);
            asm.mflo(Reg::T0);
        }
        BinaryOp::Div | BinaryOp::DivUn => {
            asm.div(Reg::T0, Reg::T2, op == BinaryOp::DivUn);
            asm.mflo(Reg::T0);
        }
        BinaryOp::Rem | BinaryOp::RemUn => {
            asm.div(Reg::T0, Reg::T2, op == BinaryOp::RemUn);
            asm.mfhi(Reg::T0);
        }
    }
}

/// Division was rejected by the caller.
fn binary_wide(ctx: &mut Ctx<'_>, op: BinaryOp) {
    if op == BinaryOp::Mul {
        multiply_wide(ctx);
        return;
    }
    let asm = &mut ctx.asm;
    match op {
        BinaryOp::Add => {
            asm.addu(Reg::T0, Reg::T0, Reg::T2);
            asm.slt(Reg::T4, Reg::T0, Reg::T2, true);
            asm.addu(Reg::T1, Reg::T1, Reg::T3);
            asm.addu(Reg::T1, Reg::T1, Reg::T4);
        }
        BinaryOp::Sub => {
            asm.slt(Reg::T4, Reg::T0, Reg::T2, true);
            asm.subu(Reg::T0, Reg::T0, Reg::T2);
            asm.subu(Reg::T1, Reg::T1, Reg::T3);
            asm.subu(Reg::T1, Reg::T1, Reg::T4);
        }
        _ => {
            if let Some(alu) = bitwise(op) {
                asm.alu3(alu, Reg::T0, Reg::T0, Reg::T2);
                asm.alu3(alu, Reg::T1, Reg::T1, Reg::T3);
            }
        }
    }
}

/// `$t1:$t0 *= $t3:$t2`, low 64 bits, from three 32x32 products.
fn multiply_wide(ctx: &mut Ctx<'_>) {
    warn!(
        method = %ctx.scope(),
        position = ctx.position(),
        "64-bit multiply expands inline"
    );
    let asm = &mut ctx.asm;
    asm.mult(Reg::T0, Reg::T2, true);
    asm.mflo(Reg::T4);
    asm.mfhi(Reg::T5);
    asm.mult(Reg::T1, Reg::T2, true);
    asm.mflo(Reg::T6);
    asm.addu(Reg::T5, Reg::T5, Reg::T6);
    asm.mult(Reg::T0, Reg::T3, true);
    asm.mflo(Reg::T6);
    asm.addu(Reg::T5, Reg::T5, Reg::T6);
    asm.mov(Reg::T0, Reg::T4);
    asm.mov(Reg::T1, Reg::T5);
}

pub(super) fn unary(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let op = instr
        .op
        .unary_op()
        .ok_or_else(|| ctx.unsupported("not a unary opcode"))?;
    let wide = effect.operand(0).size == 8;
    let asm = &mut ctx.asm;
    asm.pop(Reg::T0);
    if wide {
        asm.pop(Reg::T1);
    }
    match (op, wide) {
        (UnaryOp::Neg, false) => asm.subu(Reg::T0, Reg::Zero, Reg::T0),
        (UnaryOp::Not, false) => asm.alu3(Alu3Op::Nor, Reg::T0, Reg::T0, Reg::Zero),
        (UnaryOp::Neg, true) => {
            // Borrow out of the low word whenever it is nonzero.
            asm.slt(Reg::T4, Reg::Zero, Reg::T0, true);
            asm.subu(Reg::T0, Reg::Zero, Reg::T0);
            asm.subu(Reg::T1, Reg::Zero, Reg::T1);
            asm.subu(Reg::T1, Reg::T1, Reg::T4);
        }
        (UnaryOp::Not, true) => {
            asm.alu3(Alu3Op::Nor, Reg::T0, Reg::T0, Reg::Zero);
            asm.alu3(Alu3Op::Nor, Reg::T1, Reg::T1, Reg::Zero);
        }
    }
    push_result(ctx, wide);
    Ok(())
}

