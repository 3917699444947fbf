//! Integer arithmetic and bitwise templates.
//!
//! Word operands use `eax` (A) and `ebx` (B). Double words use `edx:eax`
//! and `ecx:ebx`, combining the halves through the carry flag.

use super::Ctx;
use super::inst::{AluOp, Reg};
use crate::simulate::StackEffect;
use kiln_core::{BinaryOp, CompileResult, IlInstruction, UnaryOp};
use tracing::warn;

/// Pop B then A into the operand registers.
pub(super) fn pop_operands(ctx: &mut Ctx<'_>, wide: bool) {
    ctx.asm.pop_r(Reg::Ebx);
    if wide {
        ctx.asm.pop_r(Reg::Ecx);
    }
    ctx.asm.pop_r(Reg::Eax);
    if wide {
        ctx.asm.pop_r(Reg::Edx);
    }
}

/// Push A, high word first when wide.
pub(super) fn push_result(ctx: &mut Ctx<'_>, wide: bool) {
    if wide {
        ctx.asm.push_r(Reg::Edx);
    }
    ctx.asm.push_r(Reg::Eax);
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
    pop_operands(ctx, wide);
    if wide {
        binary_wide(ctx, op)?;
    } else {
        binary_word(ctx, op);
    }
    push_result(ctx, wide);
    Ok(())
}

fn binary_word(ctx: &mut Ctx<'_>, op: BinaryOp) {
    let asm = &mut ctx.asm;
    match op {
        BinaryOp::Add => asm.alu_rr(AluOp::Add, Reg::Eax, Reg::Ebx),
        BinaryOp::Sub => asm.alu_rr(AluOp::Sub, Reg::Eax, Reg::Ebx),
        BinaryOp::And => asm.alu_rr(AluOp::And, Reg::Eax, Reg::Ebx),
        BinaryOp::Or => asm.alu_rr(AluOp::Or, Reg::Eax, Reg::Ebx),
        BinaryOp::Xor => asm.alu_rr(AluOp::Xor, Reg::Eax, Reg::Ebx),
        BinaryOp::Mul => asm.imul_rr(Reg::Eax, Reg::Ebx),
        BinaryOp::Div | BinaryOp::Rem => {
            asm.cdq();
            asm.idiv_r(Reg::Ebx);
        }
        BinaryOp::DivUn | BinaryOp::RemUn => {
            asm.xor_rr(Reg::Edx, Reg::Edx);
            asm.div_r(Reg::Ebx);
        }
    }
    if matches!(op, BinaryOp::Rem | BinaryOp::RemUn) {
        asm.mov_rr(Reg::Eax, Reg::Edx);
    }
}

fn binary_wide(ctx: &mut Ctx<'_>, op: BinaryOp) -> CompileResult<()> {
    let (lo, hi) = match op {
        BinaryOp::Add => (AluOp::Add, AluOp::Adc),
        BinaryOp::Sub => (AluOp::Sub, AluOp::Sbb),
        BinaryOp::And => (AluOp::And, AluOp::And),
        BinaryOp::Or => (AluOp::Or, AluOp::Or),
        BinaryOp::Xor => (AluOp::Xor, AluOp::Xor),
        BinaryOp::Mul => {
            multiply_wide(ctx);
            return Ok(());
        }
        BinaryOp::Div | BinaryOp::DivUn | BinaryOp::Rem | BinaryOp::RemUn => {
            return Err(ctx.unsupported("64-bit division and remainder"));
        }
    };
    ctx.asm.alu_rr(lo, Reg::Eax, Reg::Ebx);
    ctx.asm.alu_rr(hi, Reg::Edx, Reg::Ecx);
    Ok(())
}

/// `edx:eax *= ecx:ebx`, low 64 bits.
///
/// `hi = a_hi*b_lo + a_lo*b_hi + carry(a_lo*b_lo)`; the cross products only
/// contribute their low words.
fn multiply_wide(ctx: &mut Ctx<'_>) {
    warn!(
        method = %ctx.scope(),
        position = ctx.position(),
        "64-bit multiply expands inline"
    );
    let asm = &mut ctx.asm;
    asm.mov_rr(Reg::Esi, Reg::Edx);
    asm.imul_rr(Reg::Esi, Reg::Ebx);
    asm.mov_rr(Reg::Edi, Reg::Ecx);
    asm.imul_rr(Reg::Edi, Reg::Eax);
    asm.alu_rr(AluOp::Add, Reg::Esi, Reg::Edi);
    asm.mul_r(Reg::Ebx);
    asm.alu_rr(AluOp::Add, Reg::Edx, Reg::Esi);
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
    asm.pop_r(Reg::Eax);
    if wide {
        asm.pop_r(Reg::Edx);
    }
    match (op, wide) {
        (UnaryOp::Neg, false) => asm.neg_r(Reg::Eax),
        (UnaryOp::Not, false) => asm.not_r(Reg::Eax),
        (UnaryOp::Neg, true) => {
            asm.neg_r(Reg::Eax);
            asm.alu_ri(AluOp::Adc, Reg::Edx, 0);
            asm.neg_r(Reg::Edx);
        }
        (UnaryOp::Not, true) => {
            asm.not_r(Reg::Eax);
            asm.not_r(Reg::Edx);
        }
    }
    push_result(ctx, wide);
    Ok(())
}
