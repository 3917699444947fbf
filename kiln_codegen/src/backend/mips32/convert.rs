//! Integer conversions.

use super::Ctx;
use super::inst::{ImmOp, Reg, ShiftImmOp};
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction};

pub(super) fn convert(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let target = instr
        .op
        .conv_target()
        .ok_or_else(|| ctx.unsupported("floating-point conversion"))?;
    let from = effect.operand(0).size;
    let to = target.value_size(ctx.pointer_size());

    match (from, to) {
        (4, 4) | (8, 8) => {}
        (4, 8) => {
            ctx.asm.pop(Reg::T0);
            if target.is_signed() {
                ctx.asm.shift_imm(ShiftImmOp::Sra, Reg::T1, Reg::T0, 31);
                ctx.asm.push(Reg::T1);
            } else {
                ctx.asm.push(Reg::Zero);
            }
            ctx.asm.push(Reg::T0);
        }
        _ => {
            ctx.asm.pop(Reg::T0);
            if from == 8 {
                ctx.asm.drop_bytes(4);
            }
            if to < 4 {
                let bits = 8 * to;
                if target.is_signed() {
                    let shift = (32 - bits) as u8;
                    ctx.asm.shift_imm(ShiftImmOp::Sll, Reg::T0, Reg::T0, shift);
                    ctx.asm.shift_imm(ShiftImmOp::Sra, Reg::T0, Reg::T0, shift);
                } else {
                    ctx.asm.alu_imm(ImmOp::Andi, Reg::T0, Reg::T0, (1 << bits) - 1);
                }
            }
            ctx.asm.push(Reg::T0);
        }
    }
    Ok(())
}
