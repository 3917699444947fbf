//! Integer conversions.

use super::Ctx;
use super::inst::{Reg, Width};
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
            ctx.asm.pop_r(Reg::Eax);
            if target.is_signed() {
                ctx.asm.cdq();
                ctx.asm.push_r(Reg::Edx);
            } else {
                ctx.asm.push_i(0);
            }
            ctx.asm.push_r(Reg::Eax);
        }
        _ => {
            ctx.asm.pop_r(Reg::Eax);
            if from == 8 {
                ctx.asm.drop_bytes(4);
            }
            if let Some(width) = Width::from_bytes(to).filter(|width| width.bytes() < 4) {
                if target.is_signed() {
                    ctx.asm.movsx_rr(Reg::Eax, Reg::Eax, width);
                } else {
                    ctx.asm.movzx_rr(Reg::Eax, Reg::Eax, width);
                }
            }
            ctx.asm.push_r(Reg::Eax);
        }
    }
    Ok(())
}
