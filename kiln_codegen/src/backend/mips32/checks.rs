//! Inline safety checks.
//!
//! A failing check calls `GetEIP`, pushes the fault site and calls the throw
//! helper, which never returns.

use super::Ctx;
use super::inst::{Reg, ShiftImmOp, ZeroCmp};
use crate::runtime::RuntimeHelper;

/// `jal GetEIP; push $v0; jal <helper>`.
pub(super) fn throw_at_eip(ctx: &mut Ctx<'_>, helper: RuntimeHelper) {
    ctx.asm.jal(RuntimeHelper::GetEip.symbol());
    ctx.asm.push(Reg::V0);
    ctx.asm.jal(helper.symbol());
}

/// Fault unless `reg` is non-null.
pub(super) fn null_check(ctx: &mut Ctx<'_>, reg: Reg) {
    let not_null = ctx.new_label("NotNull");
    ctx.asm.bne(reg, Reg::Zero, not_null.clone());
    throw_at_eip(ctx, RuntimeHelper::ThrowNullReferenceException);
    ctx.asm.bind(not_null);
}

/// Fault unless `0 <= index < array.length`. Clobbers `$t4` and `$t8`.
pub(super) fn bounds_check(ctx: &mut Ctx<'_>, array: Reg, index: Reg) {
    let out_of_range = ctx.new_label("OutOfRange");
    let in_range = ctx.new_label("InRange");
    let length = ctx.layout().array_length_offset as i32;

    ctx.asm.branch_zero(ZeroCmp::Ltz, index, out_of_range.clone());
    ctx.asm.lw(Reg::T4, length, array);
    ctx.asm.slt(Reg::T8, index, Reg::T4, false);
    ctx.asm.bne(Reg::T8, Reg::Zero, in_range.clone());
    ctx.asm.bind(out_of_range);
    throw_at_eip(ctx, RuntimeHelper::ThrowIndexOutOfRangeException);
    ctx.asm.bind(in_range);
}

/// `array += index * stride`. Clobbers `index` and `$t5`.
pub(super) fn scale_index(ctx: &mut Ctx<'_>, array: Reg, index: Reg, stride: u32) {
    if stride.is_power_of_two() {
        let shift = stride.trailing_zeros() as u8;
        if shift > 0 {
            ctx.asm.shift_imm(ShiftImmOp::Sll, index, index, shift);
        }
        ctx.asm.addu(array, array, index);
    } else {
        ctx.asm.li(Reg::T5, stride as i32);
        ctx.asm.mult(index, Reg::T5, true);
        ctx.asm.mflo(Reg::T5);
        ctx.asm.addu(array, array, Reg::T5);
    }
}

pub(super) fn element_base(ctx: &mut Ctx<'_>, array: Reg, index: Reg, stride: u32) {
    null_check(ctx, array);
    bounds_check(ctx, array, index);
    scale_index(ctx, array, index, stride);
}
