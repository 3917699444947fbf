//! Inline safety checks.
//!
//! Checks are emitted inside the template that needs them, never as a
//! separate pass. A failing check calls `GetEIP` and hands the fault site to
//! the matching throw helper, which does not return.

use super::Ctx;
use super::inst::{AluOp, Cond, Mem, Reg};
use crate::runtime::RuntimeHelper;

/// `call GetEIP; push eax; call <helper>`. Clobbers eax.
pub(super) fn throw_at_eip(ctx: &mut Ctx<'_>, helper: RuntimeHelper) {
    ctx.asm.call_sym(RuntimeHelper::GetEip.symbol());
    ctx.asm.push_r(Reg::Eax);
    ctx.asm.call_sym(helper.symbol());
}

/// Fault unless `reg` is non-null. `reg` survives.
pub(super) fn null_check(ctx: &mut Ctx<'_>, reg: Reg) {
    let not_null = ctx.new_label("NotNull");
    ctx.asm.test_rr(reg, reg);
    ctx.asm.jne(not_null.clone());
    throw_at_eip(ctx, RuntimeHelper::ThrowNullReferenceException);
    ctx.asm.bind(not_null);
}

/// Fault unless `0 <= index < array.length`.
pub(super) fn bounds_check(ctx: &mut Ctx<'_>, array: Reg, index: Reg) {
    let out_of_range = ctx.new_label("OutOfRange");
    let in_range = ctx.new_label("InRange");
    let length = Mem::base(array, ctx.layout().array_length_offset as i32);

    ctx.asm.cmp_ri(index, 0);
    ctx.asm.jcc(Cond::L, out_of_range.clone());
    ctx.asm.cmp_rm(index, length);
    ctx.asm.jcc(Cond::L, in_range.clone());
    ctx.asm.bind(out_of_range);
    throw_at_eip(ctx, RuntimeHelper::ThrowIndexOutOfRangeException);
    ctx.asm.bind(in_range);
}

/// `array += index * stride`; the header offset is left to the access.
pub(super) fn scale_index(ctx: &mut Ctx<'_>, array: Reg, index: Reg, stride: u32) {
    if stride != 1 {
        ctx.asm.imul_rri(index, index, stride as i32);
    }
    ctx.asm.alu_rr(AluOp::Add, array, index);
}

/// Checked element base: null check, bounds check, then scaling.
pub(super) fn element_base(ctx: &mut Ctx<'_>, array: Reg, index: Reg, stride: u32) {
    null_check(ctx, array);
    bounds_check(ctx, array, index);
    scale_index(ctx, array, index, stride);
}
