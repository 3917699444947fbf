//! `call`, `calli` and `callvirt`.
//!
//! The caller pushes the arguments, reserves the return slot, calls, and
//! finally trades the arguments for the return value (see
//! [`after_call`](super::frame::after_call)).

use super::Ctx;
use super::checks::null_check;
use super::frame::after_call;
use super::inst::{AluOp, Mem, Reg};
use crate::runtime::{HaltReason, RuntimeHelper};
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction};

pub(super) fn call(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let symbol = ctx.tables.resolve_method(instr)?.symbol.clone();
    let ret = effect.pushed_bytes();
    ctx.asm.reserve_bytes(ret);
    ctx.asm.call_sym(symbol);
    after_call(ctx, ret, effect.popped_bytes());
    Ok(())
}

/// The function pointer is on top of the arguments.
pub(super) fn call_indirect(
    ctx: &mut Ctx<'_>,
    _instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let ret = effect.pushed_bytes();
    ctx.asm.pop_r(Reg::Esi);
    ctx.asm.reserve_bytes(ret);
    ctx.asm.call_r(Reg::Esi);
    after_call(ctx, ret, effect.popped_bytes() - effect.operand(0).size);
    Ok(())
}

/// Delegate invocation, non-virtual instance call, or method-table dispatch.
pub(super) fn call_virtual(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let tables = ctx.tables;
    let method = tables.resolve_method(instr)?;
    let declaring = tables.type_for(method.declaring_type, instr)?;
    let symbol = method.symbol.clone();
    let slot = method.id.get() as i32;
    let is_virtual = method.is_virtual;
    let is_delegate = declaring.is_delegate;

    let ret = effect.pushed_bytes();
    let args = effect.popped_bytes();
    let this = Mem::base(Reg::Esp, (args - ctx.pointer_size()) as i32);

    if is_delegate {
        // The delegate value is the target's entry point.
        ctx.asm.mov_rm(Reg::Esi, this);
        null_check(ctx, Reg::Esi);
        ctx.asm.reserve_bytes(ret);
        ctx.asm.call_r(Reg::Esi);
    } else if !is_virtual {
        ctx.asm.mov_rm(Reg::Eax, this);
        null_check(ctx, Reg::Eax);
        ctx.asm.reserve_bytes(ret);
        ctx.asm.call_sym(symbol);
    } else {
        ctx.asm.mov_rm(Reg::Eax, this);
        null_check(ctx, Reg::Eax);
        dispatch(ctx, slot, ret);
    }
    after_call(ctx, ret, args);
    Ok(())
}

/// Walk the method-table chain of the object in `eax` for `slot` and call
/// the implementation found.
///
/// Each table is a run of `(id, address)` pairs closed by `(0, parent)`.
fn dispatch(ctx: &mut Ctx<'_>, slot: i32, ret: u32) {
    let scan = ctx.new_label("Scan");
    let next = ctx.new_label("Next");
    let found = ctx.new_label("Found");
    let layout = *ctx.layout();

    ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Eax, layout.type_pointer_offset as i32));
    ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Eax, layout.type_method_table_offset as i32));

    ctx.asm.bind(scan.clone());
    ctx.asm.mov_rm(Reg::Esi, Mem::base(Reg::Eax, 0));
    ctx.asm.cmp_ri(Reg::Esi, slot);
    ctx.asm.je(found.clone());
    ctx.asm.test_rr(Reg::Esi, Reg::Esi);
    ctx.asm.jne(next.clone());
    ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Eax, 4));
    ctx.asm.test_rr(Reg::Eax, Reg::Eax);
    ctx.asm.jne(scan.clone());
    ctx.asm.push_i(HaltReason::MissingVirtualMethod.code() as i32);
    ctx.asm.call_sym(RuntimeHelper::Halt.symbol());

    ctx.asm.bind(next);
    ctx.asm.alu_ri(AluOp::Add, Reg::Eax, 8);
    ctx.asm.jmp(scan);

    ctx.asm.bind(found);
    ctx.asm.mov_rm(Reg::Esi, Mem::base(Reg::Eax, 4));
    ctx.asm.reserve_bytes(ret);
    ctx.asm.call_r(Reg::Esi);
}
