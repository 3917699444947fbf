//! `call`, `calli` and `callvirt`.
//!
//! Indirect targets are called through `$t9`, as position-independent MIPS
//! code expects.

use super::Ctx;
use super::checks::null_check;
use super::frame::after_call;
use super::inst::Reg;
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
    ctx.asm.jal(symbol);
    after_call(ctx, ret, effect.popped_bytes());
    Ok(())
}

pub(super) fn call_indirect(
    ctx: &mut Ctx<'_>,
    _instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let ret = effect.pushed_bytes();
    ctx.asm.pop(Reg::T9);
    ctx.asm.reserve_bytes(ret);
    ctx.asm.jalr(Reg::T9);
    after_call(ctx, ret, effect.popped_bytes() - effect.operand(0).size);
    Ok(())
}

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
    let this = ctx.displacement(args as i64 - ctx.pointer_size() as i64)?;

    if is_delegate {
        ctx.asm.lw(Reg::T9, this, Reg::Sp);
        null_check(ctx, Reg::T9);
        ctx.asm.reserve_bytes(ret);
        ctx.asm.jalr(Reg::T9);
    } else if !is_virtual {
        ctx.asm.lw(Reg::T0, this, Reg::Sp);
        null_check(ctx, Reg::T0);
        ctx.asm.reserve_bytes(ret);
        ctx.asm.jal(symbol);
    } else {
        ctx.asm.lw(Reg::T0, this, Reg::Sp);
        null_check(ctx, Reg::T0);
        dispatch(ctx, slot, ret);
    }
    after_call(ctx, ret, args);
    Ok(())
}

/// Method-table walk for the object in `$t0`; tables are `(id, address)`
/// pairs closed by `(0, parent)`.
fn dispatch(ctx: &mut Ctx<'_>, slot: i32, ret: u32) {
    let scan = ctx.new_label("Scan");
    let next = ctx.new_label("Next");
    let found = ctx.new_label("Found");
    let layout = *ctx.layout();

    ctx.asm.lw(Reg::T0, layout.type_pointer_offset as i32, Reg::T0);
    ctx.asm.lw(Reg::T0, layout.type_method_table_offset as i32, Reg::T0);
    ctx.asm.li(Reg::T5, slot);

    ctx.asm.bind(scan.clone());
    ctx.asm.lw(Reg::T4, 0, Reg::T0);
    ctx.asm.beq(Reg::T4, Reg::T5, found.clone());
    ctx.asm.bne(Reg::T4, Reg::Zero, next.clone());
    ctx.asm.lw(Reg::T0, 4, Reg::T0);
    ctx.asm.bne(Reg::T0, Reg::Zero, scan.clone());
    ctx.asm.push_imm(HaltReason::MissingVirtualMethod.code() as i32);
    ctx.asm.jal(RuntimeHelper::Halt.symbol());

    ctx.asm.bind(next);
    ctx.asm.addiu(Reg::T0, Reg::T0, 8);
    ctx.asm.j(scan);

    ctx.asm.bind(found);
    ctx.asm.lw(Reg::T9, 4, Reg::T0);
    ctx.asm.reserve_bytes(ret);
    ctx.asm.jalr(Reg::T9);
}
