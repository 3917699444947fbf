//! Allocation, type tests, `throw` and `initobj`.

use super::Ctx;
use super::checks::{null_check, throw_at_eip};
use super::inst::Reg;
use super::memory::zero_memory;
use crate::backend::Access;
use crate::runtime::{HaltReason, RuntimeHelper};
use kiln_core::{CompileResult, DescriptorTable, IlInstruction, OpFamily};

fn check_allocation(ctx: &mut Ctx<'_>) {
    let allocated = ctx.new_label("Allocated");
    ctx.asm.bne(Reg::T0, Reg::Zero, allocated.clone());
    ctx.asm.push_imm(HaltReason::OutOfMemory.code() as i32);
    ctx.asm.jal(RuntimeHelper::Halt.symbol());
    ctx.asm.bind(allocated);
}

/// `newobj`.
///
/// After `NewObj` returns, the constructor arguments slide down two words to
/// make room for `this` and for the result the caller keeps.
pub(super) fn new_object(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let tables = ctx.tables;
    let ctor = tables.resolve_method(instr)?;
    let declaring = tables.type_for(ctor.declaring_type, instr)?;

    if declaring.is_delegate {
        ctx.asm.pop(Reg::T0);
        ctx.asm.drop_bytes(4);
        ctx.asm.push(Reg::T0);
        return Ok(());
    }

    let mut params = 0;
    for param in &ctor.params {
        let ty = tables.type_for(*param, instr)?;
        params += DescriptorTable::stack_item(ty, ctx.pointer_size()).size;
    }
    ctx.displacement(params as i64 + 8)?;
    let type_symbol = declaring.symbol.clone();
    let ctor_symbol = ctor.symbol.clone();

    ctx.asm.push_addr(type_symbol);
    ctx.asm.reserve_bytes(RuntimeHelper::NewObj.return_bytes());
    ctx.asm.jal(RuntimeHelper::NewObj.symbol());
    ctx.asm.pop(Reg::T0);
    ctx.asm.drop_bytes(RuntimeHelper::NewObj.arg_bytes());
    check_allocation(ctx);

    ctx.asm.reserve_bytes(8);
    for word in 0..params / 4 {
        let offset = 4 * word as i32;
        ctx.asm.lw(Reg::T6, offset + 8, Reg::Sp);
        ctx.asm.sw(Reg::T6, offset, Reg::Sp);
    }
    ctx.asm.sw(Reg::T0, params as i32, Reg::Sp);
    ctx.asm.sw(Reg::T0, params as i32 + 4, Reg::Sp);
    ctx.asm.jal(ctor_symbol);
    ctx.asm.drop_bytes(params + 4);
    Ok(())
}

pub(super) fn new_array(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let element = ctx.tables.resolve_type(instr)?.symbol.clone();
    ctx.asm.push_addr(element);
    ctx.asm.reserve_bytes(RuntimeHelper::NewArr.return_bytes());
    ctx.asm.jal(RuntimeHelper::NewArr.symbol());
    ctx.asm.pop(Reg::T0);
    ctx.asm.drop_bytes(RuntimeHelper::NewArr.arg_bytes());
    check_allocation(ctx);
    ctx.asm.push(Reg::T0);
    Ok(())
}

/// `isinst` and `castclass`. Null passes through both.
pub(super) fn type_test(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let target = ctx.tables.resolve_type(instr)?.symbol.clone();
    let layout = *ctx.layout();
    let scan = ctx.new_label("Scan");
    let failed = ctx.new_label("Failed");
    let done = ctx.new_label("Done");

    ctx.asm.pop(Reg::T0);
    ctx.asm.beq(Reg::T0, Reg::Zero, done.clone());
    ctx.asm.lw(Reg::T4, layout.type_pointer_offset as i32, Reg::T0);
    ctx.asm.la(Reg::T5, target);

    ctx.asm.bind(scan.clone());
    ctx.asm.beq(Reg::T4, Reg::Zero, failed.clone());
    ctx.asm.beq(Reg::T4, Reg::T5, done.clone());
    ctx.asm.lw(Reg::T4, layout.type_base_type_offset as i32, Reg::T4);
    ctx.asm.j(scan);

    ctx.asm.bind(failed);
    if instr.op.family() == OpFamily::CastClass {
        throw_at_eip(ctx, RuntimeHelper::ThrowInvalidCastException);
    } else {
        ctx.asm.mov(Reg::T0, Reg::Zero);
    }
    ctx.asm.bind(done);
    ctx.asm.push(Reg::T0);
    Ok(())
}

pub(super) fn throw(ctx: &mut Ctx<'_>) {
    ctx.asm.jal(RuntimeHelper::Throw.symbol());
}

pub(super) fn init_object(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let access = Access::of_type(ctx.tables.resolve_type(instr)?, ctx.pointer_size());
    let align = if ctx.policy.assume_aligned_indirect {
        access.natural_alignment()
    } else {
        1
    };
    ctx.asm.pop(Reg::T0);
    if ctx.policy.guard_indirect_access {
        null_check(ctx, Reg::T0);
    }
    zero_memory(&mut ctx.asm, Reg::T0, 0, access.storage, align);
    Ok(())
}
