//! Allocation, type tests, `throw` and `initobj`.

use super::Ctx;
use super::checks::{null_check, throw_at_eip};
use super::inst::{Mem, Reg};
use super::memory::zero_memory;
use crate::backend::Access;
use crate::runtime::{HaltReason, RuntimeHelper};
use kiln_core::{CompileResult, DescriptorTable, IlInstruction, OpFamily};

/// Halt with `OutOfMemory` unless the allocation in `eax` succeeded.
fn check_allocation(ctx: &mut Ctx<'_>) {
    let allocated = ctx.new_label("Allocated");
    ctx.asm.test_rr(Reg::Eax, Reg::Eax);
    ctx.asm.jne(allocated.clone());
    ctx.asm.push_i(HaltReason::OutOfMemory.code() as i32);
    ctx.asm.call_sym(RuntimeHelper::Halt.symbol());
    ctx.asm.bind(allocated);
}

/// `newobj`.
///
/// Delegates keep the function pointer and drop the target object. Classes
/// are allocated through `NewObj`; the constructor arguments then move down
/// two slots, one for `this` and one for the result that survives the call.
pub(super) fn new_object(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let tables = ctx.tables;
    let ctor = tables.resolve_method(instr)?;
    let declaring = tables.type_for(ctor.declaring_type, instr)?;

    if declaring.is_delegate {
        ctx.asm.pop_r(Reg::Eax);
        ctx.asm.drop_bytes(4);
        ctx.asm.push_r(Reg::Eax);
        return Ok(());
    }

    let mut params = 0;
    for param in &ctor.params {
        let ty = tables.type_for(*param, instr)?;
        params += DescriptorTable::stack_item(ty, ctx.pointer_size()).size;
    }
    let type_symbol = declaring.symbol.clone();
    let ctor_symbol = ctor.symbol.clone();

    ctx.asm.push_addr(type_symbol);
    ctx.asm.reserve_bytes(RuntimeHelper::NewObj.return_bytes());
    ctx.asm.call_sym(RuntimeHelper::NewObj.symbol());
    ctx.asm.pop_r(Reg::Eax);
    ctx.asm.drop_bytes(RuntimeHelper::NewObj.arg_bytes());
    check_allocation(ctx);

    ctx.asm.reserve_bytes(8);
    for word in 0..params / 4 {
        let offset = 4 * word as i32;
        ctx.asm.mov_rm(Reg::Esi, Mem::base(Reg::Esp, offset + 8));
        ctx.asm.mov_mr(Mem::base(Reg::Esp, offset), Reg::Esi);
    }
    ctx.asm.mov_mr(Mem::base(Reg::Esp, params as i32), Reg::Eax);
    ctx.asm.mov_mr(Mem::base(Reg::Esp, params as i32 + 4), Reg::Eax);
    ctx.asm.call_sym(ctor_symbol);
    ctx.asm.drop_bytes(params + 4);
    Ok(())
}

/// `newarr`: the length is already on the stack as the first helper argument.
pub(super) fn new_array(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let element = ctx.tables.resolve_type(instr)?.symbol.clone();
    ctx.asm.push_addr(element);
    ctx.asm.reserve_bytes(RuntimeHelper::NewArr.return_bytes());
    ctx.asm.call_sym(RuntimeHelper::NewArr.symbol());
    ctx.asm.pop_r(Reg::Eax);
    ctx.asm.drop_bytes(RuntimeHelper::NewArr.arg_bytes());
    check_allocation(ctx);
    ctx.asm.push_r(Reg::Eax);
    Ok(())
}

/// `isinst` and `castclass`: walk the base-type chain of the object's type.
///
/// Null passes through both. A failed `isinst` yields null, a failed
/// `castclass` throws `InvalidCastException`.
pub(super) fn type_test(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let target = ctx.tables.resolve_type(instr)?.symbol.clone();
    let layout = *ctx.layout();
    let scan = ctx.new_label("Scan");
    let failed = ctx.new_label("Failed");
    let done = ctx.new_label("Done");

    ctx.asm.pop_r(Reg::Eax);
    ctx.asm.test_rr(Reg::Eax, Reg::Eax);
    ctx.asm.je(done.clone());
    ctx.asm.mov_rm(Reg::Ecx, Mem::base(Reg::Eax, layout.type_pointer_offset as i32));

    ctx.asm.bind(scan.clone());
    ctx.asm.test_rr(Reg::Ecx, Reg::Ecx);
    ctx.asm.je(failed.clone());
    ctx.asm.cmp_r_addr(Reg::Ecx, target);
    ctx.asm.je(done.clone());
    ctx.asm.mov_rm(Reg::Ecx, Mem::base(Reg::Ecx, layout.type_base_type_offset as i32));
    ctx.asm.jmp(scan);

    ctx.asm.bind(failed);
    if instr.op.family() == OpFamily::CastClass {
        throw_at_eip(ctx, RuntimeHelper::ThrowInvalidCastException);
    } else {
        ctx.asm.xor_rr(Reg::Eax, Reg::Eax);
    }
    ctx.asm.bind(done);
    ctx.asm.push_r(Reg::Eax);
    Ok(())
}

/// `throw`: the exception object is the helper's argument.
pub(super) fn throw(ctx: &mut Ctx<'_>) {
    ctx.asm.call_sym(RuntimeHelper::Throw.symbol());
}

/// `initobj`: zero the value at the popped address.
pub(super) fn init_object(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let access = Access::of_type(ctx.tables.resolve_type(instr)?, ctx.pointer_size());
    ctx.asm.pop_r(Reg::Eax);
    if ctx.policy.guard_indirect_access {
        null_check(ctx, Reg::Eax);
    }
    zero_memory(&mut ctx.asm, &Mem::base(Reg::Eax, 0), access.storage);
    Ok(())
}
