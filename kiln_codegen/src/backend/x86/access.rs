//! Field, indirect and array element access.
//!
//! Object and array pointers are null-checked before the first dereference;
//! element accesses are bounds-checked before the address is formed. Raw
//! pointers (`ldind`/`stind`) are only checked when the policy asks for it.

use super::Ctx;
use super::checks::{element_base, null_check};
use super::inst::{Mem, Reg};
use super::memory::{pop_to_memory, push_from_memory};
use crate::backend::Access;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction, OpFamily};

/// Instance and static field loads, stores and addresses.
pub(super) fn field(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let tables = ctx.tables;
    let field = tables.resolve_field(instr)?;
    let ty = tables.type_for(field.field_type, instr)?;
    let access = Access::of_type(ty, ctx.pointer_size());
    let offset = field.offset as i32;
    let symbol = field.symbol.clone();

    match instr.op.family() {
        OpFamily::LoadField => {
            ctx.asm.pop_r(Reg::Eax);
            null_check(ctx, Reg::Eax);
            push_from_memory(
                &mut ctx.asm,
                &Mem::base(Reg::Eax, offset),
                access.storage,
                access.signed,
            );
        }
        OpFamily::LoadFieldAddress => {
            ctx.asm.pop_r(Reg::Eax);
            null_check(ctx, Reg::Eax);
            ctx.asm.lea(Reg::Eax, Mem::base(Reg::Eax, offset));
            ctx.asm.push_r(Reg::Eax);
        }
        OpFamily::StoreField => {
            let value = effect.operand(0).size;
            ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Esp, value as i32));
            null_check(ctx, Reg::Eax);
            pop_to_memory(&mut ctx.asm, &Mem::base(Reg::Eax, offset), access.storage);
            ctx.asm.drop_bytes(4);
        }
        OpFamily::LoadStaticField => {
            push_from_memory(
                &mut ctx.asm,
                &Mem::symbol(symbol, 0),
                access.storage,
                access.signed,
            );
        }
        OpFamily::LoadStaticFieldAddress => ctx.asm.push_addr(symbol),
        _ => pop_to_memory(&mut ctx.asm, &Mem::symbol(symbol, 0), access.storage),
    }
    Ok(())
}

/// `ldind.*` and `stind.*`.
pub(super) fn indirect(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let kind = instr
        .op
        .value_kind()
        .ok_or_else(|| ctx.unsupported("not an indirect access"))?;
    let access = Access::of_kind(kind, instr, ctx.tables, ctx.pointer_size())?;
    let target = Mem::base(Reg::Eax, 0);

    if instr.op.family() == OpFamily::LoadIndirect {
        ctx.asm.pop_r(Reg::Eax);
        if ctx.policy.guard_indirect_access {
            null_check(ctx, Reg::Eax);
        }
        push_from_memory(&mut ctx.asm, &target, access.storage, access.signed);
    } else {
        let value = effect.operand(0).size;
        ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Esp, value as i32));
        if ctx.policy.guard_indirect_access {
            null_check(ctx, Reg::Eax);
        }
        pop_to_memory(&mut ctx.asm, &target, access.storage);
        ctx.asm.drop_bytes(4);
    }
    Ok(())
}

/// `ldlen`.
pub(super) fn length(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    let offset = ctx.layout().array_length_offset as i32;
    ctx.asm.pop_r(Reg::Eax);
    null_check(ctx, Reg::Eax);
    ctx.asm.push_m(Mem::base(Reg::Eax, offset));
    Ok(())
}

/// `ldelem.*`, `ldelema`, `stelem.*`.
///
/// The array pointer ends up in `eax` and the index in `ebx`; after
/// [`element_base`] `eax` points at the element minus the header.
pub(super) fn element(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let access = match instr.op.value_kind() {
        Some(kind) => Access::of_kind(kind, instr, ctx.tables, ctx.pointer_size())?,
        None => Access::of_type(ctx.tables.resolve_type(instr)?, ctx.pointer_size()),
    };
    let header = ctx.layout().array_header_size as i32;
    let element = Mem::base(Reg::Eax, header);

    match instr.op.family() {
        OpFamily::LoadElement => {
            ctx.asm.pop_r(Reg::Ebx);
            ctx.asm.pop_r(Reg::Eax);
            element_base(ctx, Reg::Eax, Reg::Ebx, access.storage);
            push_from_memory(&mut ctx.asm, &element, access.storage, access.signed);
        }
        OpFamily::LoadElementAddress => {
            ctx.asm.pop_r(Reg::Ebx);
            ctx.asm.pop_r(Reg::Eax);
            element_base(ctx, Reg::Eax, Reg::Ebx, access.storage);
            ctx.asm.lea(Reg::Eax, element);
            ctx.asm.push_r(Reg::Eax);
        }
        _ => {
            let value = effect.operand(0).size as i32;
            ctx.asm.mov_rm(Reg::Eax, Mem::base(Reg::Esp, value + 4));
            ctx.asm.mov_rm(Reg::Ebx, Mem::base(Reg::Esp, value));
            element_base(ctx, Reg::Eax, Reg::Ebx, access.storage);
            pop_to_memory(&mut ctx.asm, &element, access.storage);
            ctx.asm.drop_bytes(8);
        }
    }
    Ok(())
}
