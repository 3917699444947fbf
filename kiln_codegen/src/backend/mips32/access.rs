//! Field, indirect and array element access.
//!
//! Each access picks the widest load or store the address provably allows:
//! fields from their offset, elements from the stride and header size,
//! statics are word-aligned, raw pointers only when the policy says so.

use super::Ctx;
use super::checks::{element_base, null_check};
use super::inst::Reg;
use super::memory::{offset_alignment, pop_to_memory, push_from_memory, stride_alignment};
use crate::backend::Access;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction, OpFamily};

pub(super) fn field(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let tables = ctx.tables;
    let field = tables.resolve_field(instr)?;
    let ty = tables.type_for(field.field_type, instr)?;
    let access = Access::of_type(ty, ctx.pointer_size());
    let offset = ctx.displacement(field.offset as i64)?;
    ctx.displacement(field.offset as i64 + access.storage as i64)?;
    let align = offset_alignment(field.offset);
    let symbol = field.symbol.clone();

    match instr.op.family() {
        OpFamily::LoadField => {
            ctx.asm.pop(Reg::T0);
            null_check(ctx, Reg::T0);
            push_from_memory(&mut ctx.asm, Reg::T0, offset, access.storage, access.signed, align);
        }
        OpFamily::LoadFieldAddress => {
            ctx.asm.pop(Reg::T0);
            null_check(ctx, Reg::T0);
            ctx.asm.addiu(Reg::T0, Reg::T0, offset);
            ctx.asm.push(Reg::T0);
        }
        OpFamily::StoreField => {
            let value = ctx.displacement(effect.operand(0).size as i64)?;
            ctx.asm.lw(Reg::T0, value, Reg::Sp);
            null_check(ctx, Reg::T0);
            pop_to_memory(&mut ctx.asm, Reg::T0, offset, access.storage, align);
            ctx.asm.drop_bytes(4);
        }
        OpFamily::LoadStaticField => {
            ctx.asm.la(Reg::T0, symbol);
            push_from_memory(&mut ctx.asm, Reg::T0, 0, access.storage, access.signed, 4);
        }
        OpFamily::LoadStaticFieldAddress => ctx.asm.push_addr(symbol),
        _ => {
            ctx.asm.la(Reg::T0, symbol);
            pop_to_memory(&mut ctx.asm, Reg::T0, 0, access.storage, 4);
        }
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
    let align = if ctx.policy.assume_aligned_indirect {
        access.natural_alignment()
    } else {
        1
    };

    if instr.op.family() == OpFamily::LoadIndirect {
        ctx.asm.pop(Reg::T0);
        if ctx.policy.guard_indirect_access {
            null_check(ctx, Reg::T0);
        }
        push_from_memory(&mut ctx.asm, Reg::T0, 0, access.storage, access.signed, align);
    } else {
        let value = ctx.displacement(effect.operand(0).size as i64)?;
        ctx.asm.lw(Reg::T0, value, Reg::Sp);
        if ctx.policy.guard_indirect_access {
            null_check(ctx, Reg::T0);
        }
        pop_to_memory(&mut ctx.asm, Reg::T0, 0, access.storage, align);
        ctx.asm.drop_bytes(4);
    }
    Ok(())
}

pub(super) fn length(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    let offset = ctx.layout().array_length_offset as i32;
    ctx.asm.pop(Reg::T0);
    null_check(ctx, Reg::T0);
    ctx.asm.lw(Reg::T6, offset, Reg::T0);
    ctx.asm.push(Reg::T6);
    Ok(())
}

/// `ldelem.*`, `ldelema`, `stelem.*`: array in `$t0`, index in `$t2`.
pub(super) fn element(
    ctx: &mut Ctx<'_>,
    instr: &IlInstruction,
    effect: &StackEffect,
) -> CompileResult<()> {
    let access = match instr.op.value_kind() {
        Some(kind) => Access::of_kind(kind, instr, ctx.tables, ctx.pointer_size())?,
        None => Access::of_type(ctx.tables.resolve_type(instr)?, ctx.pointer_size()),
    };
    let header_size = ctx.layout().array_header_size;
    let header = ctx.displacement(header_size as i64 + access.storage as i64)? - access.storage as i32;
    let align = stride_alignment(access.storage).min(offset_alignment(header_size));

    match instr.op.family() {
        OpFamily::LoadElement => {
            ctx.asm.pop(Reg::T2);
            ctx.asm.pop(Reg::T0);
            element_base(ctx, Reg::T0, Reg::T2, access.storage);
            push_from_memory(&mut ctx.asm, Reg::T0, header, access.storage, access.signed, align);
        }
        OpFamily::LoadElementAddress => {
            ctx.asm.pop(Reg::T2);
            ctx.asm.pop(Reg::T0);
            element_base(ctx, Reg::T0, Reg::T2, access.storage);
            ctx.asm.addiu(Reg::T0, Reg::T0, header);
            ctx.asm.push(Reg::T0);
        }
        _ => {
            let value = ctx.displacement(effect.operand(0).size as i64 + 4)?;
            ctx.asm.lw(Reg::T0, value, Reg::Sp);
            ctx.asm.lw(Reg::T2, value - 4, Reg::Sp);
            element_base(ctx, Reg::T0, Reg::T2, access.storage);
            pop_to_memory(&mut ctx.asm, Reg::T0, header, access.storage, align);
            ctx.asm.drop_bytes(8);
        }
    }
    Ok(())
}
