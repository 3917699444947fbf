//! Frame slots, constants and stack shuffles.

use super::Ctx;
use super::inst::{Mem, Reg};
use crate::frame::FrameSlot;
use crate::runtime::RuntimeHelper;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, DescriptorTable, IlInstruction, OpCode, OpFamily};

fn slot(ctx: &Ctx<'_>, instr: &IlInstruction) -> CompileResult<FrameSlot> {
    let index = instr.index()?;
    let slot = match instr.op.family() {
        OpFamily::LoadArg | OpFamily::LoadArgAddress | OpFamily::StoreArg => ctx.frame.arg(index),
        _ => ctx.frame.local(index),
    };
    slot.copied()
        .ok_or_else(|| ctx.stack_shape(format!("frame slot {} out of range", index)))
}

/// `ldarg`/`starg`/`ldarga` and the local forms.
pub(super) fn frame_slot(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let slot = slot(ctx, instr)?;
    let base = Mem::base(Reg::Ebp, slot.offset);
    match instr.op.family() {
        OpFamily::LoadArg | OpFamily::LoadLocal => {
            for word in (0..slot.item.words()).rev() {
                ctx.asm.push_m(base.offset(4 * word as i32));
            }
        }
        OpFamily::StoreArg | OpFamily::StoreLocal => {
            for word in 0..slot.item.words() {
                ctx.asm.pop_m(base.offset(4 * word as i32));
            }
        }
        _ => {
            ctx.asm.lea(Reg::Eax, base);
            ctx.asm.push_r(Reg::Eax);
        }
    }
    Ok(())
}

/// Constants, null, string literals, tokens, function pointers and `sizeof`.
pub(super) fn constant(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    match instr.op.family() {
        OpFamily::LoadConst if instr.op == OpCode::LdcI8 => {
            let value = instr.operand_i64()?;
            ctx.asm.push_i((value >> 32) as i32);
            ctx.asm.push_i(value as i32);
        }
        OpFamily::LoadConst => {
            let value = instr.const_i32()?;
            ctx.asm.push_i(value);
        }
        OpFamily::LoadNull => ctx.asm.push_i(0),
        OpFamily::LoadString => {
            let symbol = ctx.tables.resolve_string(instr)?.symbol.clone();
            ctx.asm.push_addr(symbol);
        }
        OpFamily::LoadToken => {
            let symbol = if let Some(id) = instr.type_ref {
                ctx.tables.type_for(id, instr)?.symbol.clone()
            } else if instr.field_ref.is_some() {
                ctx.tables.resolve_field(instr)?.symbol.clone()
            } else {
                ctx.tables.resolve_method(instr)?.symbol.clone()
            };
            ctx.asm.push_addr(symbol);
        }
        OpFamily::LoadFunction => {
            let symbol = ctx.tables.resolve_method(instr)?.symbol.clone();
            ctx.asm.push_addr(symbol);
        }
        _ => {
            let ty = ctx.tables.resolve_type(instr)?;
            let size = DescriptorTable::storage_size(ty, ctx.pointer_size());
            ctx.asm.push_i(size as i32);
        }
    }
    Ok(())
}

/// Duplicate the top item one word at a time.
pub(super) fn dup(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    let size = effect.result().size;
    for _ in 0..size / 4 {
        ctx.asm.push_m(Mem::base(Reg::Esp, size as i32 - 4));
    }
    Ok(())
}

/// Discard the top item; a fresh allocation is released first.
pub(super) fn pop(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    let item = effect.operand(0);
    if item.is_new_gc_object {
        ctx.asm.call_sym(RuntimeHelper::DecrementRefCount.symbol());
    }
    ctx.asm.drop_bytes(item.size);
    Ok(())
}
