//! Frame slots, constants and stack shuffles.

use super::Ctx;
use super::inst::Reg;
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

/// `ldarg`/`starg`/`ldarga` and the local forms. Frame slots are whole words.
pub(super) fn frame_slot(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    let slot = slot(ctx, instr)?;
    let words = slot.item.words();
    let base = ctx.displacement(slot.offset as i64)?;
    ctx.displacement(slot.offset as i64 + 4 * words as i64)?;

    match instr.op.family() {
        OpFamily::LoadArg | OpFamily::LoadLocal => {
            for word in (0..words).rev() {
                ctx.asm.lw(Reg::T6, base + 4 * word as i32, Reg::Fp);
                ctx.asm.push(Reg::T6);
            }
        }
        OpFamily::StoreArg | OpFamily::StoreLocal => {
            for word in 0..words {
                ctx.asm.pop(Reg::T6);
                ctx.asm.sw(Reg::T6, base + 4 * word as i32, Reg::Fp);
            }
        }
        _ => {
            ctx.asm.addiu(Reg::T6, Reg::Fp, base);
            ctx.asm.push(Reg::T6);
        }
    }
    Ok(())
}

pub(super) fn constant(ctx: &mut Ctx<'_>, instr: &IlInstruction) -> CompileResult<()> {
    match instr.op.family() {
        OpFamily::LoadConst if instr.op == OpCode::LdcI8 => {
            let value = instr.operand_i64()?;
            ctx.asm.push_imm((value >> 32) as i32);
            ctx.asm.push_imm(value as i32);
        }
        OpFamily::LoadConst => {
            let value = instr.const_i32()?;
            ctx.asm.push_imm(value);
        }
        OpFamily::LoadNull => ctx.asm.push_imm(0),
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
            ctx.asm.push_imm(size as i32);
        }
    }
    Ok(())
}

/// Re-push the top item word by word; each push moves `$sp`, so the source
/// offset stays fixed.
pub(super) fn dup(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    let size = effect.result().size;
    let offset = ctx.displacement(size as i64 - 4)?;
    for _ in 0..size / 4 {
        ctx.asm.lw(Reg::T6, offset, Reg::Sp);
        ctx.asm.push(Reg::T6);
    }
    Ok(())
}

pub(super) fn pop(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    let item = effect.operand(0);
    if item.is_new_gc_object {
        ctx.asm.jal(RuntimeHelper::DecrementRefCount.symbol());
    }
    ctx.asm.drop_bytes(item.size);
    Ok(())
}
