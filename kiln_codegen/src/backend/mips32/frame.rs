//! Prologue, epilogue, `ret`, and result cleanup after calls.
//!
//! `jal` leaves the return address in `$ra`; the prologue spills it so the
//! frame looks the same as on x86: saved `$fp` at `0($fp)`, return address
//! at `4($fp)`, return slot at `8($fp)`.

use super::Ctx;
use super::inst::Reg;
use crate::frame::FrameLayout;
use crate::simulate::StackEffect;
use kiln_core::CompileResult;

pub(super) fn prologue(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    ctx.asm.push(Reg::Ra);
    ctx.asm.push(Reg::Fp);
    ctx.asm.mov(Reg::Fp, Reg::Sp);
    for _ in 0..ctx.frame.local_bytes() / 4 {
        ctx.asm.push(Reg::Zero);
    }
    Ok(())
}

pub(super) fn epilogue(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    let slot = FrameLayout::RETURN_SLOT_OFFSET;
    match ctx.frame.return_bytes() {
        4 => ctx.asm.sw(Reg::V0, slot, Reg::Fp),
        8 => {
            ctx.asm.sw(Reg::V0, slot, Reg::Fp);
            ctx.asm.sw(Reg::V1, slot + 4, Reg::Fp);
        }
        _ => {}
    }
    ctx.asm.mov(Reg::Sp, Reg::Fp);
    ctx.asm.pop(Reg::Fp);
    ctx.asm.pop(Reg::Ra);
    ctx.asm.jr(Reg::Ra);
    Ok(())
}

/// Pop the return value into `$v0`/`$v1` (or straight into the return slot)
/// and jump to the epilogue.
pub(super) fn ret(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    match effect.popped_bytes() {
        0 => {}
        4 => ctx.asm.pop(Reg::V0),
        8 => {
            ctx.asm.pop(Reg::V0);
            ctx.asm.pop(Reg::V1);
        }
        bytes => {
            let slot = FrameLayout::RETURN_SLOT_OFFSET;
            ctx.displacement(slot as i64 + bytes as i64)?;
            for word in 0..bytes / 4 {
                ctx.asm.pop(Reg::T6);
                ctx.asm.sw(Reg::T6, slot + 4 * word as i32, Reg::Fp);
            }
        }
    }
    let end = ctx.end_label();
    ctx.asm.j(end);
    Ok(())
}

/// Replace `args` bytes of arguments plus the `ret`-byte return slot on top
/// of the stack with just the return value.
pub(super) fn after_call(ctx: &mut Ctx<'_>, ret: u32, args: u32) {
    if args == 0 {
        return;
    }
    match ret {
        0 => ctx.asm.drop_bytes(args),
        4 => {
            ctx.asm.pop(Reg::T0);
            ctx.asm.drop_bytes(args);
            ctx.asm.push(Reg::T0);
        }
        8 => {
            ctx.asm.pop(Reg::T0);
            ctx.asm.pop(Reg::T1);
            ctx.asm.drop_bytes(args);
            ctx.asm.push(Reg::T1);
            ctx.asm.push(Reg::T0);
        }
        _ => {
            for word in (0..ret / 4).rev() {
                let offset = 4 * word as i32;
                ctx.asm.lw(Reg::T6, offset, Reg::Sp);
                ctx.asm.sw(Reg::T6, args as i32 + offset, Reg::Sp);
            }
            ctx.asm.drop_bytes(args);
        }
    }
}
