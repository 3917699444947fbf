//! Prologue, epilogue, `ret`, and result cleanup after calls.

use super::Ctx;
use super::inst::{Mem, Reg};
use crate::frame::FrameLayout;
use crate::simulate::StackEffect;
use kiln_core::CompileResult;

/// `push ebp; mov ebp, esp` then one zeroed dword per local word.
pub(super) fn prologue(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    ctx.asm.push_r(Reg::Ebp);
    ctx.asm.mov_rr(Reg::Ebp, Reg::Esp);
    for _ in 0..ctx.frame.local_bytes() / 4 {
        ctx.asm.push_i(0);
    }
    Ok(())
}

/// Shared exit: move the result registers into the return slot and unwind.
pub(super) fn epilogue(ctx: &mut Ctx<'_>) -> CompileResult<()> {
    let slot = Mem::base(Reg::Ebp, FrameLayout::RETURN_SLOT_OFFSET);
    match ctx.frame.return_bytes() {
        4 => ctx.asm.mov_mr(slot, Reg::Eax),
        8 => {
            ctx.asm.mov_mr(slot.clone(), Reg::Eax);
            ctx.asm.mov_mr(slot.offset(4), Reg::Edx);
        }
        // Larger values were stored by `ret` itself.
        _ => {}
    }
    ctx.asm.mov_rr(Reg::Esp, Reg::Ebp);
    ctx.asm.pop_r(Reg::Ebp);
    ctx.asm.ret();
    Ok(())
}

/// Pop the return value into `eax`/`edx` (or straight into the return slot)
/// and jump to the epilogue.
pub(super) fn ret(ctx: &mut Ctx<'_>, effect: &StackEffect) -> CompileResult<()> {
    match effect.popped_bytes() {
        0 => {}
        4 => ctx.asm.pop_r(Reg::Eax),
        8 => {
            ctx.asm.pop_r(Reg::Eax);
            ctx.asm.pop_r(Reg::Edx);
        }
        bytes => {
            let slot = Mem::base(Reg::Ebp, FrameLayout::RETURN_SLOT_OFFSET);
            for word in 0..bytes / 4 {
                ctx.asm.pop_m(slot.offset(4 * word as i32));
            }
        }
    }
    let end = ctx.end_label();
    ctx.asm.jmp(end);
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
            ctx.asm.pop_r(Reg::Eax);
            ctx.asm.drop_bytes(args);
            ctx.asm.push_r(Reg::Eax);
        }
        8 => {
            ctx.asm.pop_r(Reg::Eax);
            ctx.asm.pop_r(Reg::Edx);
            ctx.asm.drop_bytes(args);
            ctx.asm.push_r(Reg::Edx);
            ctx.asm.push_r(Reg::Eax);
        }
        _ => {
            // Copy high words first; the destination lies above the source.
            for word in (0..ret / 4).rev() {
                let offset = 4 * word as i32;
                ctx.asm.mov_rm(Reg::Esi, Mem::base(Reg::Esp, offset));
                ctx.asm.mov_mr(Mem::base(Reg::Esp, args as i32 + offset), Reg::Esi);
            }
            ctx.asm.drop_bytes(args);
        }
    }
}
