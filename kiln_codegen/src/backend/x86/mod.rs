//! x86 (IA-32) backend.
//!
//! Templates keep the operand stack on the machine stack: every value the
//! simulator pushes is a real `push`, every pop a real `pop`. Registers only
//! live inside one template.
//!
//! # Register Convention
//!
//! | Role                 | Registers     |
//! |----------------------|---------------|
//! | operand A (lo : hi)  | `eax` : `edx` |
//! | operand B (lo : hi)  | `ebx` : `ecx` |
//! | scratch              | `esi`, `edi`  |
//! | frame pointer        | `ebp`         |
//!
//! Double-word values are pushed high word first, so the low word sits at the
//! lower address.

mod access;
mod arith;
mod asm;
mod calls;
mod checks;
mod compare;
mod control;
mod convert;
mod frame;
pub mod inst;
mod memory;
mod objects;
mod shift;
mod stack;

pub use inst::{Cond, Mem, Operand, Reg, Width, X86Inst};

use super::{Arch, TargetBackend};
use crate::context::EmitContext;
use crate::options::TargetPolicy;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction, OpFamily};

pub(crate) type Ctx<'a> = EmitContext<'a, X86Inst>;

/// The IA-32 target.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86;

impl TargetBackend for X86 {
    type Inst = X86Inst;

    const ARCH: Arch = Arch::X86;

    /// Unaligned access is legal and the runtime traps null dereferences of
    /// raw pointers, so indirect access is neither guarded nor split.
    fn default_policy() -> TargetPolicy {
        TargetPolicy {
            guard_indirect_access: false,
            assume_aligned_indirect: true,
        }
    }

    fn emit(ctx: &mut Ctx<'_>, instr: &IlInstruction, effect: &StackEffect) -> CompileResult<()> {
        match instr.op.family() {
            OpFamily::Nop => {
                ctx.asm.nop();
                Ok(())
            }
            OpFamily::MethodStart => frame::prologue(ctx),
            OpFamily::MethodEnd => frame::epilogue(ctx),
            OpFamily::Return => frame::ret(ctx, effect),

            OpFamily::LoadArg
            | OpFamily::LoadArgAddress
            | OpFamily::StoreArg
            | OpFamily::LoadLocal
            | OpFamily::LoadLocalAddress
            | OpFamily::StoreLocal => stack::frame_slot(ctx, instr),
            OpFamily::LoadConst
            | OpFamily::LoadNull
            | OpFamily::LoadString
            | OpFamily::LoadToken
            | OpFamily::LoadFunction
            | OpFamily::SizeOf => stack::constant(ctx, instr),
            OpFamily::Dup => stack::dup(ctx, effect),
            OpFamily::Pop => stack::pop(ctx, effect),

            OpFamily::Binary => arith::binary(ctx, instr, effect),
            OpFamily::Unary => arith::unary(ctx, instr, effect),
            OpFamily::Shift => shift::shift(ctx, instr, effect),
            OpFamily::Compare => compare::compare(ctx, instr, effect),
            OpFamily::Convert => convert::convert(ctx, instr, effect),

            OpFamily::Branch => control::branch(ctx, instr, effect),
            OpFamily::Switch => control::switch(ctx, instr),
            OpFamily::Leave => control::leave(ctx, instr, effect),

            OpFamily::LoadField
            | OpFamily::LoadFieldAddress
            | OpFamily::StoreField
            | OpFamily::LoadStaticField
            | OpFamily::LoadStaticFieldAddress
            | OpFamily::StoreStaticField => access::field(ctx, instr, effect),
            OpFamily::LoadIndirect | OpFamily::StoreIndirect => access::indirect(ctx, instr, effect),
            OpFamily::LoadLength => access::length(ctx),
            OpFamily::LoadElement | OpFamily::LoadElementAddress | OpFamily::StoreElement => {
                access::element(ctx, instr, effect)
            }

            OpFamily::Call => calls::call(ctx, instr, effect),
            OpFamily::CallIndirect => calls::call_indirect(ctx, instr, effect),
            OpFamily::CallVirtual => calls::call_virtual(ctx, instr, effect),

            OpFamily::NewObject => objects::new_object(ctx, instr),
            OpFamily::NewArray => objects::new_array(ctx, instr),
            OpFamily::IsInstance | OpFamily::CastClass => objects::type_test(ctx, instr),
            OpFamily::Throw => {
                objects::throw(ctx);
                Ok(())
            }
            OpFamily::InitObject => objects::init_object(ctx, instr),
        }
    }
}
