//! MIPS32 backend.
//!
//! Same operand-stack discipline as the x86 target: values live on the
//! machine stack between templates. Conditions are materialized with
//! `slt`/`sltu` and tested with `beq`/`bne` against `$zero`; every branch and
//! jump carries a `nop` in its delay slot.
//!
//! # Register Convention
//!
//! | Role                 | Registers     |
//! |----------------------|---------------|
//! | operand A (lo : hi)  | `$t0` : `$t1` |
//! | operand B (lo : hi)  | `$t2` : `$t3` |
//! | scratch              | `$t4`..`$t6`  |
//! | byte assembly        | `$t7`         |
//! | condition flag       | `$t8`         |
//! | immediates, targets  | `$t9`         |
//! | helper results       | `$v0`, `$v1`  |
//! | frame pointer        | `$fp`         |
//!
//! Loads and stores must be naturally aligned, so memory templates pick
//! their access width from what the address is known to guarantee.

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

pub use inst::{Alu3Op, BranchCmp, ImmOp, MemWidth, MipsInst, Reg, ShiftImmOp, ZeroCmp};

use super::{Arch, TargetBackend};
use crate::context::EmitContext;
use crate::options::TargetPolicy;
use crate::simulate::StackEffect;
use kiln_core::{CompileResult, IlInstruction, OpFamily};

pub(crate) type Ctx<'a> = EmitContext<'a, MipsInst>;

/// The MIPS32 (little-endian, O32-like) target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mips32;

impl TargetBackend for Mips32 {
    type Inst = MipsInst;

    const ARCH: Arch = Arch::Mips32;

    /// No hardware trap backs a null raw pointer and misaligned words fault,
    /// so indirect access is guarded and split into bytes.
    fn default_policy() -> TargetPolicy {
        TargetPolicy {
            guard_indirect_access: true,
            assume_aligned_indirect: false,
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
