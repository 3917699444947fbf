//! Reference emulators for emitted code.
//!
//! An [`Image`] links compiled methods with the runtime data the templates
//! expect (type descriptors, method tables, statics, string literals, a
//! bump-allocated heap). [`X86Machine`] and [`MipsMachine`] then interpret the
//! instruction lists directly; no encoding step is involved. Runtime helpers
//! run natively and report exceptions and halts as [`Fault`]s.
//!
//! The emulators exist to check templates against their stack effects, so
//! every executed instruction is traced with the stack and frame pointers.
//!
//! # Address Map
//!
//! | Range                        | Contents                                |
//! |------------------------------|-----------------------------------------|
//! | `0x0000_0000..0x0000_1000`   | unmapped, every access faults           |
//! | `0x0000_1000..`              | type descriptors, tables, statics       |
//! | `0x0010_0000..`              | heap                                    |
//! | `..0x0040_0000`              | stack, growing down                     |
//! | `0x8000_0000..`              | code, one slot of 4 per instruction     |
//! | `0xF000_0000..`              | runtime helpers                         |

mod image;
mod memory;
mod mips;
mod x86;

pub use image::{Image, ImageConfig, SpanSite};
pub use memory::Memory;
pub use mips::MipsMachine;
pub use x86::X86Machine;

use crate::backend::{Mips32, TargetBackend, TargetInst, X86};
use crate::label::Label;
use kiln_core::Symbol;
use thiserror::Error;

// =============================================================================
// Address Map
// =============================================================================

/// Accesses below this address fault.
pub const NULL_GUARD: u32 = 0x1000;
pub const DATA_BASE: u32 = 0x1000;
pub const HEAP_BASE: u32 = 0x10_0000;
/// Highest heap capacity an image accepts.
pub const HEAP_LIMIT: u32 = 0x20_0000;
pub const MEMORY_SIZE: u32 = 0x40_0000;
pub const STACK_TOP: u32 = MEMORY_SIZE - 16;
pub const CODE_BASE: u32 = 0x8000_0000;
pub const HELPER_BASE: u32 = 0xF000_0000;
/// Return address handed to the outermost call; reaching it ends a run.
pub const RETURN_SENTINEL: u32 = 0xFFFF_FFF0;

// =============================================================================
// Faults
// =============================================================================

/// Abnormal end of an emulated run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("NullReferenceException raised at {eip:#010x}")]
    NullReference { eip: u32 },

    #[error("IndexOutOfRangeException raised at {eip:#010x}")]
    IndexOutOfRange { eip: u32 },

    #[error("InvalidCastException raised at {eip:#010x}")]
    InvalidCast { eip: u32 },

    #[error("exception object {object:#010x} thrown")]
    Thrown { object: u32 },

    #[error("runtime halted with reason {code}")]
    Halt { code: u32 },

    #[error("memory fault at {address:#010x}")]
    MemoryFault { address: u32 },

    #[error("unaligned access at {address:#010x}")]
    Unaligned { address: u32 },

    #[error("integer division fault")]
    DivideByZero,

    #[error("unknown symbol `{0}`")]
    UnknownSymbol(Symbol),

    #[error("unbound label `{0}`")]
    UnboundLabel(Label),

    #[error("no instruction at {address:#010x}")]
    InvalidInstruction { address: u32 },

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("stack pointer {actual:#010x} after return, expected {expected:#010x}")]
    StackImbalance { expected: u32, actual: u32 },
}

pub type EmuResult<T> = Result<T, Fault>;

// =============================================================================
// Machines
// =============================================================================

/// One argument of an emulated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackValue {
    Word(u32),
    /// Pushed high word first.
    Long(u64),
}

impl StackValue {
    #[inline]
    pub const fn bytes(self) -> u32 {
        match self {
            StackValue::Word(_) => 4,
            StackValue::Long(_) => 8,
        }
    }
}

impl From<i32> for StackValue {
    fn from(value: i32) -> Self {
        StackValue::Word(value as u32)
    }
}

impl From<u32> for StackValue {
    fn from(value: u32) -> Self {
        StackValue::Word(value)
    }
}

impl From<i64> for StackValue {
    fn from(value: i64) -> Self {
        StackValue::Long(value as u64)
    }
}

impl From<u64> for StackValue {
    fn from(value: u64) -> Self {
        StackValue::Long(value)
    }
}

/// Machine state when an instruction was about to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// Index into the image's code.
    pub index: usize,
    pub sp: u32,
    pub fp: u32,
}

/// An interpreter for one target's instruction vocabulary.
pub trait Machine {
    type Inst: TargetInst;

    fn new(image: Image<Self::Inst>) -> Self;

    fn image(&self) -> &Image<Self::Inst>;

    fn image_mut(&mut self) -> &mut Image<Self::Inst>;

    /// Call `entry` with `args` (first argument deepest) and a
    /// `return_bytes` return slot, run to completion and return the slot's
    /// words, low word first.
    fn invoke(
        &mut self,
        entry: &Symbol,
        args: &[StackValue],
        return_bytes: u32,
    ) -> EmuResult<Vec<u32>>;

    /// Instructions executed by the last [`invoke`](Machine::invoke).
    fn trace(&self) -> &[TraceEntry];
}

/// Backends with a reference emulator.
pub trait Emulated: TargetBackend {
    type Machine: Machine<Inst = Self::Inst>;
}

impl Emulated for X86 {
    type Machine = X86Machine;
}

impl Emulated for Mips32 {
    type Machine = MipsMachine;
}

/// Stack pointer expected once a call with `args` and a `return_bytes` slot
/// has returned.
#[inline]
pub(crate) fn expected_return_sp(args: &[StackValue], return_bytes: u32) -> u32 {
    let pushed: u32 = args.iter().map(|arg| arg.bytes()).sum();
    STACK_TOP - pushed - return_bytes
}

/// Words pushed for `args`, in push order.
pub(crate) fn argument_words(args: &[StackValue]) -> Vec<u32> {
    let mut words = Vec::with_capacity(args.len() * 2);
    for arg in args {
        match *arg {
            StackValue::Word(value) => words.push(value),
            StackValue::Long(value) => {
                words.push((value >> 32) as u32);
                words.push(value as u32);
            }
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_words_push_high_first() {
        let args = [StackValue::from(7i32), StackValue::from(0x1_0000_0002u64)];
        assert_eq!(argument_words(&args), vec![7, 1, 2]);
        assert_eq!(expected_return_sp(&args, 4), STACK_TOP - 16);
    }

    #[test]
    fn test_fault_messages() {
        assert_eq!(
            Fault::MemoryFault { address: 4 }.to_string(),
            "memory fault at 0x00000004"
        );
        assert_eq!(Fault::Halt { code: 2 }.to_string(), "runtime halted with reason 2");
    }
}
