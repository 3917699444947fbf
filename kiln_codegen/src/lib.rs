//! Instruction selection for a stack-based bytecode.
//!
//! Each bytecode instruction is lowered to a fixed template of target
//! instructions. The templates keep the evaluation stack on the machine stack,
//! so lowering needs only the stack effect of each instruction, which a
//! single forward simulation supplies.
//!
//! # Pipeline
//!
//! ```text
//! MethodBody → bracket (MethodStart/MethodEnd) → preprocess (labels, effects)
//!            → StackWalker + TargetBackend::emit → CompiledMethod
//! ```
//!
//! # Targets
//!
//! - [`X86`]: IA-32, NASM syntax
//! - [`Mips32`]: MIPS32, GAS syntax with explicit delay slots
//!
//! # Example
//!
//! ```
//! use kiln_codegen::{CompilerOptions, X86, compile_method};
//! use kiln_core::{
//!     DescriptorTable, InstructionBuilder, MethodBody, MethodDescriptor, MethodId, OpCode,
//!     TypeDescriptor, TypeId,
//! };
//!
//! let mut tables = DescriptorTable::new();
//! let int32 = tables.add_type(TypeDescriptor::primitive(TypeId(1), "Int32", 4, true));
//! tables.add_type(TypeDescriptor::class(TypeId(2), "Program", 4));
//! let id = MethodId::new(1).unwrap();
//! tables.add_method(
//!     MethodDescriptor::new(id, TypeId(2), "Add")
//!         .with_params(&[int32, int32])
//!         .with_return(int32),
//! );
//!
//! let code = InstructionBuilder::new()
//!     .op(OpCode::Ldarg0)
//!     .op(OpCode::Ldarg1)
//!     .op(OpCode::Add)
//!     .op(OpCode::Ret)
//!     .build()
//!     .unwrap();
//! let body = MethodBody::new(id, code);
//!
//! let compiled = compile_method::<X86>(&body, &tables, &CompilerOptions::new()).unwrap();
//! assert!(compiled.render().contains("add eax, ebx"));
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod backend;
pub mod compiler;
pub mod context;
pub mod emu;
pub mod frame;
pub mod label;
pub mod options;
pub mod preprocess;
pub mod runtime;
pub mod simulate;

pub use backend::{Access, Arch, Comparison, Mips32, Relation, TargetBackend, TargetInst, X86};
pub use compiler::{CompiledMethod, EmittedSpan, compile_all, compile_method};
pub use context::{Assembler, EmitContext};
pub use frame::{FrameLayout, FrameSlot};
pub use label::Label;
pub use options::{CompilerOptions, ObjectLayout, TargetPolicy};
pub use runtime::{HaltReason, RuntimeHelper};
pub use simulate::{SimEnv, StackEffect, StackWalker, Step, simulate};
