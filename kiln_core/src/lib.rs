//! # Kiln Core
//!
//! Data model shared by the Kiln bytecode-to-native code generator.
//!
//! - **Opcodes**: the bytecode catalogue and its family classification
//! - **Instructions**: resolved instruction records and a builder for them
//! - **Descriptors**: type, field, method and string metadata
//! - **Stack**: the simulated operand stack
//! - **Errors**: the compile error taxonomy

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod stack;

pub use descriptor::{
    DescriptorTable, FieldDescriptor, FieldId, MethodDescriptor, MethodId, StringId,
    StringLiteral, Symbol, TypeDescriptor, TypeId,
};
pub use error::{CompileError, CompileResult, DescriptorKind};
pub use instruction::{IlInstruction, InstructionBuilder, MethodBody};
pub use opcode::{
    BinaryOp, BranchCondition, CompareOp, ConvTarget, OpCode, OpFamily, OperandKind, ShiftOp,
    UnaryOp, ValueKind,
};
pub use stack::{OperandStack, StackItem};
