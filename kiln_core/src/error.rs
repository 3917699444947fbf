//! Compile-time error taxonomy.
//!
//! Every failure aborts translation of the whole method. Variants raised at an
//! instruction carry the opcode and its bytecode position:
//! - `UnsupportedOperand`: floats and opcode shapes without a template
//! - `InvalidStackShape`: operand sizes outside {4, 8}, mismatched pairs, underflow
//! - `UnresolvedDescriptor`: a missing type/field/method/string reference
//!
//! Runtime faults (null dereference, bad index, out of memory) are not
//! compile errors; they compile into calls to runtime helpers.

use crate::opcode::OpCode;
use thiserror::Error;

/// Result type used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

/// Kind of descriptor an instruction failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Type,
    Field,
    Method,
    String,
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DescriptorKind::Type => "type",
            DescriptorKind::Field => "field",
            DescriptorKind::Method => "method",
            DescriptorKind::String => "string",
        })
    }
}

/// Fatal translation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Floating point operand or an opcode variant with no template.
    #[error("unsupported operand for {op} at IL_{position:04X}: {detail}")]
    UnsupportedOperand {
        op: OpCode,
        position: u32,
        detail: String,
    },

    /// Stack shape inconsistent with the opcode.
    #[error("invalid stack shape for {op} at IL_{position:04X}: {detail}")]
    InvalidStackShape {
        op: OpCode,
        position: u32,
        detail: String,
    },

    /// Descriptor reference absent from the record or the table.
    #[error("unresolved {kind} descriptor for {op} at IL_{position:04X}")]
    UnresolvedDescriptor {
        op: OpCode,
        position: u32,
        kind: DescriptorKind,
    },

    /// Branch resolves to a position that starts no instruction.
    #[error("branch {op} at IL_{position:04X} targets IL_{target:04X}, which is not an instruction")]
    InvalidBranchTarget {
        op: OpCode,
        position: u32,
        target: i64,
    },

    /// Operand bytes too short for the encoding.
    #[error("malformed operand for {op} at IL_{position:04X}: expected {expected} bytes, found {actual}")]
    MalformedOperand {
        op: OpCode,
        position: u32,
        expected: usize,
        actual: usize,
    },

    /// Rejected compiler options.
    #[error("invalid compiler options: {0}")]
    InvalidOptions(String),
}

impl CompileError {
    #[inline]
    pub fn unsupported(op: OpCode, position: u32, detail: impl Into<String>) -> Self {
        CompileError::UnsupportedOperand {
            op,
            position,
            detail: detail.into(),
        }
    }

    #[inline]
    pub fn stack_shape(op: OpCode, position: u32, detail: impl Into<String>) -> Self {
        CompileError::InvalidStackShape {
            op,
            position,
            detail: detail.into(),
        }
    }

    #[inline]
    pub fn unresolved(op: OpCode, position: u32, kind: DescriptorKind) -> Self {
        CompileError::UnresolvedDescriptor { op, position, kind }
    }

    /// Opcode the error originates at, if any.
    pub fn op(&self) -> Option<OpCode> {
        match self {
            CompileError::UnsupportedOperand { op, .. }
            | CompileError::InvalidStackShape { op, .. }
            | CompileError::UnresolvedDescriptor { op, .. }
            | CompileError::InvalidBranchTarget { op, .. }
            | CompileError::MalformedOperand { op, .. } => Some(*op),
            CompileError::InvalidOptions(_) => None,
        }
    }

    /// Bytecode position the error originates at, if any.
    pub fn position(&self) -> Option<u32> {
        match self {
            CompileError::UnsupportedOperand { position, .. }
            | CompileError::InvalidStackShape { position, .. }
            | CompileError::UnresolvedDescriptor { position, .. }
            | CompileError::InvalidBranchTarget { position, .. }
            | CompileError::MalformedOperand { position, .. } => Some(*position),
            CompileError::InvalidOptions(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_op_and_position() {
        let err = CompileError::unsupported(OpCode::LdcR8, 0x1A, "floating point");
        assert_eq!(
            err.to_string(),
            "unsupported operand for ldc.r8 at IL_001A: floating point"
        );
        assert_eq!(err.op(), Some(OpCode::LdcR8));
        assert_eq!(err.position(), Some(0x1A));
    }

    #[test]
    fn test_unresolved_display() {
        let err = CompileError::unresolved(OpCode::Ldfld, 3, DescriptorKind::Field);
        assert_eq!(err.to_string(), "unresolved field descriptor for ldfld at IL_0003");
    }

    #[test]
    fn test_options_error_has_no_position() {
        let err = CompileError::InvalidOptions("pointer size 8".into());
        assert_eq!(err.position(), None);
        assert_eq!(err.op(), None);
    }
}
