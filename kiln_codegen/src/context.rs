//! Per-method emission state.
//!
//! Everything a template needs is threaded through one [`EmitContext`]; there
//! is no global translation state, so methods compile independently.

use crate::backend::TargetInst;
use crate::frame::FrameLayout;
use crate::label::Label;
use crate::options::{CompilerOptions, ObjectLayout, TargetPolicy};
use kiln_core::{
    CompileError, CompileResult, DescriptorTable, IlInstruction, MethodDescriptor, OpCode, Symbol,
};

// =============================================================================
// Assembler
// =============================================================================

/// Ordered instruction buffer.
///
/// Architecture-specific emit helpers are inherent impls on
/// `Assembler<X86Inst>` and `Assembler<MipsInst>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembler<I> {
    code: Vec<I>,
}

impl<I> Default for Assembler<I> {
    fn default() -> Self {
        Self { code: Vec::new() }
    }
}

impl<I: TargetInst> Assembler<I> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn emit(&mut self, inst: I) {
        self.code.push(inst);
    }

    /// Define `label` at the current point.
    #[inline]
    pub fn bind(&mut self, label: Label) {
        self.code.push(I::label(label));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[inline]
    pub fn code(&self) -> &[I] {
        &self.code
    }

    pub fn into_code(self) -> Vec<I> {
        self.code
    }
}

// =============================================================================
// Emit Context
// =============================================================================

/// Context passed to every template.
pub struct EmitContext<'a, I> {
    pub asm: Assembler<I>,
    pub tables: &'a DescriptorTable,
    pub options: &'a CompilerOptions,
    pub policy: TargetPolicy,
    pub frame: &'a FrameLayout,
    pub method: &'a MethodDescriptor,
    end_position: u32,
    op: OpCode,
    position: u32,
    label_counter: u32,
}

impl<'a, I: TargetInst> EmitContext<'a, I> {
    pub fn new(
        tables: &'a DescriptorTable,
        options: &'a CompilerOptions,
        policy: TargetPolicy,
        frame: &'a FrameLayout,
        method: &'a MethodDescriptor,
        end_position: u32,
    ) -> Self {
        Self {
            asm: Assembler::new(),
            tables,
            options,
            policy,
            frame,
            method,
            end_position,
            op: OpCode::MethodStart,
            position: 0,
            label_counter: 0,
        }
    }

    /// Start the template of `instr`.
    pub fn begin(&mut self, instr: &IlInstruction) {
        self.op = instr.op;
        self.position = instr.position;
        self.label_counter = 0;
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[inline]
    pub fn layout(&self) -> &ObjectLayout {
        &self.options.layout
    }

    #[inline]
    pub fn pointer_size(&self) -> u32 {
        self.options.pointer_size
    }

    #[inline]
    pub fn scope(&self) -> &Symbol {
        &self.method.symbol
    }

    /// Label of the instruction at `position`.
    #[inline]
    pub fn label_at(&self, position: u32) -> Label {
        Label::at(self.method.symbol.clone(), position)
    }

    /// Label of a resolved branch target.
    pub fn target_label(&self, target: i64) -> CompileResult<Label> {
        u32::try_from(target)
            .map(|position| self.label_at(position))
            .map_err(|_| CompileError::InvalidBranchTarget {
                op: self.op,
                position: self.position,
                target,
            })
    }

    /// Label of the epilogue every `ret` jumps to.
    #[inline]
    pub fn end_label(&self) -> Label {
        self.label_at(self.end_position)
    }

    /// Fresh synthetic label inside the current template.
    pub fn new_label(&mut self, name: &str) -> Label {
        let extension = format!("{}{}", name, self.label_counter);
        self.label_counter += 1;
        Label::synthetic(self.method.symbol.clone(), self.position, &extension)
    }

    pub fn unsupported(&self, detail: impl Into<String>) -> CompileError {
        CompileError::unsupported(self.op, self.position, detail)
    }

    pub fn stack_shape(&self, detail: impl Into<String>) -> CompileError {
        CompileError::stack_shape(self.op, self.position, detail)
    }

    /// Signed 16-bit displacement, as load/store encodings require.
    pub fn displacement(&self, offset: i64) -> CompileResult<i32> {
        i16::try_from(offset)
            .map(i32::from)
            .map_err(|_| self.unsupported(format!("displacement {} out of range", offset)))
    }

    pub fn finish(self) -> Vec<I> {
        self.asm.into_code()
    }
}
