//! Method compilation driver.
//!
//! # Pipeline
//!
//! 1. Bracket the body with `MethodStart` / `MethodEnd`.
//! 2. [`preprocess`]: simulate every instruction, mark labels.
//! 3. Selection: walk again with a fresh stack, emitting each template.
//!
//! A failure anywhere aborts the method; no partial output escapes.

use crate::backend::{Arch, TargetBackend, TargetInst};
use crate::context::EmitContext;
use crate::frame::FrameLayout;
use crate::preprocess::preprocess;
use crate::simulate::{SimEnv, StackEffect, StackWalker};
use kiln_core::{
    CompileError, CompileResult, DescriptorKind, DescriptorTable, IlInstruction, MethodBody,
    MethodId, OpCode, Symbol,
};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::ops::Range;
use tracing::{debug, trace};

use crate::options::CompilerOptions;

// =============================================================================
// Output
// =============================================================================

/// Instructions emitted for one bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSpan {
    pub position: u32,
    pub op: OpCode,
    /// Operand stack height before the instruction.
    pub entry_height: u32,
    pub effect: StackEffect,
    /// Range into [`CompiledMethod::instructions`].
    pub range: Range<usize>,
}

/// Translation result of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod<I> {
    pub method: MethodId,
    pub symbol: Symbol,
    pub arch: Arch,
    pub instructions: Vec<I>,
    /// Symbols the linker must resolve, sorted.
    pub external_symbols: BTreeSet<Symbol>,
    pub spans: Vec<EmittedSpan>,
    pub frame: FrameLayout,
}

impl<I: TargetInst> CompiledMethod<I> {
    /// Assembly listing, one instruction per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}:", self.symbol);
        for inst in &self.instructions {
            if inst.as_label().is_some() {
                let _ = writeln!(out, "{}", inst);
            } else {
                let _ = writeln!(out, "    {}", inst);
            }
        }
        out
    }

    /// Span of the instruction at `position`.
    pub fn span_at(&self, position: u32) -> Option<&EmittedSpan> {
        self.spans
            .iter()
            .find(|span| span.position == position && !span.op.is_pseudo())
    }

    /// Instructions emitted for `span`.
    #[inline]
    pub fn span_code(&self, span: &EmittedSpan) -> &[I] {
        &self.instructions[span.range.clone()]
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Surround the body with the prologue and epilogue pseudo-ops.
fn bracket(body: &MethodBody) -> Vec<IlInstruction> {
    let end = body
        .instructions
        .last()
        .map_or(0, |instr| instr.next_position);

    let mut start = IlInstruction::new(OpCode::MethodStart, 0);
    start.next_position = 0;
    let mut finish = IlInstruction::new(OpCode::MethodEnd, end);
    finish.next_position = end;

    let mut instructions = Vec::with_capacity(body.instructions.len() + 2);
    instructions.push(start);
    instructions.extend(body.instructions.iter().cloned());
    instructions.push(finish);
    instructions
}

/// Translate one method body for target `T`.
pub fn compile_method<T: TargetBackend>(
    body: &MethodBody,
    tables: &DescriptorTable,
    options: &CompilerOptions,
) -> CompileResult<CompiledMethod<T::Inst>> {
    options.validate()?;
    let method = tables.method(body.method).ok_or(CompileError::unresolved(
        OpCode::MethodStart,
        0,
        DescriptorKind::Method,
    ))?;
    let frame = FrameLayout::new(method, tables, options.pointer_size)?;

    let mut instructions = bracket(body);
    let end_position = instructions.last().map_or(0, |instr| instr.position);
    let env = SimEnv {
        tables,
        frame: &frame,
        method,
        pointer_size: options.pointer_size,
    };
    let effects = preprocess(&mut instructions, &env)?;

    let policy = options.policy.unwrap_or_else(T::default_policy);
    let mut ctx = EmitContext::new(tables, options, policy, &frame, method, end_position);
    let mut walker = StackWalker::new(env, &instructions);
    let mut spans = Vec::with_capacity(instructions.len());

    for (instr, expected) in instructions.iter().zip(&effects) {
        let step = walker.step(instr)?;
        debug_assert_eq!(&step.effect, expected);

        let start = ctx.asm.len();
        ctx.begin(instr);
        if instr.label_required {
            let label = ctx.label_at(instr.position);
            ctx.asm.bind(label);
        }
        T::emit(&mut ctx, instr, &step.effect)?;
        trace!(
            arch = %T::ARCH,
            position = instr.position,
            op = %instr.op,
            effect = %step.effect,
            emitted = ctx.asm.len() - start,
            "selected"
        );

        spans.push(EmittedSpan {
            position: instr.position,
            op: instr.op,
            entry_height: step.entry_height,
            effect: step.effect,
            range: start..ctx.asm.len(),
        });
    }

    let code = ctx.finish();
    let external_symbols = code
        .iter()
        .flat_map(|inst| inst.symbols())
        .cloned()
        .collect();
    debug!(
        arch = %T::ARCH,
        method = %method.symbol,
        bytecode = body.instructions.len(),
        emitted = code.len(),
        "compiled method"
    );

    Ok(CompiledMethod {
        method: method.id,
        symbol: method.symbol.clone(),
        arch: T::ARCH,
        instructions: code,
        external_symbols,
        spans,
        frame,
    })
}

/// Translate several bodies; stops at the first failure.
pub fn compile_all<T: TargetBackend>(
    bodies: &[MethodBody],
    tables: &DescriptorTable,
    options: &CompilerOptions,
) -> CompileResult<Vec<CompiledMethod<T::Inst>>> {
    bodies
        .iter()
        .map(|body| compile_method::<T>(body, tables, options))
        .collect()
}
