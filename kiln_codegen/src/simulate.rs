//! Stack effect simulation.
//!
//! [`simulate`] is the single, architecture-independent definition of what
//! every opcode pops and pushes. It also owns operand validation: anything a
//! template could not translate is rejected here, before code is emitted.
//!
//! [`StackWalker`] drives `simulate` in program order and tracks the operand
//! stack across control flow:
//! - branch targets record the stack at the branch
//! - after an unconditional transfer the next instruction starts from the
//!   recorded stack of some earlier branch to it, or empty
//! - every merge must agree on the shape of the stack

use crate::frame::FrameLayout;
use kiln_core::{
    CompileError, CompileResult, DescriptorTable, IlInstruction,
    MethodDescriptor, OpCode, OpFamily, OperandStack, StackItem, ValueKind,
};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Stack Effect
// =============================================================================

/// What one instruction pops and pushes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackEffect {
    /// Popped items, topmost first.
    pub popped: SmallVec<[StackItem; 4]>,
    /// Pushed items, in push order.
    pub pushed: SmallVec<[StackItem; 2]>,
}

impl StackEffect {
    #[inline]
    pub fn popped_bytes(&self) -> u32 {
        self.popped.iter().map(|item| item.size).sum()
    }

    #[inline]
    pub fn pushed_bytes(&self) -> u32 {
        self.pushed.iter().map(|item| item.size).sum()
    }

    /// Net change of the stack height in bytes.
    #[inline]
    pub fn delta(&self) -> i64 {
        i64::from(self.pushed_bytes()) - i64::from(self.popped_bytes())
    }

    /// The `depth`-th popped item (0 is the former top).
    #[inline]
    pub fn operand(&self, depth: usize) -> StackItem {
        self.popped.get(depth).copied().unwrap_or(StackItem::int32())
    }

    /// The last pushed item.
    #[inline]
    pub fn result(&self) -> StackItem {
        self.pushed.last().copied().unwrap_or(StackItem::int32())
    }
}

impl fmt::Display for StackEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |items: &[StackItem]| {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        write!(f, "-[{}] +[{}]", list(&self.popped), list(&self.pushed))
    }
}

// =============================================================================
// Simulation Environment
// =============================================================================

/// Read-only inputs of the simulation.
#[derive(Debug, Clone, Copy)]
pub struct SimEnv<'a> {
    pub tables: &'a DescriptorTable,
    pub frame: &'a FrameLayout,
    pub method: &'a MethodDescriptor,
    pub pointer_size: u32,
}

struct Sim<'s, 'a> {
    instr: &'s IlInstruction,
    stack: &'s mut OperandStack,
    env: &'s SimEnv<'a>,
    effect: StackEffect,
}

impl Sim<'_, '_> {
    fn shape(&self, detail: impl Into<String>) -> CompileError {
        CompileError::stack_shape(self.instr.op, self.instr.position, detail)
    }

    fn unsupported(&self, detail: impl Into<String>) -> CompileError {
        CompileError::unsupported(self.instr.op, self.instr.position, detail)
    }

    fn push(&mut self, item: StackItem) -> CompileResult<()> {
        if item.is_float {
            return Err(self.unsupported("floating-point values are not supported"));
        }
        self.stack.push(item);
        self.effect.pushed.push(item);
        Ok(())
    }

    fn pop(&mut self) -> CompileResult<StackItem> {
        let item = self.stack.pop_for(self.instr.op, self.instr.position)?;
        if item.is_float {
            return Err(self.unsupported("floating-point operand"));
        }
        self.effect.popped.push(item);
        Ok(item)
    }

    /// Pop a word or double-word integer.
    fn pop_int(&mut self) -> CompileResult<StackItem> {
        let item = self.pop()?;
        if item.size != 4 && item.size != 8 {
            return Err(self.shape(format!("operand of {} bytes, expected 4 or 8", item.size)));
        }
        Ok(item)
    }

    /// Pop operand B then operand A; both must have the same size.
    fn pop_pair(&mut self) -> CompileResult<(StackItem, StackItem)> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if a.size != b.size {
            return Err(self.shape(format!(
                "mismatched operand sizes {} and {}",
                a.size, b.size
            )));
        }
        Ok((b, a))
    }

    fn pop_sized(&mut self, size: u32) -> CompileResult<StackItem> {
        let item = self.pop()?;
        if item.size != size {
            return Err(self.shape(format!(
                "operand of {} bytes, expected {}",
                item.size, size
            )));
        }
        Ok(item)
    }

    #[inline]
    fn pop_word(&mut self) -> CompileResult<StackItem> {
        self.pop_sized(4)
    }

    /// Object reference or pointer operand.
    fn pop_object(&mut self) -> CompileResult<StackItem> {
        let size = self.env.pointer_size;
        self.pop_sized(size)
    }

    fn index(&self) -> CompileResult<u16> {
        self.instr.index()
    }

    fn type_item(&self, id: kiln_core::TypeId) -> CompileResult<StackItem> {
        let ty = self.env.tables.type_for(id, self.instr)?;
        Ok(DescriptorTable::stack_item(ty, self.env.pointer_size))
    }

    fn value_item(&self, kind: ValueKind) -> CompileResult<StackItem> {
        let ptr = self.env.pointer_size;
        Ok(match kind {
            ValueKind::Ref => StackItem::reference(ptr),
            ValueKind::I8 => StackItem::int64(),
            ValueKind::R4 | ValueKind::R8 => StackItem::float(kind.storage_size(ptr).unwrap_or(8)),
            ValueKind::I => StackItem::native_int(ptr),
            ValueKind::Typed => {
                let ty = self.env.tables.resolve_type(self.instr)?;
                DescriptorTable::stack_item(ty, ptr)
            }
            _ => StackItem::int32(),
        })
    }

    /// Pop call arguments (last first) and push the return value.
    fn call(&mut self, method: &MethodDescriptor, with_this: bool) -> CompileResult<()> {
        for param in method.params.iter().rev() {
            let item = self.type_item(*param)?;
            self.pop_sized(item.size)?;
        }
        if with_this {
            self.pop_object()?;
        }
        if let Some(ret) = method.return_type {
            let item = self.type_item(ret)?;
            self.push(item)?;
        }
        Ok(())
    }

    fn run(&mut self) -> CompileResult<()> {
        let instr = self.instr;
        let op = instr.op;
        let ptr = self.env.pointer_size;
        let tables = self.env.tables;
        let frame = self.env.frame;

        match op.family() {
            OpFamily::Nop | OpFamily::MethodStart | OpFamily::MethodEnd => {}

            OpFamily::LoadArg | OpFamily::LoadArgAddress | OpFamily::StoreArg => {
                let index = self.index()?;
                let slot = *frame
                    .arg(index)
                    .ok_or_else(|| self.shape(format!("argument {} out of range", index)))?;
                match op.family() {
                    OpFamily::LoadArg => self.push(slot.item.stored())?,
                    OpFamily::LoadArgAddress => self.push(StackItem::native_int(ptr))?,
                    _ => {
                        self.pop_sized(slot.item.size)?;
                    }
                }
            }

            OpFamily::LoadLocal | OpFamily::LoadLocalAddress | OpFamily::StoreLocal => {
                let index = self.index()?;
                let slot = *frame
                    .local(index)
                    .ok_or_else(|| self.shape(format!("local {} out of range", index)))?;
                match op.family() {
                    OpFamily::LoadLocal => self.push(slot.item.stored())?,
                    OpFamily::LoadLocalAddress => self.push(StackItem::native_int(ptr))?,
                    _ => {
                        self.pop_sized(slot.item.size)?;
                    }
                }
            }

            OpFamily::LoadConst => {
                if op == OpCode::LdcI8 {
                    instr.operand_i64()?;
                    self.push(StackItem::int64())?;
                } else {
                    instr.const_i32()?;
                    self.push(StackItem::int32())?;
                }
            }
            OpFamily::LoadNull => self.push(StackItem::reference(ptr))?,
            OpFamily::LoadString => {
                tables.resolve_string(instr)?;
                self.push(StackItem::reference(ptr))?;
            }
            OpFamily::LoadToken => {
                if instr.type_ref.is_none() && instr.field_ref.is_none() {
                    tables.resolve_method(instr)?;
                } else if instr.type_ref.is_some() {
                    tables.resolve_type(instr)?;
                } else {
                    tables.resolve_field(instr)?;
                }
                self.push(StackItem::native_int(ptr))?;
            }
            OpFamily::LoadFunction => {
                tables.resolve_method(instr)?;
                self.push(StackItem::native_int(ptr))?;
            }
            OpFamily::SizeOf => {
                tables.resolve_type(instr)?;
                self.push(StackItem::int32())?;
            }

            OpFamily::Dup => {
                let top = *self
                    .stack
                    .peek(0)
                    .ok_or_else(|| self.shape("operand stack underflow"))?;
                self.push(top.stored())?;
            }
            OpFamily::Pop => {
                self.pop()?;
            }

            OpFamily::Branch => {
                let condition = op
                    .branch_condition()
                    .ok_or_else(|| self.unsupported("unknown branch form"))?;
                match condition.operand_count() {
                    0 => {}
                    1 => {
                        self.pop_int()?;
                    }
                    _ => {
                        self.pop_pair()?;
                    }
                }
            }
            OpFamily::Switch => {
                self.pop_word()?;
            }
            OpFamily::Leave => {
                while !self.stack.is_empty() {
                    self.pop()?;
                }
            }
            OpFamily::Return => {
                if let Some(ret) = frame.return_item() {
                    self.pop_sized(ret.size)?;
                }
                if !self.stack.is_empty() {
                    return Err(self.shape(format!(
                        "{} bytes left on the stack at return",
                        self.stack.height_bytes()
                    )));
                }
            }

            OpFamily::Binary => {
                let (_, a) = self.pop_pair()?;
                let binary = op
                    .binary_op()
                    .ok_or_else(|| self.unsupported("unknown arithmetic form"))?;
                if a.size == 8 && binary.is_division() {
                    return Err(self.unsupported("64-bit division and remainder"));
                }
                self.push(StackItem::value(a.size))?;
            }
            OpFamily::Unary => {
                let a = self.pop_int()?;
                self.push(StackItem::value(a.size))?;
            }
            OpFamily::Shift => {
                self.pop_int()?;
                let value = self.pop_int()?;
                self.push(StackItem::value(value.size))?;
            }
            OpFamily::Compare => {
                self.pop_pair()?;
                self.push(StackItem::int32())?;
            }
            OpFamily::Convert => {
                let target = op
                    .conv_target()
                    .ok_or_else(|| self.unsupported("floating-point conversion"))?;
                self.pop_int()?;
                if target.value_size(ptr) == 8 {
                    self.push(StackItem::int64())?;
                } else {
                    self.push(StackItem::int32())?;
                }
            }

            OpFamily::LoadIndirect => {
                let kind = op
                    .value_kind()
                    .ok_or_else(|| self.unsupported("unknown indirect load"))?;
                let item = self.value_item(kind)?;
                self.pop_object()?;
                self.push(item)?;
            }
            OpFamily::StoreIndirect => {
                let kind = op
                    .value_kind()
                    .ok_or_else(|| self.unsupported("unknown indirect store"))?;
                let item = self.value_item(kind)?;
                self.pop_sized(item.size)?;
                self.pop_object()?;
            }

            OpFamily::LoadField | OpFamily::LoadFieldAddress | OpFamily::StoreField => {
                let field = tables.resolve_field(instr)?;
                if field.is_static {
                    return Err(self.unsupported("instance field access to a static field"));
                }
                let item = self.type_item(field.field_type)?;
                match op.family() {
                    OpFamily::LoadField => {
                        self.pop_object()?;
                        self.push(item)?;
                    }
                    OpFamily::LoadFieldAddress => {
                        self.pop_object()?;
                        self.push(StackItem::native_int(ptr))?;
                    }
                    _ => {
                        self.pop_sized(item.size)?;
                        self.pop_object()?;
                    }
                }
            }
            OpFamily::LoadStaticField
            | OpFamily::LoadStaticFieldAddress
            | OpFamily::StoreStaticField => {
                let field = tables.resolve_field(instr)?;
                if !field.is_static {
                    return Err(self.unsupported("static field access to an instance field"));
                }
                let item = self.type_item(field.field_type)?;
                match op.family() {
                    OpFamily::LoadStaticField => self.push(item)?,
                    OpFamily::LoadStaticFieldAddress => self.push(StackItem::native_int(ptr))?,
                    _ => {
                        self.pop_sized(item.size)?;
                    }
                }
            }

            OpFamily::NewArray => {
                tables.resolve_type(instr)?;
                self.pop_word()?;
                self.push(StackItem::new_object(ptr))?;
            }
            OpFamily::LoadLength => {
                self.pop_object()?;
                self.push(StackItem::native_int(ptr))?;
            }
            OpFamily::LoadElement => {
                let kind = op
                    .value_kind()
                    .ok_or_else(|| self.unsupported("unknown element load"))?;
                let item = self.value_item(kind)?;
                self.pop_word()?;
                self.pop_object()?;
                self.push(item)?;
            }
            OpFamily::LoadElementAddress => {
                tables.resolve_type(instr)?;
                self.pop_word()?;
                self.pop_object()?;
                self.push(StackItem::native_int(ptr))?;
            }
            OpFamily::StoreElement => {
                let kind = op
                    .value_kind()
                    .ok_or_else(|| self.unsupported("unknown element store"))?;
                let item = self.value_item(kind)?;
                self.pop_sized(item.size)?;
                self.pop_word()?;
                self.pop_object()?;
            }

            OpFamily::Call => {
                let method = tables.resolve_method(instr)?;
                self.call(method, !method.is_static)?;
            }
            OpFamily::CallIndirect => {
                let signature = tables.resolve_method(instr)?;
                self.pop_object()?;
                self.call(signature, !signature.is_static)?;
            }
            OpFamily::CallVirtual => {
                let method = tables.resolve_method(instr)?;
                if method.is_static {
                    return Err(self.unsupported("callvirt to a static method"));
                }
                self.call(method, true)?;
            }
            OpFamily::NewObject => {
                let ctor = tables.resolve_method(instr)?;
                let declaring = tables.type_for(ctor.declaring_type, instr)?;
                if declaring.is_value_type {
                    return Err(self.unsupported("value-type construction"));
                }
                if declaring.is_delegate {
                    // (target object, function pointer) -> function pointer
                    self.pop_object()?;
                    self.pop_object()?;
                    self.push(StackItem::native_int(ptr))?;
                } else {
                    for param in ctor.params.iter().rev() {
                        let item = self.type_item(*param)?;
                        self.pop_sized(item.size)?;
                    }
                    self.push(StackItem::new_object(ptr))?;
                }
            }
            OpFamily::IsInstance | OpFamily::CastClass => {
                tables.resolve_type(instr)?;
                self.pop_object()?;
                self.push(StackItem::reference(ptr))?;
            }
            OpFamily::Throw => {
                self.pop_object()?;
            }
            OpFamily::InitObject => {
                tables.resolve_type(instr)?;
                self.pop_object()?;
            }
        }
        Ok(())
    }
}

/// Apply `instr` to `stack` and report what it popped and pushed.
pub fn simulate(
    instr: &IlInstruction,
    stack: &mut OperandStack,
    env: &SimEnv<'_>,
) -> CompileResult<StackEffect> {
    if instr.op.is_float_op() {
        return Err(CompileError::unsupported(
            instr.op,
            instr.position,
            "floating-point operands are not supported",
        ));
    }
    let mut sim = Sim {
        instr,
        stack,
        env,
        effect: StackEffect::default(),
    };
    sim.run()?;
    Ok(sim.effect)
}

// =============================================================================
// Stack Walker
// =============================================================================

/// Result of walking one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Stack height before the instruction.
    pub entry_height: u32,
    pub effect: StackEffect,
}

/// Runs [`simulate`] over a method body in program order.
#[derive(Debug)]
pub struct StackWalker<'a> {
    env: SimEnv<'a>,
    stack: OperandStack,
    positions: FxHashSet<u32>,
    /// Stacks recorded by branches to positions not yet reached.
    pending: FxHashMap<u32, OperandStack>,
    /// Entry stacks of visited positions.
    entries: FxHashMap<u32, OperandStack>,
    branch_targets: FxHashSet<u32>,
    unreachable: bool,
}

impl<'a> StackWalker<'a> {
    pub fn new(env: SimEnv<'a>, instructions: &[IlInstruction]) -> Self {
        let positions = instructions
            .iter()
            .filter(|instr| !instr.op.is_pseudo())
            .map(|instr| instr.position)
            .collect();
        Self {
            env,
            stack: OperandStack::new(),
            positions,
            pending: FxHashMap::default(),
            entries: FxHashMap::default(),
            branch_targets: FxHashSet::default(),
            unreachable: false,
        }
    }

    /// Current simulated stack.
    #[inline]
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Positions some branch transfers to.
    #[inline]
    pub fn branch_targets(&self) -> &FxHashSet<u32> {
        &self.branch_targets
    }

    pub fn step(&mut self, instr: &IlInstruction) -> CompileResult<Step> {
        let position = instr.position;
        if instr.op.is_pseudo() {
            if self.unreachable {
                self.stack.clear();
                self.unreachable = false;
            }
        } else {
            if self.unreachable {
                self.stack = self.pending.remove(&position).unwrap_or_default();
                self.unreachable = false;
            } else if let Some(recorded) = self.pending.remove(&position) {
                if !recorded.same_shape(&self.stack) {
                    return Err(CompileError::stack_shape(
                        instr.op,
                        position,
                        format!(
                            "falls through with {} but a branch arrives with {}",
                            self.stack, recorded
                        ),
                    ));
                }
            }
            self.entries.insert(position, self.stack.clone());
        }

        let entry_height = self.stack.height_bytes();
        let effect = simulate(instr, &mut self.stack, &self.env)?;

        for target in instr.targets()? {
            self.record(instr, target)?;
        }
        if instr.op.ends_flow() {
            self.unreachable = true;
        }
        Ok(Step {
            entry_height,
            effect,
        })
    }

    fn record(&mut self, instr: &IlInstruction, target: i64) -> CompileResult<()> {
        let position = u32::try_from(target)
            .ok()
            .filter(|position| self.positions.contains(position))
            .ok_or(CompileError::InvalidBranchTarget {
                op: instr.op,
                position: instr.position,
                target,
            })?;
        self.branch_targets.insert(position);

        let known = self
            .entries
            .get(&position)
            .or_else(|| self.pending.get(&position));
        match known {
            Some(stack) if !stack.same_shape(&self.stack) => Err(CompileError::stack_shape(
                instr.op,
                instr.position,
                format!(
                    "branch to IL_{:04X} with {} but the target expects {}",
                    position, self.stack, stack
                ),
            )),
            Some(_) => Ok(()),
            None => {
                self.pending.insert(position, self.stack.clone());
                Ok(())
            }
        }
    }
}
