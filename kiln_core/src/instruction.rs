//! Resolved bytecode instruction records.
//!
//! An [`IlInstruction`] is the unit the compiler consumes: opcode, raw operand
//! bytes, resolved descriptor references, its own position and the position of
//! the next instruction. Branch targets are relative to `next_position`.

use crate::descriptor::{FieldId, MethodId, StringId, TypeId};
use crate::error::{CompileError, CompileResult};
use crate::opcode::{OpCode, OperandKind};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Instruction Record
// =============================================================================

/// One decoded and resolved bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlInstruction {
    pub op: OpCode,
    /// Raw little-endian operand bytes.
    pub operand: SmallVec<[u8; 8]>,
    pub position: u32,
    pub next_position: u32,
    pub type_ref: Option<TypeId>,
    pub field_ref: Option<FieldId>,
    pub method_ref: Option<MethodId>,
    pub string_ref: Option<StringId>,
    /// Set when some branch targets this instruction.
    pub label_required: bool,
}

impl IlInstruction {
    /// A record with no operand and no references.
    pub fn new(op: OpCode, position: u32) -> Self {
        Self {
            op,
            operand: SmallVec::new(),
            position,
            next_position: position + op.encoded_len(),
            type_ref: None,
            field_ref: None,
            method_ref: None,
            string_ref: None,
            label_required: false,
        }
    }

    fn operand_bytes<const N: usize>(&self, at: usize) -> CompileResult<[u8; N]> {
        self.operand
            .get(at..at + N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(CompileError::MalformedOperand {
                op: self.op,
                position: self.position,
                expected: at + N,
                actual: self.operand.len(),
            })
    }

    #[inline]
    pub fn operand_i8(&self) -> CompileResult<i8> {
        Ok(i8::from_le_bytes(self.operand_bytes::<1>(0)?))
    }

    #[inline]
    pub fn operand_u8(&self) -> CompileResult<u8> {
        Ok(self.operand_bytes::<1>(0)?[0])
    }

    #[inline]
    pub fn operand_u16(&self) -> CompileResult<u16> {
        Ok(u16::from_le_bytes(self.operand_bytes::<2>(0)?))
    }

    #[inline]
    pub fn operand_i32(&self) -> CompileResult<i32> {
        Ok(i32::from_le_bytes(self.operand_bytes::<4>(0)?))
    }

    #[inline]
    pub fn operand_i64(&self) -> CompileResult<i64> {
        Ok(i64::from_le_bytes(self.operand_bytes::<8>(0)?))
    }

    /// Argument or local index, implicit or encoded.
    pub fn index(&self) -> CompileResult<u16> {
        if let Some(index) = self.op.implicit_index() {
            return Ok(index);
        }
        match self.op.operand_kind() {
            OperandKind::ShortIndex => self.operand_u8().map(u16::from),
            OperandKind::Index => self.operand_u16(),
            _ => Err(CompileError::unsupported(
                self.op,
                self.position,
                "opcode carries no index",
            )),
        }
    }

    /// Constant pushed by an `ldc.i4` form.
    pub fn const_i32(&self) -> CompileResult<i32> {
        if let Some(value) = self.op.implicit_i32() {
            return Ok(value);
        }
        match self.op.operand_kind() {
            OperandKind::Int8 => self.operand_i8().map(i32::from),
            OperandKind::Int32 => self.operand_i32(),
            _ => Err(CompileError::unsupported(
                self.op,
                self.position,
                "opcode carries no 32-bit constant",
            )),
        }
    }

    /// Absolute target of a branch or leave.
    pub fn branch_target(&self) -> CompileResult<i64> {
        let offset = match self.op.operand_kind() {
            OperandKind::ShortBranch => i64::from(self.operand_i8()?),
            OperandKind::Branch => i64::from(self.operand_i32()?),
            _ => {
                return Err(CompileError::unsupported(
                    self.op,
                    self.position,
                    "opcode is not a branch",
                ));
            }
        };
        Ok(i64::from(self.next_position) + offset)
    }

    /// Absolute targets of a switch, in case order.
    pub fn switch_targets(&self) -> CompileResult<Vec<i64>> {
        let count = u32::from_le_bytes(self.operand_bytes::<4>(0)?) as usize;
        (0..count)
            .map(|case| {
                let offset = i32::from_le_bytes(self.operand_bytes::<4>(4 + 4 * case)?);
                Ok(i64::from(self.next_position) + i64::from(offset))
            })
            .collect()
    }

    /// Every position this instruction may transfer control to.
    pub fn targets(&self) -> CompileResult<SmallVec<[i64; 4]>> {
        match self.op.operand_kind() {
            OperandKind::ShortBranch | OperandKind::Branch => {
                Ok(smallvec::smallvec![self.branch_target()?])
            }
            OperandKind::Switch => Ok(self.switch_targets()?.into_iter().collect()),
            _ => Ok(SmallVec::new()),
        }
    }
}

impl fmt::Display for IlInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.position, self.op)?;
        match self.op.operand_kind() {
            OperandKind::ShortBranch | OperandKind::Branch => {
                if let Ok(target) = self.branch_target() {
                    write!(f, " IL_{:04X}", target)?;
                }
            }
            OperandKind::ShortIndex | OperandKind::Index => {
                if let Ok(index) = self.index() {
                    write!(f, " {}", index)?;
                }
            }
            OperandKind::Int8 | OperandKind::Int32 => {
                if let Ok(value) = self.const_i32() {
                    write!(f, " {}", value)?;
                }
            }
            OperandKind::Int64 => {
                if let Ok(value) = self.operand_i64() {
                    write!(f, " {}", value)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Instructions of one method, in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    pub method: MethodId,
    pub instructions: Vec<IlInstruction>,
}

impl MethodBody {
    pub fn new(method: MethodId, instructions: Vec<IlInstruction>) -> Self {
        Self {
            method,
            instructions,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug)]
enum Fixup {
    Branch(String),
    Switch(Vec<String>),
}

/// Assembles instruction records with positions derived from encoded sizes
/// and branch offsets resolved from named labels.
#[derive(Debug, Default)]
pub struct InstructionBuilder {
    instructions: Vec<IlInstruction>,
    position: u32,
    labels: FxHashMap<String, u32>,
    fixups: Vec<(usize, Fixup)>,
}

impl InstructionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, op: OpCode, operand: &[u8]) -> &mut IlInstruction {
        let mut instr = IlInstruction::new(op, self.position);
        instr.operand = SmallVec::from_slice(operand);
        instr.next_position = self.position + op.encoded_len() + operand.len() as u32;
        self.position = instr.next_position;
        self.instructions.push(instr);
        let last = self.instructions.len() - 1;
        &mut self.instructions[last]
    }

    /// Bind `name` to the position of the next instruction.
    pub fn label(&mut self, name: &str) -> &mut Self {
        self.labels.insert(name.to_string(), self.position);
        self
    }

    /// An instruction without operand.
    pub fn op(&mut self, op: OpCode) -> &mut Self {
        self.push(op, &[]);
        self
    }

    /// An instruction with explicit raw operand bytes.
    pub fn op_raw(&mut self, op: OpCode, operand: &[u8]) -> &mut Self {
        self.push(op, operand);
        self
    }

    /// An argument or local access, encoded per the opcode's index width.
    pub fn op_index(&mut self, op: OpCode, index: u16) -> &mut Self {
        match op.operand_kind() {
            OperandKind::ShortIndex => self.push(op, &[index as u8]),
            OperandKind::Index => self.push(op, &index.to_le_bytes()),
            _ => self.push(op, &[]),
        };
        self
    }

    /// `ldc.i4` in its shortest encoding.
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        match value {
            -1 => self.op(OpCode::LdcI4M1),
            0 => self.op(OpCode::LdcI40),
            1 => self.op(OpCode::LdcI41),
            2 => self.op(OpCode::LdcI42),
            3 => self.op(OpCode::LdcI43),
            4 => self.op(OpCode::LdcI44),
            5 => self.op(OpCode::LdcI45),
            6 => self.op(OpCode::LdcI46),
            7 => self.op(OpCode::LdcI47),
            8 => self.op(OpCode::LdcI48),
            v if i8::try_from(v).is_ok() => self.op_raw(OpCode::LdcI4S, &(v as i8).to_le_bytes()),
            v => self.op_raw(OpCode::LdcI4, &v.to_le_bytes()),
        }
    }

    pub fn ldc_i8(&mut self, value: i64) -> &mut Self {
        self.op_raw(OpCode::LdcI8, &value.to_le_bytes())
    }

    /// A branch or leave to a named label.
    pub fn branch(&mut self, op: OpCode, target: &str) -> &mut Self {
        let width = op.operand_kind().width().unwrap_or(0) as usize;
        self.push(op, &[0; 4][..width.min(4)]);
        let index = self.instructions.len() - 1;
        self.fixups.push((index, Fixup::Branch(target.to_string())));
        self
    }

    /// A switch over named labels.
    pub fn switch(&mut self, targets: &[&str]) -> &mut Self {
        let mut operand = Vec::with_capacity(4 + 4 * targets.len());
        operand.extend_from_slice(&(targets.len() as u32).to_le_bytes());
        operand.resize(4 + 4 * targets.len(), 0);
        self.push(OpCode::Switch, &operand);
        let index = self.instructions.len() - 1;
        let names = targets.iter().map(|t| t.to_string()).collect();
        self.fixups.push((index, Fixup::Switch(names)));
        self
    }

    pub fn op_type(&mut self, op: OpCode, ty: TypeId) -> &mut Self {
        self.push(op, &ty.0.to_le_bytes()).type_ref = Some(ty);
        self
    }

    pub fn op_field(&mut self, op: OpCode, field: FieldId) -> &mut Self {
        self.push(op, &field.0.to_le_bytes()).field_ref = Some(field);
        self
    }

    pub fn op_method(&mut self, op: OpCode, method: MethodId) -> &mut Self {
        self.push(op, &method.get().to_le_bytes()).method_ref = Some(method);
        self
    }

    pub fn op_string(&mut self, op: OpCode, string: StringId) -> &mut Self {
        self.push(op, &string.0.to_le_bytes()).string_ref = Some(string);
        self
    }

    fn resolve(&self, name: &str, instr: &IlInstruction) -> CompileResult<i32> {
        let target = self
            .labels
            .get(name)
            .ok_or(CompileError::InvalidBranchTarget {
                op: instr.op,
                position: instr.position,
                target: -1,
            })?;
        Ok(*target as i32 - instr.next_position as i32)
    }

    /// Finish, resolving every label reference.
    pub fn build(&self) -> CompileResult<Vec<IlInstruction>> {
        let mut instructions = self.instructions.clone();
        for (index, fixup) in &self.fixups {
            let instr = &instructions[*index];
            let operand: SmallVec<[u8; 8]> = match fixup {
                Fixup::Branch(name) => {
                    let offset = self.resolve(name, instr)?;
                    if instr.op.operand_kind() == OperandKind::ShortBranch {
                        let short = i8::try_from(offset).map_err(|_| {
                            CompileError::InvalidBranchTarget {
                                op: instr.op,
                                position: instr.position,
                                target: i64::from(instr.next_position) + i64::from(offset),
                            }
                        })?;
                        SmallVec::from_slice(&short.to_le_bytes())
                    } else {
                        SmallVec::from_slice(&offset.to_le_bytes())
                    }
                }
                Fixup::Switch(names) => {
                    let mut bytes = SmallVec::from_slice(&(names.len() as u32).to_le_bytes());
                    for name in names {
                        bytes.extend_from_slice(&self.resolve(name, instr)?.to_le_bytes());
                    }
                    bytes
                }
            };
            instructions[*index].operand = operand;
        }
        Ok(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_follow_encoded_sizes() {
        let instrs = InstructionBuilder::new()
            .op(OpCode::Ldarg0)
            .op_index(OpCode::LdargS, 4)
            .op_index(OpCode::Ldloc, 300)
            .ldc_i4(1000)
            .op(OpCode::Ceq)
            .build()
            .unwrap();
        let positions: Vec<_> = instrs.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 3, 7, 12]);
        assert_eq!(instrs[4].next_position, 14);
        assert_eq!(instrs[1].index().unwrap(), 4);
        assert_eq!(instrs[2].index().unwrap(), 300);
        assert_eq!(instrs[3].const_i32().unwrap(), 1000);
    }

    #[test]
    fn test_branch_offsets_are_relative_to_next() {
        let instrs = InstructionBuilder::new()
            .label("top")
            .op(OpCode::Nop)
            .branch(OpCode::BrS, "end")
            .branch(OpCode::Br, "top")
            .label("end")
            .op(OpCode::Ret)
            .build()
            .unwrap();
        assert_eq!(instrs[1].branch_target().unwrap(), 8);
        assert_eq!(instrs[2].branch_target().unwrap(), 0);
        assert_eq!(instrs[1].operand_i8().unwrap(), 5);
    }

    #[test]
    fn test_switch_targets() {
        let instrs = InstructionBuilder::new()
            .op(OpCode::Ldarg0)
            .switch(&["a", "b"])
            .label("a")
            .op(OpCode::Nop)
            .label("b")
            .op(OpCode::Ret)
            .build()
            .unwrap();
        assert_eq!(instrs[1].next_position, 1 + 1 + 12);
        assert_eq!(instrs[1].switch_targets().unwrap(), vec![14, 15]);
    }

    #[test]
    fn test_unknown_label_fails() {
        let err = InstructionBuilder::new()
            .branch(OpCode::Br, "nowhere")
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidBranchTarget { .. }));
    }

    #[test]
    fn test_short_constants() {
        let instrs = InstructionBuilder::new()
            .ldc_i4(-1)
            .ldc_i4(7)
            .ldc_i4(-100)
            .build()
            .unwrap();
        assert_eq!(instrs[0].op, OpCode::LdcI4M1);
        assert_eq!(instrs[1].op, OpCode::LdcI47);
        assert_eq!(instrs[2].op, OpCode::LdcI4S);
        assert_eq!(instrs[2].const_i32().unwrap(), -100);
    }

    #[test]
    fn test_truncated_operand_is_malformed() {
        let instrs = InstructionBuilder::new()
            .op_raw(OpCode::LdcI4, &[1, 2])
            .build()
            .unwrap();
        assert_eq!(
            instrs[0].const_i32().unwrap_err(),
            CompileError::MalformedOperand {
                op: OpCode::LdcI4,
                position: 0,
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn test_display() {
        let instrs = InstructionBuilder::new()
            .op_index(OpCode::LdargS, 2)
            .build()
            .unwrap();
        assert_eq!(instrs[0].to_string(), "IL_0000: ldarg.s 2");
    }
}
