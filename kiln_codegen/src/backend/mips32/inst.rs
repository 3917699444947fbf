//! MIPS32 instruction vocabulary, rendered as GAS.
//!
//! A handful of assembler pseudo-instructions (`li`, `la`, `move`) are kept
//! as single instructions; the assembler expands them. Branches and jumps
//! carry a delay slot, which the emit helpers always fill with `nop`.

use crate::backend::TargetInst;
use crate::label::Label;
use kiln_core::Symbol;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Registers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Zero = 0,
    At = 1,
    V0 = 2,
    V1 = 3,
    A0 = 4,
    A1 = 5,
    A2 = 6,
    A3 = 7,
    T0 = 8,
    T1 = 9,
    T2 = 10,
    T3 = 11,
    T4 = 12,
    T5 = 13,
    T6 = 14,
    T7 = 15,
    S0 = 16,
    S1 = 17,
    S2 = 18,
    S3 = 19,
    S4 = 20,
    S5 = 21,
    S6 = 22,
    S7 = 23,
    T8 = 24,
    T9 = 25,
    K0 = 26,
    K1 = 27,
    Gp = 28,
    Sp = 29,
    Fp = 30,
    Ra = 31,
}

impl Reg {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Reg::Zero => "$zero",
            Reg::At => "$at",
            Reg::V0 => "$v0",
            Reg::V1 => "$v1",
            Reg::A0 => "$a0",
            Reg::A1 => "$a1",
            Reg::A2 => "$a2",
            Reg::A3 => "$a3",
            Reg::T0 => "$t0",
            Reg::T1 => "$t1",
            Reg::T2 => "$t2",
            Reg::T3 => "$t3",
            Reg::T4 => "$t4",
            Reg::T5 => "$t5",
            Reg::T6 => "$t6",
            Reg::T7 => "$t7",
            Reg::S0 => "$s0",
            Reg::S1 => "$s1",
            Reg::S2 => "$s2",
            Reg::S3 => "$s3",
            Reg::S4 => "$s4",
            Reg::S5 => "$s5",
            Reg::S6 => "$s6",
            Reg::S7 => "$s7",
            Reg::T8 => "$t8",
            Reg::T9 => "$t9",
            Reg::K0 => "$k0",
            Reg::K1 => "$k1",
            Reg::Gp => "$gp",
            Reg::Sp => "$sp",
            Reg::Fp => "$fp",
            Reg::Ra => "$ra",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Opcodes
// =============================================================================

/// Three-register operations: `dst = lhs op rhs`.
///
/// For the variable shifts `lhs` is the value and `rhs` the amount, which is
/// also the GAS operand order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alu3Op {
    Addu,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Sllv,
    Srlv,
    Srav,
}

impl Alu3Op {
    const fn mnemonic(self) -> &'static str {
        match self {
            Alu3Op::Addu => "addu",
            Alu3Op::Subu => "subu",
            Alu3Op::And => "and",
            Alu3Op::Or => "or",
            Alu3Op::Xor => "xor",
            Alu3Op::Nor => "nor",
            Alu3Op::Slt => "slt",
            Alu3Op::Sltu => "sltu",
            Alu3Op::Sllv => "sllv",
            Alu3Op::Srlv => "srlv",
            Alu3Op::Srav => "srav",
        }
    }
}

/// Register-immediate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmOp {
    Addiu,
    Andi,
    Ori,
    Xori,
    Slti,
    Sltiu,
}

impl ImmOp {
    const fn mnemonic(self) -> &'static str {
        match self {
            ImmOp::Addiu => "addiu",
            ImmOp::Andi => "andi",
            ImmOp::Ori => "ori",
            ImmOp::Xori => "xori",
            ImmOp::Slti => "slti",
            ImmOp::Sltiu => "sltiu",
        }
    }
}

/// Shifts by a constant amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftImmOp {
    Sll,
    Srl,
    Sra,
}

/// Load/store width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemWidth {
    Byte,
    Half,
    Word,
}

impl MemWidth {
    #[inline]
    pub const fn bytes(self) -> u32 {
        match self {
            MemWidth::Byte => 1,
            MemWidth::Half => 2,
            MemWidth::Word => 4,
        }
    }

    pub const fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(MemWidth::Byte),
            2 => Some(MemWidth::Half),
            4 => Some(MemWidth::Word),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCmp {
    Eq,
    Ne,
}

/// Comparisons against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeroCmp {
    Lez,
    Gtz,
    Ltz,
    Gez,
}

impl ZeroCmp {
    const fn mnemonic(self) -> &'static str {
        match self {
            ZeroCmp::Lez => "blez",
            ZeroCmp::Gtz => "bgtz",
            ZeroCmp::Ltz => "bltz",
            ZeroCmp::Gez => "bgez",
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MipsInst {
    Label(Label),
    Alu3 {
        op: Alu3Op,
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    AluImm {
        op: ImmOp,
        dst: Reg,
        src: Reg,
        imm: i32,
    },
    ShiftImm {
        op: ShiftImmOp,
        dst: Reg,
        src: Reg,
        amount: u8,
    },
    /// `hi:lo = lhs * rhs`.
    Mult { lhs: Reg, rhs: Reg, unsigned: bool },
    /// `lo = lhs / rhs`, `hi = lhs % rhs`.
    Div { lhs: Reg, rhs: Reg, unsigned: bool },
    Mfhi(Reg),
    Mflo(Reg),
    Li { dst: Reg, imm: i32 },
    La { dst: Reg, symbol: Symbol },
    Move { dst: Reg, src: Reg },
    Load {
        width: MemWidth,
        signed: bool,
        dst: Reg,
        offset: i32,
        base: Reg,
    },
    Store {
        width: MemWidth,
        src: Reg,
        offset: i32,
        base: Reg,
    },
    Branch {
        cmp: BranchCmp,
        lhs: Reg,
        rhs: Reg,
        target: Label,
    },
    BranchZ {
        cmp: ZeroCmp,
        src: Reg,
        target: Label,
    },
    J(Label),
    Jal(Symbol),
    Jalr(Reg),
    Jr(Reg),
    Nop,
}

impl MipsInst {
    /// Whether the next instruction executes in this one's delay slot.
    #[inline]
    pub fn has_delay_slot(&self) -> bool {
        matches!(
            self,
            MipsInst::Branch { .. }
                | MipsInst::BranchZ { .. }
                | MipsInst::J(_)
                | MipsInst::Jal(_)
                | MipsInst::Jalr(_)
                | MipsInst::Jr(_)
        )
    }
}

impl TargetInst for MipsInst {
    #[inline]
    fn label(label: Label) -> Self {
        MipsInst::Label(label)
    }

    #[inline]
    fn as_label(&self) -> Option<&Label> {
        match self {
            MipsInst::Label(label) => Some(label),
            _ => None,
        }
    }

    fn symbols(&self) -> SmallVec<[&Symbol; 2]> {
        let mut out = SmallVec::new();
        match self {
            MipsInst::La { symbol, .. } | MipsInst::Jal(symbol) => out.push(symbol),
            _ => {}
        }
        out
    }
}

impl fmt::Display for MipsInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MipsInst::Label(label) => write!(f, "{}:", label),
            MipsInst::Alu3 { op, dst, lhs, rhs } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), dst, lhs, rhs)
            }
            MipsInst::AluImm { op, dst, src, imm } => {
                write!(f, "{} {}, {}, {}", op.mnemonic(), dst, src, imm)
            }
            MipsInst::ShiftImm {
                op,
                dst,
                src,
                amount,
            } => {
                let mnemonic = match op {
                    ShiftImmOp::Sll => "sll",
                    ShiftImmOp::Srl => "srl",
                    ShiftImmOp::Sra => "sra",
                };
                write!(f, "{} {}, {}, {}", mnemonic, dst, src, amount)
            }
            MipsInst::Mult { lhs, rhs, unsigned } => {
                let mnemonic = if *unsigned { "multu" } else { "mult" };
                write!(f, "{} {}, {}", mnemonic, lhs, rhs)
            }
            MipsInst::Div { lhs, rhs, unsigned } => {
                let mnemonic = if *unsigned { "divu" } else { "div" };
                write!(f, "{} {}, {}", mnemonic, lhs, rhs)
            }
            MipsInst::Mfhi(reg) => write!(f, "mfhi {}", reg),
            MipsInst::Mflo(reg) => write!(f, "mflo {}", reg),
            MipsInst::Li { dst, imm } => write!(f, "li {}, {}", dst, imm),
            MipsInst::La { dst, symbol } => write!(f, "la {}, {}", dst, symbol),
            MipsInst::Move { dst, src } => write!(f, "move {}, {}", dst, src),
            MipsInst::Load {
                width,
                signed,
                dst,
                offset,
                base,
            } => {
                let mnemonic = match (width, signed) {
                    (MemWidth::Word, _) => "lw",
                    (MemWidth::Half, true) => "lh",
                    (MemWidth::Half, false) => "lhu",
                    (MemWidth::Byte, true) => "lb",
                    (MemWidth::Byte, false) => "lbu",
                };
                write!(f, "{} {}, {}({})", mnemonic, dst, offset, base)
            }
            MipsInst::Store {
                width,
                src,
                offset,
                base,
            } => {
                let mnemonic = match width {
                    MemWidth::Word => "sw",
                    MemWidth::Half => "sh",
                    MemWidth::Byte => "sb",
                };
                write!(f, "{} {}, {}({})", mnemonic, src, offset, base)
            }
            MipsInst::Branch {
                cmp,
                lhs,
                rhs,
                target,
            } => {
                let mnemonic = match cmp {
                    BranchCmp::Eq => "beq",
                    BranchCmp::Ne => "bne",
                };
                write!(f, "{} {}, {}, {}", mnemonic, lhs, rhs, target)
            }
            MipsInst::BranchZ { cmp, src, target } => {
                write!(f, "{} {}, {}", cmp.mnemonic(), src, target)
            }
            MipsInst::J(label) => write!(f, "j {}", label),
            MipsInst::Jal(symbol) => write!(f, "jal {}", symbol),
            MipsInst::Jalr(reg) => write!(f, "jalr {}", reg),
            MipsInst::Jr(reg) => write!(f, "jr {}", reg),
            MipsInst::Nop => f.write_str("nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_rendering() {
        let inst = MipsInst::Load {
            width: MemWidth::Half,
            signed: false,
            dst: Reg::T6,
            offset: -8,
            base: Reg::Fp,
        };
        assert_eq!(inst.to_string(), "lhu $t6, -8($fp)");

        let inst = MipsInst::Alu3 {
            op: Alu3Op::Sllv,
            dst: Reg::T1,
            lhs: Reg::T1,
            rhs: Reg::T2,
        };
        assert_eq!(inst.to_string(), "sllv $t1, $t1, $t2");

        let label = Label::at(Symbol::new("M1.main"), 0x12);
        let inst = MipsInst::Branch {
            cmp: BranchCmp::Ne,
            lhs: Reg::T8,
            rhs: Reg::Zero,
            target: label,
        };
        assert_eq!(inst.to_string(), "bne $t8, $zero, M1.main.IL_0012");
    }

    #[test]
    fn test_delay_slots_and_symbols() {
        let call = MipsInst::Jal(Symbol::new("NewObj"));
        assert!(call.has_delay_slot());
        assert_eq!(call.symbols().as_slice(), &[&Symbol::new("NewObj")]);
        assert!(!MipsInst::Mflo(Reg::T0).has_delay_slot());
        assert!(MipsInst::Jr(Reg::Ra).symbols().is_empty());
    }
}
