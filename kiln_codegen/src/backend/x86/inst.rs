//! x86 instruction vocabulary (32-bit protected mode), rendered as NASM.

use crate::backend::{Comparison, Relation, TargetInst};
use crate::label::Label;
use kiln_core::Symbol;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Registers and Operands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

impl Reg {
    pub const ALL: [Reg; 8] = [
        Reg::Eax,
        Reg::Ecx,
        Reg::Edx,
        Reg::Ebx,
        Reg::Esp,
        Reg::Ebp,
        Reg::Esi,
        Reg::Edi,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Reg::Eax => "eax",
            Reg::Ecx => "ecx",
            Reg::Edx => "edx",
            Reg::Ebx => "ebx",
            Reg::Esp => "esp",
            Reg::Ebp => "ebp",
            Reg::Esi => "esi",
            Reg::Edi => "edi",
        }
    }

    /// Name of the low byte or low word sub-register.
    pub const fn sub_name(self, width: Width) -> &'static str {
        match (width, self) {
            (Width::Byte, Reg::Eax) => "al",
            (Width::Byte, Reg::Ecx) => "cl",
            (Width::Byte, Reg::Edx) => "dl",
            (Width::Byte, Reg::Ebx) => "bl",
            (Width::Word, Reg::Eax) => "ax",
            (Width::Word, Reg::Ecx) => "cx",
            (Width::Word, Reg::Edx) => "dx",
            (Width::Word, Reg::Ebx) => "bx",
            (Width::Word, Reg::Esp) => "sp",
            (Width::Word, Reg::Ebp) => "bp",
            (Width::Word, Reg::Esi) => "si",
            (Width::Word, Reg::Edi) => "di",
            _ => self.name(),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    #[inline]
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Dword => 4,
        }
    }

    pub const fn from_bytes(bytes: u32) -> Option<Self> {
        match bytes {
            1 => Some(Width::Byte),
            2 => Some(Width::Word),
            4 => Some(Width::Dword),
            _ => None,
        }
    }

    const fn keyword(self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
        }
    }
}

/// `[base + symbol + disp]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Option<Reg>,
    pub symbol: Option<Symbol>,
    pub disp: i32,
}

impl Mem {
    #[inline]
    pub const fn base(base: Reg, disp: i32) -> Self {
        Self {
            base: Some(base),
            symbol: None,
            disp,
        }
    }

    #[inline]
    pub fn symbol(symbol: Symbol, disp: i32) -> Self {
        Self {
            base: None,
            symbol: Some(symbol),
            disp,
        }
    }

    /// Same location displaced by `delta` bytes.
    #[inline]
    pub fn offset(&self, delta: i32) -> Self {
        Self {
            disp: self.disp + delta,
            ..self.clone()
        }
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        if let Some(base) = self.base {
            write!(f, "{}", base)?;
            first = false;
        }
        if let Some(symbol) = &self.symbol {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{}", symbol)?;
            first = false;
        }
        if first {
            write!(f, "{}", self.disp)?;
        } else if self.disp > 0 {
            write!(f, "+{}", self.disp)?;
        } else if self.disp < 0 {
            write!(f, "{}", self.disp)?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    /// Low byte or word of a register.
    Sub(Reg, Width),
    Imm(i32),
    Mem(Width, Mem),
    /// Address of a linker symbol, as an immediate.
    Addr(Symbol),
}

impl Operand {
    #[inline]
    pub const fn dword(mem: Mem) -> Self {
        Operand::Mem(Width::Dword, mem)
    }

    fn symbol(&self) -> Option<&Symbol> {
        match self {
            Operand::Mem(_, mem) => mem.symbol.as_ref(),
            Operand::Addr(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Sub(reg, width) => f.write_str(reg.sub_name(*width)),
            Operand::Imm(value) => write!(f, "{}", value),
            Operand::Mem(width, mem) => write!(f, "{} {}", width.keyword(), mem),
            Operand::Addr(symbol) => write!(f, "{}", symbol),
        }
    }
}

// =============================================================================
// Conditions and Opcodes
// =============================================================================

/// Condition codes read by `jcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
    B,
    Be,
    A,
    Ae,
}

impl Cond {
    /// Condition that holds after `cmp a, b` when `a cmp b`.
    pub const fn of(cmp: Comparison) -> Self {
        match (cmp.relation, cmp.unsigned) {
            (Relation::Eq, _) => Cond::E,
            (Relation::Ne, _) => Cond::Ne,
            (Relation::Lt, false) => Cond::L,
            (Relation::Le, false) => Cond::Le,
            (Relation::Gt, false) => Cond::G,
            (Relation::Ge, false) => Cond::Ge,
            (Relation::Lt, true) => Cond::B,
            (Relation::Le, true) => Cond::Be,
            (Relation::Gt, true) => Cond::A,
            (Relation::Ge, true) => Cond::Ae,
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::L => "l",
            Cond::Le => "le",
            Cond::G => "g",
            Cond::Ge => "ge",
            Cond::B => "b",
            Cond::Be => "be",
            Cond::A => "a",
            Cond::Ae => "ae",
        }
    }
}

/// Jump or call destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Label(Label),
    Symbol(Symbol),
    Reg(Reg),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Label(label) => write!(f, "{}", label),
            Target::Symbol(symbol) => write!(f, "{}", symbol),
            Target::Reg(reg) => write!(f, "{}", reg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbb,
    And,
    Or,
    Xor,
    Cmp,
}

impl AluOp {
    const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Adc => "adc",
            AluOp::Sub => "sub",
            AluOp::Sbb => "sbb",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftKind {
    Shl,
    /// Logical right.
    Shr,
    /// Arithmetic right.
    Sar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftCount {
    Cl,
    Imm(u8),
}

impl fmt::Display for ShiftCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftCount::Cl => f.write_str("cl"),
            ShiftCount::Imm(n) => write!(f, "{}", n),
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum X86Inst {
    Label(Label),
    Mov { dst: Operand, src: Operand },
    Movzx { dst: Reg, src: Operand },
    Movsx { dst: Reg, src: Operand },
    Lea { dst: Reg, src: Mem },
    Push(Operand),
    Pop(Operand),
    Alu { op: AluOp, dst: Operand, src: Operand },
    Test { dst: Operand, src: Operand },
    Neg(Operand),
    Not(Operand),
    /// `edx:eax = eax * src`, unsigned.
    Mul(Operand),
    Imul { dst: Reg, src: Operand },
    ImulImm { dst: Reg, src: Operand, imm: i32 },
    /// `eax, edx = edx:eax / src`, unsigned.
    Div(Operand),
    Idiv(Operand),
    /// Sign-extend eax into edx.
    Cdq,
    Shift { kind: ShiftKind, dst: Operand, count: ShiftCount },
    Shld { dst: Operand, src: Reg, count: ShiftCount },
    Shrd { dst: Operand, src: Reg, count: ShiftCount },
    Jmp(Target),
    Jcc(Cond, Label),
    Call(Target),
    Ret,
    Nop,
}

impl TargetInst for X86Inst {
    #[inline]
    fn label(label: Label) -> Self {
        X86Inst::Label(label)
    }

    #[inline]
    fn as_label(&self) -> Option<&Label> {
        match self {
            X86Inst::Label(label) => Some(label),
            _ => None,
        }
    }

    fn symbols(&self) -> SmallVec<[&Symbol; 2]> {
        let mut out = SmallVec::new();
        match self {
            X86Inst::Mov { dst, src }
            | X86Inst::Alu { dst, src, .. }
            | X86Inst::Test { dst, src } => {
                out.extend(dst.symbol());
                out.extend(src.symbol());
            }
            X86Inst::Movzx { src, .. }
            | X86Inst::Movsx { src, .. }
            | X86Inst::Imul { src, .. }
            | X86Inst::ImulImm { src, .. } => out.extend(src.symbol()),
            X86Inst::Push(op)
            | X86Inst::Pop(op)
            | X86Inst::Neg(op)
            | X86Inst::Not(op)
            | X86Inst::Mul(op)
            | X86Inst::Div(op)
            | X86Inst::Idiv(op) => out.extend(op.symbol()),
            X86Inst::Shift { dst, .. } | X86Inst::Shld { dst, .. } | X86Inst::Shrd { dst, .. } => {
                out.extend(dst.symbol())
            }
            X86Inst::Lea { src, .. } => out.extend(src.symbol.as_ref()),
            X86Inst::Jmp(Target::Symbol(symbol)) | X86Inst::Call(Target::Symbol(symbol)) => {
                out.push(symbol)
            }
            _ => {}
        }
        out
    }
}

impl fmt::Display for X86Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Inst::Label(label) => write!(f, "{}:", label),
            X86Inst::Mov { dst, src } => write!(f, "mov {}, {}", dst, src),
            X86Inst::Movzx { dst, src } => write!(f, "movzx {}, {}", dst, src),
            X86Inst::Movsx { dst, src } => write!(f, "movsx {}, {}", dst, src),
            X86Inst::Lea { dst, src } => write!(f, "lea {}, {}", dst, src),
            X86Inst::Push(op) => write!(f, "push {}", op),
            X86Inst::Pop(op) => write!(f, "pop {}", op),
            X86Inst::Alu { op, dst, src } => write!(f, "{} {}, {}", op.mnemonic(), dst, src),
            X86Inst::Test { dst, src } => write!(f, "test {}, {}", dst, src),
            X86Inst::Neg(op) => write!(f, "neg {}", op),
            X86Inst::Not(op) => write!(f, "not {}", op),
            X86Inst::Mul(op) => write!(f, "mul {}", op),
            X86Inst::Imul { dst, src } => write!(f, "imul {}, {}", dst, src),
            X86Inst::ImulImm { dst, src, imm } => write!(f, "imul {}, {}, {}", dst, src, imm),
            X86Inst::Div(op) => write!(f, "div {}", op),
            X86Inst::Idiv(op) => write!(f, "idiv {}", op),
            X86Inst::Cdq => f.write_str("cdq"),
            X86Inst::Shift { kind, dst, count } => {
                let mnemonic = match kind {
                    ShiftKind::Shl => "shl",
                    ShiftKind::Shr => "shr",
                    ShiftKind::Sar => "sar",
                };
                write!(f, "{} {}, {}", mnemonic, dst, count)
            }
            X86Inst::Shld { dst, src, count } => write!(f, "shld {}, {}, {}", dst, src, count),
            X86Inst::Shrd { dst, src, count } => write!(f, "shrd {}, {}, {}", dst, src, count),
            X86Inst::Jmp(target) => write!(f, "jmp {}", target),
            X86Inst::Jcc(cond, label) => write!(f, "j{} {}", cond.suffix(), label),
            X86Inst::Call(target) => write!(f, "call {}", target),
            X86Inst::Ret => f.write_str("ret"),
            X86Inst::Nop => f.write_str("nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nasm_rendering() {
        let inst = X86Inst::Mov {
            dst: Operand::Reg(Reg::Eax),
            src: Operand::dword(Mem::base(Reg::Ebp, -8)),
        };
        assert_eq!(inst.to_string(), "mov eax, dword [ebp-8]");

        let inst = X86Inst::Movzx {
            dst: Reg::Edx,
            src: Operand::Mem(Width::Byte, Mem::base(Reg::Eax, 12)),
        };
        assert_eq!(inst.to_string(), "movzx edx, byte [eax+12]");

        let inst = X86Inst::Mov {
            dst: Operand::Mem(Width::Word, Mem::base(Reg::Eax, 0)),
            src: Operand::Sub(Reg::Edx, Width::Word),
        };
        assert_eq!(inst.to_string(), "mov word [eax], dx");

        let inst = X86Inst::Shld {
            dst: Operand::Reg(Reg::Edx),
            src: Reg::Eax,
            count: ShiftCount::Cl,
        };
        assert_eq!(inst.to_string(), "shld edx, eax, cl");
    }

    #[test]
    fn test_symbols_collected() {
        let inst = X86Inst::Push(Operand::dword(Mem::symbol(Symbol::new("static.count"), 4)));
        assert_eq!(inst.to_string(), "push dword [static.count+4]");
        assert_eq!(inst.symbols().as_slice(), &[&Symbol::new("static.count")]);

        let inst = X86Inst::Alu {
            op: AluOp::Cmp,
            dst: Operand::Reg(Reg::Ecx),
            src: Operand::Addr(Symbol::new("Dog.Type")),
        };
        assert_eq!(inst.to_string(), "cmp ecx, Dog.Type");
        assert_eq!(inst.symbols().len(), 1);
        assert!(X86Inst::Jcc(Cond::E, Label::at(Symbol::new("M"), 0)).symbols().is_empty());
    }

    #[test]
    fn test_condition_mapping() {
        assert_eq!(Cond::of(Comparison::new(Relation::Lt, true)), Cond::B);
        assert_eq!(Cond::of(Comparison::new(Relation::Ge, false)), Cond::Ge);
        assert_eq!(Cond::of(Comparison::new(Relation::Ne, false)), Cond::Ne);
    }
}
