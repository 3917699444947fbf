//! Emit helpers for [`X86Inst`].

use super::inst::{AluOp, Cond, Mem, Operand, Reg, ShiftCount, ShiftKind, Target, Width, X86Inst};
use crate::context::Assembler;
use crate::label::Label;
use kiln_core::Symbol;

impl Assembler<X86Inst> {
    // -------------------------------------------------------------------------
    // Moves
    // -------------------------------------------------------------------------

    #[inline]
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        self.emit(X86Inst::Mov {
            dst: Operand::Reg(dst),
            src: Operand::Reg(src),
        });
    }

    #[inline]
    pub fn mov_ri(&mut self, dst: Reg, imm: i32) {
        self.emit(X86Inst::Mov {
            dst: Operand::Reg(dst),
            src: Operand::Imm(imm),
        });
    }

    #[inline]
    pub fn mov_rm(&mut self, dst: Reg, mem: Mem) {
        self.emit(X86Inst::Mov {
            dst: Operand::Reg(dst),
            src: Operand::dword(mem),
        });
    }

    #[inline]
    pub fn mov_mr(&mut self, mem: Mem, src: Reg) {
        self.emit(X86Inst::Mov {
            dst: Operand::dword(mem),
            src: Operand::Reg(src),
        });
    }

    /// Store `width` bytes of an immediate.
    #[inline]
    pub fn mov_mi(&mut self, width: Width, mem: Mem, imm: i32) {
        self.emit(X86Inst::Mov {
            dst: Operand::Mem(width, mem),
            src: Operand::Imm(imm),
        });
    }

    /// Store the low byte or word of `src`.
    #[inline]
    pub fn mov_m_sub(&mut self, width: Width, mem: Mem, src: Reg) {
        self.emit(X86Inst::Mov {
            dst: Operand::Mem(width, mem),
            src: Operand::Sub(src, width),
        });
    }

    #[inline]
    pub fn movzx_rm(&mut self, dst: Reg, width: Width, mem: Mem) {
        self.emit(X86Inst::Movzx {
            dst,
            src: Operand::Mem(width, mem),
        });
    }

    #[inline]
    pub fn movsx_rm(&mut self, dst: Reg, width: Width, mem: Mem) {
        self.emit(X86Inst::Movsx {
            dst,
            src: Operand::Mem(width, mem),
        });
    }

    #[inline]
    pub fn movzx_rr(&mut self, dst: Reg, src: Reg, width: Width) {
        self.emit(X86Inst::Movzx {
            dst,
            src: Operand::Sub(src, width),
        });
    }

    #[inline]
    pub fn movsx_rr(&mut self, dst: Reg, src: Reg, width: Width) {
        self.emit(X86Inst::Movsx {
            dst,
            src: Operand::Sub(src, width),
        });
    }

    #[inline]
    pub fn lea(&mut self, dst: Reg, src: Mem) {
        self.emit(X86Inst::Lea { dst, src });
    }

    // -------------------------------------------------------------------------
    // Stack
    // -------------------------------------------------------------------------

    #[inline]
    pub fn push_r(&mut self, reg: Reg) {
        self.emit(X86Inst::Push(Operand::Reg(reg)));
    }

    #[inline]
    pub fn push_i(&mut self, imm: i32) {
        self.emit(X86Inst::Push(Operand::Imm(imm)));
    }

    #[inline]
    pub fn push_m(&mut self, mem: Mem) {
        self.emit(X86Inst::Push(Operand::dword(mem)));
    }

    /// Push the address of `symbol`.
    #[inline]
    pub fn push_addr(&mut self, symbol: Symbol) {
        self.emit(X86Inst::Push(Operand::Addr(symbol)));
    }

    #[inline]
    pub fn pop_r(&mut self, reg: Reg) {
        self.emit(X86Inst::Pop(Operand::Reg(reg)));
    }

    #[inline]
    pub fn pop_m(&mut self, mem: Mem) {
        self.emit(X86Inst::Pop(Operand::dword(mem)));
    }

    /// Release `bytes` of stack; nothing for zero.
    pub fn drop_bytes(&mut self, bytes: u32) {
        if bytes > 0 {
            self.alu_ri(AluOp::Add, Reg::Esp, bytes as i32);
        }
    }

    /// Reserve `bytes` of stack; nothing for zero.
    pub fn reserve_bytes(&mut self, bytes: u32) {
        if bytes > 0 {
            self.alu_ri(AluOp::Sub, Reg::Esp, bytes as i32);
        }
    }

    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    #[inline]
    pub fn alu_rr(&mut self, op: AluOp, dst: Reg, src: Reg) {
        self.emit(X86Inst::Alu {
            op,
            dst: Operand::Reg(dst),
            src: Operand::Reg(src),
        });
    }

    #[inline]
    pub fn alu_ri(&mut self, op: AluOp, dst: Reg, imm: i32) {
        self.emit(X86Inst::Alu {
            op,
            dst: Operand::Reg(dst),
            src: Operand::Imm(imm),
        });
    }

    #[inline]
    pub fn cmp_rr(&mut self, a: Reg, b: Reg) {
        self.alu_rr(AluOp::Cmp, a, b);
    }

    #[inline]
    pub fn cmp_ri(&mut self, a: Reg, imm: i32) {
        self.alu_ri(AluOp::Cmp, a, imm);
    }

    #[inline]
    pub fn cmp_rm(&mut self, a: Reg, mem: Mem) {
        self.emit(X86Inst::Alu {
            op: AluOp::Cmp,
            dst: Operand::Reg(a),
            src: Operand::dword(mem),
        });
    }

    /// Compare against the address of `symbol`.
    #[inline]
    pub fn cmp_r_addr(&mut self, a: Reg, symbol: Symbol) {
        self.emit(X86Inst::Alu {
            op: AluOp::Cmp,
            dst: Operand::Reg(a),
            src: Operand::Addr(symbol),
        });
    }

    #[inline]
    pub fn xor_rr(&mut self, dst: Reg, src: Reg) {
        self.alu_rr(AluOp::Xor, dst, src);
    }

    #[inline]
    pub fn test_rr(&mut self, a: Reg, b: Reg) {
        self.emit(X86Inst::Test {
            dst: Operand::Reg(a),
            src: Operand::Reg(b),
        });
    }

    #[inline]
    pub fn neg_r(&mut self, reg: Reg) {
        self.emit(X86Inst::Neg(Operand::Reg(reg)));
    }

    #[inline]
    pub fn not_r(&mut self, reg: Reg) {
        self.emit(X86Inst::Not(Operand::Reg(reg)));
    }

    #[inline]
    pub fn mul_r(&mut self, src: Reg) {
        self.emit(X86Inst::Mul(Operand::Reg(src)));
    }

    #[inline]
    pub fn imul_rr(&mut self, dst: Reg, src: Reg) {
        self.emit(X86Inst::Imul {
            dst,
            src: Operand::Reg(src),
        });
    }

    #[inline]
    pub fn imul_rri(&mut self, dst: Reg, src: Reg, imm: i32) {
        self.emit(X86Inst::ImulImm {
            dst,
            src: Operand::Reg(src),
            imm,
        });
    }

    #[inline]
    pub fn div_r(&mut self, src: Reg) {
        self.emit(X86Inst::Div(Operand::Reg(src)));
    }

    #[inline]
    pub fn idiv_r(&mut self, src: Reg) {
        self.emit(X86Inst::Idiv(Operand::Reg(src)));
    }

    #[inline]
    pub fn cdq(&mut self) {
        self.emit(X86Inst::Cdq);
    }

    #[inline]
    pub fn shift_cl(&mut self, kind: ShiftKind, dst: Reg) {
        self.emit(X86Inst::Shift {
            kind,
            dst: Operand::Reg(dst),
            count: ShiftCount::Cl,
        });
    }

    #[inline]
    pub fn shift_ri(&mut self, kind: ShiftKind, dst: Reg, count: u8) {
        self.emit(X86Inst::Shift {
            kind,
            dst: Operand::Reg(dst),
            count: ShiftCount::Imm(count),
        });
    }

    #[inline]
    pub fn shld_cl(&mut self, dst: Reg, src: Reg) {
        self.emit(X86Inst::Shld {
            dst: Operand::Reg(dst),
            src,
            count: ShiftCount::Cl,
        });
    }

    #[inline]
    pub fn shrd_cl(&mut self, dst: Reg, src: Reg) {
        self.emit(X86Inst::Shrd {
            dst: Operand::Reg(dst),
            src,
            count: ShiftCount::Cl,
        });
    }

    // -------------------------------------------------------------------------
    // Control Flow
    // -------------------------------------------------------------------------

    #[inline]
    pub fn jmp(&mut self, label: Label) {
        self.emit(X86Inst::Jmp(Target::Label(label)));
    }

    #[inline]
    pub fn jcc(&mut self, cond: Cond, label: Label) {
        self.emit(X86Inst::Jcc(cond, label));
    }

    #[inline]
    pub fn je(&mut self, label: Label) {
        self.jcc(Cond::E, label);
    }

    #[inline]
    pub fn jne(&mut self, label: Label) {
        self.jcc(Cond::Ne, label);
    }

    #[inline]
    pub fn call_sym(&mut self, symbol: Symbol) {
        self.emit(X86Inst::Call(Target::Symbol(symbol)));
    }

    #[inline]
    pub fn call_r(&mut self, reg: Reg) {
        self.emit(X86Inst::Call(Target::Reg(reg)));
    }

    #[inline]
    pub fn ret(&mut self) {
        self.emit(X86Inst::Ret);
    }

    #[inline]
    pub fn nop(&mut self) {
        self.emit(X86Inst::Nop);
    }
}
