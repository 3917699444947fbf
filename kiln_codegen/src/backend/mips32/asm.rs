//! Emit helpers for [`MipsInst`].
//!
//! Every branch and jump helper fills its delay slot with `nop`. `push`/`pop`
//! expand to an `$sp` adjustment plus a word load or store; immediates and
//! addresses travel through `$t9`.

use super::inst::{Alu3Op, BranchCmp, ImmOp, MemWidth, MipsInst, Reg, ShiftImmOp, ZeroCmp};
use crate::context::Assembler;
use crate::label::Label;
use kiln_core::Symbol;

impl Assembler<MipsInst> {
    // -------------------------------------------------------------------------
    // Arithmetic
    // -------------------------------------------------------------------------

    #[inline]
    pub fn alu3(&mut self, op: Alu3Op, dst: Reg, lhs: Reg, rhs: Reg) {
        self.emit(MipsInst::Alu3 { op, dst, lhs, rhs });
    }

    #[inline]
    pub fn addu(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.alu3(Alu3Op::Addu, dst, lhs, rhs);
    }

    #[inline]
    pub fn subu(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.alu3(Alu3Op::Subu, dst, lhs, rhs);
    }

    #[inline]
    pub fn or(&mut self, dst: Reg, lhs: Reg, rhs: Reg) {
        self.alu3(Alu3Op::Or, dst, lhs, rhs);
    }

    #[inline]
    pub fn slt(&mut self, dst: Reg, lhs: Reg, rhs: Reg, unsigned: bool) {
        let op = if unsigned { Alu3Op::Sltu } else { Alu3Op::Slt };
        self.alu3(op, dst, lhs, rhs);
    }

    #[inline]
    pub fn alu_imm(&mut self, op: ImmOp, dst: Reg, src: Reg, imm: i32) {
        self.emit(MipsInst::AluImm { op, dst, src, imm });
    }

    #[inline]
    pub fn addiu(&mut self, dst: Reg, src: Reg, imm: i32) {
        self.alu_imm(ImmOp::Addiu, dst, src, imm);
    }

    #[inline]
    pub fn shift_imm(&mut self, op: ShiftImmOp, dst: Reg, src: Reg, amount: u8) {
        self.emit(MipsInst::ShiftImm {
            op,
            dst,
            src,
            amount,
        });
    }

    #[inline]
    pub fn mult(&mut self, lhs: Reg, rhs: Reg, unsigned: bool) {
        self.emit(MipsInst::Mult { lhs, rhs, unsigned });
    }

    #[inline]
    pub fn div(&mut self, lhs: Reg, rhs: Reg, unsigned: bool) {
        self.emit(MipsInst::Div { lhs, rhs, unsigned });
    }

    #[inline]
    pub fn mfhi(&mut self, dst: Reg) {
        self.emit(MipsInst::Mfhi(dst));
    }

    #[inline]
    pub fn mflo(&mut self, dst: Reg) {
        self.emit(MipsInst::Mflo(dst));
    }

    // -------------------------------------------------------------------------
    // Moves and Memory
    // -------------------------------------------------------------------------

    #[inline]
    pub fn li(&mut self, dst: Reg, imm: i32) {
        self.emit(MipsInst::Li { dst, imm });
    }

    #[inline]
    pub fn la(&mut self, dst: Reg, symbol: Symbol) {
        self.emit(MipsInst::La { dst, symbol });
    }

    #[inline]
    pub fn mov(&mut self, dst: Reg, src: Reg) {
        self.emit(MipsInst::Move { dst, src });
    }

    #[inline]
    pub fn load(&mut self, width: MemWidth, signed: bool, dst: Reg, offset: i32, base: Reg) {
        self.emit(MipsInst::Load {
            width,
            signed,
            dst,
            offset,
            base,
        });
    }

    #[inline]
    pub fn lw(&mut self, dst: Reg, offset: i32, base: Reg) {
        self.load(MemWidth::Word, true, dst, offset, base);
    }

    #[inline]
    pub fn store(&mut self, width: MemWidth, src: Reg, offset: i32, base: Reg) {
        self.emit(MipsInst::Store {
            width,
            src,
            offset,
            base,
        });
    }

    #[inline]
    pub fn sw(&mut self, src: Reg, offset: i32, base: Reg) {
        self.store(MemWidth::Word, src, offset, base);
    }

    // -------------------------------------------------------------------------
    // Stack
    // -------------------------------------------------------------------------

    pub fn push(&mut self, src: Reg) {
        self.addiu(Reg::Sp, Reg::Sp, -4);
        self.sw(src, 0, Reg::Sp);
    }

    pub fn pop(&mut self, dst: Reg) {
        self.lw(dst, 0, Reg::Sp);
        self.addiu(Reg::Sp, Reg::Sp, 4);
    }

    /// Push a constant; zero comes straight from `$zero`.
    pub fn push_imm(&mut self, imm: i32) {
        if imm == 0 {
            self.push(Reg::Zero);
        } else {
            self.li(Reg::T9, imm);
            self.push(Reg::T9);
        }
    }

    pub fn push_addr(&mut self, symbol: Symbol) {
        self.la(Reg::T9, symbol);
        self.push(Reg::T9);
    }

    /// Release `bytes` of stack; nothing for zero.
    pub fn drop_bytes(&mut self, bytes: u32) {
        if bytes > 0 {
            self.addiu(Reg::Sp, Reg::Sp, bytes as i32);
        }
    }

    /// Reserve `bytes` of stack; nothing for zero.
    pub fn reserve_bytes(&mut self, bytes: u32) {
        if bytes > 0 {
            self.addiu(Reg::Sp, Reg::Sp, -(bytes as i32));
        }
    }

    // -------------------------------------------------------------------------
    // Control Flow
    // -------------------------------------------------------------------------

    pub fn branch(&mut self, cmp: BranchCmp, lhs: Reg, rhs: Reg, target: Label) {
        self.emit(MipsInst::Branch {
            cmp,
            lhs,
            rhs,
            target,
        });
        self.nop();
    }

    #[inline]
    pub fn beq(&mut self, lhs: Reg, rhs: Reg, target: Label) {
        self.branch(BranchCmp::Eq, lhs, rhs, target);
    }

    #[inline]
    pub fn bne(&mut self, lhs: Reg, rhs: Reg, target: Label) {
        self.branch(BranchCmp::Ne, lhs, rhs, target);
    }

    pub fn branch_zero(&mut self, cmp: ZeroCmp, src: Reg, target: Label) {
        self.emit(MipsInst::BranchZ { cmp, src, target });
        self.nop();
    }

    pub fn j(&mut self, target: Label) {
        self.emit(MipsInst::J(target));
        self.nop();
    }

    pub fn jal(&mut self, symbol: Symbol) {
        self.emit(MipsInst::Jal(symbol));
        self.nop();
    }

    pub fn jalr(&mut self, reg: Reg) {
        self.emit(MipsInst::Jalr(reg));
        self.nop();
    }

    pub fn jr(&mut self, reg: Reg) {
        self.emit(MipsInst::Jr(reg));
        self.nop();
    }

    #[inline]
    pub fn nop(&mut self) {
        self.emit(MipsInst::Nop);
    }
}
