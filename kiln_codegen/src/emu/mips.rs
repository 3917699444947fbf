//! Interpreter for [`MipsInst`] lists, delay slots included.

use super::image::Image;
use super::{
    EmuResult, Fault, Machine, RETURN_SENTINEL, STACK_TOP, StackValue, TraceEntry,
    argument_words, expected_return_sp,
};
use crate::backend::mips32::{Alu3Op, BranchCmp, ImmOp, MipsInst, Reg, ShiftImmOp, ZeroCmp};
use kiln_core::Symbol;
use tracing::debug;

/// Reference interpreter for the MIPS32 backend.
///
/// Control transfers take effect after the following instruction, as on the
/// hardware. Reaching a runtime helper's address runs the helper natively and
/// returns through `$ra`.
#[derive(Debug, Clone)]
pub struct MipsMachine {
    image: Image<MipsInst>,
    regs: [u32; 32],
    hi: u32,
    lo: u32,
    pc: u32,
    npc: u32,
    trace: Vec<TraceEntry>,
}

impl MipsMachine {
    #[inline]
    pub fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    #[inline]
    fn set(&mut self, reg: Reg, value: u32) {
        if reg != Reg::Zero {
            self.regs[reg.index()] = value;
        }
    }

    fn push(&mut self, value: u32) -> EmuResult<()> {
        let sp = self.reg(Reg::Sp).wrapping_sub(4);
        self.image.write_u32(sp, value)?;
        self.set(Reg::Sp, sp);
        Ok(())
    }

    fn effective(&self, base: Reg, offset: i32, bytes: u32) -> EmuResult<u32> {
        let address = self.reg(base).wrapping_add(offset as u32);
        if address % bytes != 0 {
            return Err(Fault::Unaligned { address });
        }
        Ok(address)
    }

    fn alu3(op: Alu3Op, lhs: u32, rhs: u32) -> u32 {
        match op {
            Alu3Op::Addu => lhs.wrapping_add(rhs),
            Alu3Op::Subu => lhs.wrapping_sub(rhs),
            Alu3Op::And => lhs & rhs,
            Alu3Op::Or => lhs | rhs,
            Alu3Op::Xor => lhs ^ rhs,
            Alu3Op::Nor => !(lhs | rhs),
            Alu3Op::Slt => u32::from((lhs as i32) < (rhs as i32)),
            Alu3Op::Sltu => u32::from(lhs < rhs),
            Alu3Op::Sllv => lhs << (rhs & 31),
            Alu3Op::Srlv => lhs >> (rhs & 31),
            Alu3Op::Srav => ((lhs as i32) >> (rhs & 31)) as u32,
        }
    }

    fn alu_imm(op: ImmOp, src: u32, imm: i32) -> u32 {
        let zero_extended = (imm as u32) & 0xFFFF;
        match op {
            ImmOp::Addiu => src.wrapping_add(imm as u32),
            ImmOp::Andi => src & zero_extended,
            ImmOp::Ori => src | zero_extended,
            ImmOp::Xori => src ^ zero_extended,
            ImmOp::Slti => u32::from((src as i32) < imm),
            ImmOp::Sltiu => u32::from(src < imm as u32),
        }
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Execute the instruction at `pc`; returns the new `npc`.
    fn step(&mut self, inst: &MipsInst) -> EmuResult<u32> {
        let mut next = self.npc.wrapping_add(4);

        match inst {
            MipsInst::Label(_) | MipsInst::Nop => {}
            MipsInst::Alu3 { op, dst, lhs, rhs } => {
                let value = Self::alu3(*op, self.reg(*lhs), self.reg(*rhs));
                self.set(*dst, value);
            }
            MipsInst::AluImm { op, dst, src, imm } => {
                let value = Self::alu_imm(*op, self.reg(*src), *imm);
                self.set(*dst, value);
            }
            MipsInst::ShiftImm {
                op,
                dst,
                src,
                amount,
            } => {
                let n = u32::from(*amount) & 31;
                let src = self.reg(*src);
                let value = match op {
                    ShiftImmOp::Sll => src << n,
                    ShiftImmOp::Srl => src >> n,
                    ShiftImmOp::Sra => ((src as i32) >> n) as u32,
                };
                self.set(*dst, value);
            }
            MipsInst::Mult { lhs, rhs, unsigned } => {
                let (lhs, rhs) = (self.reg(*lhs), self.reg(*rhs));
                let product = if *unsigned {
                    u64::from(lhs) * u64::from(rhs)
                } else {
                    (i64::from(lhs as i32) * i64::from(rhs as i32)) as u64
                };
                self.hi = (product >> 32) as u32;
                self.lo = product as u32;
            }
            MipsInst::Div { lhs, rhs, unsigned } => {
                let (lhs, rhs) = (self.reg(*lhs), self.reg(*rhs));
                if rhs == 0 {
                    return Err(Fault::DivideByZero);
                }
                if *unsigned {
                    self.lo = lhs / rhs;
                    self.hi = lhs % rhs;
                } else {
                    self.lo = (lhs as i32).wrapping_div(rhs as i32) as u32;
                    self.hi = (lhs as i32).wrapping_rem(rhs as i32) as u32;
                }
            }
            MipsInst::Mfhi(dst) => self.set(*dst, self.hi),
            MipsInst::Mflo(dst) => self.set(*dst, self.lo),
            MipsInst::Li { dst, imm } => self.set(*dst, *imm as u32),
            MipsInst::La { dst, symbol } => {
                let address = self.image.resolve(symbol)?;
                self.set(*dst, address);
            }
            MipsInst::Move { dst, src } => self.set(*dst, self.reg(*src)),
            MipsInst::Load {
                width,
                signed,
                dst,
                offset,
                base,
            } => {
                let bytes = width.bytes();
                let address = self.effective(*base, *offset, bytes)?;
                let mut value = self.image.memory().read(address, bytes)?;
                if *signed && bytes < 4 {
                    let shift = 32 - 8 * bytes;
                    value = (((value << shift) as i32) >> shift) as u32;
                }
                self.set(*dst, value);
            }
            MipsInst::Store {
                width,
                src,
                offset,
                base,
            } => {
                let bytes = width.bytes();
                let address = self.effective(*base, *offset, bytes)?;
                let value = self.reg(*src);
                self.image.memory_mut().write(address, bytes, value)?;
            }
            MipsInst::Branch {
                cmp,
                lhs,
                rhs,
                target,
            } => {
                let equal = self.reg(*lhs) == self.reg(*rhs);
                if equal == (*cmp == BranchCmp::Eq) {
                    next = self.image.label_address(target)?;
                }
            }
            MipsInst::BranchZ { cmp, src, target } => {
                let value = self.reg(*src) as i32;
                let taken = match cmp {
                    ZeroCmp::Lez => value <= 0,
                    ZeroCmp::Gtz => value > 0,
                    ZeroCmp::Ltz => value < 0,
                    ZeroCmp::Gez => value >= 0,
                };
                if taken {
                    next = self.image.label_address(target)?;
                }
            }
            MipsInst::J(label) => next = self.image.label_address(label)?,
            MipsInst::Jal(symbol) => {
                next = self.image.resolve(symbol)?;
                self.set(Reg::Ra, self.pc.wrapping_add(8));
            }
            MipsInst::Jalr(reg) => {
                next = self.reg(*reg);
                self.set(Reg::Ra, self.pc.wrapping_add(8));
            }
            MipsInst::Jr(reg) => next = self.reg(*reg),
        }
        Ok(next)
    }

    /// Run the helper at `pc` and return to `$ra`.
    fn call_helper(&mut self) -> EmuResult<bool> {
        let Some(helper) = self.image.helper_at(self.pc) else {
            return Ok(false);
        };
        let ra = self.reg(Reg::Ra);
        let sp = self.reg(Reg::Sp);
        if let Some(value) = self.image.run_helper(helper, sp, ra.wrapping_sub(8))? {
            self.set(Reg::V0, value);
        }
        self.pc = ra;
        self.npc = ra.wrapping_add(4);
        Ok(true)
    }

    fn run(&mut self) -> EmuResult<()> {
        let limit = self.image.step_limit();
        let mut steps = 0u64;
        while self.pc != RETURN_SENTINEL {
            if steps == limit {
                return Err(Fault::StepLimit(limit));
            }
            steps += 1;
            if self.call_helper()? {
                continue;
            }
            let index = self.image.index_of(self.pc)?;
            self.trace.push(TraceEntry {
                index,
                sp: self.reg(Reg::Sp),
                fp: self.reg(Reg::Fp),
            });
            let inst = self
                .image
                .instruction(index)
                .cloned()
                .ok_or(Fault::InvalidInstruction { address: self.pc })?;
            let next = self.step(&inst)?;
            self.pc = self.npc;
            self.npc = next;
        }
        Ok(())
    }
}

impl Machine for MipsMachine {
    type Inst = MipsInst;

    fn new(image: Image<MipsInst>) -> Self {
        Self {
            image,
            regs: [0; 32],
            hi: 0,
            lo: 0,
            pc: RETURN_SENTINEL,
            npc: RETURN_SENTINEL,
            trace: Vec::new(),
        }
    }

    #[inline]
    fn image(&self) -> &Image<MipsInst> {
        &self.image
    }

    #[inline]
    fn image_mut(&mut self) -> &mut Image<MipsInst> {
        &mut self.image
    }

    fn invoke(
        &mut self,
        entry: &Symbol,
        args: &[StackValue],
        return_bytes: u32,
    ) -> EmuResult<Vec<u32>> {
        self.trace.clear();
        self.regs = [0; 32];
        self.set(Reg::Sp, STACK_TOP);
        for word in argument_words(args) {
            self.push(word)?;
        }
        let sp = self.reg(Reg::Sp) - return_bytes;
        self.set(Reg::Sp, sp);
        self.set(Reg::Ra, RETURN_SENTINEL);
        self.pc = self.image.resolve(entry)?;
        self.npc = self.pc.wrapping_add(4);

        self.run()?;
        debug!(entry = %entry, steps = self.trace.len(), "mips32 invocation returned");

        let sp = self.reg(Reg::Sp);
        let expected = expected_return_sp(args, return_bytes);
        if sp != expected {
            return Err(Fault::StackImbalance {
                expected,
                actual: sp,
            });
        }
        (0..return_bytes / 4)
            .map(|word| self.image.read_u32(sp + 4 * word))
            .collect()
    }

    #[inline]
    fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }
}
