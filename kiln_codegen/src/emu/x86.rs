//! Interpreter for [`X86Inst`] lists.

use super::image::Image;
use super::{
    EmuResult, Fault, Machine, RETURN_SENTINEL, STACK_TOP, StackValue, TraceEntry,
    argument_words, expected_return_sp,
};
use crate::backend::x86::inst::{
    AluOp, Cond, Mem, Operand, Reg, ShiftCount, ShiftKind, Target, X86Inst,
};
use kiln_core::Symbol;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    cf: bool,
    zf: bool,
    sf: bool,
    of: bool,
}

impl Flags {
    fn holds(self, cond: Cond) -> bool {
        match cond {
            Cond::E => self.zf,
            Cond::Ne => !self.zf,
            Cond::L => self.sf != self.of,
            Cond::Le => self.zf || self.sf != self.of,
            Cond::G => !self.zf && self.sf == self.of,
            Cond::Ge => self.sf == self.of,
            Cond::B => self.cf,
            Cond::Be => self.cf || self.zf,
            Cond::A => !self.cf && !self.zf,
            Cond::Ae => !self.cf,
        }
    }
}

#[inline]
fn mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

#[inline]
fn sign(value: u64, bits: u32) -> bool {
    value >> (bits - 1) & 1 == 1
}

fn sign_extend(value: u32, bits: u32) -> u32 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as u32
}

/// Result and flags of a two-operand ALU op on `bits`-wide values.
fn alu(op: AluOp, a: u32, b: u32, carry: bool, bits: u32) -> (u32, Flags) {
    let m = mask(bits);
    let (a, b) = (u64::from(a) & m, u64::from(b) & m);
    let (raw, cf, of) = match op {
        AluOp::Add | AluOp::Adc => {
            let c = u64::from(op == AluOp::Adc && carry);
            let raw = a + b + c;
            let of = sign(a, bits) == sign(b, bits) && sign(raw, bits) != sign(a, bits);
            (raw, raw > m, of)
        }
        AluOp::Sub | AluOp::Sbb | AluOp::Cmp => {
            let c = u64::from(op == AluOp::Sbb && carry);
            let raw = a.wrapping_sub(b).wrapping_sub(c);
            let of = sign(a, bits) != sign(b, bits) && sign(raw, bits) != sign(a, bits);
            (raw, a < b + c, of)
        }
        AluOp::And => (a & b, false, false),
        AluOp::Or => (a | b, false, false),
        AluOp::Xor => (a ^ b, false, false),
    };
    let result = raw & m;
    let flags = Flags {
        cf,
        zf: result == 0,
        sf: sign(result, bits),
        of,
    };
    (result as u32, flags)
}

/// Reference interpreter for the x86 backend.
///
/// A `call` to a runtime helper runs the helper natively; no return address
/// is pushed, so the helper sees its return slot at `esp`.
#[derive(Debug, Clone)]
pub struct X86Machine {
    image: Image<X86Inst>,
    regs: [u32; 8],
    flags: Flags,
    pc: u32,
    trace: Vec<TraceEntry>,
}

impl X86Machine {
    #[inline]
    pub fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    #[inline]
    fn set(&mut self, reg: Reg, value: u32) {
        self.regs[reg.index()] = value;
    }

    fn push(&mut self, value: u32) -> EmuResult<()> {
        let sp = self.reg(Reg::Esp).wrapping_sub(4);
        self.image.write_u32(sp, value)?;
        self.set(Reg::Esp, sp);
        Ok(())
    }

    fn pop(&mut self) -> EmuResult<u32> {
        let sp = self.reg(Reg::Esp);
        let value = self.image.read_u32(sp)?;
        self.set(Reg::Esp, sp.wrapping_add(4));
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Operands
    // -------------------------------------------------------------------------

    fn address(&self, mem: &Mem) -> EmuResult<u32> {
        let mut address = mem.disp as u32;
        if let Some(base) = mem.base {
            address = address.wrapping_add(self.reg(base));
        }
        if let Some(symbol) = &mem.symbol {
            address = address.wrapping_add(self.image.resolve(symbol)?);
        }
        Ok(address)
    }

    fn bits(operand: &Operand) -> u32 {
        match operand {
            Operand::Sub(_, width) | Operand::Mem(width, _) => 8 * width.bytes(),
            _ => 32,
        }
    }

    /// Zero-extended value of `operand`.
    fn read(&self, operand: &Operand) -> EmuResult<u32> {
        match operand {
            Operand::Reg(reg) => Ok(self.reg(*reg)),
            Operand::Sub(reg, width) => Ok((u64::from(self.reg(*reg)) & mask(8 * width.bytes())) as u32),
            Operand::Imm(value) => Ok(*value as u32),
            Operand::Mem(width, mem) => self.image.memory().read(self.address(mem)?, width.bytes()),
            Operand::Addr(symbol) => self.image.resolve(symbol),
        }
    }

    fn write(&mut self, operand: &Operand, value: u32) -> EmuResult<()> {
        match operand {
            Operand::Reg(reg) => {
                self.set(*reg, value);
                Ok(())
            }
            Operand::Sub(reg, width) => {
                let m = mask(8 * width.bytes()) as u32;
                let merged = (self.reg(*reg) & !m) | (value & m);
                self.set(*reg, merged);
                Ok(())
            }
            Operand::Mem(width, mem) => {
                let address = self.address(mem)?;
                self.image.memory_mut().write(address, width.bytes(), value)
            }
            Operand::Imm(_) | Operand::Addr(_) => Err(Fault::InvalidInstruction { address: self.pc }),
        }
    }

    fn target(&self, target: &Target) -> EmuResult<u32> {
        match target {
            Target::Label(label) => self.image.label_address(label),
            Target::Symbol(symbol) => self.image.resolve(symbol),
            Target::Reg(reg) => Ok(self.reg(*reg)),
        }
    }

    fn shift_count(&self, count: ShiftCount) -> u32 {
        match count {
            ShiftCount::Cl => self.reg(Reg::Ecx) & 31,
            ShiftCount::Imm(n) => u32::from(n) & 31,
        }
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    fn step(&mut self, inst: &X86Inst) -> EmuResult<()> {
        let here = self.pc;
        self.pc = here.wrapping_add(4);

        match inst {
            X86Inst::Label(_) | X86Inst::Nop => {}
            X86Inst::Mov { dst, src } => {
                let value = self.read(src)?;
                self.write(dst, value)?;
            }
            X86Inst::Movzx { dst, src } => {
                let value = self.read(src)?;
                self.set(*dst, value);
            }
            X86Inst::Movsx { dst, src } => {
                let value = sign_extend(self.read(src)?, Self::bits(src));
                self.set(*dst, value);
            }
            X86Inst::Lea { dst, src } => {
                let address = self.address(src)?;
                self.set(*dst, address);
            }
            X86Inst::Push(operand) => {
                let value = self.read(operand)?;
                self.push(value)?;
            }
            X86Inst::Pop(operand) => {
                let value = self.pop()?;
                self.write(operand, value)?;
            }
            X86Inst::Alu { op, dst, src } => {
                let bits = Self::bits(dst);
                let (result, flags) = alu(*op, self.read(dst)?, self.read(src)?, self.flags.cf, bits);
                self.flags = flags;
                if *op != AluOp::Cmp {
                    self.write(dst, result)?;
                }
            }
            X86Inst::Test { dst, src } => {
                let bits = Self::bits(dst);
                let (_, flags) = alu(AluOp::And, self.read(dst)?, self.read(src)?, false, bits);
                self.flags = flags;
            }
            X86Inst::Neg(operand) => {
                let bits = Self::bits(operand);
                let (result, flags) = alu(AluOp::Sub, 0, self.read(operand)?, false, bits);
                self.flags = flags;
                self.write(operand, result)?;
            }
            X86Inst::Not(operand) => {
                let value = !self.read(operand)?;
                self.write(operand, value)?;
            }
            X86Inst::Mul(operand) => {
                let product = u64::from(self.reg(Reg::Eax)) * u64::from(self.read(operand)?);
                self.set(Reg::Eax, product as u32);
                self.set(Reg::Edx, (product >> 32) as u32);
                let overflow = product >> 32 != 0;
                self.flags.cf = overflow;
                self.flags.of = overflow;
            }
            X86Inst::Imul { dst, src } => {
                let lhs = self.reg(*dst) as i32;
                let rhs = self.read(src)? as i32;
                self.imul(*dst, lhs, rhs);
            }
            X86Inst::ImulImm { dst, src, imm } => {
                let lhs = self.read(src)? as i32;
                self.imul(*dst, lhs, *imm);
            }
            X86Inst::Div(operand) => {
                let divisor = u64::from(self.read(operand)?);
                let dividend = u64::from(self.reg(Reg::Edx)) << 32 | u64::from(self.reg(Reg::Eax));
                if divisor == 0 {
                    return Err(Fault::DivideByZero);
                }
                let quotient = u32::try_from(dividend / divisor).map_err(|_| Fault::DivideByZero)?;
                self.set(Reg::Eax, quotient);
                self.set(Reg::Edx, (dividend % divisor) as u32);
            }
            X86Inst::Idiv(operand) => {
                let divisor = i64::from(self.read(operand)? as i32);
                let dividend =
                    (u64::from(self.reg(Reg::Edx)) << 32 | u64::from(self.reg(Reg::Eax))) as i64;
                let quotient = dividend.checked_div(divisor).ok_or(Fault::DivideByZero)?;
                let quotient = i32::try_from(quotient).map_err(|_| Fault::DivideByZero)?;
                let remainder = dividend.checked_rem(divisor).ok_or(Fault::DivideByZero)?;
                self.set(Reg::Eax, quotient as u32);
                self.set(Reg::Edx, remainder as u32);
            }
            X86Inst::Cdq => {
                let high = if (self.reg(Reg::Eax) as i32) < 0 { u32::MAX } else { 0 };
                self.set(Reg::Edx, high);
            }
            X86Inst::Shift { kind, dst, count } => {
                let n = self.shift_count(*count);
                if n != 0 {
                    let bits = Self::bits(dst);
                    let value = self.read(dst)?;
                    let (result, carry) = match kind {
                        ShiftKind::Shl => (
                            (u64::from(value) << n) & mask(bits),
                            (u64::from(value) << n >> bits) & 1 == 1,
                        ),
                        ShiftKind::Shr => (u64::from(value) >> n, value >> (n - 1) & 1 == 1),
                        ShiftKind::Sar => {
                            let signed = sign_extend(value, bits) as i32;
                            (
                                (u64::from((signed >> n) as u32)) & mask(bits),
                                (signed >> (n - 1)) & 1 == 1,
                            )
                        }
                    };
                    self.flags.cf = carry;
                    self.flags.zf = result == 0;
                    self.flags.sf = sign(result, bits);
                    self.write(dst, result as u32)?;
                }
            }
            X86Inst::Shld { dst, src, count } => {
                let n = self.shift_count(*count);
                if n != 0 {
                    let value = self.read(dst)?;
                    let fill = self.reg(*src);
                    self.write(dst, value << n | fill >> (32 - n))?;
                }
            }
            X86Inst::Shrd { dst, src, count } => {
                let n = self.shift_count(*count);
                if n != 0 {
                    let value = self.read(dst)?;
                    let fill = self.reg(*src);
                    self.write(dst, value >> n | fill << (32 - n))?;
                }
            }
            X86Inst::Jmp(target) => self.pc = self.target(target)?,
            X86Inst::Jcc(cond, label) => {
                if self.flags.holds(*cond) {
                    self.pc = self.image.label_address(label)?;
                }
            }
            X86Inst::Call(target) => {
                let destination = self.target(target)?;
                match self.image.helper_at(destination) {
                    Some(helper) => {
                        let sp = self.reg(Reg::Esp);
                        if let Some(value) = self.image.run_helper(helper, sp, here)? {
                            self.set(Reg::Eax, value);
                        }
                    }
                    None => {
                        let ret = self.pc;
                        self.push(ret)?;
                        self.pc = destination;
                    }
                }
            }
            X86Inst::Ret => self.pc = self.pop()?,
        }
        Ok(())
    }

    fn imul(&mut self, dst: Reg, lhs: i32, rhs: i32) {
        let (product, overflow) = lhs.overflowing_mul(rhs);
        self.flags.cf = overflow;
        self.flags.of = overflow;
        self.set(dst, product as u32);
    }

    fn run(&mut self) -> EmuResult<()> {
        let limit = self.image.step_limit();
        let mut steps = 0u64;
        while self.pc != RETURN_SENTINEL {
            if steps == limit {
                return Err(Fault::StepLimit(limit));
            }
            steps += 1;
            let index = self.image.index_of(self.pc)?;
            self.trace.push(TraceEntry {
                index,
                sp: self.reg(Reg::Esp),
                fp: self.reg(Reg::Ebp),
            });
            let inst = self
                .image
                .instruction(index)
                .cloned()
                .ok_or(Fault::InvalidInstruction { address: self.pc })?;
            self.step(&inst)?;
        }
        Ok(())
    }
}

impl Machine for X86Machine {
    type Inst = X86Inst;

    fn new(image: Image<X86Inst>) -> Self {
        Self {
            image,
            regs: [0; 8],
            flags: Flags::default(),
            pc: RETURN_SENTINEL,
            trace: Vec::new(),
        }
    }

    #[inline]
    fn image(&self) -> &Image<X86Inst> {
        &self.image
    }

    #[inline]
    fn image_mut(&mut self) -> &mut Image<X86Inst> {
        &mut self.image
    }

    fn invoke(
        &mut self,
        entry: &Symbol,
        args: &[StackValue],
        return_bytes: u32,
    ) -> EmuResult<Vec<u32>> {
        self.trace.clear();
        self.regs = [0; 8];
        self.flags = Flags::default();
        self.set(Reg::Esp, STACK_TOP);
        for word in argument_words(args) {
            self.push(word)?;
        }
        let sp = self.reg(Reg::Esp) - return_bytes;
        self.set(Reg::Esp, sp);
        self.push(RETURN_SENTINEL)?;
        self.pc = self.image.resolve(entry)?;

        self.run()?;
        debug!(entry = %entry, steps = self.trace.len(), "x86 invocation returned");

        let sp = self.reg(Reg::Esp);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_sets_borrow_and_sign() {
        let (result, flags) = alu(AluOp::Sub, 1, 2, false, 32);
        assert_eq!(result, u32::MAX);
        assert!(flags.cf);
        assert!(flags.sf);
        assert!(!flags.of);
        assert!(flags.holds(Cond::L));
        assert!(flags.holds(Cond::B));
    }

    #[test]
    fn test_signed_overflow_flags() {
        let (_, flags) = alu(AluOp::Cmp, 0x8000_0000, 1, false, 32);
        assert!(flags.of);
        assert!(flags.holds(Cond::L));
        assert!(!flags.holds(Cond::B));

        let (result, flags) = alu(AluOp::Adc, u32::MAX, 0, true, 32);
        assert_eq!(result, 0);
        assert!(flags.cf && flags.zf);
    }

    #[test]
    fn test_byte_width_alu() {
        let (result, flags) = alu(AluOp::Add, 0xFF, 1, false, 8);
        assert_eq!(result, 0);
        assert!(flags.cf);
        assert_eq!(sign_extend(0x80, 8), 0xFFFF_FF80);
        assert_eq!(sign_extend(0x7FFF, 16), 0x7FFF);
    }
}
