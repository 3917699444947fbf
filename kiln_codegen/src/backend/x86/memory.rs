//! Memory/stack transfer helpers.
//!
//! x86 tolerates unaligned access, so whole dwords move with one `push`/`pop`.
//! Only the tail of a value whose size is not a multiple of four needs
//! narrower moves. Scratch registers: `edx`, `esi`. Callers keep the base
//! address in some other register.

use super::inst::{AluOp, Mem, Reg, ShiftKind, Width, X86Inst};
use crate::context::Assembler;

/// Bytes of the `word`-th dword of a `storage`-byte value.
#[inline]
fn word_bytes(storage: u32, word: u32) -> u32 {
    (storage - 4 * word).min(4)
}

/// Load a 1..=3 byte tail into `dst`, zero- or sign-extended.
fn load_partial(asm: &mut Assembler<X86Inst>, dst: Reg, mem: &Mem, bytes: u32, signed: bool) {
    match bytes {
        1 if signed => asm.movsx_rm(dst, Width::Byte, mem.clone()),
        1 => asm.movzx_rm(dst, Width::Byte, mem.clone()),
        2 if signed => asm.movsx_rm(dst, Width::Word, mem.clone()),
        2 => asm.movzx_rm(dst, Width::Word, mem.clone()),
        _ => {
            asm.movzx_rm(dst, Width::Byte, mem.offset(2));
            asm.shift_ri(ShiftKind::Shl, dst, 16);
            asm.movzx_rm(Reg::Esi, Width::Word, mem.clone());
            asm.alu_rr(AluOp::Or, dst, Reg::Esi);
        }
    }
}

/// Push a `storage`-byte value read from `mem`, high dword first.
///
/// `signed` sign-extends values narrower than a dword.
pub(super) fn push_from_memory(
    asm: &mut Assembler<X86Inst>,
    mem: &Mem,
    storage: u32,
    signed: bool,
) {
    let words = storage.div_ceil(4);
    for word in (0..words).rev() {
        let at = mem.offset(4 * word as i32);
        match word_bytes(storage, word) {
            4 => asm.push_m(at),
            bytes => {
                load_partial(asm, Reg::Edx, &at, bytes, signed && storage < 4);
                asm.push_r(Reg::Edx);
            }
        }
    }
}

/// Pop a `storage`-byte value into `mem`, low dword first.
pub(super) fn pop_to_memory(asm: &mut Assembler<X86Inst>, mem: &Mem, storage: u32) {
    let words = storage.div_ceil(4);
    for word in 0..words {
        let at = mem.offset(4 * word as i32);
        match word_bytes(storage, word) {
            4 => asm.pop_m(at),
            1 => {
                asm.pop_r(Reg::Edx);
                asm.mov_m_sub(Width::Byte, at, Reg::Edx);
            }
            2 => {
                asm.pop_r(Reg::Edx);
                asm.mov_m_sub(Width::Word, at, Reg::Edx);
            }
            _ => {
                asm.pop_r(Reg::Edx);
                asm.mov_m_sub(Width::Word, at.clone(), Reg::Edx);
                asm.shift_ri(ShiftKind::Shr, Reg::Edx, 16);
                asm.mov_m_sub(Width::Byte, at.offset(2), Reg::Edx);
            }
        }
    }
}

/// Zero `storage` bytes at `mem`.
pub(super) fn zero_memory(asm: &mut Assembler<X86Inst>, mem: &Mem, storage: u32) {
    let mut done = 0;
    while done < storage {
        let width = match storage - done {
            4.. => Width::Dword,
            2 | 3 => Width::Word,
            _ => Width::Byte,
        };
        asm.mov_mi(width, mem.offset(done as i32), 0);
        done += width.bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(asm: &Assembler<X86Inst>) -> Vec<String> {
        asm.code().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_wide_value_pushes_high_first() {
        let mut asm = Assembler::new();
        push_from_memory(&mut asm, &Mem::base(Reg::Eax, 8), 8, true);
        assert_eq!(render(&asm), ["push dword [eax+12]", "push dword [eax+8]"]);
    }

    #[test]
    fn test_narrow_values_extend() {
        let mut asm = Assembler::new();
        push_from_memory(&mut asm, &Mem::base(Reg::Eax, 4), 1, true);
        push_from_memory(&mut asm, &Mem::base(Reg::Eax, 4), 2, false);
        assert_eq!(
            render(&asm),
            [
                "movsx edx, byte [eax+4]",
                "push edx",
                "movzx edx, word [eax+4]",
                "push edx"
            ]
        );
    }

    #[test]
    fn test_odd_struct_tail() {
        let mut asm = Assembler::new();
        pop_to_memory(&mut asm, &Mem::base(Reg::Eax, 0), 7);
        assert_eq!(
            render(&asm),
            [
                "pop dword [eax]",
                "pop edx",
                "mov word [eax+4], dx",
                "shr edx, 16",
                "mov byte [eax+6], dl"
            ]
        );
    }

    #[test]
    fn test_zero_memory_widths() {
        let mut asm = Assembler::new();
        zero_memory(&mut asm, &Mem::base(Reg::Eax, 0), 7);
        assert_eq!(
            render(&asm),
            [
                "mov dword [eax], 0",
                "mov word [eax+4], 0",
                "mov byte [eax+6], 0"
            ]
        );
    }
}
