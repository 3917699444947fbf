//! Memory/stack transfer helpers.
//!
//! MIPS loads and stores fault on misaligned addresses. A value moves with a
//! single `lw`/`lh`/`lb` (or store) only when its address is known to be
//! aligned for that width; otherwise it is assembled or split one byte at a
//! time, little-endian. Scratch registers: `$t6` (the value) and `$t7`.

use super::inst::{Alu3Op, MemWidth, MipsInst, Reg, ShiftImmOp};
use crate::context::Assembler;

/// Alignment guaranteed for `offset` from a word-aligned base, capped at 4.
#[inline]
pub(super) fn offset_alignment(offset: u32) -> u32 {
    if offset == 0 {
        4
    } else {
        (1 << offset.trailing_zeros()).min(4)
    }
}

/// Alignment of every element of an array with the given stride.
#[inline]
pub(super) fn stride_alignment(stride: u32) -> u32 {
    offset_alignment(stride)
}

#[inline]
fn word_bytes(storage: u32, word: u32) -> u32 {
    (storage - 4 * word).min(4)
}

/// Load `bytes` (1..=4) at `offset(base)` into `dst`.
fn load_value(
    asm: &mut Assembler<MipsInst>,
    dst: Reg,
    base: Reg,
    offset: i32,
    bytes: u32,
    signed: bool,
    align: u32,
) {
    if let Some(width) = MemWidth::from_bytes(bytes).filter(|_| align >= bytes) {
        asm.load(width, signed, dst, offset, base);
        return;
    }
    // Highest byte first so only it carries the sign.
    let top = bytes - 1;
    asm.load(MemWidth::Byte, signed, dst, offset + top as i32, base);
    for byte in (0..top).rev() {
        asm.shift_imm(ShiftImmOp::Sll, dst, dst, 8);
        asm.load(MemWidth::Byte, false, Reg::T7, offset + byte as i32, base);
        asm.alu3(Alu3Op::Or, dst, dst, Reg::T7);
    }
}

/// Store the low `bytes` (1..=4) of `src` at `offset(base)`.
fn store_value(
    asm: &mut Assembler<MipsInst>,
    src: Reg,
    base: Reg,
    offset: i32,
    bytes: u32,
    align: u32,
) {
    if let Some(width) = MemWidth::from_bytes(bytes).filter(|_| align >= bytes) {
        asm.store(width, src, offset, base);
        return;
    }
    asm.store(MemWidth::Byte, src, offset, base);
    for byte in 1..bytes {
        asm.shift_imm(ShiftImmOp::Srl, Reg::T7, src, (8 * byte) as u8);
        asm.store(MemWidth::Byte, Reg::T7, offset + byte as i32, base);
    }
}

/// Push a `storage`-byte value read from `offset(base)`, high word first.
pub(super) fn push_from_memory(
    asm: &mut Assembler<MipsInst>,
    base: Reg,
    offset: i32,
    storage: u32,
    signed: bool,
    align: u32,
) {
    for word in (0..storage.div_ceil(4)).rev() {
        let bytes = word_bytes(storage, word);
        load_value(
            asm,
            Reg::T6,
            base,
            offset + 4 * word as i32,
            bytes,
            signed && storage < 4,
            align,
        );
        asm.push(Reg::T6);
    }
}

/// Pop a `storage`-byte value into `offset(base)`, low word first.
pub(super) fn pop_to_memory(
    asm: &mut Assembler<MipsInst>,
    base: Reg,
    offset: i32,
    storage: u32,
    align: u32,
) {
    for word in 0..storage.div_ceil(4) {
        asm.pop(Reg::T6);
        store_value(
            asm,
            Reg::T6,
            base,
            offset + 4 * word as i32,
            word_bytes(storage, word),
            align,
        );
    }
}

/// Zero `storage` bytes at `offset(base)` with the widest stores `align`
/// allows.
pub(super) fn zero_memory(
    asm: &mut Assembler<MipsInst>,
    base: Reg,
    offset: i32,
    storage: u32,
    align: u32,
) {
    let mut done = 0;
    while done < storage {
        let left = storage - done;
        let width = if align >= 4 && left >= 4 {
            MemWidth::Word
        } else if align >= 2 && left >= 2 {
            MemWidth::Half
        } else {
            MemWidth::Byte
        };
        asm.store(width, Reg::Zero, offset + done as i32, base);
        done += width.bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(asm: &Assembler<MipsInst>) -> Vec<String> {
        asm.code().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_alignment_from_offsets() {
        assert_eq!(offset_alignment(0), 4);
        assert_eq!(offset_alignment(6), 2);
        assert_eq!(offset_alignment(13), 1);
        assert_eq!(offset_alignment(16), 4);
        assert_eq!(stride_alignment(8), 4);
        assert_eq!(stride_alignment(3), 1);
    }

    #[test]
    fn test_aligned_word_is_single_load() {
        let mut asm = Assembler::new();
        push_from_memory(&mut asm, Reg::T0, 8, 4, true, 4);
        assert_eq!(
            render(&asm),
            ["lw $t6, 8($t0)", "addiu $sp, $sp, -4", "sw $t6, 0($sp)"]
        );
    }

    #[test]
    fn test_unaligned_half_assembles_bytes() {
        let mut asm = Assembler::new();
        push_from_memory(&mut asm, Reg::T0, 5, 2, true, 1);
        assert_eq!(
            render(&asm)[..4],
            [
                "lb $t6, 6($t0)",
                "sll $t6, $t6, 8",
                "lbu $t7, 5($t0)",
                "or $t6, $t6, $t7"
            ]
        );
    }

    #[test]
    fn test_unaligned_store_splits_bytes() {
        let mut asm = Assembler::new();
        pop_to_memory(&mut asm, Reg::T0, 1, 2, 1);
        assert_eq!(
            render(&asm),
            [
                "lw $t6, 0($sp)",
                "addiu $sp, $sp, 4",
                "sb $t6, 1($t0)",
                "srl $t7, $t6, 8",
                "sb $t7, 2($t0)"
            ]
        );
    }

    #[test]
    fn test_zero_memory_respects_alignment() {
        let mut asm = Assembler::new();
        zero_memory(&mut asm, Reg::T0, 0, 6, 2);
        assert_eq!(
            render(&asm),
            ["sh $zero, 0($t0)", "sh $zero, 2($t0)", "sh $zero, 4($t0)"]
        );
    }
}
