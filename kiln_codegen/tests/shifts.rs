//! Shift templates on word and double-word operands.

mod common;

use common::*;
use kiln_codegen::emu::StackValue;
use kiln_core::{MethodId, OpCode, TypeId};

// =============================================================================
// Test Helpers
// =============================================================================

fn shifter(op: OpCode, value: TypeId, count: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("shift", &[value, count], Some(value), |b| {
        b.op(OpCode::Ldarg0).op(OpCode::Ldarg1).op(op).op(OpCode::Ret);
    });
    (fx, id)
}

/// Double-word shift with counts at or above 64 saturating.
fn reference_long(op: OpCode, value: i64, count: u64) -> i64 {
    if count >= 64 {
        return match op {
            OpCode::Shr => value >> 63,
            _ => 0,
        };
    }
    match op {
        OpCode::Shl => value << count,
        OpCode::Shr => value >> count,
        _ => ((value as u64) >> count) as i64,
    }
}

const SHIFTS: [OpCode; 3] = [OpCode::Shl, OpCode::Shr, OpCode::ShrUn];

// =============================================================================
// Word Shifts
// =============================================================================

#[test]
fn test_word_shifts() {
    let value = 0x8000_00F0u32 as i32;
    let cases = [
        (OpCode::Shl, 0, value),
        (OpCode::Shl, 4, 0x0000_0F00),
        (OpCode::Shr, 4, 0xF800_000Fu32 as i32),
        (OpCode::ShrUn, 4, 0x0800_000F),
        (OpCode::ShrUn, 31, 1),
        (OpCode::Shr, 31, -1),
    ];
    for (op, count, expected) in cases {
        let (fx, id) = shifter(op, INT32, INT32);
        assert_eq!(fx.word(id, &words(&[value, count])) as i32, expected, "{op:?} {count}");
    }
}

#[test]
fn test_word_shift_count_is_masked() {
    for op in SHIFTS {
        let (fx, id) = shifter(op, INT32, INT32);
        assert_eq!(fx.word(id, &words(&[0x1234, 32])), 0x1234, "{op:?}");
        assert_eq!(fx.word(id, &words(&[0x1234, 33])), {
            match op {
                OpCode::Shl => 0x2468,
                _ => 0x091A,
            }
        });
    }
}

#[test]
fn test_word_shift_by_wide_count_saturates() {
    let huge = StackValue::from(0x1_0000_0000i64);
    let (fx, shl) = shifter(OpCode::Shl, INT32, INT64);
    assert_eq!(fx.word(shl, &[StackValue::from(7), huge]), 0);

    let (fx, shr) = shifter(OpCode::Shr, INT32, INT64);
    assert_eq!(fx.word(shr, &[StackValue::from(-8), huge]) as i32, -1);
    assert_eq!(fx.word(shr, &[StackValue::from(8), huge]), 0);
    assert_eq!(fx.word(shr, &[StackValue::from(-8), StackValue::from(1i64)]) as i32, -4);

    let (fx, shr_un) = shifter(OpCode::ShrUn, INT32, INT64);
    assert_eq!(fx.word(shr_un, &[StackValue::from(-8), huge]), 0);
}

// =============================================================================
// Double-Word Shifts
// =============================================================================

#[test]
fn test_long_shifts_across_all_counts() {
    let values = [0x8123_4567_89AB_CDEFu64 as i64, 0x0123_4567_89AB_CDEF, -1, 1];
    for op in SHIFTS {
        let (fx, id) = shifter(op, INT64, INT32);
        for value in values {
            for count in [0, 1, 7, 31, 32, 33, 47, 63, 64, 65, 80] {
                let got = fx.long(id, &[StackValue::from(value), StackValue::from(count)]) as i64;
                assert_eq!(
                    got,
                    reference_long(op, value, count as u64),
                    "{op:?} {value:#x} by {count}"
                );
            }
        }
    }
}

#[test]
fn test_long_shift_by_wide_count() {
    let value = 0x8000_0000_0000_0001u64 as i64;
    for op in SHIFTS {
        let (fx, id) = shifter(op, INT64, INT64);
        for count in [0i64, 5, 40, 64, 0x1_0000_0001] {
            let got = fx.long(id, &[StackValue::from(value), StackValue::from(count)]) as i64;
            let expected = if count >> 32 != 0 {
                reference_long(op, value, 64)
            } else {
                reference_long(op, value, count as u64)
            };
            assert_eq!(got, expected, "{op:?} by {count:#x}");
        }
    }
}
