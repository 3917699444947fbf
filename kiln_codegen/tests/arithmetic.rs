//! Arithmetic, bitwise and unary templates executed on both emulators.

mod common;

use common::*;
use kiln_codegen::emu::{Fault, StackValue};
use kiln_codegen::{Mips32, X86};
use kiln_core::{CompileError, MethodId, OpCode, TypeId};
use proptest::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

fn binary(op: OpCode, ty: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("binary", &[ty, ty], Some(ty), |b| {
        b.op(OpCode::Ldarg0).op(OpCode::Ldarg1).op(op).op(OpCode::Ret);
    });
    (fx, id)
}

fn unary(op: OpCode, ty: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("unary", &[ty], Some(ty), |b| {
        b.op(OpCode::Ldarg0).op(op).op(OpCode::Ret);
    });
    (fx, id)
}

fn word_op(op: OpCode, a: i32, b: i32) -> i32 {
    let (fx, id) = binary(op, INT32);
    fx.word(id, &words(&[a, b])) as i32
}

fn long_op(op: OpCode, a: i64, b: i64) -> i64 {
    let (fx, id) = binary(op, INT64);
    fx.long(id, &[StackValue::from(a), StackValue::from(b)]) as i64
}

// =============================================================================
// Word Arithmetic
// =============================================================================

#[test]
fn test_add_wraps_at_word_boundary() {
    assert_eq!(word_op(OpCode::Add, -1, 1), 0);
    assert_eq!(word_op(OpCode::Add, i32::MAX, 1), i32::MIN);
    assert_eq!(word_op(OpCode::Sub, i32::MIN, 1), i32::MAX);
}

#[test]
fn test_division_and_remainder() {
    assert_eq!(word_op(OpCode::Div, -7, 2), -3);
    assert_eq!(word_op(OpCode::Rem, -7, 2), -1);
    assert_eq!(word_op(OpCode::DivUn, -1, 2), i32::MAX);
    assert_eq!(word_op(OpCode::RemUn, -1, 16), 15);
}

#[test]
fn test_division_by_zero_faults() {
    let (fx, id) = binary(OpCode::Div, INT32);
    assert_eq!(fx.run_both(id, &words(&[1, 0]), 4), Err(Fault::DivideByZero));
}

#[test]
fn test_unary_word() {
    assert_eq!(unary_word(OpCode::Neg, 5), -5);
    assert_eq!(unary_word(OpCode::Neg, i32::MIN), i32::MIN);
    assert_eq!(unary_word(OpCode::Not, 0), -1);
}

fn unary_word(op: OpCode, a: i32) -> i32 {
    let (fx, id) = unary(op, INT32);
    fx.word(id, &words(&[a])) as i32
}

// =============================================================================
// Double-Word Arithmetic
// =============================================================================

#[test]
fn test_long_carry_and_borrow() {
    assert_eq!(long_op(OpCode::Add, 0xFFFF_FFFF, 1), 0x1_0000_0000);
    assert_eq!(long_op(OpCode::Sub, 0x1_0000_0000, 1), 0xFFFF_FFFF);
    assert_eq!(long_op(OpCode::Add, -1, 1), 0);
    assert_eq!(long_op(OpCode::Mul, 0x1_0000_0001, 0x1_0000_0001), 0x2_0000_0001);
}

#[test]
fn test_long_negate() {
    let (fx, id) = unary(OpCode::Neg, INT64);
    assert_eq!(fx.long(id, &[StackValue::from(1i64)]) as i64, -1);
    assert_eq!(fx.long(id, &[StackValue::from(0x1_0000_0000i64)]) as i64, -0x1_0000_0000);
    assert_eq!(fx.long(id, &[StackValue::from(0i64)]), 0);
}

#[test]
fn test_long_division_is_unsupported() {
    for op in [OpCode::Div, OpCode::DivUn, OpCode::Rem, OpCode::RemUn] {
        let (fx, _) = binary(op, INT64);
        assert!(matches!(
            fx.compile::<X86>(),
            Err(CompileError::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            fx.compile::<Mips32>(),
            Err(CompileError::UnsupportedOperand { .. })
        ));
    }
}

#[test]
fn test_floats_are_unsupported() {
    let mut fx = Fixture::new();
    fx.function("half", &[], None, |b| {
        b.op_raw(OpCode::LdcR8, &0.5f64.to_le_bytes())
            .op(OpCode::Pop)
            .op(OpCode::Ret);
    });
    let err = fx.compile::<X86>().unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnsupportedOperand { op: OpCode::LdcR8, .. }
    ));

    let mut fx = Fixture::new();
    fx.function("load", &[DOUBLE], None, |b| {
        b.op(OpCode::Ldarg0).op(OpCode::Pop).op(OpCode::Ret);
    });
    assert!(matches!(
        fx.compile::<Mips32>(),
        Err(CompileError::UnsupportedOperand { .. })
    ));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_word_ops_match_wrapping(a: i32, b: i32) {
        prop_assert_eq!(word_op(OpCode::Add, a, b), a.wrapping_add(b));
        prop_assert_eq!(word_op(OpCode::Sub, a, b), a.wrapping_sub(b));
        prop_assert_eq!(word_op(OpCode::Mul, a, b), a.wrapping_mul(b));
        prop_assert_eq!(word_op(OpCode::And, a, b), a & b);
        prop_assert_eq!(word_op(OpCode::Or, a, b), a | b);
        prop_assert_eq!(word_op(OpCode::Xor, a, b), a ^ b);
    }

    #[test]
    fn test_word_division_matches(a: i32, b in any::<i32>().prop_filter("nonzero", |b| *b != 0)) {
        prop_assume!(!(a == i32::MIN && b == -1));
        prop_assert_eq!(word_op(OpCode::Div, a, b), a / b);
        prop_assert_eq!(word_op(OpCode::Rem, a, b), a % b);
        prop_assert_eq!(word_op(OpCode::DivUn, a, b) as u32, a as u32 / b as u32);
        prop_assert_eq!(word_op(OpCode::RemUn, a, b) as u32, a as u32 % b as u32);
    }

    #[test]
    fn test_long_ops_match_wrapping(a: i64, b: i64) {
        prop_assert_eq!(long_op(OpCode::Add, a, b), a.wrapping_add(b));
        prop_assert_eq!(long_op(OpCode::Sub, a, b), a.wrapping_sub(b));
        prop_assert_eq!(long_op(OpCode::Mul, a, b), a.wrapping_mul(b));
        prop_assert_eq!(long_op(OpCode::And, a, b), a & b);
        prop_assert_eq!(long_op(OpCode::Or, a, b), a | b);
        prop_assert_eq!(long_op(OpCode::Xor, a, b), a ^ b);
    }

    #[test]
    fn test_long_unary_matches(a: i64) {
        let (fx, neg) = unary(OpCode::Neg, INT64);
        prop_assert_eq!(fx.long(neg, &[StackValue::from(a)]) as i64, a.wrapping_neg());
        let (fx, not) = unary(OpCode::Not, INT64);
        prop_assert_eq!(fx.long(not, &[StackValue::from(a)]) as i64, !a);
    }
}
