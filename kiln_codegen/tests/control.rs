//! Branches, comparisons, switch, conversions and frame access.

mod common;

use common::*;
use kiln_codegen::emu::{Machine, StackValue};
use kiln_codegen::X86;
use kiln_core::{MethodId, OpCode, TypeId};
use proptest::prelude::*;

// =============================================================================
// Test Helpers
// =============================================================================

fn compare(op: OpCode, ty: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("compare", &[ty, ty], Some(INT32), |b| {
        b.op(OpCode::Ldarg0).op(OpCode::Ldarg1).op(op).op(OpCode::Ret);
    });
    (fx, id)
}

/// `int Taken(T a, T b)`: 1 when the branch is taken.
fn branch(op: OpCode, ty: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("taken", &[ty, ty], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .op(OpCode::Ldarg1)
            .branch(op, "yes")
            .ldc_i4(0)
            .op(OpCode::Ret)
            .label("yes")
            .ldc_i4(1)
            .op(OpCode::Ret);
    });
    (fx, id)
}

fn convert(op: OpCode, from: TypeId, to: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let id = fx.function("convert", &[from], Some(to), |b| {
        b.op(OpCode::Ldarg0).op(op).op(OpCode::Ret);
    });
    (fx, id)
}

/// Reference result of a two-operand branch on signed values.
fn relation(op: OpCode, a: i64, b: i64) -> bool {
    let (ua, ub) = (a as u64, b as u64);
    match op {
        OpCode::Beq => a == b,
        OpCode::BneUn => a != b,
        OpCode::Bge => a >= b,
        OpCode::Bgt => a > b,
        OpCode::Ble => a <= b,
        OpCode::Blt => a < b,
        OpCode::BgeUn => ua >= ub,
        OpCode::BgtUn => ua > ub,
        OpCode::BleUn => ua <= ub,
        OpCode::BltUn => ua < ub,
        OpCode::Ceq => a == b,
        OpCode::Cgt => a > b,
        OpCode::CgtUn => ua > ub,
        OpCode::Clt => a < b,
        OpCode::CltUn => ua < ub,
        _ => unreachable!("not a comparison: {op:?}"),
    }
}

const BRANCHES: [OpCode; 10] = [
    OpCode::Beq,
    OpCode::BneUn,
    OpCode::Bge,
    OpCode::Bgt,
    OpCode::Ble,
    OpCode::Blt,
    OpCode::BgeUn,
    OpCode::BgtUn,
    OpCode::BleUn,
    OpCode::BltUn,
];

const COMPARES: [OpCode; 5] = [
    OpCode::Ceq,
    OpCode::Cgt,
    OpCode::CgtUn,
    OpCode::Clt,
    OpCode::CltUn,
];

/// Word values with their unsigned meaning as the u64 reference sees it.
fn word_relation(op: OpCode, a: i32, b: i32) -> bool {
    let unsigned = matches!(
        op,
        OpCode::BgeUn
            | OpCode::BgtUn
            | OpCode::BleUn
            | OpCode::BltUn
            | OpCode::CgtUn
            | OpCode::CltUn
    );
    if unsigned {
        relation(op, i64::from(a as u32), i64::from(b as u32))
    } else {
        relation(op, i64::from(a), i64::from(b))
    }
}

// =============================================================================
// Loops and Switch
// =============================================================================

#[test]
fn test_counting_loop() {
    let mut fx = Fixture::new();
    let id = fx.function_with_locals("sum", &[INT32], &[INT32, INT32], Some(INT32), |b| {
        b.ldc_i4(1)
            .op(OpCode::Stloc1)
            .label("top")
            .op(OpCode::Ldloc0)
            .op(OpCode::Ldloc1)
            .op(OpCode::Add)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc1)
            .ldc_i4(1)
            .op(OpCode::Add)
            .op(OpCode::Stloc1)
            .op(OpCode::Ldloc1)
            .op(OpCode::Ldarg0)
            .branch(OpCode::BleS, "top")
            .op(OpCode::Ldloc0)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &words(&[10])), 55);
    assert_eq!(fx.word(id, &words(&[100])), 5050);
}

#[test]
fn test_switch() {
    let mut fx = Fixture::new();
    let id = fx.function("select", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .switch(&["zero", "one", "two"])
            .ldc_i4(100)
            .op(OpCode::Ret)
            .label("zero")
            .ldc_i4(10)
            .op(OpCode::Ret)
            .label("one")
            .ldc_i4(11)
            .op(OpCode::Ret)
            .label("two")
            .ldc_i4(12)
            .op(OpCode::Ret);
    });
    for (selector, expected) in [(0, 10), (1, 11), (2, 12), (3, 100), (-1, 100)] {
        assert_eq!(fx.word(id, &words(&[selector])), expected, "case {selector}");
    }
}

#[test]
fn test_leave_discards_operands() {
    let mut fx = Fixture::new();
    let id = fx.function("leave", &[], Some(INT32), |b| {
        b.ldc_i4(1)
            .ldc_i8(2)
            .branch(OpCode::LeaveS, "out")
            .label("out")
            .ldc_i4(3)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]), 3);
}

#[test]
fn test_boolean_branches() {
    let mut fx = Fixture::new();
    let long = fx.function("long", &[INT64], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .branch(OpCode::Brtrue, "yes")
            .ldc_i4(0)
            .op(OpCode::Ret)
            .label("yes")
            .ldc_i4(1)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(long, &[StackValue::from(0i64)]), 0);
    assert_eq!(fx.word(long, &[StackValue::from(0x1_0000_0000i64)]), 1);
    assert_eq!(fx.word(long, &[StackValue::from(1i64)]), 1);
}

// =============================================================================
// Conversions
// =============================================================================

#[test]
fn test_narrowing_conversions() {
    let cases = [
        (OpCode::ConvI1, 0x1FF, 0xFFFF_FFFF),
        (OpCode::ConvU1, 0x1FF, 0xFF),
        (OpCode::ConvI2, 0x1_8000, 0xFFFF_8000),
        (OpCode::ConvU2, 0x1_8000, 0x8000),
        (OpCode::ConvI4, -5, (-5i32) as u32),
        (OpCode::ConvU4, -5, (-5i32) as u32),
    ];
    for (op, input, expected) in cases {
        let (fx, id) = convert(op, INT32, INT32);
        assert_eq!(fx.word(id, &words(&[input])), expected, "{op:?}");
    }
}

#[test]
fn test_widening_conversions() {
    let (fx, id) = convert(OpCode::ConvI8, INT32, INT64);
    assert_eq!(fx.long(id, &words(&[-5])) as i64, -5);
    let (fx, id) = convert(OpCode::ConvU8, INT32, INT64);
    assert_eq!(fx.long(id, &words(&[-5])), 0xFFFF_FFFB);
}

#[test]
fn test_long_to_word_conversions() {
    let value = StackValue::from(0x1_2345_6789i64);
    let (fx, id) = convert(OpCode::ConvI4, INT64, INT32);
    assert_eq!(fx.word(id, &[value]), 0x2345_6789);
    let (fx, id) = convert(OpCode::ConvI1, INT64, INT32);
    assert_eq!(fx.word(id, &[value]), 0xFFFF_FF89);
    let (fx, id) = convert(OpCode::ConvU2, INT64, INT32);
    assert_eq!(fx.word(id, &[value]), 0x6789);
}

// =============================================================================
// Frame Access
// =============================================================================

#[test]
fn test_store_argument() {
    let mut fx = Fixture::new();
    let id = fx.function("starg", &[INT32, INT64], Some(INT64), |b| {
        b.ldc_i8(-9)
            .op_index(OpCode::StargS, 1)
            .op(OpCode::Ldarg1)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.long(id, &[StackValue::from(1), StackValue::from(2i64)]) as i64, -9);
}

#[test]
fn test_local_address_and_indirect_store() {
    let mut fx = Fixture::new();
    let id = fx.function_with_locals("local", &[], &[INT32, INT64], Some(INT64), |b| {
        b.op_index(OpCode::LdlocaS, 0)
            .ldc_i4(9)
            .op(OpCode::StindI4)
            .op_index(OpCode::LdlocaS, 1)
            .op(OpCode::Ldloc0)
            .op(OpCode::ConvI8)
            .op(OpCode::StindI8)
            .op_index(OpCode::LdlocaS, 1)
            .op(OpCode::LdindI8)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.long(id, &[]), 9);
}

#[test]
fn test_initobj_zeroes_value() {
    let mut fx = Fixture::new();
    let id = fx.function_with_locals("init", &[], &[POINT], Some(INT32), |b| {
        b.op_index(OpCode::LdlocaS, 0)
            .ldc_i4(5)
            .op(OpCode::StindI4)
            .op_index(OpCode::LdlocaS, 0)
            .op_type(OpCode::Initobj, POINT)
            .op_index(OpCode::LdlocaS, 0)
            .op(OpCode::LdindI4)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]), 0);
}

#[test]
fn test_dup() {
    let mut fx = Fixture::new();
    let square = fx.function("square", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .op(OpCode::Dup)
            .op(OpCode::Mul)
            .op(OpCode::Ret);
    });
    let double = fx.function("double", &[INT64], Some(INT64), |b| {
        b.op(OpCode::Ldarg0)
            .op(OpCode::Dup)
            .op(OpCode::Add)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(square, &words(&[-12])), 144);
    assert_eq!(
        fx.long(double, &[StackValue::from(0x4000_0000_8000_0000i64)]),
        0x8000_0001_0000_0000
    );
}

#[test]
fn test_sizeof_and_token() {
    let mut fx = Fixture::new();
    let size = fx.function("size", &[], Some(INT32), |b| {
        b.op_type(OpCode::Sizeof, POINT).op(OpCode::Ret);
    });
    let token = fx.function("token", &[], Some(INT32), |b| {
        b.op_type(OpCode::Ldtoken, DOG).op(OpCode::Ret);
    });
    assert_eq!(fx.word(size, &[]), 8);

    let machine = fx.machine::<X86>();
    let dog = machine.image().type_address(DOG).expect("dog linked");
    assert_eq!(fx.word(token, &[]), dog);
}

// =============================================================================
// Arrays
// =============================================================================

#[test]
fn test_byte_elements_extend() {
    let build = |load: OpCode| {
        let mut fx = Fixture::new();
        let id = fx.function_with_locals("bytes", &[INT32], &[OBJECT], Some(INT32), |b| {
            b.ldc_i4(3)
                .op_type(OpCode::Newarr, UINT8)
                .op(OpCode::Stloc0)
                .op(OpCode::Ldloc0)
                .ldc_i4(1)
                .op(OpCode::Ldarg0)
                .op(OpCode::StelemI1)
                .op(OpCode::Ldloc0)
                .ldc_i4(1)
                .op(load)
                .op(OpCode::Ret);
        });
        (fx, id)
    };
    let (fx, signed) = build(OpCode::LdelemI1);
    assert_eq!(fx.word(signed, &words(&[200])), 0xFFFF_FFC8);
    let (fx, unsigned) = build(OpCode::LdelemU1);
    assert_eq!(fx.word(unsigned, &words(&[200])), 200);
    assert_eq!(fx.word(unsigned, &words(&[0x1234])), 0x34);
}

#[test]
fn test_long_elements() {
    let mut fx = Fixture::new();
    let id = fx.function_with_locals("longs", &[INT64], &[OBJECT], Some(INT64), |b| {
        b.ldc_i4(2)
            .op_type(OpCode::Newarr, INT64)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .ldc_i4(1)
            .op(OpCode::Ldarg0)
            .op(OpCode::StelemI8)
            .op(OpCode::Ldloc0)
            .ldc_i4(1)
            .op(OpCode::LdelemI8)
            .op(OpCode::Ret);
    });
    let value = -0x0123_4567_89AB_CDEFi64;
    assert_eq!(fx.long(id, &[StackValue::from(value)]) as i64, value);
}

#[test]
fn test_reference_elements() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(DOG);
    let id = fx.function_with_locals("refs", &[], &[OBJECT], Some(INT32), |b| {
        b.ldc_i4(2)
            .op_type(OpCode::Newarr, OBJECT)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .ldc_i4(1)
            .op_method(OpCode::Newobj, ctor)
            .op(OpCode::StelemRef)
            .op(OpCode::Ldloc0)
            .ldc_i4(1)
            .op(OpCode::LdelemRef)
            .op_field(OpCode::Ldfld, WEIGHT)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]), 5);
}

#[test]
fn test_element_address() {
    let mut fx = Fixture::new();
    let id = fx.function_with_locals("address", &[], &[OBJECT], Some(INT32), |b| {
        b.ldc_i4(4)
            .op_type(OpCode::Newarr, INT16)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .ldc_i4(3)
            .op_type(OpCode::Ldelema, INT16)
            .ldc_i4(-3)
            .op(OpCode::StindI2)
            .op(OpCode::Ldloc0)
            .ldc_i4(3)
            .op(OpCode::LdelemI2)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]) as i32, -3);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_word_comparisons(a: i32, b in prop_oneof![Just(0i32), Just(-1), Just(i32::MIN), any::<i32>()]) {
        for op in COMPARES {
            let (fx, id) = compare(op, INT32);
            for (x, y) in [(a, b), (b, a), (a, a)] {
                prop_assert_eq!(fx.word(id, &words(&[x, y])), u32::from(word_relation(op, x, y)));
            }
        }
    }

    #[test]
    fn test_word_branches(a: i32, b: i32) {
        for op in BRANCHES {
            let (fx, id) = branch(op, INT32);
            for (x, y) in [(a, b), (b, a), (a, a)] {
                prop_assert_eq!(fx.word(id, &words(&[x, y])), u32::from(word_relation(op, x, y)));
            }
        }
    }

    #[test]
    fn test_long_comparisons(a: i64, low: u32) {
        // Same high word, differing low word, exercises the low-word compare.
        let b = (a & !0xFFFF_FFFF) | i64::from(low);
        for op in COMPARES {
            let (fx, id) = compare(op, INT64);
            for (x, y) in [(a, b), (b, a), (a, a.wrapping_neg())] {
                let args = [StackValue::from(x), StackValue::from(y)];
                prop_assert_eq!(fx.word(id, &args), u32::from(relation(op, x, y)));
            }
        }
    }

    #[test]
    fn test_long_branches(a: i64, b: i64) {
        for op in BRANCHES {
            let (fx, id) = branch(op, INT64);
            for (x, y) in [(a, b), (b, a), (a, a)] {
                let args = [StackValue::from(x), StackValue::from(y)];
                prop_assert_eq!(fx.word(id, &args), u32::from(relation(op, x, y)));
            }
        }
    }
}
