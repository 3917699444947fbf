//! Objects: fields, statics, allocation, type tests, dispatch and delegates.

mod common;

use common::*;
use kiln_codegen::emu::{Fault, HEAP_BASE, Machine, StackValue};
use kiln_codegen::{HaltReason, Mips32, X86};
use kiln_core::{MethodDescriptor, MethodId, OpCode, StringId, StringLiteral, TypeId};

// =============================================================================
// Test Helpers
// =============================================================================

/// `Speak` is declared on `Animal`; `Dog` overrides it, `Cat` inherits it.
struct Zoo {
    fx: Fixture,
    speak: MethodId,
}

impl Zoo {
    fn new() -> Self {
        let mut fx = Fixture::new();
        let speak = fx.next_id();
        fx.method(
            MethodDescriptor::new(speak, ANIMAL, "Speak")
                .virtual_method()
                .with_return(INT32),
            |b| {
                b.ldc_i4(1).op(OpCode::Ret);
            },
        );
        let bark = fx.next_id();
        fx.method(
            MethodDescriptor::new(bark, DOG, "Speak")
                .virtual_method()
                .with_return(INT32),
            |b| {
                b.ldc_i4(2).op(OpCode::Ret);
            },
        );
        fx.override_slot(ANIMAL, speak, speak);
        fx.override_slot(DOG, speak, bark);
        Self { fx, speak }
    }

    /// `int Call()`: `new T().Speak()`.
    fn caller(&mut self, ty: TypeId) -> MethodId {
        let ctor = self.fx.constructor(ty);
        let speak = self.speak;
        self.fx.function("call", &[], Some(INT32), |b| {
            b.op_method(OpCode::Newobj, ctor)
                .op_method(OpCode::Callvirt, speak)
                .op(OpCode::Ret);
        })
    }
}

/// `int Test(int which)`: type test of a fresh Dog (0) or Rock (1).
fn type_test(op: OpCode, target: TypeId) -> (Fixture, MethodId) {
    let mut fx = Fixture::new();
    let dog = fx.constructor(DOG);
    let rock = fx.constructor(ROCK);
    let id = fx.function_with_locals("test", &[INT32], &[OBJECT], Some(INT32), |b| {
        b.op_method(OpCode::Newobj, dog)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldarg0)
            .branch(OpCode::BrfalseS, "check")
            .op_method(OpCode::Newobj, rock)
            .op(OpCode::Stloc0)
            .label("check")
            .op(OpCode::Ldloc0)
            .op_type(op, target)
            .branch(OpCode::BrtrueS, "yes")
            .ldc_i4(0)
            .op(OpCode::Ret)
            .label("yes")
            .ldc_i4(1)
            .op(OpCode::Ret);
    });
    (fx, id)
}

// =============================================================================
// Fields
// =============================================================================

#[test]
fn test_constructor_runs_on_new_object() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(DOG);
    let id = fx.function("weight", &[], Some(INT32), |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op_field(OpCode::Ldfld, WEIGHT)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]), 5);
}

#[test]
fn test_instance_field_round_trips() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(ANIMAL);
    let legs = fx.function_with_locals("legs", &[INT32], &[ANIMAL], Some(INT32), |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .op(OpCode::Ldarg0)
            .op_field(OpCode::Stfld, LEGS)
            .op(OpCode::Ldloc0)
            .op_field(OpCode::Ldfld, LEGS)
            .op(OpCode::Ret);
    });
    let age = fx.function_with_locals("age", &[INT64], &[ANIMAL], Some(INT64), |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .op(OpCode::Ldarg0)
            .op_field(OpCode::Stfld, AGE)
            .op(OpCode::Ldloc0)
            .op_field(OpCode::Ldfld, AGE)
            .op(OpCode::Ret);
    });

    assert_eq!(fx.word(legs, &words(&[4])), 4);
    // Int16 storage truncates and sign-extends on the way back.
    assert_eq!(fx.word(legs, &words(&[-2])), 0xFFFF_FFFE);
    assert_eq!(fx.word(legs, &words(&[0x1_8001])) as i32, -0x7FFF);

    let value = 0x0123_4567_89AB_CDEFi64;
    assert_eq!(fx.long(age, &[StackValue::from(value)]) as i64, value);
}

#[test]
fn test_field_address() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(ANIMAL);
    let id = fx.function("via_address", &[], Some(INT32), |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op_field(OpCode::Ldflda, WEIGHT)
            .op(OpCode::LdindI4)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &[]), 5);
}

#[test]
fn test_static_fields() {
    let mut fx = Fixture::new();
    let counter = fx.function("counter", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .op_field(OpCode::Stsfld, COUNTER)
            .op_field(OpCode::Ldsfld, COUNTER)
            .ldc_i4(1)
            .op(OpCode::Add)
            .op(OpCode::Ret);
    });
    let total = fx.function("total", &[INT64], Some(INT64), |b| {
        b.op(OpCode::Ldarg0)
            .op_field(OpCode::Stsfld, TOTAL)
            .op_field(OpCode::Ldsfld, TOTAL)
            .op(OpCode::Ret);
    });
    let address = fx.function("address", &[], Some(INT32), |b| {
        b.op_field(OpCode::Ldsflda, COUNTER)
            .ldc_i4(77)
            .op(OpCode::StindI4)
            .op_field(OpCode::Ldsfld, COUNTER)
            .op(OpCode::Ret);
    });

    assert_eq!(fx.word(counter, &words(&[41])), 42);
    assert_eq!(fx.long(total, &[StackValue::from(-3i64)]) as i64, -3);
    assert_eq!(fx.word(address, &[]), 77);
}

// =============================================================================
// Allocation
// =============================================================================

#[test]
fn test_out_of_memory_halts() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(ANIMAL);
    let id = fx.function("alloc", &[], Some(ANIMAL), |b| {
        b.op_method(OpCode::Newobj, ctor).op(OpCode::Ret);
    });
    fx.config.heap_capacity = 16;
    assert_eq!(
        fx.run_both(id, &[], 4),
        Err(Fault::Halt {
            code: HaltReason::OutOfMemory.code()
        })
    );
}

#[test]
fn test_negative_array_length_halts() {
    let mut fx = Fixture::new();
    let id = fx.function("alloc", &[INT32], Some(OBJECT), |b| {
        b.op(OpCode::Ldarg0)
            .op_type(OpCode::Newarr, INT32)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &words(&[2])), HEAP_BASE);
    assert_eq!(
        fx.run_both(id, &words(&[-1]), 4),
        Err(Fault::Halt {
            code: HaltReason::OutOfMemory.code()
        })
    );
}

#[test]
fn test_discarded_allocation_is_released() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(DOG);
    let id = fx.function("discard", &[], None, |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op(OpCode::Pop)
            .op(OpCode::Ret);
    });

    let mut x86 = fx.machine::<X86>();
    assert_eq!(x86.invoke(&fx.symbol(id), &[], 0), Ok(vec![]));
    assert_eq!(x86.image().released(), &[HEAP_BASE]);

    let mut mips = fx.machine::<Mips32>();
    assert_eq!(mips.invoke(&fx.symbol(id), &[], 0), Ok(vec![]));
    assert_eq!(mips.image().released(), &[HEAP_BASE]);
}

#[test]
fn test_stored_allocation_is_kept() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(DOG);
    let id = fx.function_with_locals("keep", &[], &[OBJECT], None, |b| {
        b.op_method(OpCode::Newobj, ctor)
            .op(OpCode::Stloc0)
            .op(OpCode::Ldloc0)
            .op(OpCode::Pop)
            .op(OpCode::Ret);
    });
    let mut x86 = fx.machine::<X86>();
    assert_eq!(x86.invoke(&fx.symbol(id), &[], 0), Ok(vec![]));
    assert!(x86.image().released().is_empty());
}

#[test]
fn test_throw_reports_object() {
    let mut fx = Fixture::new();
    let ctor = fx.constructor(ROCK);
    let id = fx.function("throw", &[], None, |b| {
        b.op_method(OpCode::Newobj, ctor).op(OpCode::Throw);
    });
    assert_eq!(
        fx.run_both(id, &[], 0),
        Err(Fault::Thrown { object: HEAP_BASE })
    );
}

#[test]
fn test_string_literal_address() {
    let mut fx = Fixture::new();
    let hello = fx.tables.add_string(StringLiteral::new(StringId(1), "hello"));
    let id = fx.function("hello", &[], Some(OBJECT), |b| {
        b.op_string(OpCode::Ldstr, hello).op(OpCode::Ret);
    });
    let symbol = fx.tables.string(hello).expect("literal").symbol.clone();
    let machine = fx.machine::<X86>();
    let address = machine.image().symbol_address(&symbol).expect("linked");
    assert_eq!(fx.word(id, &[]), address);
    assert_eq!(machine.image().read_u32(address + 4), Ok(5));
}

// =============================================================================
// Type Tests
// =============================================================================

#[test]
fn test_isinst() {
    let (fx, id) = type_test(OpCode::Isinst, ANIMAL);
    assert_eq!(fx.word(id, &words(&[0])), 1);
    assert_eq!(fx.word(id, &words(&[1])), 0);

    let (fx, id) = type_test(OpCode::Isinst, CAT);
    assert_eq!(fx.word(id, &words(&[0])), 0);
}

#[test]
fn test_castclass() {
    let (fx, id) = type_test(OpCode::Castclass, OBJECT);
    assert_eq!(fx.word(id, &words(&[0])), 1);

    let (fx, id) = type_test(OpCode::Castclass, DOG);
    assert_eq!(fx.word(id, &words(&[0])), 1);
    let result = fx.run_both(id, &words(&[1]), 4);
    assert!(matches!(result, Err(Fault::InvalidCast { .. })), "{result:?}");
}

#[test]
fn test_null_passes_type_tests() {
    let mut fx = Fixture::new();
    let cast = fx.function("cast", &[], Some(OBJECT), |b| {
        b.op(OpCode::Ldnull)
            .op_type(OpCode::Castclass, DOG)
            .op(OpCode::Ret);
    });
    let test = fx.function("test", &[], Some(OBJECT), |b| {
        b.op(OpCode::Ldnull)
            .op_type(OpCode::Isinst, DOG)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(cast, &[]), 0);
    assert_eq!(fx.word(test, &[]), 0);
}

// =============================================================================
// Calls
// =============================================================================

#[test]
fn test_virtual_dispatch() {
    let mut zoo = Zoo::new();
    let animal = zoo.caller(ANIMAL);
    let dog = zoo.caller(DOG);
    let cat = zoo.caller(CAT);
    assert_eq!(zoo.fx.word(animal, &[]), 1);
    assert_eq!(zoo.fx.word(dog, &[]), 2);
    assert_eq!(zoo.fx.word(cat, &[]), 1);
}

#[test]
fn test_missing_virtual_method_halts() {
    let mut zoo = Zoo::new();
    let rock = zoo.caller(ROCK);
    assert_eq!(
        zoo.fx.run_both(rock, &[], 4),
        Err(Fault::Halt {
            code: HaltReason::MissingVirtualMethod.code()
        })
    );
}

#[test]
fn test_virtual_call_on_null() {
    let mut zoo = Zoo::new();
    let speak = zoo.speak;
    let id = zoo.fx.function("call", &[], Some(INT32), |b| {
        b.op(OpCode::Ldnull)
            .op_method(OpCode::Callvirt, speak)
            .op(OpCode::Ret);
    });
    let result = zoo.fx.run_both(id, &[], 4);
    assert!(matches!(result, Err(Fault::NullReference { .. })), "{result:?}");
}

#[test]
fn test_static_call_with_wide_arguments() {
    let mut fx = Fixture::new();
    let combine = fx.function("combine", &[INT64, INT32], Some(INT64), |b| {
        b.op(OpCode::Ldarg0)
            .op(OpCode::Ldarg1)
            .op(OpCode::ConvI8)
            .op(OpCode::Sub)
            .op(OpCode::Ret);
    });
    let id = fx.function("outer", &[INT32], Some(INT64), |b| {
        b.ldc_i8(0x1_0000_0000)
            .op(OpCode::Ldarg0)
            .op_method(OpCode::Call, combine)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.long(id, &words(&[1])), 0xFFFF_FFFF);
    assert_eq!(fx.long(id, &words(&[-1])), 0x1_0000_0001);
}

#[test]
fn test_delegate_invoke() {
    let mut fx = Fixture::new();
    let twice = fx.next_id();
    fx.method(
        MethodDescriptor::new(twice, PROGRAM, "Twice")
            .instance()
            .with_params(&[INT32])
            .with_return(INT32),
        |b| {
            b.op(OpCode::Ldarg1)
                .op(OpCode::Ldarg1)
                .op(OpCode::Add)
                .op(OpCode::Ret);
        },
    );
    let ctor = fx.next_id();
    fx.declare(
        MethodDescriptor::new(ctor, ACTION, ".ctor")
            .constructor()
            .with_params(&[OBJECT, INT32]),
    );
    let invoke = fx.next_id();
    fx.declare(
        MethodDescriptor::new(invoke, ACTION, "Invoke")
            .virtual_method()
            .with_params(&[INT32])
            .with_return(INT32),
    );

    let id = fx.function("run", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldnull)
            .op_method(OpCode::Ldftn, twice)
            .op_method(OpCode::Newobj, ctor)
            .op(OpCode::Ldarg0)
            .op_method(OpCode::Callvirt, invoke)
            .op(OpCode::Ret);
    });
    let null = fx.function("null", &[], Some(INT32), |b| {
        b.op(OpCode::Ldnull)
            .ldc_i4(3)
            .op_method(OpCode::Callvirt, invoke)
            .op(OpCode::Ret);
    });

    assert_eq!(fx.word(id, &words(&[21])), 42);
    let result = fx.run_both(null, &[], 4);
    assert!(matches!(result, Err(Fault::NullReference { .. })), "{result:?}");
}

#[test]
fn test_indirect_call() {
    let mut fx = Fixture::new();
    let triple = fx.function("triple", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .ldc_i4(3)
            .op(OpCode::Mul)
            .op(OpCode::Ret);
    });
    let id = fx.function("run", &[INT32], Some(INT32), |b| {
        b.op(OpCode::Ldarg0)
            .op_method(OpCode::Ldftn, triple)
            .op_method(OpCode::Calli, triple)
            .op(OpCode::Ret);
    });
    assert_eq!(fx.word(id, &words(&[-7])) as i32, -21);
}
