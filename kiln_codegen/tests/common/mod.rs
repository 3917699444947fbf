//! Shared fixture: a small type universe, method registration, and runs of
//! the compiled code on both reference emulators.

#![allow(dead_code)]

use kiln_codegen::emu::{EmuResult, Emulated, Fault, Image, ImageConfig, Machine, StackValue};
use kiln_codegen::{CompiledMethod, CompilerOptions, Mips32, TargetBackend, X86, compile_all};
use kiln_core::{
    CompileResult, DescriptorTable, FieldDescriptor, FieldId, InstructionBuilder, MethodBody,
    MethodDescriptor, MethodId, OpCode, Symbol, TypeDescriptor, TypeId,
};
use std::mem::Discriminant;

// =============================================================================
// Type Universe
// =============================================================================

pub const INT32: TypeId = TypeId(1);
pub const INT64: TypeId = TypeId(2);
pub const UINT8: TypeId = TypeId(3);
pub const INT16: TypeId = TypeId(4);
pub const DOUBLE: TypeId = TypeId(5);
pub const OBJECT: TypeId = TypeId(10);
pub const ANIMAL: TypeId = TypeId(11);
pub const DOG: TypeId = TypeId(12);
pub const CAT: TypeId = TypeId(13);
pub const ROCK: TypeId = TypeId(14);
pub const POINT: TypeId = TypeId(15);
pub const PROGRAM: TypeId = TypeId(16);
pub const ACTION: TypeId = TypeId(17);

/// `Animal.weight`, an `Int32` at offset 4.
pub const WEIGHT: FieldId = FieldId(1);
/// `Animal.legs`, an `Int16` at offset 8.
pub const LEGS: FieldId = FieldId(2);
/// `Animal.age`, an `Int64` at offset 12.
pub const AGE: FieldId = FieldId(3);
/// `Program.counter`, a static `Int32`.
pub const COUNTER: FieldId = FieldId(4);
/// `Program.total`, a static `Int64`.
pub const TOTAL: FieldId = FieldId(5);

pub fn mid(n: u32) -> MethodId {
    MethodId::new(n).unwrap()
}

pub struct Fixture {
    pub tables: DescriptorTable,
    pub bodies: Vec<MethodBody>,
    pub options: CompilerOptions,
    pub config: ImageConfig,
    next_method: u32,
}

impl Fixture {
    pub fn new() -> Self {
        let mut tables = DescriptorTable::new();
        tables.add_type(TypeDescriptor::primitive(INT32, "Int32", 4, true));
        tables.add_type(TypeDescriptor::primitive(INT64, "Int64", 8, true));
        tables.add_type(TypeDescriptor::primitive(UINT8, "Byte", 1, false));
        tables.add_type(TypeDescriptor::primitive(INT16, "Int16", 2, true));
        tables.add_type(TypeDescriptor::float(DOUBLE, "Double", 8));
        tables.add_type(TypeDescriptor::class(OBJECT, "Object", 4));
        tables.add_type(TypeDescriptor::class(ANIMAL, "Animal", 20).with_base(OBJECT));
        tables.add_type(TypeDescriptor::class(DOG, "Dog", 20).with_base(ANIMAL));
        tables.add_type(TypeDescriptor::class(CAT, "Cat", 20).with_base(ANIMAL));
        tables.add_type(TypeDescriptor::class(ROCK, "Rock", 8));
        tables.add_type(TypeDescriptor::structure(POINT, "Point", 8));
        tables.add_type(TypeDescriptor::class(PROGRAM, "Program", 4));
        tables.add_type(TypeDescriptor::delegate(ACTION, "Action"));

        tables.add_field(FieldDescriptor::instance(WEIGHT, "weight", ANIMAL, INT32, 4));
        tables.add_field(FieldDescriptor::instance(LEGS, "legs", ANIMAL, INT16, 8));
        tables.add_field(FieldDescriptor::instance(AGE, "age", ANIMAL, INT64, 12));
        tables.add_field(FieldDescriptor::static_field(COUNTER, "counter", PROGRAM, INT32));
        tables.add_field(FieldDescriptor::static_field(TOTAL, "total", PROGRAM, INT64));

        Self {
            tables,
            bodies: Vec::new(),
            options: CompilerOptions::new(),
            config: ImageConfig::default(),
            next_method: 1,
        }
    }

    /// Reserve the next method id.
    pub fn next_id(&mut self) -> MethodId {
        let id = mid(self.next_method);
        self.next_method += 1;
        id
    }

    /// Register a descriptor without a body.
    pub fn declare(&mut self, descriptor: MethodDescriptor) -> MethodId {
        self.tables.add_method(descriptor)
    }

    /// Register a method and its body.
    pub fn method(
        &mut self,
        descriptor: MethodDescriptor,
        build: impl FnOnce(&mut InstructionBuilder),
    ) -> MethodId {
        let id = self.tables.add_method(descriptor);
        let mut builder = InstructionBuilder::new();
        build(&mut builder);
        self.bodies
            .push(MethodBody::new(id, builder.build().expect("body builds")));
        id
    }

    /// A static method on `Program`.
    pub fn function(
        &mut self,
        name: &str,
        params: &[TypeId],
        ret: Option<TypeId>,
        build: impl FnOnce(&mut InstructionBuilder),
    ) -> MethodId {
        self.function_with_locals(name, params, &[], ret, build)
    }

    pub fn function_with_locals(
        &mut self,
        name: &str,
        params: &[TypeId],
        locals: &[TypeId],
        ret: Option<TypeId>,
        build: impl FnOnce(&mut InstructionBuilder),
    ) -> MethodId {
        let id = self.next_id();
        let mut descriptor = MethodDescriptor::new(id, PROGRAM, name)
            .with_params(params)
            .with_locals(locals);
        if let Some(ret) = ret {
            descriptor = descriptor.with_return(ret);
        }
        self.method(descriptor, build)
    }

    /// Add `(slot, implementation)` to `ty`'s method table.
    pub fn override_slot(&mut self, ty: TypeId, slot: MethodId, implementation: MethodId) {
        let updated = self
            .tables
            .type_desc(ty)
            .expect("type exists")
            .clone()
            .with_method(slot, implementation);
        self.tables.add_type(updated);
    }

    /// A constructor for `ty` that stores `weight` when `ty` is an animal.
    pub fn constructor(&mut self, ty: TypeId) -> MethodId {
        let id = self.next_id();
        let descriptor = MethodDescriptor::new(id, ty, ".ctor").constructor();
        let animal = self.tables.is_subtype(ty, ANIMAL);
        self.method(descriptor, |b| {
            if animal {
                b.op(OpCode::Ldarg0).ldc_i4(5).op_field(OpCode::Stfld, WEIGHT);
            }
            b.op(OpCode::Ret);
        })
    }

    pub fn compile<T: TargetBackend>(&self) -> CompileResult<Vec<CompiledMethod<T::Inst>>> {
        compile_all::<T>(&self.bodies, &self.tables, &self.options)
    }

    pub fn machine<T: Emulated>(&self) -> T::Machine {
        let methods = self.compile::<T>().expect("fixture compiles");
        let image = Image::link(&methods, &self.tables, &self.options, self.config)
            .expect("fixture links");
        T::Machine::new(image)
    }

    pub fn symbol(&self, method: MethodId) -> Symbol {
        self.tables.method(method).expect("method exists").symbol.clone()
    }

    pub fn run<T: Emulated>(
        &self,
        entry: MethodId,
        args: &[StackValue],
        return_bytes: u32,
    ) -> EmuResult<Vec<u32>> {
        self.machine::<T>()
            .invoke(&self.symbol(entry), args, return_bytes)
    }

    /// Run on both targets, require identical outcomes, return it.
    pub fn run_both(
        &self,
        entry: MethodId,
        args: &[StackValue],
        return_bytes: u32,
    ) -> EmuResult<Vec<u32>> {
        let x86 = self.run::<X86>(entry, args, return_bytes);
        let mips = self.run::<Mips32>(entry, args, return_bytes);
        assert_eq!(
            fault_kind(&x86),
            fault_kind(&mips),
            "targets disagree: x86 {x86:?}, mips32 {mips:?}"
        );
        if x86.is_ok() {
            assert_eq!(x86, mips, "targets disagree");
        }
        x86
    }

    pub fn word(&self, entry: MethodId, args: &[StackValue]) -> u32 {
        self.run_both(entry, args, 4).expect("runs")[0]
    }

    pub fn long(&self, entry: MethodId, args: &[StackValue]) -> u64 {
        let words = self.run_both(entry, args, 8).expect("runs");
        u64::from(words[1]) << 32 | u64::from(words[0])
    }
}

/// Faults carry target-specific addresses; compare their kinds only.
pub fn fault_kind(result: &EmuResult<Vec<u32>>) -> Option<Discriminant<Fault>> {
    result.as_ref().err().map(std::mem::discriminant)
}

pub fn words(args: &[i32]) -> Vec<StackValue> {
    args.iter().map(|&arg| StackValue::from(arg)).collect()
}
