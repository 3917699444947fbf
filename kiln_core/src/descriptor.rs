//! Resolved metadata: types, fields, methods and string literals.
//!
//! Descriptors are produced by the metadata layer and are read-only during
//! compilation. Each carries the [`Symbol`] the linker knows it by.

use crate::error::{CompileError, CompileResult, DescriptorKind};
use crate::instruction::IlInstruction;
use crate::stack::StackItem;
use rustc_hash::FxHashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// Identifiers
// =============================================================================

/// A linker-visible name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: impl AsRef<str>) -> Self {
        Symbol(Arc::from(name.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

/// Method identifier; zero terminates a method table, so ids are nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(NonZeroU32);

impl MethodId {
    #[inline]
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(id) => Some(MethodId(id)),
            None => None,
        }
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A runtime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub id: TypeId,
    pub name: String,
    /// Label of the runtime type descriptor.
    pub symbol: Symbol,
    /// Bytes an instance occupies on the operand stack (before slot rounding).
    pub stack_size: u32,
    /// Bytes an instance occupies in a field or array element.
    pub heap_size: u32,
    pub is_value_type: bool,
    pub is_gc_managed: bool,
    pub is_float: bool,
    pub is_signed: bool,
    pub is_delegate: bool,
    pub base_type: Option<TypeId>,
    /// `(slot, implementation)` pairs; the slot id is the lookup key.
    pub method_table: Vec<(MethodId, MethodId)>,
}

impl TypeDescriptor {
    /// A primitive integer value type of `size` bytes.
    pub fn primitive(id: TypeId, name: &str, size: u32, is_signed: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            symbol: Symbol::new(format!("{name}.Type")),
            stack_size: size,
            heap_size: size,
            is_value_type: true,
            is_gc_managed: false,
            is_float: false,
            is_signed,
            is_delegate: false,
            base_type: None,
            method_table: Vec::new(),
        }
    }

    /// A floating-point value type.
    pub fn float(id: TypeId, name: &str, size: u32) -> Self {
        Self {
            is_float: true,
            is_signed: true,
            ..Self::primitive(id, name, size, true)
        }
    }

    /// A user value type whose instances span `size` bytes.
    pub fn structure(id: TypeId, name: &str, size: u32) -> Self {
        Self::primitive(id, name, size, false)
    }

    /// A GC-managed class; `heap_size` is the instance size including header.
    pub fn class(id: TypeId, name: &str, heap_size: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            symbol: Symbol::new(format!("{name}.Type")),
            stack_size: 4,
            heap_size,
            is_value_type: false,
            is_gc_managed: true,
            is_float: false,
            is_signed: false,
            is_delegate: false,
            base_type: None,
            method_table: Vec::new(),
        }
    }

    /// A delegate class.
    pub fn delegate(id: TypeId, name: &str) -> Self {
        Self {
            is_delegate: true,
            ..Self::class(id, name, 8)
        }
    }

    pub fn with_base(mut self, base: TypeId) -> Self {
        self.base_type = Some(base);
        self
    }

    /// Register `implementation` for virtual `slot`.
    pub fn with_method(mut self, slot: MethodId, implementation: MethodId) -> Self {
        self.method_table.push((slot, implementation));
        self
    }

    pub fn with_symbol(mut self, symbol: impl AsRef<str>) -> Self {
        self.symbol = Symbol::new(symbol);
        self
    }
}

/// An instance or static field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: FieldId,
    pub name: String,
    pub declaring_type: TypeId,
    pub field_type: TypeId,
    /// Byte offset within the object, header included.
    pub offset: u32,
    pub is_static: bool,
    /// Storage label of a static field.
    pub symbol: Symbol,
}

impl FieldDescriptor {
    pub fn instance(
        id: FieldId,
        name: &str,
        declaring_type: TypeId,
        field_type: TypeId,
        offset: u32,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            declaring_type,
            field_type,
            offset,
            is_static: false,
            symbol: Symbol::new(format!("field.{name}")),
        }
    }

    pub fn static_field(id: FieldId, name: &str, declaring_type: TypeId, field_type: TypeId) -> Self {
        Self {
            is_static: true,
            symbol: Symbol::new(format!("static.{name}")),
            ..Self::instance(id, name, declaring_type, field_type, 0)
        }
    }
}

/// A method signature and entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub id: MethodId,
    pub name: String,
    /// Compiled entry point.
    pub symbol: Symbol,
    pub declaring_type: TypeId,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_constructor: bool,
    /// Parameter types, excluding `this`.
    pub params: Vec<TypeId>,
    pub return_type: Option<TypeId>,
    pub locals: Vec<TypeId>,
}

impl MethodDescriptor {
    /// A static method; its symbol is `M{id}.{name}` unless overridden.
    pub fn new(id: MethodId, declaring_type: TypeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            symbol: Symbol::new(format!("M{}.{}", id.get(), name)),
            declaring_type,
            is_static: true,
            is_virtual: false,
            is_constructor: false,
            params: Vec::new(),
            return_type: None,
            locals: Vec::new(),
        }
    }

    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
    }

    pub fn virtual_method(mut self) -> Self {
        self.is_static = false;
        self.is_virtual = true;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_static = false;
        self.is_constructor = true;
        self
    }

    pub fn with_params(mut self, params: &[TypeId]) -> Self {
        self.params = params.to_vec();
        self
    }

    pub fn with_return(mut self, ty: TypeId) -> Self {
        self.return_type = Some(ty);
        self
    }

    pub fn with_locals(mut self, locals: &[TypeId]) -> Self {
        self.locals = locals.to_vec();
        self
    }

    pub fn with_symbol(mut self, symbol: impl AsRef<str>) -> Self {
        self.symbol = Symbol::new(symbol);
        self
    }

    /// Argument count including `this`.
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.is_static)
    }
}

/// An interned string literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    pub id: StringId,
    pub value: String,
    pub symbol: Symbol,
}

impl StringLiteral {
    pub fn new(id: StringId, value: &str) -> Self {
        Self {
            id,
            value: value.to_string(),
            symbol: Symbol::new(format!("string.{}", id.0)),
        }
    }
}

// =============================================================================
// Descriptor Table
// =============================================================================

/// All descriptors visible to one compilation.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    types: FxHashMap<TypeId, TypeDescriptor>,
    fields: FxHashMap<FieldId, FieldDescriptor>,
    methods: FxHashMap<MethodId, MethodDescriptor>,
    strings: FxHashMap<StringId, StringLiteral>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, ty: TypeDescriptor) -> TypeId {
        let id = ty.id;
        self.types.insert(id, ty);
        id
    }

    pub fn add_field(&mut self, field: FieldDescriptor) -> FieldId {
        let id = field.id;
        self.fields.insert(id, field);
        id
    }

    pub fn add_method(&mut self, method: MethodDescriptor) -> MethodId {
        let id = method.id;
        self.methods.insert(id, method);
        id
    }

    pub fn add_string(&mut self, literal: StringLiteral) -> StringId {
        let id = literal.id;
        self.strings.insert(id, literal);
        id
    }

    #[inline]
    pub fn type_desc(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(&id)
    }

    #[inline]
    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.get(&id)
    }

    #[inline]
    pub fn method(&self, id: MethodId) -> Option<&MethodDescriptor> {
        self.methods.get(&id)
    }

    #[inline]
    pub fn string(&self, id: StringId) -> Option<&StringLiteral> {
        self.strings.get(&id)
    }

    /// Types ordered by id.
    pub fn types(&self) -> Vec<&TypeDescriptor> {
        let mut types: Vec<_> = self.types.values().collect();
        types.sort_by_key(|ty| ty.id);
        types
    }

    /// Fields ordered by id.
    pub fn fields(&self) -> Vec<&FieldDescriptor> {
        let mut fields: Vec<_> = self.fields.values().collect();
        fields.sort_by_key(|field| field.id);
        fields
    }

    /// Methods ordered by id.
    pub fn methods(&self) -> Vec<&MethodDescriptor> {
        let mut methods: Vec<_> = self.methods.values().collect();
        methods.sort_by_key(|method| method.id);
        methods
    }

    /// String literals ordered by id.
    pub fn strings(&self) -> Vec<&StringLiteral> {
        let mut strings: Vec<_> = self.strings.values().collect();
        strings.sort_by_key(|literal| literal.id);
        strings
    }

    // -------------------------------------------------------------------------
    // Instruction-attributed resolution
    // -------------------------------------------------------------------------

    pub fn resolve_type(&self, instr: &IlInstruction) -> CompileResult<&TypeDescriptor> {
        instr
            .type_ref
            .and_then(|id| self.type_desc(id))
            .ok_or_else(|| CompileError::unresolved(instr.op, instr.position, DescriptorKind::Type))
    }

    pub fn resolve_field(&self, instr: &IlInstruction) -> CompileResult<&FieldDescriptor> {
        instr
            .field_ref
            .and_then(|id| self.field(id))
            .ok_or_else(|| CompileError::unresolved(instr.op, instr.position, DescriptorKind::Field))
    }

    pub fn resolve_method(&self, instr: &IlInstruction) -> CompileResult<&MethodDescriptor> {
        instr
            .method_ref
            .and_then(|id| self.method(id))
            .ok_or_else(|| {
                CompileError::unresolved(instr.op, instr.position, DescriptorKind::Method)
            })
    }

    pub fn resolve_string(&self, instr: &IlInstruction) -> CompileResult<&StringLiteral> {
        instr
            .string_ref
            .and_then(|id| self.string(id))
            .ok_or_else(|| {
                CompileError::unresolved(instr.op, instr.position, DescriptorKind::String)
            })
    }

    /// Resolve a type id referenced by another descriptor.
    pub fn type_for(&self, id: TypeId, instr: &IlInstruction) -> CompileResult<&TypeDescriptor> {
        self.type_desc(id)
            .ok_or_else(|| CompileError::unresolved(instr.op, instr.position, DescriptorKind::Type))
    }

    // -------------------------------------------------------------------------
    // Size calculations
    // -------------------------------------------------------------------------

    /// Shape of a value of `ty` on the operand stack.
    pub fn stack_item(ty: &TypeDescriptor, pointer_size: u32) -> StackItem {
        if !ty.is_value_type {
            return StackItem::reference(pointer_size);
        }
        let size = ty.stack_size.max(1).next_multiple_of(4);
        if ty.is_float {
            StackItem::float(size)
        } else {
            StackItem::value(size)
        }
    }

    /// Bytes a value of `ty` occupies in a field or array element.
    #[inline]
    pub fn storage_size(ty: &TypeDescriptor, pointer_size: u32) -> u32 {
        if ty.is_value_type {
            ty.heap_size
        } else {
            pointer_size
        }
    }

    /// Whether `ty` is `target` or derives from it.
    pub fn is_subtype(&self, ty: TypeId, target: TypeId) -> bool {
        let mut current = Some(ty);
        let mut steps = 0;
        while let Some(id) = current {
            if id == target {
                return true;
            }
            steps += 1;
            if steps > self.types.len() {
                return false;
            }
            current = self.type_desc(id).and_then(|t| t.base_type);
        }
        false
    }
}
