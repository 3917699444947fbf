//! Linked program image and the native runtime helpers.

use super::memory::Memory;
use super::{
    CODE_BASE, DATA_BASE, EmuResult, Fault, HEAP_BASE, HEAP_LIMIT, HELPER_BASE,
};
use crate::backend::TargetInst;
use crate::compiler::{CompiledMethod, EmittedSpan};
use crate::label::Label;
use crate::options::{CompilerOptions, ObjectLayout};
use crate::runtime::{HaltReason, RuntimeHelper};
use kiln_core::{DescriptorTable, Symbol, TypeId};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Resource limits of an emulated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    /// Heap bytes available to `NewObj` and `NewArr`.
    pub heap_capacity: u32,
    /// Instructions one `invoke` may execute.
    pub step_limit: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            heap_capacity: 0x10_0000,
            step_limit: 1_000_000,
        }
    }
}

#[derive(Debug, Clone)]
struct LinkedMethod {
    symbol: Symbol,
    /// Index of the method's first instruction.
    base: usize,
    spans: Vec<EmittedSpan>,
    local_bytes: u32,
}

#[derive(Debug, Clone, Copy)]
struct TypeInfo {
    instance_size: u32,
    element_size: u32,
}

/// The bytecode instruction an executed target instruction starts.
#[derive(Debug, Clone, Copy)]
pub struct SpanSite<'a> {
    pub method: &'a Symbol,
    pub span: &'a EmittedSpan,
    pub local_bytes: u32,
}

/// Code, data and heap of one emulated program.
#[derive(Debug, Clone)]
pub struct Image<I> {
    code: Vec<I>,
    labels: FxHashMap<Label, usize>,
    symbols: FxHashMap<Symbol, u32>,
    methods: Vec<LinkedMethod>,
    types: FxHashMap<TypeId, u32>,
    type_info: FxHashMap<u32, TypeInfo>,
    memory: Memory,
    layout: ObjectLayout,
    config: ImageConfig,
    data_next: u32,
    heap_next: u32,
    heap_end: u32,
    released: Vec<u32>,
}

impl<I: TargetInst> Image<I> {
    /// Link `methods` against the runtime data described by `tables`.
    pub fn link(
        methods: &[CompiledMethod<I>],
        tables: &DescriptorTable,
        options: &CompilerOptions,
        config: ImageConfig,
    ) -> EmuResult<Self> {
        let mut image = Self {
            code: Vec::new(),
            labels: FxHashMap::default(),
            symbols: FxHashMap::default(),
            methods: Vec::with_capacity(methods.len()),
            types: FxHashMap::default(),
            type_info: FxHashMap::default(),
            memory: Memory::new(),
            layout: options.layout,
            config,
            data_next: DATA_BASE,
            heap_next: HEAP_BASE,
            heap_end: HEAP_BASE + config.heap_capacity.min(HEAP_LIMIT),
            released: Vec::new(),
        };

        for (slot, helper) in RuntimeHelper::ALL.into_iter().enumerate() {
            image
                .symbols
                .insert(helper.symbol(), HELPER_BASE + 4 * slot as u32);
        }
        for method in methods {
            image.link_method(method);
        }
        image.link_types(tables, options.pointer_size)?;
        for field in tables.fields().into_iter().filter(|field| field.is_static) {
            let size = match tables.type_desc(field.field_type) {
                Some(ty) => DescriptorTable::storage_size(ty, options.pointer_size),
                None => options.pointer_size,
            };
            let address = image.alloc_data(size)?;
            image.symbols.insert(field.symbol.clone(), address);
        }
        for literal in tables.strings() {
            let address = image.alloc_data(8)?;
            image
                .memory
                .write_u32(address + 4, literal.value.chars().count() as u32)?;
            image.symbols.insert(literal.symbol.clone(), address);
        }

        debug!(
            methods = image.methods.len(),
            instructions = image.code.len(),
            data = image.data_next - DATA_BASE,
            "linked image"
        );
        Ok(image)
    }

    fn link_method(&mut self, method: &CompiledMethod<I>) {
        let base = self.code.len();
        for (offset, inst) in method.instructions.iter().enumerate() {
            if let Some(label) = inst.as_label() {
                self.labels.insert(label.clone(), base + offset);
            }
        }
        self.code.extend(method.instructions.iter().cloned());
        self.symbols
            .insert(method.symbol.clone(), Self::code_address(base));
        self.methods.push(LinkedMethod {
            symbol: method.symbol.clone(),
            base,
            spans: method.spans.clone(),
            local_bytes: method.frame.local_bytes(),
        });
    }

    /// Type descriptors first, so method tables can point at their parents.
    fn link_types(&mut self, tables: &DescriptorTable, pointer_size: u32) -> EmuResult<()> {
        let layout = self.layout;
        let descriptor_size = 4 + [
            layout.type_size_offset,
            layout.type_id_offset,
            layout.type_method_table_offset,
            layout.type_base_type_offset,
        ]
        .into_iter()
        .max()
        .unwrap_or(0);

        let types = tables.types();
        let mut method_tables = FxHashMap::default();
        for ty in &types {
            let address = self.alloc_data(descriptor_size)?;
            let table = self.alloc_data(8 * (ty.method_table.len() as u32 + 1))?;
            self.types.insert(ty.id, address);
            self.symbols.insert(ty.symbol.clone(), address);
            self.type_info.insert(
                address,
                TypeInfo {
                    instance_size: ty.heap_size,
                    element_size: DescriptorTable::storage_size(ty, pointer_size),
                },
            );
            method_tables.insert(ty.id, table);
        }

        for ty in &types {
            let address = self.types[&ty.id];
            let table = method_tables[&ty.id];
            let base = ty.base_type.and_then(|id| self.types.get(&id).copied());
            let parent_table = ty
                .base_type
                .and_then(|id| method_tables.get(&id).copied())
                .unwrap_or(0);

            self.memory
                .write_u32(address + layout.type_size_offset, ty.heap_size)?;
            self.memory.write_u32(address + layout.type_id_offset, ty.id.0)?;
            self.memory
                .write_u32(address + layout.type_method_table_offset, table)?;
            self.memory
                .write_u32(address + layout.type_base_type_offset, base.unwrap_or(0))?;

            let mut entry = table;
            for (slot, implementation) in &ty.method_table {
                let target = tables
                    .method(*implementation)
                    .and_then(|method| self.symbols.get(&method.symbol).copied())
                    .unwrap_or(0);
                self.memory.write_u32(entry, slot.get())?;
                self.memory.write_u32(entry + 4, target)?;
                entry += 8;
            }
            self.memory.write_u32(entry, 0)?;
            self.memory.write_u32(entry + 4, parent_table)?;
        }
        Ok(())
    }

    fn alloc_data(&mut self, size: u32) -> EmuResult<u32> {
        let address = self.data_next;
        let end = address + size.max(4).next_multiple_of(8);
        if end > HEAP_BASE {
            return Err(Fault::MemoryFault { address });
        }
        self.data_next = end;
        Ok(address)
    }

    // -------------------------------------------------------------------------
    // Code
    // -------------------------------------------------------------------------

    #[inline]
    pub fn code_address(index: usize) -> u32 {
        CODE_BASE.wrapping_add(4 * index as u32)
    }

    /// Index of the instruction at `address`.
    pub fn index_of(&self, address: u32) -> EmuResult<usize> {
        let offset = address.wrapping_sub(CODE_BASE);
        let index = (offset / 4) as usize;
        if address < CODE_BASE || offset % 4 != 0 || index >= self.code.len() {
            return Err(Fault::InvalidInstruction { address });
        }
        Ok(index)
    }

    #[inline]
    pub fn instruction(&self, index: usize) -> Option<&I> {
        self.code.get(index)
    }

    pub fn label_address(&self, label: &Label) -> EmuResult<u32> {
        self.labels
            .get(label)
            .map(|index| Self::code_address(*index))
            .ok_or_else(|| Fault::UnboundLabel(label.clone()))
    }

    #[inline]
    pub fn symbol_address(&self, symbol: &Symbol) -> Option<u32> {
        self.symbols.get(symbol).copied()
    }

    pub fn resolve(&self, symbol: &Symbol) -> EmuResult<u32> {
        self.symbol_address(symbol)
            .ok_or_else(|| Fault::UnknownSymbol(symbol.clone()))
    }

    /// The helper whose entry point is `address`.
    pub fn helper_at(&self, address: u32) -> Option<RuntimeHelper> {
        let offset = address.checked_sub(HELPER_BASE)?;
        if offset % 4 != 0 {
            return None;
        }
        RuntimeHelper::ALL.get((offset / 4) as usize).copied()
    }

    /// The span whose first instruction is `index`.
    pub fn locate(&self, index: usize) -> Option<SpanSite<'_>> {
        let method = self.methods.iter().rev().find(|method| method.base <= index)?;
        let local = index - method.base;
        let span = method
            .spans
            .iter()
            .find(|span| span.range.start == local && !span.range.is_empty())?;
        Some(SpanSite {
            method: &method.symbol,
            span,
            local_bytes: method.local_bytes,
        })
    }

    #[inline]
    pub fn step_limit(&self) -> u64 {
        self.config.step_limit
    }

    // -------------------------------------------------------------------------
    // Data
    // -------------------------------------------------------------------------

    #[inline]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    #[inline]
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    #[inline]
    pub fn read_u32(&self, address: u32) -> EmuResult<u32> {
        self.memory.read_u32(address)
    }

    #[inline]
    pub fn write_u32(&mut self, address: u32, value: u32) -> EmuResult<()> {
        self.memory.write_u32(address, value)
    }

    #[inline]
    pub fn type_address(&self, ty: TypeId) -> Option<u32> {
        self.types.get(&ty).copied()
    }

    #[inline]
    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    // -------------------------------------------------------------------------
    // Heap
    // -------------------------------------------------------------------------

    /// Objects handed to `DecrementRefCount`, in call order.
    #[inline]
    pub fn released(&self) -> &[u32] {
        &self.released
    }

    /// Bump allocation; `None` once the heap is exhausted.
    fn alloc(&mut self, size: u32) -> EmuResult<Option<u32>> {
        let size = size.max(4).next_multiple_of(4);
        let address = self.heap_next;
        match address.checked_add(size) {
            Some(end) if end <= self.heap_end => {
                self.memory.fill_zero(address, size)?;
                self.heap_next = end;
                Ok(Some(address))
            }
            _ => Ok(None),
        }
    }

    fn type_info(&self, descriptor: u32) -> EmuResult<TypeInfo> {
        self.type_info
            .get(&descriptor)
            .copied()
            .ok_or(Fault::MemoryFault {
                address: descriptor,
            })
    }

    /// `NewObj`: zeroed instance with its type pointer set, or null.
    fn new_object(&mut self, descriptor: u32) -> EmuResult<u32> {
        let info = self.type_info(descriptor)?;
        let Some(object) = self.alloc(info.instance_size)? else {
            return Ok(0);
        };
        self.memory
            .write_u32(object + self.layout.type_pointer_offset, descriptor)?;
        Ok(object)
    }

    /// `NewArr`: arrays carry no type pointer of their own, only the
    /// element type. A negative length allocates nothing.
    fn new_array(&mut self, element: u32, length: u32) -> EmuResult<u32> {
        let info = self.type_info(element)?;
        if (length as i32) < 0 {
            return Ok(0);
        }
        let size = length
            .checked_mul(info.element_size)
            .and_then(|bytes| bytes.checked_add(self.layout.array_header_size));
        let Some(size) = size else {
            return Ok(0);
        };
        let Some(array) = self.alloc(size)? else {
            return Ok(0);
        };
        self.memory
            .write_u32(array + self.layout.array_length_offset, length)?;
        self.memory
            .write_u32(array + self.layout.array_element_type_offset, element)?;
        Ok(array)
    }

    /// Allocate an instance of `ty` outside emulated code.
    pub fn alloc_object(&mut self, ty: TypeId) -> EmuResult<u32> {
        let descriptor = self.type_address(ty).ok_or(Fault::MemoryFault { address: 0 })?;
        match self.new_object(descriptor)? {
            0 => Err(Fault::Halt {
                code: HaltReason::OutOfMemory.code(),
            }),
            object => Ok(object),
        }
    }

    /// Allocate an array of `length` elements of `element`.
    pub fn alloc_array(&mut self, element: TypeId, length: u32) -> EmuResult<u32> {
        let descriptor = self
            .type_address(element)
            .ok_or(Fault::MemoryFault { address: 0 })?;
        match self.new_array(descriptor, length)? {
            0 => Err(Fault::Halt {
                code: HaltReason::OutOfMemory.code(),
            }),
            array => Ok(array),
        }
    }

    // -------------------------------------------------------------------------
    // Runtime Helpers
    // -------------------------------------------------------------------------

    /// Run `helper` natively with the managed calling convention: its return
    /// slot at `sp`, the last argument right above.
    ///
    /// Returns the value for the first return register (`GetEIP` only).
    pub(crate) fn run_helper(
        &mut self,
        helper: RuntimeHelper,
        sp: u32,
        call_site: u32,
    ) -> EmuResult<Option<u32>> {
        let args = sp.wrapping_add(helper.return_bytes());
        match helper {
            RuntimeHelper::GetEip => Ok(Some(call_site)),
            RuntimeHelper::ThrowNullReferenceException => Err(Fault::NullReference {
                eip: self.memory.read_u32(args)?,
            }),
            RuntimeHelper::ThrowIndexOutOfRangeException => Err(Fault::IndexOutOfRange {
                eip: self.memory.read_u32(args)?,
            }),
            RuntimeHelper::ThrowInvalidCastException => Err(Fault::InvalidCast {
                eip: self.memory.read_u32(args)?,
            }),
            RuntimeHelper::Throw => Err(Fault::Thrown {
                object: self.memory.read_u32(args)?,
            }),
            RuntimeHelper::Halt => Err(Fault::Halt {
                code: self.memory.read_u32(args)?,
            }),
            RuntimeHelper::DecrementRefCount => {
                let object = self.memory.read_u32(args)?;
                self.released.push(object);
                Ok(None)
            }
            RuntimeHelper::NewObj => {
                let descriptor = self.memory.read_u32(args)?;
                let object = self.new_object(descriptor)?;
                self.memory.write_u32(sp, object)?;
                Ok(None)
            }
            RuntimeHelper::NewArr => {
                let element = self.memory.read_u32(args)?;
                let length = self.memory.read_u32(args + 4)?;
                let array = self.new_array(element, length)?;
                self.memory.write_u32(sp, array)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::x86::X86Inst;
    use kiln_core::{MethodDescriptor, MethodId, TypeDescriptor};

    fn tables() -> DescriptorTable {
        let mut tables = DescriptorTable::new();
        let speak = MethodId::new(1).unwrap();
        tables.add_type(TypeDescriptor::primitive(TypeId(1), "Int32", 4, true));
        tables.add_type(TypeDescriptor::class(TypeId(2), "Animal", 12).with_method(speak, speak));
        tables.add_type(TypeDescriptor::class(TypeId(3), "Dog", 16).with_base(TypeId(2)));
        tables.add_method(
            MethodDescriptor::new(speak, TypeId(2), "Speak")
                .instance()
                .virtual_method(),
        );
        tables
    }

    fn image(config: ImageConfig) -> Image<X86Inst> {
        Image::link(&[], &tables(), &CompilerOptions::new(), config).unwrap()
    }

    #[test]
    fn test_type_descriptors_chain_to_base() {
        let image = image(ImageConfig::default());
        let layout = ObjectLayout::default();
        let animal = image.type_address(TypeId(2)).unwrap();
        let dog = image.type_address(TypeId(3)).unwrap();

        assert_eq!(image.read_u32(dog + layout.type_size_offset).unwrap(), 16);
        assert_eq!(image.read_u32(dog + layout.type_id_offset).unwrap(), 3);
        assert_eq!(image.read_u32(dog + layout.type_base_type_offset).unwrap(), animal);

        // Dog's table is just the terminator pointing at Animal's table.
        let dog_table = image.read_u32(dog + layout.type_method_table_offset).unwrap();
        let animal_table = image.read_u32(animal + layout.type_method_table_offset).unwrap();
        assert_eq!(image.read_u32(dog_table).unwrap(), 0);
        assert_eq!(image.read_u32(dog_table + 4).unwrap(), animal_table);
        assert_eq!(image.read_u32(animal_table).unwrap(), 1);
    }

    #[test]
    fn test_helpers_have_addresses() {
        let image = image(ImageConfig::default());
        let halt = image.resolve(&RuntimeHelper::Halt.symbol()).unwrap();
        assert_eq!(image.helper_at(halt), Some(RuntimeHelper::Halt));
        assert_eq!(image.helper_at(CODE_BASE), None);
    }

    #[test]
    fn test_arrays_record_length_and_element_type() {
        let mut image = image(ImageConfig::default());
        let array = image.alloc_array(TypeId(1), 5).unwrap();
        let int32 = image.type_address(TypeId(1)).unwrap();
        assert_eq!(image.read_u32(array).unwrap(), 0);
        assert_eq!(image.read_u32(array + 4).unwrap(), 5);
        assert_eq!(image.read_u32(array + 8).unwrap(), int32);
    }

    #[test]
    fn test_exhausted_heap_yields_null() {
        let mut image = image(ImageConfig {
            heap_capacity: 32,
            ..ImageConfig::default()
        });
        assert!(image.alloc_object(TypeId(3)).is_ok());
        assert!(image.alloc_object(TypeId(3)).is_ok());
        assert_eq!(
            image.alloc_object(TypeId(3)),
            Err(Fault::Halt {
                code: HaltReason::OutOfMemory.code()
            })
        );
    }
}
