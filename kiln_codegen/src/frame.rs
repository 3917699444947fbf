//! Stack frame layout shared by both targets.
//!
//! ```text
//!   higher addresses
//!   +-----------------+
//!   | arg 0 / this    |
//!   | ...             |
//!   | arg n-1         |  fp + 8 + ret_size
//!   | return slot     |  fp + 8
//!   | return address  |  fp + 4
//!   | saved fp        |  fp + 0   <- fp
//!   | local 0         |  fp - size(local 0)
//!   | ...             |
//!   | operand stack   |           <- sp
//!   +-----------------+
//! ```

use kiln_core::{
    CompileError, CompileResult, DescriptorKind, DescriptorTable, MethodDescriptor, OpCode,
    StackItem, TypeId,
};

/// Frame-pointer relative location of one argument or local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub offset: i32,
    pub item: StackItem,
}

/// Resolved frame of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    args: Vec<FrameSlot>,
    locals: Vec<FrameSlot>,
    return_item: Option<StackItem>,
    arg_bytes: u32,
    local_bytes: u32,
}

impl FrameLayout {
    /// Offset of the return address.
    pub const RETURN_ADDRESS_OFFSET: i32 = 4;
    /// Offset of the caller-reserved return slot.
    pub const RETURN_SLOT_OFFSET: i32 = 8;

    pub fn new(
        method: &MethodDescriptor,
        tables: &DescriptorTable,
        pointer_size: u32,
    ) -> CompileResult<Self> {
        let resolve = |id: TypeId| {
            tables
                .type_desc(id)
                .map(|ty| DescriptorTable::stack_item(ty, pointer_size))
                .ok_or(CompileError::unresolved(
                    OpCode::MethodStart,
                    0,
                    DescriptorKind::Type,
                ))
        };

        let mut arg_items = Vec::with_capacity(method.arg_count());
        if !method.is_static {
            let declaring = tables.type_desc(method.declaring_type).ok_or(
                CompileError::unresolved(OpCode::MethodStart, 0, DescriptorKind::Type),
            )?;
            // `this` of a value type is a managed pointer to the instance.
            arg_items.push(if declaring.is_value_type {
                StackItem::native_int(pointer_size)
            } else {
                StackItem::reference(pointer_size)
            });
        }
        for param in &method.params {
            arg_items.push(resolve(*param)?);
        }

        let return_item = method.return_type.map(&resolve).transpose()?;
        let return_bytes = return_item.map_or(0, |item| item.size);

        let mut args = Vec::with_capacity(arg_items.len());
        let mut above: u32 = arg_items.iter().map(|item| item.size).sum();
        let arg_bytes = above;
        for item in arg_items {
            above -= item.size;
            args.push(FrameSlot {
                offset: Self::RETURN_SLOT_OFFSET + (return_bytes + above) as i32,
                item,
            });
        }

        let mut locals = Vec::with_capacity(method.locals.len());
        let mut depth = 0u32;
        for local in &method.locals {
            let item = resolve(*local)?;
            depth += item.size;
            locals.push(FrameSlot {
                offset: -(depth as i32),
                item,
            });
        }

        Ok(Self {
            args,
            locals,
            return_item,
            arg_bytes,
            local_bytes: depth,
        })
    }

    #[inline]
    pub fn arg(&self, index: u16) -> Option<&FrameSlot> {
        self.args.get(usize::from(index))
    }

    #[inline]
    pub fn local(&self, index: u16) -> Option<&FrameSlot> {
        self.locals.get(usize::from(index))
    }

    #[inline]
    pub fn args(&self) -> &[FrameSlot] {
        &self.args
    }

    #[inline]
    pub fn locals(&self) -> &[FrameSlot] {
        &self.locals
    }

    #[inline]
    pub fn return_item(&self) -> Option<StackItem> {
        self.return_item
    }

    #[inline]
    pub fn return_bytes(&self) -> u32 {
        self.return_item.map_or(0, |item| item.size)
    }

    /// Bytes of arguments the caller pushed, `this` included.
    #[inline]
    pub fn arg_bytes(&self) -> u32 {
        self.arg_bytes
    }

    /// Bytes the prologue reserves for locals.
    #[inline]
    pub fn local_bytes(&self) -> u32 {
        self.local_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{MethodId, TypeDescriptor};

    fn tables() -> DescriptorTable {
        let mut tables = DescriptorTable::new();
        tables.add_type(TypeDescriptor::primitive(TypeId(1), "Int32", 4, true));
        tables.add_type(TypeDescriptor::primitive(TypeId(2), "Int64", 8, true));
        tables.add_type(TypeDescriptor::class(TypeId(3), "Object", 4));
        tables.add_type(TypeDescriptor::primitive(TypeId(4), "Byte", 1, false));
        tables.add_type(TypeDescriptor::structure(TypeId(5), "Point", 8));
        tables
    }

    #[test]
    fn test_static_args_last_nearest() {
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(3), "f")
            .with_params(&[TypeId(1), TypeId(2), TypeId(4)])
            .with_return(TypeId(2));
        let frame = FrameLayout::new(&method, &tables(), 4).unwrap();
        // return slot 8 bytes at fp+8; arg2 (byte, 4-byte slot) nearest.
        assert_eq!(frame.arg(2).unwrap().offset, 16);
        assert_eq!(frame.arg(1).unwrap().offset, 20);
        assert_eq!(frame.arg(0).unwrap().offset, 28);
        assert_eq!(frame.arg_bytes(), 16);
        assert_eq!(frame.return_bytes(), 8);
    }

    #[test]
    fn test_instance_this_is_arg0() {
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(3), "f")
            .instance()
            .with_params(&[TypeId(1)]);
        let frame = FrameLayout::new(&method, &tables(), 4).unwrap();
        assert_eq!(frame.args().len(), 2);
        assert_eq!(frame.arg(0).unwrap().item, StackItem::reference(4));
        assert_eq!(frame.arg(0).unwrap().offset, 12);
        assert_eq!(frame.arg(1).unwrap().offset, 8);
    }

    #[test]
    fn test_value_type_this_is_pointer() {
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(5), "f").instance();
        let frame = FrameLayout::new(&method, &tables(), 4).unwrap();
        assert_eq!(frame.arg(0).unwrap().item, StackItem::native_int(4));
    }

    #[test]
    fn test_locals_grow_down() {
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(3), "f")
            .with_locals(&[TypeId(1), TypeId(5), TypeId(4)]);
        let frame = FrameLayout::new(&method, &tables(), 4).unwrap();
        assert_eq!(frame.local(0).unwrap().offset, -4);
        assert_eq!(frame.local(1).unwrap().offset, -12);
        assert_eq!(frame.local(2).unwrap().offset, -16);
        assert_eq!(frame.local_bytes(), 16);
        assert!(frame.local(3).is_none());
    }

    #[test]
    fn test_unknown_type_is_unresolved() {
        let method = MethodDescriptor::new(MethodId::new(1).unwrap(), TypeId(3), "f")
            .with_params(&[TypeId(99)]);
        let err = FrameLayout::new(&method, &tables(), 4).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnresolvedDescriptor { kind: DescriptorKind::Type, .. }
        ));
    }
}
