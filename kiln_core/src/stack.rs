//! Simulated operand stack.
//!
//! A [`StackItem`] describes the shape of one logical value: its slot
//! footprint and the flags the code generator dispatches on. The
//! [`OperandStack`] is owned by a single method translation and mutated in
//! program order; its byte height always equals the bytes the emitted code has
//! reserved below the real stack pointer at the same program point.

use crate::error::{CompileError, CompileResult};
use crate::opcode::OpCode;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Stack Item
// =============================================================================

/// Shape of one value on the operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackItem {
    /// Slot footprint in bytes, a multiple of 4.
    pub size: u32,
    pub is_float: bool,
    pub is_gc_managed: bool,
    /// Value-type instance rather than a reference.
    pub is_value: bool,
    /// Fresh allocation not yet stored anywhere.
    pub is_new_gc_object: bool,
}

impl StackItem {
    /// A word-sized integer.
    #[inline]
    pub const fn int32() -> Self {
        Self::value(4)
    }

    /// A double-word integer.
    #[inline]
    pub const fn int64() -> Self {
        Self::value(8)
    }

    /// A native-width integer or unmanaged pointer.
    #[inline]
    pub const fn native_int(pointer_size: u32) -> Self {
        Self::value(pointer_size)
    }

    /// A value-type instance occupying `size` stack bytes.
    #[inline]
    pub const fn value(size: u32) -> Self {
        Self {
            size,
            is_float: false,
            is_gc_managed: false,
            is_value: true,
            is_new_gc_object: false,
        }
    }

    /// A floating-point value.
    #[inline]
    pub const fn float(size: u32) -> Self {
        Self {
            is_float: true,
            ..Self::value(size)
        }
    }

    /// A managed object reference.
    #[inline]
    pub const fn reference(pointer_size: u32) -> Self {
        Self {
            size: pointer_size,
            is_float: false,
            is_gc_managed: true,
            is_value: false,
            is_new_gc_object: false,
        }
    }

    /// The result of a fresh allocation.
    #[inline]
    pub const fn new_object(pointer_size: u32) -> Self {
        Self {
            is_new_gc_object: true,
            ..Self::reference(pointer_size)
        }
    }

    /// Same value with the fresh-allocation flag cleared.
    #[inline]
    pub const fn stored(self) -> Self {
        Self {
            is_new_gc_object: false,
            ..self
        }
    }

    /// Number of 4-byte words the slot spans.
    #[inline]
    pub const fn words(&self) -> u32 {
        self.size.div_ceil(4)
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_float {
            "float"
        } else if self.is_value {
            "value"
        } else {
            "ref"
        };
        write!(f, "{}{}", kind, self.size * 8)?;
        if self.is_new_gc_object {
            f.write_str("+new")?;
        }
        Ok(())
    }
}

// =============================================================================
// Operand Stack
// =============================================================================

/// LIFO sequence of stack items, one per logical value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandStack {
    items: Vec<StackItem>,
}

impl OperandStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, item: StackItem) {
        self.items.push(item);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<StackItem> {
        self.items.pop()
    }

    /// Pop, reporting underflow as an error attributed to `op`.
    pub fn pop_for(&mut self, op: OpCode, position: u32) -> CompileResult<StackItem> {
        self.items
            .pop()
            .ok_or_else(|| CompileError::stack_shape(op, position, "operand stack underflow"))
    }

    /// Pop `n` items, topmost first.
    pub fn pop_n(
        &mut self,
        n: usize,
        op: OpCode,
        position: u32,
    ) -> CompileResult<SmallVec<[StackItem; 4]>> {
        if self.items.len() < n {
            return Err(CompileError::stack_shape(
                op,
                position,
                format!("needs {} operands, stack holds {}", n, self.items.len()),
            ));
        }
        Ok((0..n).filter_map(|_| self.items.pop()).collect())
    }

    /// Item `depth` slots below the top (0 is the top).
    #[inline]
    pub fn peek(&self, depth: usize) -> Option<&StackItem> {
        self.items.iter().rev().nth(depth)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total bytes reserved by all items.
    #[inline]
    pub fn height_bytes(&self) -> u32 {
        self.items.iter().map(|item| item.size).sum()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Items from bottom to top.
    #[inline]
    pub fn items(&self) -> &[StackItem] {
        &self.items
    }

    /// Two stacks merge when their slot sizes agree item by item.
    pub fn same_shape(&self, other: &OperandStack) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.size == b.size && a.is_float == b.is_float)
    }
}

impl fmt::Display for OperandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", item)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_tracks_pushes() {
        let mut stack = OperandStack::new();
        stack.push(StackItem::int32());
        stack.push(StackItem::int64());
        stack.push(StackItem::reference(4));
        assert_eq!(stack.height_bytes(), 16);
        assert_eq!(stack.pop(), Some(StackItem::reference(4)));
        assert_eq!(stack.height_bytes(), 12);
    }

    #[test]
    fn test_pop_n_is_top_first() {
        let mut stack = OperandStack::new();
        stack.push(StackItem::int32());
        stack.push(StackItem::int64());
        let popped = stack.pop_n(2, OpCode::Add, 0).unwrap();
        assert_eq!(popped[0].size, 8);
        assert_eq!(popped[1].size, 4);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_underflow_is_stack_shape_error() {
        let mut stack = OperandStack::new();
        let err = stack.pop_for(OpCode::Pop, 7).unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidStackShape { op: OpCode::Pop, position: 7, .. }
        ));
        assert!(stack.pop_n(1, OpCode::Add, 0).is_err());
    }

    #[test]
    fn test_same_shape_ignores_new_object_flag() {
        let mut a = OperandStack::new();
        let mut b = OperandStack::new();
        a.push(StackItem::new_object(4));
        b.push(StackItem::reference(4));
        assert!(a.same_shape(&b));
        b.push(StackItem::int32());
        assert!(!a.same_shape(&b));
    }

    #[test]
    fn test_peek_depth() {
        let mut stack = OperandStack::new();
        stack.push(StackItem::int64());
        stack.push(StackItem::int32());
        assert_eq!(stack.peek(0).map(|i| i.size), Some(4));
        assert_eq!(stack.peek(1).map(|i| i.size), Some(8));
        assert_eq!(stack.peek(2), None);
    }

    #[test]
    fn test_display() {
        let mut stack = OperandStack::new();
        stack.push(StackItem::int64());
        stack.push(StackItem::new_object(4));
        assert_eq!(stack.to_string(), "[value64, ref32+new]");
    }
}
