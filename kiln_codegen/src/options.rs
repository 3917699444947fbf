//! Compiler options supplied by the driver.

use kiln_core::{CompileError, CompileResult};

/// Byte offsets of the runtime object and type-descriptor formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLayout {
    /// Offset of the type-descriptor pointer inside every object.
    pub type_pointer_offset: u32,
    /// Offset of the element count inside an array.
    pub array_length_offset: u32,
    /// Offset of the element type-descriptor pointer inside an array.
    pub array_element_type_offset: u32,
    /// Offset of element 0 inside an array.
    pub array_header_size: u32,
    /// Offset of the instance size inside a type descriptor.
    pub type_size_offset: u32,
    /// Offset of the type id inside a type descriptor.
    pub type_id_offset: u32,
    /// Offset of the method-table pointer inside a type descriptor.
    pub type_method_table_offset: u32,
    /// Offset of the base-type pointer inside a type descriptor.
    pub type_base_type_offset: u32,
}

impl Default for ObjectLayout {
    fn default() -> Self {
        Self {
            type_pointer_offset: 0,
            array_length_offset: 4,
            array_element_type_offset: 8,
            array_header_size: 12,
            type_size_offset: 0,
            type_id_offset: 4,
            type_method_table_offset: 8,
            type_base_type_offset: 12,
        }
    }
}

/// Per-target code generation policy.
///
/// The two backends differ on purpose here; the driver may override either
/// knob through [`CompilerOptions::policy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPolicy {
    /// Null-check the address operand of `ldind`, `stind` and `initobj`.
    pub guard_indirect_access: bool,
    /// Treat indirect addresses as naturally aligned.
    pub assume_aligned_indirect: bool,
}

/// Options record for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    pub pointer_size: u32,
    pub layout: ObjectLayout,
    /// Overrides the backend's default policy when set.
    pub policy: Option<TargetPolicy>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self {
            pointer_size: 4,
            layout: ObjectLayout::default(),
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: TargetPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Both targets are 32-bit; every layout offset must be word aligned.
    pub fn validate(&self) -> CompileResult<()> {
        if self.pointer_size != 4 {
            return Err(CompileError::InvalidOptions(format!(
                "pointer size {} is not supported, targets are 32-bit",
                self.pointer_size
            )));
        }
        let layout = &self.layout;
        let offsets = [
            ("type_pointer_offset", layout.type_pointer_offset),
            ("array_length_offset", layout.array_length_offset),
            ("array_element_type_offset", layout.array_element_type_offset),
            ("array_header_size", layout.array_header_size),
            ("type_size_offset", layout.type_size_offset),
            ("type_id_offset", layout.type_id_offset),
            ("type_method_table_offset", layout.type_method_table_offset),
            ("type_base_type_offset", layout.type_base_type_offset),
        ];
        for (name, offset) in offsets {
            if offset % 4 != 0 {
                return Err(CompileError::InvalidOptions(format!(
                    "{name} = {offset} is not word aligned"
                )));
            }
        }
        Ok(())
    }
}
