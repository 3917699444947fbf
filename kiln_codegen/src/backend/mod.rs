//! Target backends.
//!
//! Translation is a two-axis lookup: the opcode's [`OpFamily`] picks a
//! template module, the [`TargetBackend`] picks the architecture. Stack shapes
//! come from the shared simulator; a backend only decides which instructions
//! realize them.
//!
//! - `x86`: flag-based CISC target (condition codes, variable shifts)
//! - `mips32`: register-compare RISC target (slt/beq, delay slots)
//!
//! [`OpFamily`]: kiln_core::OpFamily

pub mod mips32;
pub mod x86;

use crate::context::EmitContext;
use crate::label::Label;
use crate::options::TargetPolicy;
use crate::simulate::StackEffect;
use kiln_core::{
    BranchCondition, CompareOp, CompileResult, DescriptorTable, IlInstruction, Symbol,
    TypeDescriptor, ValueKind,
};
use smallvec::SmallVec;
use std::fmt;

pub use mips32::Mips32;
pub use x86::X86;

// =============================================================================
// Instruction Vocabulary
// =============================================================================

/// One emitted target instruction.
pub trait TargetInst: Clone + fmt::Debug + fmt::Display + PartialEq + Eq {
    /// Label definition pseudo-instruction.
    fn label(label: Label) -> Self;

    /// The label this instruction defines, if it is one.
    fn as_label(&self) -> Option<&Label>;

    /// External symbols referenced by this instruction.
    fn symbols(&self) -> SmallVec<[&Symbol; 2]>;
}

/// Target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    Mips32,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86 => f.write_str("x86"),
            Arch::Mips32 => f.write_str("mips32"),
        }
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Instruction emission for one architecture.
pub trait TargetBackend {
    type Inst: TargetInst;

    const ARCH: Arch;

    /// Policy used when the options record does not override it.
    fn default_policy() -> TargetPolicy;

    /// Emit the template for `instr`, whose stack effect has already been
    /// simulated.
    fn emit(
        ctx: &mut EmitContext<'_, Self::Inst>,
        instr: &IlInstruction,
        effect: &StackEffect,
    ) -> CompileResult<()>;
}

// =============================================================================
// Memory Access
// =============================================================================

/// Footprint of a value moving between memory and the operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// Bytes in memory.
    pub storage: u32,
    /// Sign-extend when narrower than a word.
    pub signed: bool,
}

impl Access {
    pub fn of_type(ty: &TypeDescriptor, pointer_size: u32) -> Self {
        Self {
            storage: DescriptorTable::storage_size(ty, pointer_size),
            signed: ty.is_signed,
        }
    }

    /// Access implied by an opcode's value kind; typed forms read the
    /// instruction's type operand.
    pub fn of_kind(
        kind: ValueKind,
        instr: &IlInstruction,
        tables: &DescriptorTable,
        pointer_size: u32,
    ) -> CompileResult<Self> {
        match kind.storage_size(pointer_size) {
            Some(storage) => Ok(Self {
                storage,
                signed: kind.is_signed(),
            }),
            None => Ok(Self::of_type(tables.resolve_type(instr)?, pointer_size)),
        }
    }

    /// Natural alignment, capped at a word.
    #[inline]
    pub fn natural_alignment(self) -> u32 {
        match self.storage {
            1 => 1,
            2 | 3 => 2,
            _ => 4,
        }
    }
}

// =============================================================================
// Comparisons
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A relation between operand A and operand B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Comparison {
    pub relation: Relation,
    pub unsigned: bool,
}

impl Comparison {
    #[inline]
    pub const fn new(relation: Relation, unsigned: bool) -> Self {
        Self { relation, unsigned }
    }

    /// Two-operand branch conditions; `None` for the zero-test forms.
    pub const fn from_branch(condition: BranchCondition) -> Option<Self> {
        let relation = match condition {
            BranchCondition::Eq => Relation::Eq,
            BranchCondition::NeUn => Relation::Ne,
            BranchCondition::Ge | BranchCondition::GeUn => Relation::Ge,
            BranchCondition::Gt | BranchCondition::GtUn => Relation::Gt,
            BranchCondition::Le | BranchCondition::LeUn => Relation::Le,
            BranchCondition::Lt | BranchCondition::LtUn => Relation::Lt,
            BranchCondition::Always | BranchCondition::True | BranchCondition::False => {
                return None;
            }
        };
        Some(Self::new(relation, condition.is_unsigned()))
    }

    pub const fn from_compare(op: CompareOp) -> Self {
        match op {
            CompareOp::Eq => Self::new(Relation::Eq, false),
            CompareOp::Gt => Self::new(Relation::Gt, false),
            CompareOp::GtUn => Self::new(Relation::Gt, true),
            CompareOp::Lt => Self::new(Relation::Lt, false),
            CompareOp::LtUn => Self::new(Relation::Lt, true),
        }
    }

    /// Relation on the high words that decides the result outright.
    ///
    /// `None` for equality, which needs both words.
    pub const fn high_word(self) -> Option<Self> {
        match self.relation {
            Relation::Eq => None,
            Relation::Ne => Some(Self::new(Relation::Ne, true)),
            Relation::Gt | Relation::Ge => Some(Self::new(Relation::Gt, self.unsigned)),
            Relation::Lt | Relation::Le => Some(Self::new(Relation::Lt, self.unsigned)),
        }
    }

    /// Relation on the low words once the high words are equal.
    #[inline]
    pub const fn low_word(self) -> Self {
        Self::new(self.relation, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_conditions_map() {
        assert_eq!(
            Comparison::from_branch(BranchCondition::LtUn),
            Some(Comparison::new(Relation::Lt, true))
        );
        assert_eq!(Comparison::from_branch(BranchCondition::True), None);
        assert_eq!(
            Comparison::from_branch(BranchCondition::Ge),
            Some(Comparison::new(Relation::Ge, false))
        );
    }

    #[test]
    fn test_access_of_kind() {
        let tables = DescriptorTable::new();
        let instr = IlInstruction::new(kiln_core::OpCode::LdindU2, 0);
        let access = Access::of_kind(ValueKind::U2, &instr, &tables, 4).unwrap();
        assert_eq!(access, Access { storage: 2, signed: false });
        assert_eq!(access.natural_alignment(), 2);

        let typed = IlInstruction::new(kiln_core::OpCode::Ldelem, 0);
        assert!(Access::of_kind(ValueKind::Typed, &typed, &tables, 4).is_err());
    }

    #[test]
    fn test_double_word_split() {
        let ge = Comparison::new(Relation::Ge, false);
        assert_eq!(ge.high_word(), Some(Comparison::new(Relation::Gt, false)));
        assert_eq!(ge.low_word(), Comparison::new(Relation::Ge, true));
        assert_eq!(Comparison::new(Relation::Eq, false).high_word(), None);
    }
}
