//! Bytecode opcode catalogue.
//!
//! Opcodes carry their CIL encoding as the discriminant (two-byte forms are
//! `0xFE__`). Two pseudo-ops bracket every method body: `MethodStart` and
//! `MethodEnd`. Each opcode belongs to exactly one [`OpFamily`]; translation
//! is a lookup on (family, target architecture).

use std::fmt;

// =============================================================================
// Opcodes
// =============================================================================

/// A bytecode opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum OpCode {
    Nop = 0x00,
    Ldarg0 = 0x02,
    Ldarg1 = 0x03,
    Ldarg2 = 0x04,
    Ldarg3 = 0x05,
    Ldloc0 = 0x06,
    Ldloc1 = 0x07,
    Ldloc2 = 0x08,
    Ldloc3 = 0x09,
    Stloc0 = 0x0A,
    Stloc1 = 0x0B,
    Stloc2 = 0x0C,
    Stloc3 = 0x0D,
    LdargS = 0x0E,
    LdargaS = 0x0F,
    StargS = 0x10,
    LdlocS = 0x11,
    LdlocaS = 0x12,
    StlocS = 0x13,
    Ldnull = 0x14,
    LdcI4M1 = 0x15,
    LdcI40 = 0x16,
    LdcI41 = 0x17,
    LdcI42 = 0x18,
    LdcI43 = 0x19,
    LdcI44 = 0x1A,
    LdcI45 = 0x1B,
    LdcI46 = 0x1C,
    LdcI47 = 0x1D,
    LdcI48 = 0x1E,
    LdcI4S = 0x1F,
    LdcI4 = 0x20,
    LdcI8 = 0x21,
    LdcR4 = 0x22,
    LdcR8 = 0x23,
    Dup = 0x25,
    Pop = 0x26,
    Call = 0x28,
    Calli = 0x29,
    Ret = 0x2A,
    BrS = 0x2B,
    BrfalseS = 0x2C,
    BrtrueS = 0x2D,
    BeqS = 0x2E,
    BgeS = 0x2F,
    BgtS = 0x30,
    BleS = 0x31,
    BltS = 0x32,
    BneUnS = 0x33,
    BgeUnS = 0x34,
    BgtUnS = 0x35,
    BleUnS = 0x36,
    BltUnS = 0x37,
    Br = 0x38,
    Brfalse = 0x39,
    Brtrue = 0x3A,
    Beq = 0x3B,
    Bge = 0x3C,
    Bgt = 0x3D,
    Ble = 0x3E,
    Blt = 0x3F,
    BneUn = 0x40,
    BgeUn = 0x41,
    BgtUn = 0x42,
    BleUn = 0x43,
    BltUn = 0x44,
    Switch = 0x45,
    LdindI1 = 0x46,
    LdindU1 = 0x47,
    LdindI2 = 0x48,
    LdindU2 = 0x49,
    LdindI4 = 0x4A,
    LdindU4 = 0x4B,
    LdindI8 = 0x4C,
    LdindI = 0x4D,
    LdindR4 = 0x4E,
    LdindR8 = 0x4F,
    LdindRef = 0x50,
    StindRef = 0x51,
    StindI1 = 0x52,
    StindI2 = 0x53,
    StindI4 = 0x54,
    StindI8 = 0x55,
    StindR4 = 0x56,
    StindR8 = 0x57,
    Add = 0x58,
    Sub = 0x59,
    Mul = 0x5A,
    Div = 0x5B,
    DivUn = 0x5C,
    Rem = 0x5D,
    RemUn = 0x5E,
    And = 0x5F,
    Or = 0x60,
    Xor = 0x61,
    Shl = 0x62,
    Shr = 0x63,
    ShrUn = 0x64,
    Neg = 0x65,
    Not = 0x66,
    ConvI1 = 0x67,
    ConvI2 = 0x68,
    ConvI4 = 0x69,
    ConvI8 = 0x6A,
    ConvR4 = 0x6B,
    ConvR8 = 0x6C,
    ConvU4 = 0x6D,
    ConvU8 = 0x6E,
    Callvirt = 0x6F,
    Ldstr = 0x72,
    Newobj = 0x73,
    Castclass = 0x74,
    Isinst = 0x75,
    ConvRUn = 0x76,
    Throw = 0x7A,
    Ldfld = 0x7B,
    Ldflda = 0x7C,
    Stfld = 0x7D,
    Ldsfld = 0x7E,
    Ldsflda = 0x7F,
    Stsfld = 0x80,
    Newarr = 0x8D,
    Ldlen = 0x8E,
    Ldelema = 0x8F,
    LdelemI1 = 0x90,
    LdelemU1 = 0x91,
    LdelemI2 = 0x92,
    LdelemU2 = 0x93,
    LdelemI4 = 0x94,
    LdelemU4 = 0x95,
    LdelemI8 = 0x96,
    LdelemI = 0x97,
    LdelemR4 = 0x98,
    LdelemR8 = 0x99,
    LdelemRef = 0x9A,
    StelemI = 0x9B,
    StelemI1 = 0x9C,
    StelemI2 = 0x9D,
    StelemI4 = 0x9E,
    StelemI8 = 0x9F,
    StelemR4 = 0xA0,
    StelemR8 = 0xA1,
    StelemRef = 0xA2,
    Ldelem = 0xA3,
    Stelem = 0xA4,
    Ldtoken = 0xD0,
    ConvU2 = 0xD1,
    ConvU1 = 0xD2,
    ConvI = 0xD3,
    Leave = 0xDD,
    LeaveS = 0xDE,
    StindI = 0xDF,
    ConvU = 0xE0,
    Ceq = 0xFE01,
    Cgt = 0xFE02,
    CgtUn = 0xFE03,
    Clt = 0xFE04,
    CltUn = 0xFE05,
    Ldftn = 0xFE06,
    Ldarg = 0xFE09,
    Ldarga = 0xFE0A,
    Starg = 0xFE0B,
    Ldloc = 0xFE0C,
    Ldloca = 0xFE0D,
    Stloc = 0xFE0E,
    Initobj = 0xFE15,
    Sizeof = 0xFE1C,
    /// Pseudo-op: method prologue.
    MethodStart = 0xFF00,
    /// Pseudo-op: method epilogue, target of every `Ret`.
    MethodEnd = 0xFF01,
}

/// Encoded operand shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// Unsigned 8-bit argument/local index.
    ShortIndex,
    /// Unsigned 16-bit argument/local index.
    Index,
    Int8,
    Int32,
    Int64,
    Float32,
    Float64,
    ShortBranch,
    Branch,
    /// `u32` count followed by that many `i32` offsets.
    Switch,
    /// Metadata token resolved into a descriptor reference.
    Token,
}

impl OperandKind {
    /// Fixed operand width in bytes, `None` for `Switch`.
    pub const fn width(self) -> Option<u32> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::ShortIndex | OperandKind::Int8 | OperandKind::ShortBranch => Some(1),
            OperandKind::Index => Some(2),
            OperandKind::Int32
            | OperandKind::Float32
            | OperandKind::Branch
            | OperandKind::Token => Some(4),
            OperandKind::Int64 | OperandKind::Float64 => Some(8),
            OperandKind::Switch => None,
        }
    }
}

// =============================================================================
// Semantic Classification
// =============================================================================

/// Opcode family: the unit of translation shared by every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Nop,
    LoadArg,
    LoadArgAddress,
    StoreArg,
    LoadLocal,
    LoadLocalAddress,
    StoreLocal,
    LoadConst,
    LoadNull,
    LoadString,
    LoadToken,
    LoadFunction,
    SizeOf,
    Dup,
    Pop,
    Branch,
    Switch,
    Leave,
    Return,
    Binary,
    Unary,
    Shift,
    Compare,
    Convert,
    LoadIndirect,
    StoreIndirect,
    LoadField,
    LoadFieldAddress,
    StoreField,
    LoadStaticField,
    LoadStaticFieldAddress,
    StoreStaticField,
    NewArray,
    LoadLength,
    LoadElement,
    LoadElementAddress,
    StoreElement,
    Call,
    CallIndirect,
    CallVirtual,
    NewObject,
    IsInstance,
    CastClass,
    Throw,
    InitObject,
    MethodStart,
    MethodEnd,
}

/// Two-operand arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Division and remainder have no double-word template yet.
    #[inline]
    pub const fn is_division(self) -> bool {
        matches!(
            self,
            BinaryOp::Div | BinaryOp::DivUn | BinaryOp::Rem | BinaryOp::RemUn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Shl,
    /// Arithmetic shift right.
    Shr,
    /// Logical shift right.
    ShrUn,
}

/// Value-producing comparisons (`ceq` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Gt,
    GtUn,
    Lt,
    LtUn,
}

/// Condition under which a branch is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    Always,
    True,
    False,
    Eq,
    NeUn,
    Ge,
    Gt,
    Le,
    Lt,
    GeUn,
    GtUn,
    LeUn,
    LtUn,
}

impl BranchCondition {
    /// Number of operands consumed from the stack.
    #[inline]
    pub const fn operand_count(self) -> usize {
        match self {
            BranchCondition::Always => 0,
            BranchCondition::True | BranchCondition::False => 1,
            _ => 2,
        }
    }

    #[inline]
    pub const fn is_unsigned(self) -> bool {
        matches!(
            self,
            BranchCondition::NeUn
                | BranchCondition::GeUn
                | BranchCondition::GtUn
                | BranchCondition::LeUn
                | BranchCondition::LtUn
        )
    }
}

/// Integer conversion target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvTarget {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    I,
    U,
}

impl ConvTarget {
    /// Width of the converted value before re-extension to a stack slot.
    pub const fn value_size(self, pointer_size: u32) -> u32 {
        match self {
            ConvTarget::I1 | ConvTarget::U1 => 1,
            ConvTarget::I2 | ConvTarget::U2 => 2,
            ConvTarget::I4 | ConvTarget::U4 => 4,
            ConvTarget::I8 | ConvTarget::U8 => 8,
            ConvTarget::I | ConvTarget::U => pointer_size,
        }
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ConvTarget::I1 | ConvTarget::I2 | ConvTarget::I4 | ConvTarget::I8 | ConvTarget::I
        )
    }
}

/// Element/indirect value kind encoded in `ldind.*`, `ldelem.*` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    I,
    R4,
    R8,
    Ref,
    /// Shape given by the instruction's type reference (`ldelem`, `stelem`).
    Typed,
}

impl ValueKind {
    /// Bytes occupied in memory; `None` for [`ValueKind::Typed`].
    pub const fn storage_size(self, pointer_size: u32) -> Option<u32> {
        match self {
            ValueKind::I1 | ValueKind::U1 => Some(1),
            ValueKind::I2 | ValueKind::U2 => Some(2),
            ValueKind::I4 | ValueKind::U4 | ValueKind::R4 => Some(4),
            ValueKind::I8 | ValueKind::R8 => Some(8),
            ValueKind::I | ValueKind::Ref => Some(pointer_size),
            ValueKind::Typed => None,
        }
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            ValueKind::I1 | ValueKind::I2 | ValueKind::I4 | ValueKind::I8 | ValueKind::I
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ValueKind::R4 | ValueKind::R8)
    }
}

impl OpCode {
    /// Encoded opcode length in bytes.
    #[inline]
    pub const fn encoded_len(self) -> u32 {
        if (self as u16) > 0xFF { 2 } else { 1 }
    }

    /// Pseudo-ops are synthesized by the compiler and never decoded.
    #[inline]
    pub const fn is_pseudo(self) -> bool {
        matches!(self, OpCode::MethodStart | OpCode::MethodEnd)
    }

    /// Operand encoding of this opcode.
    pub const fn operand_kind(self) -> OperandKind {
        use OpCode::*;
        match self {
            LdargS | LdargaS | StargS | LdlocS | LdlocaS | StlocS => OperandKind::ShortIndex,
            Ldarg | Ldarga | Starg | Ldloc | Ldloca | Stloc => OperandKind::Index,
            LdcI4S => OperandKind::Int8,
            LdcI4 => OperandKind::Int32,
            LdcI8 => OperandKind::Int64,
            LdcR4 => OperandKind::Float32,
            LdcR8 => OperandKind::Float64,
            BrS | BrfalseS | BrtrueS | BeqS | BgeS | BgtS | BleS | BltS | BneUnS | BgeUnS
            | BgtUnS | BleUnS | BltUnS | LeaveS => OperandKind::ShortBranch,
            Br | Brfalse | Brtrue | Beq | Bge | Bgt | Ble | Blt | BneUn | BgeUn | BgtUn
            | BleUn | BltUn | Leave => OperandKind::Branch,
            Switch => OperandKind::Switch,
            Call | Calli | Callvirt | Ldstr | Newobj | Castclass | Isinst | Ldfld | Ldflda
            | Stfld | Ldsfld | Ldsflda | Stsfld | Newarr | Ldelema | Ldelem | Stelem
            | Ldtoken | Ldftn | Initobj | Sizeof => OperandKind::Token,
            _ => OperandKind::None,
        }
    }

    /// Family this opcode is translated by.
    pub const fn family(self) -> OpFamily {
        use OpCode::*;
        match self {
            Nop => OpFamily::Nop,
            Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS | Ldarg => OpFamily::LoadArg,
            LdargaS | Ldarga => OpFamily::LoadArgAddress,
            StargS | Starg => OpFamily::StoreArg,
            Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3 | LdlocS | Ldloc => OpFamily::LoadLocal,
            LdlocaS | Ldloca => OpFamily::LoadLocalAddress,
            Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS | Stloc => OpFamily::StoreLocal,
            LdcI4M1 | LdcI40 | LdcI41 | LdcI42 | LdcI43 | LdcI44 | LdcI45 | LdcI46 | LdcI47
            | LdcI48 | LdcI4S | LdcI4 | LdcI8 | LdcR4 | LdcR8 => OpFamily::LoadConst,
            Ldnull => OpFamily::LoadNull,
            Ldstr => OpFamily::LoadString,
            Ldtoken => OpFamily::LoadToken,
            Ldftn => OpFamily::LoadFunction,
            Sizeof => OpFamily::SizeOf,
            Dup => OpFamily::Dup,
            Pop => OpFamily::Pop,
            BrS | BrfalseS | BrtrueS | BeqS | BgeS | BgtS | BleS | BltS | BneUnS | BgeUnS
            | BgtUnS | BleUnS | BltUnS | Br | Brfalse | Brtrue | Beq | Bge | Bgt | Ble | Blt
            | BneUn | BgeUn | BgtUn | BleUn | BltUn => OpFamily::Branch,
            Switch => OpFamily::Switch,
            Leave | LeaveS => OpFamily::Leave,
            Ret => OpFamily::Return,
            Add | Sub | Mul | Div | DivUn | Rem | RemUn | And | Or | Xor => OpFamily::Binary,
            Neg | Not => OpFamily::Unary,
            Shl | Shr | ShrUn => OpFamily::Shift,
            Ceq | Cgt | CgtUn | Clt | CltUn => OpFamily::Compare,
            ConvI1 | ConvI2 | ConvI4 | ConvI8 | ConvR4 | ConvR8 | ConvU4 | ConvU8 | ConvRUn
            | ConvU2 | ConvU1 | ConvI | ConvU => OpFamily::Convert,
            LdindI1 | LdindU1 | LdindI2 | LdindU2 | LdindI4 | LdindU4 | LdindI8 | LdindI
            | LdindR4 | LdindR8 | LdindRef => OpFamily::LoadIndirect,
            StindRef | StindI1 | StindI2 | StindI4 | StindI8 | StindI | StindR4 | StindR8 => {
                OpFamily::StoreIndirect
            }
            Ldfld => OpFamily::LoadField,
            Ldflda => OpFamily::LoadFieldAddress,
            Stfld => OpFamily::StoreField,
            Ldsfld => OpFamily::LoadStaticField,
            Ldsflda => OpFamily::LoadStaticFieldAddress,
            Stsfld => OpFamily::StoreStaticField,
            Newarr => OpFamily::NewArray,
            Ldlen => OpFamily::LoadLength,
            LdelemI1 | LdelemU1 | LdelemI2 | LdelemU2 | LdelemI4 | LdelemU4 | LdelemI8
            | LdelemI | LdelemR4 | LdelemR8 | LdelemRef | Ldelem => OpFamily::LoadElement,
            Ldelema => OpFamily::LoadElementAddress,
            StelemI | StelemI1 | StelemI2 | StelemI4 | StelemI8 | StelemR4 | StelemR8
            | StelemRef | Stelem => OpFamily::StoreElement,
            Call => OpFamily::Call,
            Calli => OpFamily::CallIndirect,
            Callvirt => OpFamily::CallVirtual,
            Newobj => OpFamily::NewObject,
            Isinst => OpFamily::IsInstance,
            Castclass => OpFamily::CastClass,
            Throw => OpFamily::Throw,
            Initobj => OpFamily::InitObject,
            MethodStart => OpFamily::MethodStart,
            MethodEnd => OpFamily::MethodEnd,
        }
    }

    /// Opcodes whose operands are floating-point by construction.
    pub const fn is_float_op(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            LdcR4
                | LdcR8
                | ConvR4
                | ConvR8
                | ConvRUn
                | LdindR4
                | LdindR8
                | StindR4
                | StindR8
                | LdelemR4
                | LdelemR8
                | StelemR4
                | StelemR8
        )
    }

    /// Control never falls through to the next instruction.
    pub const fn ends_flow(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Br | BrS | Leave | LeaveS | Ret | Throw | MethodEnd
        )
    }

    pub const fn binary_op(self) -> Option<BinaryOp> {
        use OpCode::*;
        Some(match self {
            Add => BinaryOp::Add,
            Sub => BinaryOp::Sub,
            Mul => BinaryOp::Mul,
            Div => BinaryOp::Div,
            DivUn => BinaryOp::DivUn,
            Rem => BinaryOp::Rem,
            RemUn => BinaryOp::RemUn,
            And => BinaryOp::And,
            Or => BinaryOp::Or,
            Xor => BinaryOp::Xor,
            _ => return None,
        })
    }

    pub const fn unary_op(self) -> Option<UnaryOp> {
        match self {
            OpCode::Neg => Some(UnaryOp::Neg),
            OpCode::Not => Some(UnaryOp::Not),
            _ => None,
        }
    }

    pub const fn shift_op(self) -> Option<ShiftOp> {
        match self {
            OpCode::Shl => Some(ShiftOp::Shl),
            OpCode::Shr => Some(ShiftOp::Shr),
            OpCode::ShrUn => Some(ShiftOp::ShrUn),
            _ => None,
        }
    }

    pub const fn compare_op(self) -> Option<CompareOp> {
        match self {
            OpCode::Ceq => Some(CompareOp::Eq),
            OpCode::Cgt => Some(CompareOp::Gt),
            OpCode::CgtUn => Some(CompareOp::GtUn),
            OpCode::Clt => Some(CompareOp::Lt),
            OpCode::CltUn => Some(CompareOp::LtUn),
            _ => None,
        }
    }

    pub const fn branch_condition(self) -> Option<BranchCondition> {
        use OpCode::*;
        Some(match self {
            Br | BrS => BranchCondition::Always,
            Brtrue | BrtrueS => BranchCondition::True,
            Brfalse | BrfalseS => BranchCondition::False,
            Beq | BeqS => BranchCondition::Eq,
            BneUn | BneUnS => BranchCondition::NeUn,
            Bge | BgeS => BranchCondition::Ge,
            Bgt | BgtS => BranchCondition::Gt,
            Ble | BleS => BranchCondition::Le,
            Blt | BltS => BranchCondition::Lt,
            BgeUn | BgeUnS => BranchCondition::GeUn,
            BgtUn | BgtUnS => BranchCondition::GtUn,
            BleUn | BleUnS => BranchCondition::LeUn,
            BltUn | BltUnS => BranchCondition::LtUn,
            _ => return None,
        })
    }

    /// Integer conversion target; `None` for float conversions.
    pub const fn conv_target(self) -> Option<ConvTarget> {
        use OpCode::*;
        Some(match self {
            ConvI1 => ConvTarget::I1,
            ConvI2 => ConvTarget::I2,
            ConvI4 => ConvTarget::I4,
            ConvI8 => ConvTarget::I8,
            ConvU1 => ConvTarget::U1,
            ConvU2 => ConvTarget::U2,
            ConvU4 => ConvTarget::U4,
            ConvU8 => ConvTarget::U8,
            ConvI => ConvTarget::I,
            ConvU => ConvTarget::U,
            _ => return None,
        })
    }

    /// Value kind of indirect and element accesses.
    pub const fn value_kind(self) -> Option<ValueKind> {
        use OpCode::*;
        Some(match self {
            LdindI1 | LdelemI1 | StindI1 | StelemI1 => ValueKind::I1,
            LdindU1 | LdelemU1 => ValueKind::U1,
            LdindI2 | LdelemI2 | StindI2 | StelemI2 => ValueKind::I2,
            LdindU2 | LdelemU2 => ValueKind::U2,
            LdindI4 | LdelemI4 | StindI4 | StelemI4 => ValueKind::I4,
            LdindU4 | LdelemU4 => ValueKind::U4,
            LdindI8 | LdelemI8 | StindI8 | StelemI8 => ValueKind::I8,
            LdindI | LdelemI | StindI | StelemI => ValueKind::I,
            LdindR4 | LdelemR4 | StindR4 | StelemR4 => ValueKind::R4,
            LdindR8 | LdelemR8 | StindR8 | StelemR8 => ValueKind::R8,
            LdindRef | LdelemRef | StindRef | StelemRef => ValueKind::Ref,
            Ldelem | Stelem => ValueKind::Typed,
            _ => return None,
        })
    }

    /// Argument or local index implied by the opcode itself.
    pub const fn implicit_index(self) -> Option<u16> {
        use OpCode::*;
        match self {
            Ldarg0 | Ldloc0 | Stloc0 => Some(0),
            Ldarg1 | Ldloc1 | Stloc1 => Some(1),
            Ldarg2 | Ldloc2 | Stloc2 => Some(2),
            Ldarg3 | Ldloc3 | Stloc3 => Some(3),
            _ => None,
        }
    }

    /// Constant implied by the short `ldc.i4.*` forms.
    pub const fn implicit_i32(self) -> Option<i32> {
        use OpCode::*;
        match self {
            LdcI4M1 => Some(-1),
            LdcI40 => Some(0),
            LdcI41 => Some(1),
            LdcI42 => Some(2),
            LdcI43 => Some(3),
            LdcI44 => Some(4),
            LdcI45 => Some(5),
            LdcI46 => Some(6),
            LdcI47 => Some(7),
            LdcI48 => Some(8),
            _ => None,
        }
    }

    /// Assembly-style mnemonic, e.g. `ldarg.s`.
    pub fn mnemonic(self) -> String {
        if self.is_pseudo() {
            return format!("{:?}", self);
        }
        if let Some(value) = self.implicit_i32().filter(|v| *v >= 0) {
            return format!("ldc.i4.{value}");
        }
        let indexed = self.implicit_index().is_some();
        let name = format!("{:?}", self);
        let mut out = String::with_capacity(name.len() + 4);
        for (i, c) in name.char_indices() {
            if i > 0 && (c.is_ascii_uppercase() || (indexed && c.is_ascii_digit())) {
                out.push('.');
            }
            out.push(c.to_ascii_lowercase());
        }
        out
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mnemonic())
    }
}
