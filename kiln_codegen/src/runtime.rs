//! Runtime helper contract.
//!
//! Emitted code calls these helpers by symbol; the runtime links them. They
//! use the managed calling convention: arguments pushed first to last, then a
//! return slot, then the call. `GetEIP` is the one exception and returns the
//! call site's instruction pointer in the first return register without
//! touching the stack.

use kiln_core::Symbol;

/// Helper routines emitted code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuntimeHelper {
    GetEip,
    ThrowNullReferenceException,
    ThrowIndexOutOfRangeException,
    ThrowInvalidCastException,
    Throw,
    NewObj,
    NewArr,
    DecrementRefCount,
    Halt,
}

impl RuntimeHelper {
    pub const ALL: [RuntimeHelper; 9] = [
        RuntimeHelper::GetEip,
        RuntimeHelper::ThrowNullReferenceException,
        RuntimeHelper::ThrowIndexOutOfRangeException,
        RuntimeHelper::ThrowInvalidCastException,
        RuntimeHelper::Throw,
        RuntimeHelper::NewObj,
        RuntimeHelper::NewArr,
        RuntimeHelper::DecrementRefCount,
        RuntimeHelper::Halt,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            RuntimeHelper::GetEip => "GetEIP",
            RuntimeHelper::ThrowNullReferenceException => "ThrowNullReferenceException",
            RuntimeHelper::ThrowIndexOutOfRangeException => "ThrowIndexOutOfRangeException",
            RuntimeHelper::ThrowInvalidCastException => "ThrowInvalidCastException",
            RuntimeHelper::Throw => "Throw",
            RuntimeHelper::NewObj => "NewObj",
            RuntimeHelper::NewArr => "NewArr",
            RuntimeHelper::DecrementRefCount => "DecrementRefCount",
            RuntimeHelper::Halt => "Halt",
        }
    }

    #[inline]
    pub fn symbol(self) -> Symbol {
        Symbol::new(self.name())
    }

    pub fn from_symbol(symbol: &Symbol) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|helper| helper.name() == symbol.as_str())
    }

    /// Argument bytes the caller pushes before the return slot.
    pub const fn arg_bytes(self) -> u32 {
        match self {
            RuntimeHelper::GetEip => 0,
            RuntimeHelper::NewArr => 8,
            _ => 4,
        }
    }

    /// Size of the return slot the caller reserves.
    pub const fn return_bytes(self) -> u32 {
        match self {
            RuntimeHelper::NewObj | RuntimeHelper::NewArr => 4,
            _ => 0,
        }
    }

    /// Whether control never comes back from the helper.
    pub const fn never_returns(self) -> bool {
        matches!(
            self,
            RuntimeHelper::ThrowNullReferenceException
                | RuntimeHelper::ThrowIndexOutOfRangeException
                | RuntimeHelper::ThrowInvalidCastException
                | RuntimeHelper::Throw
                | RuntimeHelper::Halt
        )
    }
}

/// Reason code passed to [`RuntimeHelper::Halt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HaltReason {
    /// The allocator returned null; no exception object can be created.
    OutOfMemory = 1,
    /// Virtual dispatch exhausted the method-table chain.
    MissingVirtualMethod = 2,
}

impl HaltReason {
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(HaltReason::OutOfMemory),
            2 => Some(HaltReason::MissingVirtualMethod),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_round_trip() {
        for helper in RuntimeHelper::ALL {
            assert_eq!(RuntimeHelper::from_symbol(&helper.symbol()), Some(helper));
        }
        assert_eq!(RuntimeHelper::from_symbol(&Symbol::new("Main")), None);
    }

    #[test]
    fn test_helper_frames() {
        assert_eq!(RuntimeHelper::NewArr.arg_bytes(), 8);
        assert_eq!(RuntimeHelper::NewObj.return_bytes(), 4);
        assert_eq!(RuntimeHelper::GetEip.arg_bytes(), 0);
        assert!(RuntimeHelper::Halt.never_returns());
        assert!(!RuntimeHelper::DecrementRefCount.never_returns());
    }

    #[test]
    fn test_halt_codes() {
        assert_eq!(HaltReason::OutOfMemory.code(), 1);
        assert_eq!(HaltReason::from_code(2), Some(HaltReason::MissingVirtualMethod));
        assert_eq!(HaltReason::from_code(9), None);
    }
}
