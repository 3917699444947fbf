//! Branch labels.
//!
//! A label is named by the method it belongs to, the bytecode position it
//! marks and an optional extension for control flow inside one instruction's
//! template. Names depend on nothing but those three parts, so compiling the
//! same method twice yields the same label text.

use kiln_core::Symbol;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub scope: Symbol,
    pub position: u32,
    pub extension: Option<Arc<str>>,
}

impl Label {
    /// Label of the instruction at `position`.
    #[inline]
    pub fn at(scope: Symbol, position: u32) -> Self {
        Self {
            scope,
            position,
            extension: None,
        }
    }

    /// Synthetic label inside the template emitted for `position`.
    #[inline]
    pub fn synthetic(scope: Symbol, position: u32, extension: &str) -> Self {
        Self {
            scope,
            position,
            extension: Some(Arc::from(extension)),
        }
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.extension.is_some()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.IL_{:04X}", self.scope, self.position)?;
        if let Some(extension) = &self.extension {
            write!(f, "_{}", extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_rendering() {
        let scope = Symbol::new("Foo.Bar");
        assert_eq!(Label::at(scope.clone(), 0x1c).to_string(), "Foo.Bar.IL_001C");
        assert_eq!(
            Label::synthetic(scope, 0x1c, "True0").to_string(),
            "Foo.Bar.IL_001C_True0"
        );
    }

    #[test]
    fn test_labels_compare_by_parts() {
        let scope = Symbol::new("M");
        assert_eq!(Label::at(scope.clone(), 4), Label::at(scope.clone(), 4));
        assert_ne!(
            Label::at(scope.clone(), 4),
            Label::synthetic(scope.clone(), 4, "End0")
        );
        assert!(Label::synthetic(scope, 4, "End0").is_synthetic());
    }
}
