//! Unresolved reference reports.
//!
//! A reference that cannot be found in the target framework does not stop the rewrite. It is
//! recorded as a [`Diagnostic`] and the reference is left as it is; the produced module may
//! then fail to load, and the diagnostics tell the user why.
//!
//! # Example
//!
//! ```rust
//! use refrewrite::rewrite::{Diagnostic, Diagnostics, ReferenceKind};
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.push(Diagnostic {
//!     kind: ReferenceKind::Type,
//!     reference: "System.Collections.ArrayList".to_string(),
//!     module: "Game.dll".to_string(),
//!     entity: "Game.Inventory".to_string(),
//! });
//!
//! assert_eq!(
//!     diagnostics.iter().next().map(ToString::to_string).as_deref(),
//!     Some("Error: type `System.Collections.ArrayList` doesn't exist in target framework. \
//!           It is referenced from Game.dll at Game.Inventory.")
//! );
//! ```

use std::fmt;

/// Kind of the reference a diagnostic is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// A type reference
    Type,
    /// A field reference
    Field,
    /// A method reference
    Method,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::Type => write!(f, "type"),
            ReferenceKind::Field => write!(f, "field"),
            ReferenceKind::Method => write!(f, "method"),
        }
    }
}

/// A reference the rewriter could not resolve in the target framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What was referenced
    pub kind: ReferenceKind,
    /// Full name of the reference
    pub reference: String,
    /// Name of the module containing the reference
    pub module: String,
    /// Entity that holds the reference (type, member or method body)
    pub entity: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error: {} `{}` doesn't exist in target framework. It is referenced from {} at {}.",
            self.kind, self.reference, self.module, self.entity
        )
    }
}

/// Diagnostics collected during a rewrite, in the order they were reported
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Number of recorded diagnostics
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of diagnostics of `kind`
    #[must_use]
    pub fn count(&self, kind: ReferenceKind) -> usize {
        self.entries.iter().filter(|entry| entry.kind == kind).count()
    }

    /// Recorded diagnostics
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}
