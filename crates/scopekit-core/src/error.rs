use std::fmt;

use crate::diagnostics::Diagnostic;
use crate::ScopeHandleId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The handle is still under construction; its controller does not exist yet.
    UnresolvedHandle { handle: ScopeHandleId },
    /// State can only be replaced while the component is being constructed.
    AlreadyResolved { handle: ScopeHandleId },
    /// The root family was created without a state listener.
    NoListener { handle: ScopeHandleId },
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::UnresolvedHandle { handle } => {
                write!(f, "scope handle {handle:?} accessed before it was resolved")
            }
            ScopeError::AlreadyResolved { handle } => {
                write!(f, "scope handle {handle:?} is resolved; state can no longer be replaced")
            }
            ScopeError::NoListener { handle } => {
                write!(f, "scope handle {handle:?} has no state listener")
            }
        }
    }
}

impl std::error::Error for ScopeError {}

#[derive(Debug)]
pub enum BuildError {
    /// Diagnostics were found and [`DiagnosticsPolicy::Fail`](crate::DiagnosticsPolicy::Fail)
    /// was requested.
    Diagnostics(Vec<Diagnostic>),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Diagnostics(diagnostics) => {
                write!(f, "build produced {} diagnostic(s)", diagnostics.len())?;
                for diagnostic in diagnostics {
                    write!(f, "\n  {diagnostic}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for BuildError {}
