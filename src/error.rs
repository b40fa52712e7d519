//! Compiler error types shared across every pipeline stage.

use std::io;
use thiserror::Error;

/// Errors produced anywhere in the RHIR/STIR/CFIR/codegen pipeline.
#[derive(Error, Debug)]
pub enum CompileError {
    /// A reference does not belong to the context it was dereferenced against.
    #[error("reference {0} does not belong to this context")]
    Reference(u32),

    /// A coercion to a specific entity/operation/predicate variant failed.
    #[error("entity kind mismatch: expected {expected}, found {found}")]
    EntityKindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// An internal graph-encoding invariant was violated.
    #[error("structural error: {0}")]
    Structural(String),

    /// A name could not be resolved in scope.
    #[error("unresolved name: {0}")]
    Resolution(String),

    /// An external subprocess failed or was not found.
    #[error("subprocess error: {0}")]
    Subprocess(String),

    /// I/O failure reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The declarative JSON model file was malformed.
    #[error("model file error: {0}")]
    Json(#[from] serde_json::Error),

    /// The external model checker exited non-zero.
    #[error("model check failed (exit {0:?}): {1}")]
    ModelCheck(Option<i32>, String),
}

/// Result type used throughout the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_error_displays_offending_id() {
        let err = CompileError::Reference(42);
        assert_eq!(err.to_string(), "reference 42 does not belong to this context");
    }

    #[test]
    fn entity_kind_mismatch_names_both_sides() {
        let err = CompileError::EntityKindMismatch {
            expected: "EffectBlock",
            found: "Protocol",
        };
        assert!(err.to_string().contains("EffectBlock"));
        assert!(err.to_string().contains("Protocol"));
    }
}
