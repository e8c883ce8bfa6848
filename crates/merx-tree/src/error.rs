//! Attribute-tree error types.

use thiserror::Error;

/// Error produced while decoding or diffing an attribute tree.
///
/// All variants carry the dotted path of the offending node, rooted at `$`
/// (e.g. `$.location.lat`). These errors are fatal for the reconciliation:
/// malformed desired configuration is never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The value at a path does not match the declared schema type.
    #[error("schema mismatch at '{path}': expected {expected}, found {found}")]
    SchemaMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// The desired configuration carries a field the schema does not declare.
    #[error("unknown field '{path}' not declared in the resource schema")]
    UnknownField { path: String },

    /// An enum-typed field holds a token outside the allowed set.
    #[error("invalid enum token '{token}' at '{path}', expected one of: {allowed}")]
    InvalidEnumToken {
        path: String,
        token: String,
        allowed: String,
    },

    /// A decimal field holds a non-finite number.
    #[error("non-finite number at '{path}'")]
    NonFiniteNumber { path: String },
}

impl TreeError {
    /// The dotted path of the offending node.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            TreeError::SchemaMismatch { path, .. }
            | TreeError::UnknownField { path }
            | TreeError::InvalidEnumToken { path, .. }
            | TreeError::NonFiniteNumber { path } => path,
        }
    }
}

/// Result type for attribute-tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
