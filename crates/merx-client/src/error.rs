//! Reconciliation error types
//!
//! Error definitions with transient/permanent classification. Only
//! [`ReconcileError::Transient`] failures — network-level errors before a
//! state-changing call was confirmed sent — are ever retried; everything else
//! propagates to the caller unmodified.

use thiserror::Error;

use crate::coordinator::Phase;
use merx_core::KeyError;
use merx_tree::TreeError;

/// Error that can occur during a reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Malformed desired configuration. Fatal, never retried; the inner
    /// error carries the offending dotted path.
    #[error(transparent)]
    SchemaMismatch(#[from] TreeError),

    /// Bad credentials or a definitive token-endpoint rejection. Fatal,
    /// surfaced immediately to every waiter of the single-flight group.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    /// Version mismatch or concurrent-mutation rejection. Never silently
    /// retried: a blind retry could overwrite concurrent external changes.
    #[error("conflict updating {resource}: remote state no longer matches version {sent_version:?}; re-read the resource before retrying")]
    Conflict {
        resource: String,
        sent_version: Option<i64>,
    },

    /// The remote resource does not exist. The caller decides whether to
    /// treat this as already-deleted.
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// The caller's deadline elapsed. No partial state was mutated.
    #[error("cancelled while in phase {phase}")]
    Cancelled { phase: Phase },

    /// Network-level failure before any state-changing call was confirmed
    /// sent. Safe to retry with backoff.
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The remote rejected the request for a reason outside the taxonomy
    /// above (e.g. a validation error).
    #[error("gateway rejected request ({status}): {message}")]
    Gateway { status: u16, message: String },

    /// Malformed composite import identifier or path template.
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    /// Invalid client configuration (e.g. the HTTP client cannot be built).
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
}

impl ReconcileError {
    /// Whether the operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Transient { .. })
    }

    /// Whether retrying cannot help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable code for classification and logging.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            ReconcileError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ReconcileError::Conflict { .. } => "CONFLICT",
            ReconcileError::NotFound { .. } => "NOT_FOUND",
            ReconcileError::Cancelled { .. } => "CANCELLED",
            ReconcileError::Transient { .. } => "TRANSIENT",
            ReconcileError::Gateway { .. } => "GATEWAY_REJECTED",
            ReconcileError::InvalidKey(_) => "INVALID_KEY",
            ReconcileError::Configuration { .. } => "INVALID_CONFIG",
        }
    }

    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        ReconcileError::Transient {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transient error with a source.
    pub fn transient_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ReconcileError::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication failure.
    pub fn auth(reason: impl Into<String>) -> Self {
        ReconcileError::AuthenticationFailed {
            reason: reason.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
