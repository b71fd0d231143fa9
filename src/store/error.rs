//! Error types for artifact storage operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during artifact storage operations.
///
/// Absence is not an error: `get` reports it as `Ok(None)` and `delete`
/// treats it as success.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid store specification (URL parsing or unsupported scheme).
    #[error("invalid store spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Access denied by the storage backend.
    #[error("access denied during {operation}: {message}")]
    AccessDenied {
        operation: &'static str,
        message: String,
    },

    /// Network, I/O or any other backend failure.
    #[error("storage backend failed during {operation}: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: object_store::Error,
    },

    /// The caller's deadline passed or the caller cancelled mid-operation.
    #[error("{operation} cancelled: {reason}")]
    Cancelled {
        operation: &'static str,
        reason: CancelReason,
    },
}

/// Why a store operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    DeadlineExceeded,
    Requested,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
            Self::Requested => f.write_str("cancelled by caller"),
        }
    }
}

impl StoreError {
    pub fn invalid_spec(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Classify a backend error. Callers handle `NotFound` before getting here.
    pub fn from_object_store(operation: &'static str, err: object_store::Error) -> Self {
        match err {
            object_store::Error::PermissionDenied { source, .. }
            | object_store::Error::Unauthenticated { source, .. } => Self::AccessDenied {
                operation,
                message: source.to_string(),
            },
            source => Self::Backend { operation, source },
        }
    }

    /// Returns true if the operation was cut short by a deadline or cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true if this is an access/permission error.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
