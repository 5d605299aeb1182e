//! Service Layer Error Types
//!
//! This module defines the error taxonomy of the page tree services.
//!
//! - **Invalid**: malformed input (unknown type, bad position, missing ids)
//! - **Forbidden**: structurally disallowed operation (self-parenting, moving
//!   the root/archive/a parked page, publishing under an unpublished parent)
//! - **NotFound**: a referenced page or target does not resolve
//! - **Conflict**: a unique index rejected a write that could not be narrowed
//!
//! None of these are retried. Store and lock failures propagate as-is.

use crate::db::StoreError;
use crate::operations::PlacementError;
use crate::services::tree_lock::LockError;
use thiserror::Error;

/// Coarse classification used by callers that map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    Forbidden,
    NotFound,
    Conflict,
    Unavailable,
}

/// Page tree operation errors
#[derive(Error, Debug)]
pub enum PageTreeError {
    /// Malformed input
    #[error("Invalid: {reason}")]
    Invalid { reason: String },

    /// Structurally disallowed operation
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Referenced page does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Unique constraint violation surfaced to the caller
    #[error("Conflict on '{field}': {value}")]
    Conflict { field: String, value: String },

    /// Store operation failed
    #[error("Store operation failed: {0}")]
    Store(StoreError),

    /// Tree lock could not be acquired or released
    #[error("Tree lock failed: {0}")]
    Lock(#[from] LockError),
}

impl From<StoreError> for PageTreeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { field, value } => Self::Conflict { field, value },
            StoreError::NotFound { id } => Self::NotFound { what: id },
            other => Self::Store(other),
        }
    }
}

impl From<PlacementError> for PageTreeError {
    fn from(err: PlacementError) -> Self {
        if err.is_forbidden() {
            Self::forbidden(err.to_string())
        } else {
            Self::invalid(err.to_string())
        }
    }
}

impl PageTreeError {
    /// Create an invalid input error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Create a forbidden operation error
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a conflict error
    pub fn conflict(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Store(_) | Self::Lock(_) => ErrorKind::Unavailable,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    pub fn is_invalid(&self) -> bool {
        self.kind() == ErrorKind::Invalid
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
