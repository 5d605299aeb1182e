//! Store Error Types
//!
//! This module defines the errors a page store reports. The duplicate-key
//! case is its own variant so callers can downgrade uniqueness conflicts into
//! narrower retries instead of failing the whole operation.

use thiserror::Error;

/// Page store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// A compound unique index rejected the write
    #[error("Duplicate key on '{field}': {value}")]
    DuplicateKey { field: String, value: String },

    /// The document addressed by an update or delete does not exist
    #[error("Document not found: {id}")]
    NotFound { id: String },

    /// Backend failure (connection, serialization, ...)
    #[error("Store backend failed: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a duplicate key error
    pub fn duplicate_key(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::DuplicateKey {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a backend error from a message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(anyhow::anyhow!(msg.into()))
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// True when the duplicate key is on the given field
    pub fn is_duplicate_on(&self, field: &str) -> bool {
        matches!(self, Self::DuplicateKey { field: f, .. } if f == field)
    }
}
