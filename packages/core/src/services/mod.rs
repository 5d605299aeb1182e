//! Business Services
//!
//! This module contains the page tree services:
//!
//! - `PageTree` - structural operations (insert, move, archive, restore,
//!   publish, localize) under the tree lock
//! - `ParkedPages` - reconciliation of configuration-defined parked pages
//! - `ImportResolver` - duplicate/conflict resolution for bulk imports
//! - `TreeLock` / `LockService` - named, reentrant distributed lock
//! - `PageTypeRegistry` - page type managers, id generation and permissions
//!
//! Services coordinate between the store layer and the pure planning
//! functions in [`crate::operations`], which never perform I/O.

pub mod batch_ops;
pub mod context;
pub mod error;
pub mod import_resolver;
pub mod page_tree;
pub mod parked_pages;
pub mod tree_lock;
pub mod type_registry;

pub use batch_ops::{BatchFailure, BatchReport};
pub use context::RequestContext;
pub use error::{ErrorKind, PageTreeError};
pub use import_resolver::{
    DedupeReport, DuplicateReport, ImportConflict, ImportRecord, ImportReport, ImportResolver,
    Replacement,
};
pub use page_tree::{ArchiveOutcome, NewPage, PageTree};
pub use parked_pages::{ParkedPages, ReconcileReport};
pub use tree_lock::{LocalLockService, LockError, LockService, TreeLock};
pub use type_registry::{
    AllowAll, BasicPageType, IdGenerator, PageTypeManager, PageTypeRegistry, TreePermissions,
    UuidIdGenerator,
};
