//! PageTree Core Business Logic Layer
//!
//! This crate maintains a hierarchical, versioned page tree on top of a
//! document store. Every page carries a materialized `path`, a `level` and
//! a sibling `rank`; the tree engine keeps those consistent across inserts,
//! moves, archiving and restores while holding a single named lock.
//!
//! # Architecture
//!
//! - **Materialized paths**: `path` is the `/`-joined chain of `aposDocId`s
//!   from the root, so subtree queries are prefix scans
//! - **Document variants**: one logical page exists once per locale and mode
//!   (`draft`, `published`, `previous`), keyed `aposDocId:locale:mode`
//! - **Parked pages**: configuration pins a set of pages (home, archive,
//!   and any configured extras) and their fields
//! - **No transactions**: every write is individually durable, ranks may
//!   carry gaps and `repair_ranks` closes them
//!
//! # Modules
//!
//! - [`models`] - Data structures (Page, Position, ChangeSet)
//! - [`operations`] - Pure placement, cascade and batch planning
//! - [`services`] - PageTree, ParkedPages, ImportResolver, TreeLock
//! - [`db`] - PageStore trait and in-memory implementation
//! - [`config`] - Parked page and locale configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::{ParkedPageSpec, TreeConfig};
pub use db::{MemoryPageStore, PageStore, StoreError, TreeEvent};
pub use models::*;
pub use services::*;
