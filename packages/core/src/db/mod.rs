//! Database Layer
//!
//! This module defines the persistence contract of the page tree:
//!
//! - `PageStore` - async document store trait (find, insert, update, delete,
//!   update_many, distinct, bulk id remapping)
//! - `PageQuery` / `PageMutation` - backend-neutral criteria and mutations
//! - `StoreError` - store errors with a distinguishable duplicate-key case
//! - `MemoryPageStore` - reference implementation with unique indexes
//! - `TreeEvent` - domain events emitted by structural operations
//!
//! # Architecture
//!
//! The tree engine never assumes transactions. Every write it issues is
//! individually durable, and the store's unique indexes on
//! `(path, locale, mode)` and `(slug, locale, mode)` are the last line of
//! defense against out-of-band writers.

mod error;
pub mod events;
mod memory_store;
mod page_store;
mod query;

pub use error::StoreError;
pub use events::TreeEvent;
pub use memory_store::MemoryPageStore;
pub use page_store::PageStore;
pub use query::{PageField, PageMutation, PagePatch, PageQuery, SortOrder};
