//! PageStore Trait - Document Store Abstraction
//!
//! This module defines the `PageStore` trait the tree engine persists through.
//! The engine owns `path`, `level`, `rank`, `slug` and `archived`; the store
//! only has to keep documents, evaluate `PageQuery` criteria and enforce its
//! unique indexes.
//!
//! # Contract
//!
//! - **Unique indexes**: `(path, locale, mode)` and `(slug, locale, mode)`.
//!   Violations are reported as [`StoreError::DuplicateKey`] naming the field.
//! - **Ordered sibling scans**: `SortOrder::Rank` / `SortOrder::LevelRank`
//!   should be served from a `(level, rank)` index.
//! - **Descendant scans**: `PageQuery::path_prefix` should be served by a
//!   prefix/range query on the indexed `path` field.
//! - **No transactions**: each write is individually durable. The tree engine
//!   tolerates partially applied sequences (ranks need not be dense).
//!
//! # Examples
//!
//! ```rust,no_run
//! use pagetree_core::db::{MemoryPageStore, PageQuery, PageStore, SortOrder};
//! use pagetree_core::models::Mode;
//!
//! # async fn example() -> Result<(), pagetree_core::db::StoreError> {
//! let store = MemoryPageStore::new();
//! let siblings = store
//!     .find(
//!         PageQuery::scoped("en", Mode::Draft)
//!             .with_path_prefix("home")
//!             .with_level(1)
//!             .sorted(SortOrder::Rank),
//!     )
//!     .await?;
//! println!("{} top-level pages", siblings.len());
//! # Ok(())
//! # }
//! ```

use super::error::StoreError;
use super::query::{PageField, PageMutation, PageQuery};
use crate::models::Page;
use async_trait::async_trait;
use std::collections::HashMap;

/// Abstraction layer for page persistence
///
/// Implementations must be `Send + Sync` so the tree service can be shared
/// across tasks.
#[async_trait]
pub trait PageStore: Send + Sync {
    //
    // QUERYING
    //

    /// Find every page matching the criteria, in the requested order
    async fn find(&self, query: PageQuery) -> Result<Vec<Page>, StoreError>;

    /// Find the first page matching the criteria
    async fn find_one(&self, query: PageQuery) -> Result<Option<Page>, StoreError> {
        Ok(self.find(query.with_limit(1)).await?.into_iter().next())
    }

    /// Distinct values of a field across matching pages, in first-seen order
    async fn distinct(&self, field: PageField, query: PageQuery)
        -> Result<Vec<String>, StoreError>;

    //
    // SINGLE-DOCUMENT WRITES
    //

    /// Insert a new page
    ///
    /// # Errors
    ///
    /// - `DuplicateKey { field: "_id" }` if the id exists
    /// - `DuplicateKey { field: "path" | "slug" }` on unique index violations
    async fn insert(&self, page: Page) -> Result<Page, StoreError>;

    /// Replace an existing page
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id does not exist
    /// - `DuplicateKey` on unique index violations
    async fn update(&self, page: Page) -> Result<Page, StoreError>;

    /// Delete a page; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    //
    // MULTI-DOCUMENT WRITES
    //

    /// Apply a mutation to every matching page; returns the count
    ///
    /// Each document is written individually. On a unique index violation the
    /// documents already written stay written and the error is returned.
    async fn update_many(&self, query: PageQuery, mutation: PageMutation)
        -> Result<usize, StoreError>;

    /// Rewrite `aposDocId` references (relationship values and path segments)
    /// from the map's keys to its values across the whole store, in one pass
    ///
    /// Returns the number of documents touched.
    async fn remap_doc_ids(&self, remap: &HashMap<String, String>) -> Result<usize, StoreError>;
}
