//! Data Models
//!
//! This module contains the data structures shared by every layer of the
//! page tree:
//!
//! - `Page` - the universal page document and its variant ids
//! - `Position` / `TargetRef` - placement directives resolved at the API boundary
//! - `ChangeSet` - de-duplicated positional changes reported by structural operations

mod change;
mod page;
mod position;

pub use change::{ChangeSet, PageChange};
pub use page::{
    child_path, is_valid_slug, join_slug, last_slug_component, path_level, slugify, Mode, Page,
    PageId, STRUCTURAL_FIELDS,
};
pub use position::{Position, TargetRef};
