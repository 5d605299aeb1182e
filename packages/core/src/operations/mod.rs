//! Tree Operations
//!
//! Pure computations behind every structural mutation. These functions take
//! the neighborhood a service has already read from the store and return
//! what should be written; they never perform I/O themselves.
//!
//! - `rank_ordering` - position normalization, archive rules, rank assignment
//!   and rank repair
//! - `path_cascade` - path/slug/level rewrites for a relocated subtree and
//!   ancestry checks
//! - `batch` - batch archive/restore planning

pub mod batch;
mod error;
pub mod path_cascade;
pub mod rank_ordering;

pub use batch::{plan_batch, BatchKind, BatchPatch, Promotion};
pub use error::PlacementError;
pub use path_cascade::{check_not_self_ancestor, check_parent_published, moved_slug, Relocation};
pub use rank_ordering::{dedupe_ranks, normalize_index, repair_plan, resolve_placement, Placement};
