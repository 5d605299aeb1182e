//! Query criteria and mutations for the page store
//!
//! All filter fields combine with AND logic; `None` means "no filter on this
//! field". Descendant lookups use `path_prefix`, which a backend should serve
//! from an index on `path` (range or anchored-prefix scan) rather than by
//! walking the tree in memory.

use crate::models::{Mode, Page};
use serde::{Deserialize, Serialize};

/// Sort order for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Store order (unspecified)
    #[default]
    Natural,
    /// Ascending rank (sibling scans)
    Rank,
    /// Ascending level, then rank (tree-walk order by depth)
    LevelRank,
    /// Ascending path
    Path,
}

/// Filter criteria for page queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub ids: Option<Vec<String>>,
    pub doc_ids: Option<Vec<String>>,
    pub locale: Option<String>,
    pub modes: Option<Vec<Mode>>,
    pub path: Option<String>,
    /// Strict descendants: `path` starts with `path_prefix + "/"`
    pub path_prefix: Option<String>,
    pub level: Option<u32>,
    pub rank_gte: Option<i64>,
    pub slug: Option<String>,
    pub parked_id: Option<String>,
    pub has_parked_id: Option<bool>,
    pub page_types: Option<Vec<String>>,
    pub archived: Option<bool>,
    pub exclude_ids: Option<Vec<String>>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope to a single locale and mode
    pub fn scoped(locale: &str, mode: Mode) -> Self {
        Self::new().with_locale(locale).with_modes(vec![mode])
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().with_ids(vec![id.into()])
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_doc_ids(mut self, doc_ids: Vec<String>) -> Self {
        self.doc_ids = Some(doc_ids);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_modes(mut self, modes: Vec<Mode>) -> Self {
        self.modes = Some(modes);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_rank_gte(mut self, rank: i64) -> Self {
        self.rank_gte = Some(rank);
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_parked_id(mut self, parked_id: impl Into<String>) -> Self {
        self.parked_id = Some(parked_id.into());
        self
    }

    pub fn with_has_parked_id(mut self, has: bool) -> Self {
        self.has_parked_id = Some(has);
        self
    }

    pub fn with_page_types(mut self, types: Vec<String>) -> Self {
        self.page_types = Some(types);
        self
    }

    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    pub fn excluding(mut self, ids: Vec<String>) -> Self {
        self.exclude_ids = Some(ids);
        self
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the criteria against a page
    ///
    /// Backends with native query languages translate the criteria instead;
    /// this is the reference semantics.
    pub fn matches(&self, page: &Page) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| id == &page.id) {
                return false;
            }
        }
        if let Some(doc_ids) = &self.doc_ids {
            if !doc_ids.iter().any(|id| id == &page.apos_doc_id) {
                return false;
            }
        }
        if let Some(locale) = &self.locale {
            if locale != &page.apos_locale {
                return false;
            }
        }
        if let Some(modes) = &self.modes {
            if !modes.contains(&page.apos_mode) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if path != &page.path {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            match page.path.strip_prefix(prefix.as_str()) {
                Some(rest) if rest.starts_with('/') => {}
                _ => return false,
            }
        }
        if let Some(level) = self.level {
            if level != page.level {
                return false;
            }
        }
        if let Some(rank) = self.rank_gte {
            if page.rank < rank {
                return false;
            }
        }
        if let Some(slug) = &self.slug {
            if slug != &page.slug {
                return false;
            }
        }
        if let Some(parked_id) = &self.parked_id {
            if page.parked_id.as_deref() != Some(parked_id.as_str()) {
                return false;
            }
        }
        if let Some(has) = self.has_parked_id {
            if page.parked_id.is_some() != has {
                return false;
            }
        }
        if let Some(types) = &self.page_types {
            if !types.iter().any(|t| t == &page.page_type) {
                return false;
            }
        }
        if let Some(archived) = self.archived {
            if archived != page.archived {
                return false;
            }
        }
        if let Some(excluded) = &self.exclude_ids {
            if excluded.iter().any(|id| id == &page.id) {
                return false;
            }
        }
        true
    }
}

/// Sparse positional patch applied by `update_many`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePatch {
    pub path: Option<String>,
    pub slug: Option<String>,
    pub level: Option<u32>,
    pub rank: Option<i64>,
    pub archived: Option<bool>,
    pub last_published_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the slug, keeping the path-only part of the patch
    pub fn without_slug(mut self) -> Self {
        self.slug = None;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_none()
            && self.slug.is_none()
            && self.level.is_none()
            && self.rank.is_none()
            && self.archived.is_none()
            && self.last_published_at.is_none()
    }

    pub fn apply_to(&self, page: &mut Page) {
        if let Some(path) = &self.path {
            page.path = path.clone();
        }
        if let Some(slug) = &self.slug {
            page.slug = slug.clone();
        }
        if let Some(level) = self.level {
            page.level = level;
        }
        if let Some(rank) = self.rank {
            page.rank = rank;
        }
        if let Some(archived) = self.archived {
            page.archived = archived;
        }
        if let Some(at) = self.last_published_at {
            page.last_published_at = Some(at);
        }
    }
}

/// Multi-document mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PageMutation {
    /// Atomic counter-style `rank += by`
    IncrementRank { by: i64 },
    /// Set the given positional fields
    Set(PagePatch),
}

/// Fields supported by `distinct`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageField {
    DocId,
    ParkedId,
    PageType,
    Locale,
    Slug,
}

impl PageField {
    pub fn read(&self, page: &Page) -> Option<String> {
        match self {
            PageField::DocId => Some(page.apos_doc_id.clone()),
            PageField::ParkedId => page.parked_id.clone(),
            PageField::PageType => Some(page.page_type.clone()),
            PageField::Locale => Some(page.apos_locale.clone()),
            PageField::Slug => Some(page.slug.clone()),
        }
    }
}
