//! Path and slug cascade
//!
//! When a page moves, its materialized path changes and every descendant's
//! path must follow. Slugs follow too, but only where they were derived
//! from the old parent's slug; hand-crafted slugs stay put unless the page
//! is going into the archive, which always namespaces them under the
//! archive slug so they stop shadowing live URLs.

use crate::db::PagePatch;
use crate::models::{join_slug, last_slug_component, path_level, Page};
use crate::operations::PlacementError;

/// Slug prefix that children of `slug` share
fn slug_prefix(slug: &str) -> String {
    if slug.ends_with('/') {
        slug.to_string()
    } else {
        format!("{}/", slug)
    }
}

/// New slug of the moved page itself
///
/// Rewritten when it was derived from the old parent's slug; forced under
/// the new parent when entering the archive; otherwise kept.
pub fn moved_slug(
    page: &Page,
    old_parent_slug: &str,
    new_parent_slug: &str,
    into_archive: bool,
) -> String {
    if let Some(rest) = page.slug.strip_prefix(&slug_prefix(old_parent_slug)) {
        return join_slug(new_parent_slug, rest);
    }
    if into_archive && !page.archived {
        return join_slug(new_parent_slug, last_slug_component(&page.slug));
    }
    page.slug.clone()
}

/// Description of a subtree relocation
#[derive(Debug, Clone)]
pub struct Relocation<'a> {
    pub old_path: &'a str,
    pub new_path: &'a str,
    pub old_slug: &'a str,
    pub new_slug: &'a str,
    /// New archived flag for the whole subtree; `None` leaves it alone
    pub archived: Option<bool>,
    pub into_archive: bool,
}

impl<'a> Relocation<'a> {
    /// Slug-only relocation, for a slug edit without a move
    pub fn slug_only(path: &'a str, old_slug: &'a str, new_slug: &'a str) -> Self {
        Self {
            old_path: path,
            new_path: path,
            old_slug,
            new_slug,
            archived: None,
            into_archive: false,
        }
    }

    /// Patch for one descendant, `None` if it is outside the subtree or
    /// nothing changes
    pub fn descendant_patch(&self, page: &Page) -> Option<PagePatch> {
        let rest = page
            .path
            .strip_prefix(self.old_path)
            .filter(|rest| rest.starts_with('/'))?;

        let mut patch = PagePatch::new();

        let path = format!("{}{}", self.new_path, rest);
        if path != page.path {
            patch.level = Some(path_level(&path));
            patch.path = Some(path);
        }

        if let Some(archived) = self.archived {
            if archived != page.archived {
                patch.archived = Some(archived);
            }
        }

        let slug = if let Some(tail) = page.slug.strip_prefix(&slug_prefix(self.old_slug)) {
            join_slug(self.new_slug, tail)
        } else if self.into_archive && !page.archived {
            join_slug(self.new_slug, last_slug_component(&page.slug))
        } else {
            page.slug.clone()
        };
        if slug != page.slug {
            patch.slug = Some(slug);
        }

        if patch.is_empty() {
            None
        } else {
            Some(patch)
        }
    }

    /// `(_id, patch)` for every descendant that changes
    pub fn cascade(&self, descendants: &[Page]) -> Vec<(String, PagePatch)> {
        descendants
            .iter()
            .filter_map(|page| self.descendant_patch(page).map(|patch| (page.id.clone(), patch)))
            .collect()
    }
}

/// Forbid placing a page under itself or one of its descendants
pub fn check_not_self_ancestor(page: &Page, new_parent: &Page) -> Result<(), PlacementError> {
    if new_parent
        .path
        .split('/')
        .any(|segment| segment == page.apos_doc_id)
    {
        return Err(PlacementError::SelfAncestor {
            page_id: page.id.clone(),
            parent_id: new_parent.id.clone(),
        });
    }
    Ok(())
}

/// Forbid placing published content under a never-published parent
pub fn check_parent_published(page: &Page, parent: &Page) -> Result<(), PlacementError> {
    if page.last_published_at.is_some() && parent.last_published_at.is_none() {
        return Err(PlacementError::UnpublishedParent {
            page_id: page.id.clone(),
            parent_id: parent.id.clone(),
        });
    }
    Ok(())
}
