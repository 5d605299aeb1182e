//! Batch archive/restore planner
//!
//! Archiving or restoring a selection of pages is planned up front so the
//! selection keeps its internal shape: a selected page whose ancestor is
//! also selected travels with (and under) that ancestor, and unselected
//! children of a selected page are promoted out of the way before their
//! parent leaves.

use crate::models::{Page, Position, TargetRef};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Direction of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchKind {
    Archive,
    Restore,
}

/// Unselected child moved aside before its parent is relocated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    pub id: String,
    pub target_id: String,
    pub position: Position,
}

/// Planned relocation of one selected page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPatch {
    pub id: String,
    #[serde(serialize_with = "serialize_target")]
    pub target: TargetRef,
    pub position: Position,
    pub archived: bool,
    pub currently_archived: bool,
    pub level: u32,
    /// Nothing to do for this page
    pub noop: bool,
    pub promotions: Vec<Promotion>,
}

fn serialize_target<S: serde::Serializer>(target: &TargetRef, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&target.to_string())
}

/// Plan a batch archive or restore
///
/// `children` maps an `aposDocId` to its direct children. Patches come back
/// in application order.
pub fn plan_batch(
    kind: BatchKind,
    selected: &[Page],
    children: &HashMap<String, Vec<Page>>,
) -> Vec<BatchPatch> {
    let by_doc: HashMap<&str, &Page> = selected
        .iter()
        .map(|page| (page.apos_doc_id.as_str(), page))
        .collect();
    let selected_docs: HashSet<&str> = by_doc.keys().copied().collect();

    let mut patches: Vec<BatchPatch> = selected
        .iter()
        .map(|page| {
            let ancestors = page.ancestor_doc_ids();

            let nearest_selected = ancestors
                .iter()
                .rev()
                .find_map(|doc| by_doc.get(doc).copied());

            // Topmost selected page among ancestors-or-self
            let topmost = ancestors
                .iter()
                .find_map(|doc| by_doc.get(doc).copied())
                .unwrap_or(page);

            let promotions = children
                .get(&page.apos_doc_id)
                .map(|kids| {
                    kids.iter()
                        .filter(|kid| !selected_docs.contains(kid.apos_doc_id.as_str()))
                        .map(|kid| Promotion {
                            id: kid.id.clone(),
                            target_id: topmost.id.clone(),
                            position: Position::After,
                        })
                        .collect()
                })
                .unwrap_or_default();

            let (target, position) = match (nearest_selected, kind) {
                (Some(ancestor), _) => (TargetRef::Id(ancestor.id.clone()), Position::LastChild),
                (None, BatchKind::Archive) => (TargetRef::Archive, Position::FirstChild),
                (None, BatchKind::Restore) => (TargetRef::Home, Position::LastChild),
            };

            let noop = kind == BatchKind::Restore && !page.archived && nearest_selected.is_none();

            BatchPatch {
                id: page.id.clone(),
                target,
                position,
                archived: kind == BatchKind::Archive,
                currently_archived: page.archived,
                level: page.level,
                noop,
                promotions: if noop { Vec::new() } else { promotions },
            }
        })
        .collect();

    // Pages still on the wrong side go first, shallow before deep
    patches.sort_by_key(|patch| {
        let pending = match kind {
            BatchKind::Archive => !patch.currently_archived,
            BatchKind::Restore => patch.currently_archived,
        };
        (!pending, patch.level)
    });
    patches
}
