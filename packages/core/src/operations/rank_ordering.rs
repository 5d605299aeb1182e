//! Position and rank engine
//!
//! Pure functions that turn a `(target, position)` request into a concrete
//! anchor, position and rank. Ranks are integers, unique within a sibling
//! group, and may have gaps. Making room for a new rank is done by
//! "nudging": every sibling at or after the threshold moves up by one.
//!
//! Nothing here touches the store; callers pass in the neighborhood they
//! have already read.

use crate::models::{Page, Position};
use crate::operations::PlacementError;

/// Result of resolving a placement request
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Page the position is relative to after normalization
    pub anchor: Page,
    /// Never `Position::Index`
    pub position: Position,
    pub rank: i64,
    /// Siblings with `rank >= nudge_from` must move up by one
    pub nudge_from: Option<i64>,
}

impl Placement {
    /// True when the anchor becomes the parent
    pub fn parent_is_anchor(&self) -> bool {
        self.position.is_child()
    }
}

/// Rewrite a numeric offset into a keyword position
///
/// `children` are the target's children ordered by rank. Returns the
/// sibling to anchor on, or `None` when the target itself is the anchor.
/// Offsets past the end become `lastChild` so the archive stays last.
pub fn normalize_index<'a>(
    children: &'a [Page],
    index: usize,
    subject_doc_id: Option<&str>,
) -> (Option<&'a Page>, Position) {
    let is_subject = |page: &Page| Some(page.apos_doc_id.as_str()) == subject_doc_id;

    if children.is_empty() {
        return (None, Position::FirstChild);
    }
    if index == 0 {
        if is_subject(&children[0]) {
            return (None, Position::FirstChild);
        }
        return (Some(&children[0]), Position::Before);
    }
    if index >= children.len() {
        return (None, Position::LastChild);
    }
    // The subject vacates its slot, so everything behind it shifts left by one
    match children.iter().position(is_subject) {
        Some(current) if current < index => (Some(&children[index]), Position::After),
        _ => (Some(&children[index - 1]), Position::After),
    }
}

/// Resolve `(target, position)` into a placement
///
/// `children` are the target's children ordered by rank; they are only
/// consulted for child positions and numeric offsets.
pub fn resolve_placement(
    target: &Page,
    position: Position,
    children: &[Page],
    subject_doc_id: Option<&str>,
    archive_doc_id: Option<&str>,
) -> Result<Placement, PlacementError> {
    let from_offset = matches!(position, Position::Index(_));
    let (mut anchor, mut position) = match position {
        Position::Index(index) => match normalize_index(children, index, subject_doc_id) {
            (Some(sibling), position) => (sibling, position),
            (None, position) => (target, position),
        },
        other => (target, other),
    };

    let is_archive = |page: &Page| Some(page.apos_doc_id.as_str()) == archive_doc_id;

    if position == Position::LastChild {
        if let Some(archive) = children.iter().find(|c| is_archive(c)) {
            if Some(archive.apos_doc_id.as_str()) != subject_doc_id {
                anchor = archive;
                position = Position::Before;
            }
        }
    }

    // An offset that lands after the archive is read as "the end"
    if position == Position::After && is_archive(anchor) {
        if anchor.level == 1 && !from_offset {
            return Err(PlacementError::AfterArchiveRoot {
                archive_id: anchor.id.clone(),
            });
        }
        position = Position::Before;
    }

    if position.is_sibling() && anchor.is_root() {
        return Err(PlacementError::RootHasNoSiblings {
            root_id: anchor.id.clone(),
        });
    }

    let (rank, nudge_from) = match position {
        Position::FirstChild => (0, Some(0)),
        Position::LastChild => (
            children.iter().map(|c| c.rank).max().map_or(0, |max| max + 1),
            None,
        ),
        Position::Before => (anchor.rank, Some(anchor.rank)),
        Position::After => (anchor.rank + 1, Some(anchor.rank + 1)),
        Position::Index(_) => unreachable!("numeric offsets are normalized above"),
    };

    Ok(Placement {
        anchor: anchor.clone(),
        position,
        rank,
        nudge_from,
    })
}

/// Minimal bumps that make `ranks` strictly increasing, order preserved
///
/// Idempotent: a strictly increasing input comes back unchanged.
pub fn dedupe_ranks(ranks: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(ranks.len());
    let mut prev: Option<i64> = None;
    for &rank in ranks {
        let next = match prev {
            Some(p) => rank.max(p + 1),
            None => rank,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Rank rewrites that repair a sibling group
///
/// Siblings are ordered by `(rank, _id)`; the archive root, when present, is
/// forced to the end. Returns only the `(_id, new_rank)` pairs that change.
pub fn repair_plan(siblings: &[Page], archive_doc_id: Option<&str>) -> Vec<(String, i64)> {
    let mut ordered: Vec<&Page> = siblings.iter().collect();
    ordered.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.id.cmp(&b.id)));
    if let Some(index) = ordered
        .iter()
        .position(|p| Some(p.apos_doc_id.as_str()) == archive_doc_id)
    {
        let archive = ordered.remove(index);
        ordered.push(archive);
    }

    let ranks: Vec<i64> = ordered.iter().map(|p| p.rank).collect();
    dedupe_ranks(&ranks)
        .into_iter()
        .zip(ordered)
        .filter(|(rank, page)| *rank != page.rank)
        .map(|(rank, page)| (page.id.clone(), rank))
        .collect()
}
