//! Change sets returned by structural operations
//!
//! Every page whose positional fields were rewritten by a move (the mover,
//! nudged siblings, cascaded descendants) is reported once, keyed by `_id`.

use super::page::Page;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Positional projection of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageChange {
    #[serde(rename = "_id")]
    pub id: String,
    pub slug: String,
    pub path: String,
    pub level: u32,
    pub rank: i64,
    pub archived: bool,
}

impl From<&Page> for PageChange {
    fn from(page: &Page) -> Self {
        Self {
            id: page.id.clone(),
            slug: page.slug.clone(),
            path: page.path.clone(),
            level: page.level,
            rank: page.rank,
            archived: page.archived,
        }
    }
}

/// Ordered, id-deduplicated list of changes
///
/// Recording the same id twice overwrites the earlier entry in place, so the
/// first-seen order is kept while the latest values win.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<PageChange>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, change: PageChange) {
        match self.index.get(&change.id) {
            Some(&at) => self.changes[at] = change,
            None => {
                self.index.insert(change.id.clone(), self.changes.len());
                self.changes.push(change);
            }
        }
    }

    pub fn record_page(&mut self, page: &Page) {
        self.record(PageChange::from(page));
    }

    pub fn extend(&mut self, other: ChangeSet) {
        for change in other.changes {
            self.record(change);
        }
    }

    pub fn get(&self, id: &str) -> Option<&PageChange> {
        self.index.get(id).map(|&at| &self.changes[at])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageChange> {
        self.changes.iter()
    }

    pub fn into_vec(self) -> Vec<PageChange> {
        self.changes
    }
}
