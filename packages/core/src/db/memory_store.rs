//! In-memory PageStore
//!
//! A `BTreeMap`-backed implementation of [`PageStore`] that enforces the same
//! unique indexes a production document store would. It is suitable for
//! tests, tooling and embedding scenarios where durability is handled
//! elsewhere.

use super::error::StoreError;
use super::page_store::PageStore;
use super::query::{PageField, PageMutation, PageQuery, SortOrder};
use crate::models::Page;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-memory page store with `(path, locale, mode)` and `(slug, locale, mode)`
/// unique indexes
#[derive(Debug, Default)]
pub struct MemoryPageStore {
    pages: RwLock<BTreeMap<String, Page>>,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, bypassing unique index checks
    ///
    /// Used to reproduce states that a racing writer could leave behind.
    pub async fn seed_unchecked(&self, pages: Vec<Page>) {
        let mut map = self.pages.write().await;
        for page in pages {
            map.insert(page.id.clone(), page);
        }
    }

    /// Snapshot of every stored page, ordered by id
    pub async fn all(&self) -> Vec<Page> {
        self.pages.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.read().await.is_empty()
    }
}

/// Check `candidate` against every other document's unique keys
fn check_unique(pages: &BTreeMap<String, Page>, candidate: &Page) -> Result<(), StoreError> {
    for other in pages.values() {
        if other.id == candidate.id
            || other.apos_locale != candidate.apos_locale
            || other.apos_mode != candidate.apos_mode
        {
            continue;
        }
        if other.path == candidate.path {
            return Err(StoreError::duplicate_key("path", candidate.path.clone()));
        }
        if other.slug == candidate.slug {
            return Err(StoreError::duplicate_key("slug", candidate.slug.clone()));
        }
    }
    Ok(())
}

fn sort_pages(pages: &mut [Page], order: SortOrder) {
    match order {
        SortOrder::Natural => {}
        SortOrder::Rank => pages.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.id.cmp(&b.id))),
        SortOrder::LevelRank => pages.sort_by(|a, b| {
            a.level
                .cmp(&b.level)
                .then(a.rank.cmp(&b.rank))
                .then(a.id.cmp(&b.id))
        }),
        SortOrder::Path => pages.sort_by(|a, b| a.path.cmp(&b.path)),
    }
}

fn remap_segments(path: &str, remap: &HashMap<String, String>) -> String {
    path.split('/')
        .map(|segment| remap.get(segment).map(String::as_str).unwrap_or(segment))
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl PageStore for MemoryPageStore {
    async fn find(&self, query: PageQuery) -> Result<Vec<Page>, StoreError> {
        let pages = self.pages.read().await;
        let mut found: Vec<Page> = pages
            .values()
            .filter(|page| query.matches(page))
            .cloned()
            .collect();
        sort_pages(&mut found, query.sort);
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn distinct(
        &self,
        field: PageField,
        query: PageQuery,
    ) -> Result<Vec<String>, StoreError> {
        let found = self.find(query).await?;
        let mut values: Vec<String> = Vec::new();
        for page in &found {
            if let Some(value) = field.read(page) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    async fn insert(&self, page: Page) -> Result<Page, StoreError> {
        let mut pages = self.pages.write().await;
        if pages.contains_key(&page.id) {
            return Err(StoreError::duplicate_key("_id", page.id.clone()));
        }
        check_unique(&pages, &page)?;
        pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn update(&self, mut page: Page) -> Result<Page, StoreError> {
        let mut pages = self.pages.write().await;
        if !pages.contains_key(&page.id) {
            return Err(StoreError::not_found(page.id.clone()));
        }
        check_unique(&pages, &page)?;
        page.updated_at = Utc::now();
        pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.pages.write().await.remove(id).is_some())
    }

    async fn update_many(
        &self,
        query: PageQuery,
        mutation: PageMutation,
    ) -> Result<usize, StoreError> {
        let mut pages = self.pages.write().await;
        let targets: Vec<Page> = pages
            .values()
            .filter(|page| query.matches(page))
            .cloned()
            .collect();

        let now = Utc::now();
        let mut count = 0;
        for mut page in targets {
            match &mutation {
                PageMutation::IncrementRank { by } => page.rank += by,
                PageMutation::Set(patch) => patch.apply_to(&mut page),
            }
            check_unique(&pages, &page)?;
            page.updated_at = now;
            pages.insert(page.id.clone(), page);
            count += 1;
        }
        Ok(count)
    }

    async fn remap_doc_ids(&self, remap: &HashMap<String, String>) -> Result<usize, StoreError> {
        if remap.is_empty() {
            return Ok(0);
        }
        let mut pages = self.pages.write().await;
        let mut next = pages.clone();
        let mut touched = 0;

        for page in next.values_mut() {
            let mut changed = false;

            let path = remap_segments(&page.path, remap);
            if path != page.path {
                page.path = path;
                changed = true;
            }
            for targets in page.relationships.values_mut() {
                for target in targets.iter_mut() {
                    if let Some(replacement) = remap.get(target.as_str()) {
                        *target = replacement.clone();
                        changed = true;
                    }
                }
                let mut seen = Vec::with_capacity(targets.len());
                targets.retain(|t| {
                    if seen.contains(t) {
                        false
                    } else {
                        seen.push(t.clone());
                        true
                    }
                });
            }
            if changed {
                touched += 1;
            }
        }

        for page in next.values() {
            check_unique(&next, page)?;
        }
        *pages = next;
        Ok(touched)
    }
}
