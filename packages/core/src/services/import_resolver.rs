//! Import Duplicate/Conflict Resolver
//!
//! Bulk import brings in documents that may already exist in the
//! destination. The resolver decides, per record, whether it replaces an
//! existing page (singletons and parked pages, matched by type or
//! `parkedId` regardless of id), collides with one (same `aposDocId`, needs
//! confirmation) or is new. New records are placed by inferring their
//! parent from the path, then the slug, then falling back to home.
//!
//! Id rewrites are collected in memory while applying and written with a
//! single `remap_doc_ids` pass at the end.

use crate::db::{PageField, PageQuery};
use crate::models::{Mode, Page, PageId, Position, TargetRef};
use crate::services::batch_ops::BatchFailure;
use crate::services::context::RequestContext;
use crate::services::error::PageTreeError;
use crate::services::page_tree::{NewPage, PageTree};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// One document of an import stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub apos_doc_id: String,
    pub path: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub page_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parked_id: Option<String>,
    pub apos_mode: Mode,
    pub apos_locale: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Vec<String>>,
    /// Attachment ids referenced by the record
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl ImportRecord {
    /// `aposDocId`s of the record's ancestors, root first
    pub fn ancestor_doc_ids(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.path.split('/').collect();
        segments.pop();
        segments
    }

    pub fn parent_doc_id(&self) -> Option<&str> {
        self.ancestor_doc_ids().last().copied()
    }

    pub fn level(&self) -> usize {
        self.path.matches('/').count()
    }

    /// Slug of the parent implied by the record's own slug
    pub fn parent_slug(&self) -> String {
        match self.slug.trim_end_matches('/').rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        }
    }
}

/// Existing page a record will overwrite
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub doc_id: String,
    pub locale: String,
    pub existing_doc_id: String,
}

/// Record whose `aposDocId` already exists
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportConflict {
    pub doc_id: String,
    pub locale: String,
    pub existing_id: String,
}

/// Classification of an import batch, keyed by `aposDocId` and locale
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub replacements: Vec<Replacement>,
    pub conflicts: Vec<ImportConflict>,
    pub inserts: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl DuplicateReport {
    fn replacement_for(&self, record: &ImportRecord) -> Option<&Replacement> {
        self.replacements
            .iter()
            .find(|r| r.doc_id == record.apos_doc_id && r.locale == record.apos_locale)
    }

    fn is_conflict(&self, record: &ImportRecord) -> bool {
        self.conflicts
            .iter()
            .any(|c| c.doc_id == record.apos_doc_id && c.locale == record.apos_locale)
    }

    fn is_failed(&self, doc_id: &str) -> bool {
        self.failed.iter().any(|f| f.id == doc_id)
    }
}

/// Outcome of applying an import
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<BatchFailure>,
    /// Attachments of records that were not written
    pub deferred_attachments: Vec<String>,
    /// Pages touched by the final id remap
    pub remapped: usize,
}

/// Outcome of merging duplicate parked pages
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupeReport {
    /// `parkedId` → surviving `aposDocId`
    pub kept: BTreeMap<String, String>,
    pub removed: Vec<String>,
    /// Children moved from a removed duplicate to the keeper
    pub reparented: Vec<String>,
    pub remapped: usize,
}

/// Resolver for bulk imports into a page tree
#[derive(Debug, Clone)]
pub struct ImportResolver {
    tree: PageTree,
}

impl ImportResolver {
    pub fn new(tree: PageTree) -> Self {
        Self { tree }
    }

    fn draft_ctx(ctx: &RequestContext, record: &ImportRecord) -> RequestContext {
        ctx.with_locale(record.apos_locale.clone()).with_mode(Mode::Draft)
    }

    /// Where a new record should be inserted
    ///
    /// Probes the parent, then each further ancestor deepest first, then
    /// the parent slug, then home. Always `lastChild`.
    pub async fn infer_target(
        &self,
        ctx: &RequestContext,
        record: &ImportRecord,
    ) -> Result<(TargetRef, Position), PageTreeError> {
        self.infer_target_with(ctx, record, &HashMap::new()).await
    }

    async fn infer_target_with(
        &self,
        ctx: &RequestContext,
        record: &ImportRecord,
        remap: &HashMap<String, String>,
    ) -> Result<(TargetRef, Position), PageTreeError> {
        for doc_id in record.ancestor_doc_ids().into_iter().rev() {
            let doc_id = remap.get(doc_id).map(String::as_str).unwrap_or(doc_id);
            if let Some(page) = self.tree.find(ctx, doc_id).await? {
                return Ok((TargetRef::Id(page.id), Position::LastChild));
            }
        }

        let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_slug(record.parent_slug());
        if let Some(page) = self.tree.store().find_one(query).await? {
            return Ok((TargetRef::Id(page.id), Position::LastChild));
        }

        Ok((TargetRef::Home, Position::LastChild))
    }

    /// Partition records into replacements, conflicts and inserts
    pub async fn detect_duplicates(
        &self,
        ctx: &RequestContext,
        records: &[ImportRecord],
    ) -> Result<DuplicateReport, PageTreeError> {
        let mut report = DuplicateReport::default();
        let mut seen: HashSet<(&str, &str)> = HashSet::new();

        for record in records {
            if !seen.insert((record.apos_doc_id.as_str(), record.apos_locale.as_str())) {
                continue;
            }
            let draft = Self::draft_ctx(ctx, record);

            let Some(manager) = self.tree.types().get(&record.page_type) else {
                report.failed.push(BatchFailure::new(
                    record.apos_doc_id.as_str(),
                    format!("unknown page type '{}'", record.page_type),
                ));
                continue;
            };

            if manager.is_singleton() || record.parked_id.is_some() {
                let existing = match &record.parked_id {
                    Some(parked_id) => self.tree.find_parked(&draft, parked_id).await?,
                    None => {
                        let query = PageQuery::scoped(draft.locale(), Mode::Draft)
                            .with_page_types(vec![record.page_type.clone()]);
                        self.tree.store().find_one(query).await?
                    }
                };
                if let Some(existing) = existing {
                    report.replacements.push(Replacement {
                        doc_id: record.apos_doc_id.clone(),
                        locale: record.apos_locale.clone(),
                        existing_doc_id: existing.apos_doc_id,
                    });
                    continue;
                }
            }

            match self.tree.find(&draft, &record.apos_doc_id).await? {
                Some(existing) => report.conflicts.push(ImportConflict {
                    doc_id: record.apos_doc_id.clone(),
                    locale: record.apos_locale.clone(),
                    existing_id: existing.id,
                }),
                None if !report.inserts.contains(&record.apos_doc_id) => {
                    report.inserts.push(record.apos_doc_id.clone())
                }
                None => {}
            }
        }

        debug!(
            "Import duplicates: {} replacements, {} conflicts, {} inserts, {} failed",
            report.replacements.len(),
            report.conflicts.len(),
            report.inserts.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Write an import batch
    ///
    /// `confirmed` lists the conflicting `aposDocId`s the user agreed to
    /// overwrite; other conflicts are skipped.
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        records: &[ImportRecord],
        duplicates: &DuplicateReport,
        confirmed: &[String],
    ) -> Result<ImportReport, PageTreeError> {
        self.tree
            .lock()
            .run(ctx, self.apply_locked(ctx, records, duplicates, confirmed))
            .await
    }

    async fn apply_locked(
        &self,
        ctx: &RequestContext,
        records: &[ImportRecord],
        duplicates: &DuplicateReport,
        confirmed: &[String],
    ) -> Result<ImportReport, PageTreeError> {
        let mut report = ImportReport {
            failed: duplicates.failed.clone(),
            ..Default::default()
        };

        let remap: HashMap<String, String> = duplicates
            .replacements
            .iter()
            .filter(|r| r.doc_id != r.existing_doc_id)
            .map(|r| (r.doc_id.clone(), r.existing_doc_id.clone()))
            .collect();

        // Parents before children
        let mut drafts: Vec<&ImportRecord> = records
            .iter()
            .filter(|r| r.apos_mode == Mode::Draft)
            .collect();
        drafts.sort_by_key(|r| r.level());

        // Keyed by (aposDocId, locale)
        let mut written: HashSet<(&str, &str)> = HashSet::new();
        let mut not_written: HashSet<(&str, &str)> = HashSet::new();

        for record in drafts {
            let doc_id = record.apos_doc_id.as_str();
            let key = (doc_id, record.apos_locale.as_str());
            let draft = Self::draft_ctx(ctx, record);

            if duplicates.is_failed(doc_id) {
                not_written.insert(key);
                continue;
            }

            let outcome = if let Some(replacement) = duplicates.replacement_for(record) {
                self.overwrite(&draft, record, &replacement.existing_doc_id, &remap)
                    .await
                    .map(|_| false)
            } else if duplicates.is_conflict(record) {
                if !confirmed.iter().any(|c| c == doc_id) {
                    debug!("Skipping unconfirmed conflict {}", doc_id);
                    report.skipped.push(doc_id.to_string());
                    not_written.insert(key);
                    continue;
                }
                self.overwrite(&draft, record, doc_id, &remap)
                    .await
                    .map(|_| false)
            } else {
                self.insert(&draft, record, &remap).await.map(|_| true)
            };

            match outcome {
                Ok(true) => {
                    report.imported.push(doc_id.to_string());
                    written.insert(key);
                }
                Ok(false) => {
                    report.updated.push(doc_id.to_string());
                    written.insert(key);
                }
                Err(e) => {
                    warn!("Failed to import {}: {}", doc_id, e);
                    report.failed.push(BatchFailure::new(doc_id, e));
                    not_written.insert(key);
                }
            }
        }

        let mut published: Vec<&ImportRecord> = records
            .iter()
            .filter(|r| {
                r.apos_mode == Mode::Published
                    && written.contains(&(r.apos_doc_id.as_str(), r.apos_locale.as_str()))
            })
            .collect();
        published.sort_by_key(|r| r.level());
        for record in published {
            let target = remap
                .get(&record.apos_doc_id)
                .unwrap_or(&record.apos_doc_id);
            let draft = Self::draft_ctx(ctx, record);
            if let Err(e) = self.tree.publish(&draft, target).await {
                warn!("Failed to publish imported {}: {}", record.apos_doc_id, e);
                report
                    .failed
                    .push(BatchFailure::new(record.apos_doc_id.as_str(), e));
            }
        }

        for record in records {
            if not_written.contains(&(record.apos_doc_id.as_str(), record.apos_locale.as_str())) {
                for attachment in &record.attachments {
                    if !report.deferred_attachments.contains(attachment) {
                        report.deferred_attachments.push(attachment.clone());
                    }
                }
            }
        }

        if !remap.is_empty() {
            report.remapped = self.tree.store().remap_doc_ids(&remap).await?;
        }

        info!(
            "Import applied: {} imported, {} updated, {} skipped, {} failed",
            report.imported.len(),
            report.updated.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn insert(
        &self,
        draft: &RequestContext,
        record: &ImportRecord,
        remap: &HashMap<String, String>,
    ) -> Result<Page, PageTreeError> {
        let (target, position) = self.infer_target_with(draft, record, remap).await?;
        let new_page = NewPage {
            id: Some(draft.page_id(&record.apos_doc_id)),
            page_type: Some(record.page_type.clone()),
            title: record.title.clone(),
            slug: Some(record.slug.clone()),
            parked_id: record.parked_id.clone(),
            relationships: remap_relationships(&record.relationships, remap),
            fields: record.fields.clone(),
            ..Default::default()
        };
        self.tree.insert(draft, target, position, new_page).await
    }

    /// Overwrite the content of an existing page with a record
    async fn overwrite(
        &self,
        draft: &RequestContext,
        record: &ImportRecord,
        existing_doc_id: &str,
        remap: &HashMap<String, String>,
    ) -> Result<Page, PageTreeError> {
        let mut page = self.tree.get(draft, existing_doc_id).await?;
        page.page_type = record.page_type.clone();
        page.title = record.title.clone();
        page.slug = record.slug.clone();
        page.fields = record.fields.clone();
        page.relationships = remap_relationships(&record.relationships, remap);
        self.tree.update(draft, page).await
    }

    /// Merge parked pages that ended up with several `aposDocId`s
    ///
    /// Keeps the shallowest, lowest-ranked page per `parkedId`. Children of
    /// the others move under the keeper, then the others are deleted in
    /// every mode of the locale and their ids remapped in one pass.
    pub async fn dedupe_parked(&self, ctx: &RequestContext) -> Result<DedupeReport, PageTreeError> {
        self.tree
            .lock()
            .run(ctx, self.dedupe_parked_locked(ctx))
            .await
    }

    async fn dedupe_parked_locked(
        &self,
        ctx: &RequestContext,
    ) -> Result<DedupeReport, PageTreeError> {
        let store = self.tree.store();
        let mut report = DedupeReport::default();
        let mut remap: HashMap<String, String> = HashMap::new();

        let parked_ids = store
            .distinct(
                PageField::ParkedId,
                PageQuery::new()
                    .with_locale(ctx.locale())
                    .with_has_parked_id(true),
            )
            .await?;

        for parked_id in parked_ids {
            let mut pages = store
                .find(
                    PageQuery::new()
                        .with_locale(ctx.locale())
                        .with_parked_id(parked_id.clone()),
                )
                .await?;
            pages.sort_by(|a, b| {
                a.level
                    .cmp(&b.level)
                    .then(a.rank.cmp(&b.rank))
                    .then(a.apos_mode.cmp(&b.apos_mode))
                    .then(a.id.cmp(&b.id))
            });
            let Some(keeper) = pages.first().map(|p| p.apos_doc_id.clone()) else {
                continue;
            };

            for page in pages.iter().filter(|p| p.apos_doc_id != keeper) {
                report
                    .reparented
                    .extend(self.reparent_children(ctx, page, &keeper).await?);
                store.delete(&page.id).await?;
                report.removed.push(page.id.clone());
                remap.insert(page.apos_doc_id.clone(), keeper.clone());
            }
            report.kept.insert(parked_id, keeper);
        }

        if !remap.is_empty() {
            report.remapped = store.remap_doc_ids(&remap).await?;
            info!(
                "Merged {} duplicate parked pages in {}",
                report.removed.len(),
                ctx.locale()
            );
        }
        Ok(report)
    }

    /// Move the direct children of a duplicate under the keeper's variant in
    /// the same mode, so their ranks and levels are recomputed
    async fn reparent_children(
        &self,
        ctx: &RequestContext,
        duplicate: &Page,
        keeper: &str,
    ) -> Result<Vec<String>, PageTreeError> {
        if !Mode::live().contains(&duplicate.apos_mode) {
            return Ok(Vec::new());
        }
        let mode_ctx = ctx.with_mode(duplicate.apos_mode);
        let Some(target) = self.tree.find(&mode_ctx, keeper).await? else {
            warn!(
                "No {} variant of {} to adopt children of {}",
                duplicate.apos_mode, keeper, duplicate.id
            );
            return Ok(Vec::new());
        };

        let mut moved = Vec::new();
        for child in self.tree.children(&mode_ctx, duplicate).await? {
            if child.is_parked() {
                debug!("Leaving parked child {} to the id remap", child.id);
                continue;
            }
            self.tree
                .move_page(
                    &mode_ctx,
                    &child.id,
                    TargetRef::Id(target.id.clone()),
                    Position::LastChild,
                )
                .await?;
            moved.push(child.id);
        }
        Ok(moved)
    }
}

fn remap_relationships(
    relationships: &BTreeMap<String, Vec<String>>,
    remap: &HashMap<String, String>,
) -> BTreeMap<String, Vec<String>> {
    relationships
        .iter()
        .map(|(name, targets)| {
            let mut out: Vec<String> = Vec::with_capacity(targets.len());
            for target in targets {
                let doc_id = PageId::doc_id_of(target);
                let mapped = remap.get(doc_id).cloned().unwrap_or_else(|| doc_id.to_string());
                if !out.contains(&mapped) {
                    out.push(mapped);
                }
            }
            (name.clone(), out)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::{MemoryPageStore, PageStore};
    use crate::services::ParkedPages;
    use std::sync::Arc;

    fn record(doc: &str, path: &str, slug: &str, page_type: &str) -> ImportRecord {
        ImportRecord {
            apos_doc_id: doc.to_string(),
            path: path.to_string(),
            slug: slug.to_string(),
            page_type: page_type.to_string(),
            parked_id: None,
            apos_mode: Mode::Draft,
            apos_locale: "en".to_string(),
            title: doc.to_uppercase(),
            fields: Map::new(),
            relationships: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    async fn setup() -> (ImportResolver, PageTree, Arc<MemoryPageStore>, RequestContext) {
        let store = Arc::new(MemoryPageStore::new());
        let tree = PageTree::new(store.clone(), TreeConfig::default()).unwrap();
        ParkedPages::new(tree.clone()).initialize().await.unwrap();
        (
            ImportResolver::new(tree.clone()),
            tree,
            store,
            RequestContext::draft("en"),
        )
    }

    #[test]
    fn test_record_path_helpers() {
        let r = record("c", "h/a/c", "/a/c", "default-page");
        assert_eq!(r.parent_doc_id(), Some("a"));
        assert_eq!(r.ancestor_doc_ids(), vec!["h", "a"]);
        assert_eq!(r.level(), 2);
        assert_eq!(r.parent_slug(), "/a");
        assert_eq!(record("a", "h/a", "/a", "default-page").parent_slug(), "/");
    }

    #[tokio::test]
    async fn test_infer_target_walks_ancestors_then_slug_then_home() {
        let (resolver, tree, _store, ctx) = setup().await;
        let a = tree
            .insert(
                &ctx,
                TargetRef::Home,
                Position::LastChild,
                NewPage::titled("A").with_id("a:en:draft"),
            )
            .await
            .unwrap();

        // Grandparent exists, parent does not
        let (target, position) = resolver
            .infer_target(&ctx, &record("x", "remote-home/a/missing/x", "/z/x", "default-page"))
            .await
            .unwrap();
        assert_eq!(target, TargetRef::Id(a.id.clone()));
        assert_eq!(position, Position::LastChild);

        // No ancestor matches; parent slug does
        let (target, _) = resolver
            .infer_target(&ctx, &record("y", "r1/r2/y", "/a/y", "default-page"))
            .await
            .unwrap();
        assert_eq!(target, TargetRef::Id(a.id));

        let (target, _) = resolver
            .infer_target(&ctx, &record("z", "r1/r2/z", "/nowhere/z", "default-page"))
            .await
            .unwrap();
        assert_eq!(target, TargetRef::Home);
    }

    #[tokio::test]
    async fn test_detect_duplicates_partitions_records() {
        let (resolver, tree, _store, ctx) = setup().await;
        tree.insert(
            &ctx,
            TargetRef::Home,
            Position::LastChild,
            NewPage::titled("A").with_id("a:en:draft"),
        )
        .await
        .unwrap();

        let mut home = record("remote-home", "remote-home", "/", "home-page");
        home.parked_id = Some("home".to_string());
        let records = vec![
            home,
            record("a", "remote-home/a", "/a", "default-page"),
            record("b", "remote-home/b", "/b", "default-page"),
            record("q", "remote-home/q", "/q", "quiz-page"),
        ];

        let report = resolver.detect_duplicates(&ctx, &records).await.unwrap();
        assert_eq!(report.replacements.len(), 1);
        assert_eq!(report.replacements[0].doc_id, "remote-home");
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].existing_id, "a:en:draft");
        assert_eq!(report.inserts, vec!["b".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "q");
    }

    #[tokio::test]
    async fn test_apply_remaps_replaced_ids_once() {
        let (resolver, tree, store, ctx) = setup().await;
        let local_home = tree.home(&ctx).await.unwrap();

        let mut home = record("remote-home", "remote-home", "/", "home-page");
        home.parked_id = Some("home".to_string());
        home.title = "Imported Home".to_string();
        home.fields.insert("intro".to_string(), Value::from("hello"));
        let mut child = record("b", "remote-home/b", "/b", "default-page");
        child
            .relationships
            .insert("_links".to_string(), vec!["remote-home".to_string()]);
        let mut published_b = record("b", "remote-home/b", "/b", "default-page");
        published_b.apos_mode = Mode::Published;
        let mut skipped = record("c", "remote-home/c", "/c", "default-page");
        skipped.attachments = vec!["att-1".to_string()];

        tree.insert(
            &ctx,
            TargetRef::Home,
            Position::LastChild,
            NewPage::titled("C").with_id("c:en:draft"),
        )
        .await
        .unwrap();

        let records = vec![home, child, published_b, skipped];
        let duplicates = resolver.detect_duplicates(&ctx, &records).await.unwrap();
        let report = resolver
            .apply(&ctx, &records, &duplicates, &[])
            .await
            .unwrap();

        assert_eq!(report.updated, vec!["remote-home".to_string()]);
        assert_eq!(report.imported, vec!["b".to_string()]);
        assert_eq!(report.skipped, vec!["c".to_string()]);
        assert_eq!(report.deferred_attachments, vec!["att-1".to_string()]);
        assert!(report.failed.is_empty(), "{:?}", report.failed);

        let b = tree.get(&ctx, "b").await.unwrap();
        assert_eq!(b.path, format!("{}/b", local_home.apos_doc_id));
        assert_eq!(
            b.relationships["_links"],
            vec![local_home.apos_doc_id.clone()]
        );

        let home = tree.home(&ctx).await.unwrap();
        // Parked fields keep their pinned values
        assert_eq!(home.title, "Home");
        assert_eq!(home.slug, "/");
        assert_eq!(home.fields["intro"], Value::from("hello"));

        // Published record triggered a publish
        assert!(store
            .find_one(PageQuery::by_id("b:en:published"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_confirmed_conflict_is_overwritten() {
        let (resolver, tree, _store, ctx) = setup().await;
        tree.insert(
            &ctx,
            TargetRef::Home,
            Position::LastChild,
            NewPage::titled("A").with_id("a:en:draft"),
        )
        .await
        .unwrap();

        let mut incoming = record("a", "remote-home/a", "/a", "default-page");
        incoming.title = "Replaced".to_string();
        let records = vec![incoming];
        let duplicates = resolver.detect_duplicates(&ctx, &records).await.unwrap();
        let report = resolver
            .apply(&ctx, &records, &duplicates, &["a".to_string()])
            .await
            .unwrap();

        assert_eq!(report.updated, vec!["a".to_string()]);
        assert_eq!(tree.get(&ctx, "a").await.unwrap().title, "Replaced");
    }

    #[tokio::test]
    async fn test_same_doc_in_another_locale_is_classified_separately() {
        let (resolver, _tree, store, ctx) = setup().await;
        let mut existing = Page::new("a", "fr", Mode::Draft, "default-page", "A");
        existing.path = "fr-home/a".to_string();
        existing.level = 1;
        existing.slug = "/a".to_string();
        store.insert(existing).await.unwrap();

        let mut french = record("a", "remote-home/a", "/a", "default-page");
        french.apos_locale = "fr".to_string();
        let records = vec![record("a", "remote-home/a", "/a", "default-page"), french];

        let duplicates = resolver.detect_duplicates(&ctx, &records).await.unwrap();
        assert_eq!(duplicates.inserts, vec!["a".to_string()]);
        assert_eq!(duplicates.conflicts.len(), 1);
        assert_eq!(duplicates.conflicts[0].locale, "fr");
        assert_eq!(duplicates.conflicts[0].existing_id, "a:fr:draft");

        let report = resolver
            .apply(&ctx, &records, &duplicates, &[])
            .await
            .unwrap();
        assert_eq!(report.imported, vec!["a".to_string()]);
        assert_eq!(report.skipped, vec!["a".to_string()]);
        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert!(store
            .find_one(PageQuery::by_id("a:en:draft"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_dedupe_parked_without_duplicates_is_noop() {
        let (resolver, _tree, store, ctx) = setup().await;
        let before = store.len().await;
        let report = resolver.dedupe_parked(&ctx).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.remapped, 0);
        assert_eq!(store.len().await, before);
    }
}
