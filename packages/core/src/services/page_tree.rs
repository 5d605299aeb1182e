//! Page Tree Orchestrator
//!
//! `PageTree` owns every structural mutation of the page tree. Each public
//! mutation runs as `acquire lock → body → release`, reads the neighborhood
//! it needs from the [`PageStore`], asks the pure engine in
//! [`crate::operations`] what to write, and writes it.
//!
//! # Consistency
//!
//! The store offers no transactions. Writes are ordered so that readers see
//! either the old or the new position of a page, never a duplicate rank:
//! siblings are nudged before the moved page takes its rank, and descendants
//! follow their ancestor. Unique slug conflicts raised while cascading are
//! narrowed to a path-only write rather than failing the move.
//!
//! # Events
//!
//! Every completed mutation emits a [`TreeEvent`] on a broadcast channel;
//! see [`PageTree::subscribe_to_events`].

use crate::config::{TreeConfig, ARCHIVE_PARKED_ID};
use crate::db::{PageMutation, PagePatch, PageQuery, PageStore, SortOrder, TreeEvent};
use crate::models::{
    child_path, is_valid_slug, join_slug, path_level, slugify, ChangeSet, Mode, Page, PageId,
    Position, TargetRef,
};
use crate::operations::{
    check_not_self_ancestor, check_parent_published, moved_slug, repair_plan, resolve_placement,
    Relocation,
};
use crate::services::context::RequestContext;
use crate::services::error::PageTreeError;
use crate::services::tree_lock::{LocalLockService, LockService, TreeLock};
use crate::services::type_registry::{
    AllowAll, IdGenerator, PageTypeRegistry, TreePermissions, UuidIdGenerator,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// Broadcast channel capacity for tree events
const TREE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Input for [`PageTree::insert`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewPage {
    /// Explicit `_id`; must carry the request's `:{locale}:{mode}` suffix
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,

    pub title: String,

    /// Defaults to the parent slug plus the slugified title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,

    pub orphan: bool,

    pub parked: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parked_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<DateTime<Utc>>,

    pub relationships: BTreeMap<String, Vec<String>>,

    pub fields: Map<String, Value>,
}

impl NewPage {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, page_type: impl Into<String>) -> Self {
        self.page_type = Some(page_type.into());
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Result of [`PageTree::archive`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    /// Slug of the page's parent before it was archived
    pub parent_slug: String,
    pub changes: ChangeSet,
}

/// Orchestrator for structural mutations of the page tree
#[derive(Clone)]
pub struct PageTree {
    pub(crate) store: Arc<dyn PageStore>,
    lock: TreeLock,
    types: Arc<PageTypeRegistry>,
    ids: Arc<dyn IdGenerator>,
    permissions: Arc<dyn TreePermissions>,
    config: Arc<TreeConfig>,
    event_tx: broadcast::Sender<TreeEvent>,
}

impl PageTree {
    /// Create a tree over `store`
    ///
    /// Uses a process-local lock, the default page types, UUID ids and no
    /// permission checks; replace any of them with the `with_*` builders.
    pub fn new(store: Arc<dyn PageStore>, config: TreeConfig) -> Result<Self, PageTreeError> {
        config.validate().map_err(PageTreeError::invalid)?;

        let lock_service = Arc::new(LocalLockService::new(Duration::from_millis(
            config.lock_wait_ms,
        )));
        let types = PageTypeRegistry::with_defaults(
            &config.home_type,
            &config.archive_type,
            &config.default_type,
        );
        let (event_tx, _) = broadcast::channel(TREE_EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            store,
            lock: TreeLock::new(lock_service, config.lock_name.clone()),
            types: Arc::new(types),
            ids: Arc::new(UuidIdGenerator),
            permissions: Arc::new(AllowAll),
            config: Arc::new(config),
            event_tx,
        })
    }

    pub fn with_lock_service(mut self, service: Arc<dyn LockService>) -> Self {
        self.lock = TreeLock::new(service, self.config.lock_name.clone());
        self
    }

    pub fn with_types(mut self, types: PageTypeRegistry) -> Self {
        self.types = Arc::new(types);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn TreePermissions>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn types(&self) -> &PageTypeRegistry {
        &self.types
    }

    pub(crate) fn lock(&self) -> &TreeLock {
        &self.lock
    }

    pub(crate) fn generate_id(&self) -> String {
        self.ids.generate()
    }

    /// Subscribe to tree events
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors; there may be no subscribers.
    pub(crate) fn emit_event(&self, event: TreeEvent) {
        debug!("Emitting {}", event.event_type());
        let _ = self.event_tx.send(event);
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    /// Full `_id` for `id`, which may be a bare `aposDocId`
    pub fn resolve_id(&self, ctx: &RequestContext, id: &str) -> String {
        if PageId::parse(id).is_some() {
            id.to_string()
        } else {
            ctx.page_id(id)
        }
    }

    pub async fn find(&self, ctx: &RequestContext, id: &str) -> Result<Option<Page>, PageTreeError> {
        let id = self.resolve_id(ctx, id);
        Ok(self.store.find_one(PageQuery::by_id(id)).await?)
    }

    pub async fn get(&self, ctx: &RequestContext, id: &str) -> Result<Page, PageTreeError> {
        self.find(ctx, id)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("page {}", id)))
    }

    pub async fn find_home(&self, ctx: &RequestContext) -> Result<Option<Page>, PageTreeError> {
        let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_level(0);
        Ok(self.store.find_one(query).await?)
    }

    pub async fn home(&self, ctx: &RequestContext) -> Result<Page, PageTreeError> {
        self.find_home(ctx)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("home page for {}", ctx.locale())))
    }

    pub async fn find_archive(&self, ctx: &RequestContext) -> Result<Option<Page>, PageTreeError> {
        let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_parked_id(ARCHIVE_PARKED_ID);
        Ok(self.store.find_one(query).await?)
    }

    pub async fn archive_root(&self, ctx: &RequestContext) -> Result<Page, PageTreeError> {
        self.find_archive(ctx)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("archive page for {}", ctx.locale())))
    }

    pub async fn find_parked(
        &self,
        ctx: &RequestContext,
        parked_id: &str,
    ) -> Result<Option<Page>, PageTreeError> {
        let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_parked_id(parked_id);
        Ok(self.store.find_one(query).await?)
    }

    /// Direct children ordered by rank
    pub async fn children(
        &self,
        ctx: &RequestContext,
        page: &Page,
    ) -> Result<Vec<Page>, PageTreeError> {
        let query = PageQuery::scoped(ctx.locale(), ctx.mode())
            .with_path_prefix(page.path.clone())
            .with_level(page.level + 1)
            .sorted(SortOrder::Rank);
        Ok(self.store.find(query).await?)
    }

    /// Every descendant, shallow first
    pub async fn descendants(
        &self,
        ctx: &RequestContext,
        page: &Page,
    ) -> Result<Vec<Page>, PageTreeError> {
        let query = PageQuery::scoped(ctx.locale(), ctx.mode())
            .with_path_prefix(page.path.clone())
            .sorted(SortOrder::LevelRank);
        Ok(self.store.find(query).await?)
    }

    pub async fn parent(
        &self,
        ctx: &RequestContext,
        page: &Page,
    ) -> Result<Option<Page>, PageTreeError> {
        let Some(parent_path) = page.parent_path() else {
            return Ok(None);
        };
        let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_path(parent_path);
        Ok(self.store.find_one(query).await?)
    }

    async fn resolve_target(
        &self,
        ctx: &RequestContext,
        target: &TargetRef,
    ) -> Result<Option<Page>, PageTreeError> {
        match target {
            TargetRef::Home => self.find_home(ctx).await,
            TargetRef::Archive => self.find_archive(ctx).await,
            TargetRef::Id(id) => self.find(ctx, id).await,
        }
    }

    async fn load_changes(&self, ids: Vec<String>) -> Result<ChangeSet, PageTreeError> {
        let mut changes = ChangeSet::new();
        if ids.is_empty() {
            return Ok(changes);
        }
        for page in self.store.find(PageQuery::new().with_ids(ids)).await? {
            changes.record_page(&page);
        }
        Ok(changes)
    }

    // ---------------------------------------------------------------------
    // Write helpers
    // ---------------------------------------------------------------------

    /// Shift siblings under `parent` at or after `from` up by one rank
    ///
    /// Covers the draft and published variants of the request locale and
    /// skips every variant of the pages in `exclude_doc_ids`.
    async fn nudge(
        &self,
        ctx: &RequestContext,
        parent: &Page,
        from: i64,
        exclude_doc_ids: &[&str],
    ) -> Result<ChangeSet, PageTreeError> {
        let query = PageQuery::new()
            .with_locale(ctx.locale())
            .with_modes(Mode::live().to_vec())
            .with_path_prefix(parent.path.clone())
            .with_level(parent.level + 1)
            .with_rank_gte(from);
        let ids: Vec<String> = self
            .store
            .find(query)
            .await?
            .into_iter()
            .filter(|page| !exclude_doc_ids.contains(&page.apos_doc_id.as_str()))
            .map(|page| page.id)
            .collect();
        if ids.is_empty() {
            return Ok(ChangeSet::new());
        }

        debug!("Nudging {} siblings under {} from rank {}", ids.len(), parent.id, from);
        self.store
            .update_many(
                PageQuery::new().with_ids(ids.clone()),
                PageMutation::IncrementRank { by: 1 },
            )
            .await?;
        self.load_changes(ids).await
    }

    /// Write a positional patch, narrowing to a path-only write on a slug
    /// conflict
    ///
    /// Returns false when the second attempt also conflicted and the write
    /// was dropped.
    async fn write_patch(&self, id: &str, patch: PagePatch) -> Result<bool, PageTreeError> {
        if patch.is_empty() {
            return Ok(true);
        }
        let query = PageQuery::by_id(id);
        match self
            .store
            .update_many(query.clone(), PageMutation::Set(patch.clone()))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_duplicate_key() && patch.slug.is_some() => {
                warn!("Slug conflict updating {}: {}; retrying without slug", id, e);
                match self
                    .store
                    .update_many(query, PageMutation::Set(patch.without_slug()))
                    .await
                {
                    Ok(_) => Ok(true),
                    Err(e) if e.is_duplicate_key() => {
                        warn!("Dropping positional update of {}: {}", id, e);
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a relocation to every descendant of `page`, returning the ids
    /// that were written
    async fn cascade(
        &self,
        ctx: &RequestContext,
        page: &Page,
        relocation: &Relocation<'_>,
    ) -> Result<Vec<String>, PageTreeError> {
        let descendants = self.descendants(ctx, page).await?;
        let mut written = Vec::new();
        for (id, patch) in relocation.cascade(&descendants) {
            if self.write_patch(&id, patch).await? {
                written.push(id);
            }
        }
        Ok(written)
    }

    // ---------------------------------------------------------------------
    // Insert
    // ---------------------------------------------------------------------

    /// Insert a new page relative to `target`
    #[instrument(skip(self, ctx, new_page), fields(locale = ctx.locale(), mode = %ctx.mode()))]
    pub async fn insert(
        &self,
        ctx: &RequestContext,
        target: TargetRef,
        position: Position,
        new_page: NewPage,
    ) -> Result<Page, PageTreeError> {
        self.lock
            .run(ctx, self.insert_locked(ctx, target, position, new_page))
            .await
    }

    async fn insert_locked(
        &self,
        ctx: &RequestContext,
        target: TargetRef,
        position: Position,
        new_page: NewPage,
    ) -> Result<Page, PageTreeError> {
        let type_name = new_page
            .page_type
            .clone()
            .unwrap_or_else(|| self.config.default_type.clone());
        let manager = self.types.require(&type_name)?;

        let target_page = self
            .resolve_target(ctx, &target)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("target {}", target)))?;

        let children = if position.is_child() || matches!(position, Position::Index(_)) {
            self.children(ctx, &target_page).await?
        } else {
            Vec::new()
        };
        let archive = self.find_archive(ctx).await?;
        let placement = resolve_placement(
            &target_page,
            position,
            &children,
            None,
            archive.as_ref().map(|a| a.apos_doc_id.as_str()),
        )?;

        let parent = if placement.parent_is_anchor() {
            placement.anchor.clone()
        } else {
            self.parent(ctx, &placement.anchor)
                .await?
                .ok_or_else(|| PageTreeError::not_found(format!("parent of {}", placement.anchor.id)))?
        };

        if !self.permissions.can_create_child(ctx, &parent) {
            return Err(PageTreeError::forbidden(format!(
                "not allowed to create pages under {}",
                parent.id
            )));
        }

        let doc_id = match &new_page.id {
            Some(id) => explicit_doc_id(ctx, id)?,
            None => self.ids.generate(),
        };

        let mut page = Page::new(doc_id.as_str(), ctx.locale(), ctx.mode(), &type_name, &new_page.title);
        page.fields = manager.new_instance();
        page.fields.extend(new_page.fields);
        page.orphan = new_page.orphan;
        page.parked = new_page.parked;
        page.parked_id = new_page.parked_id;
        page.last_published_at = new_page.last_published_at;
        page.relationships = new_page.relationships;
        page.path = child_path(&parent.path, &doc_id);
        page.level = path_level(&page.path);
        page.rank = placement.rank;
        page.archived = parent.archived;

        check_parent_published(&page, &parent)?;

        let slug = match new_page.slug {
            Some(slug) => slug,
            None => join_slug(&parent.slug, &slugify(&new_page.title)),
        };
        if !is_valid_slug(&slug) {
            return Err(PageTreeError::invalid(format!("invalid slug '{}'", slug)));
        }

        if let Some(from) = placement.nudge_from {
            self.nudge(ctx, &parent, from, &[doc_id.as_str()]).await?;
        }

        let page = self.insert_with_unique_slug(page, &slug).await?;
        info!("Inserted {} at {} (rank {})", page.id, page.path, page.rank);
        self.emit_event(TreeEvent::PageInserted { page: page.change() });
        Ok(page)
    }

    /// Insert, suffixing the slug with `-2`, `-3`, ... while it is taken
    async fn insert_with_unique_slug(
        &self,
        mut page: Page,
        slug: &str,
    ) -> Result<Page, PageTreeError> {
        for attempt in 1..=self.config.max_slug_attempts {
            page.slug = if attempt == 1 {
                slug.to_string()
            } else {
                format!("{}-{}", slug, attempt)
            };
            match self.store.insert(page.clone()).await {
                Ok(inserted) => return Ok(inserted),
                Err(e) if e.is_duplicate_on("slug") => {
                    debug!("Slug {} taken, trying next suffix", page.slug);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PageTreeError::conflict("slug", slug))
    }

    /// Insert the tree root for the request's locale and mode
    pub async fn insert_root(
        &self,
        ctx: &RequestContext,
        new_page: NewPage,
    ) -> Result<Page, PageTreeError> {
        self.lock.run(ctx, self.insert_root_locked(ctx, new_page)).await
    }

    async fn insert_root_locked(
        &self,
        ctx: &RequestContext,
        new_page: NewPage,
    ) -> Result<Page, PageTreeError> {
        if let Some(home) = self.find_home(ctx).await? {
            return Err(PageTreeError::forbidden(format!(
                "root page {} already exists",
                home.id
            )));
        }
        let type_name = new_page
            .page_type
            .clone()
            .unwrap_or_else(|| self.config.home_type.clone());
        let manager = self.types.require(&type_name)?;

        let doc_id = match &new_page.id {
            Some(id) => explicit_doc_id(ctx, id)?,
            None => self.ids.generate(),
        };
        let mut page = Page::new(doc_id.as_str(), ctx.locale(), ctx.mode(), &type_name, &new_page.title);
        page.fields = manager.new_instance();
        page.fields.extend(new_page.fields);
        page.slug = new_page.slug.unwrap_or_else(|| "/".to_string());
        page.orphan = new_page.orphan;
        page.parked = new_page.parked;
        page.parked_id = new_page.parked_id;
        page.last_published_at = new_page.last_published_at;
        page.relationships = new_page.relationships;

        let page = self.store.insert(page).await?;
        info!("Inserted root page {}", page.id);
        self.emit_event(TreeEvent::PageInserted { page: page.change() });
        Ok(page)
    }

    // ---------------------------------------------------------------------
    // Move
    // ---------------------------------------------------------------------

    /// Move a page (and its subtree) relative to `target`
    ///
    /// Returns every positional change, including nudged siblings and
    /// cascaded descendants.
    #[instrument(skip(self, ctx), fields(locale = ctx.locale(), mode = %ctx.mode()))]
    pub async fn move_page(
        &self,
        ctx: &RequestContext,
        moved_id: &str,
        target: TargetRef,
        position: Position,
    ) -> Result<ChangeSet, PageTreeError> {
        self.lock
            .run(ctx, self.move_locked(ctx, moved_id, target, position))
            .await
    }

    async fn move_locked(
        &self,
        ctx: &RequestContext,
        moved_id: &str,
        target: TargetRef,
        position: Position,
    ) -> Result<ChangeSet, PageTreeError> {
        let moved = self.get(ctx, moved_id).await?;

        let mut target_page = self.resolve_target(ctx, &target).await?;
        if target_page.is_none() && ctx.mode() == Mode::Published && position.is_sibling() {
            debug!("Published target {} missing, falling back to draft", target);
            let draft_target = match &target {
                TargetRef::Id(id) => TargetRef::Id(PageId::doc_id_of(id).to_string()),
                other => other.clone(),
            };
            target_page = self
                .resolve_target(&ctx.with_mode(Mode::Draft), &draft_target)
                .await?;
        }
        let target_page =
            target_page.ok_or_else(|| PageTreeError::not_found(format!("target {}", target)))?;

        if moved.is_root() {
            return Err(PageTreeError::forbidden("cannot move the root page"));
        }
        if moved.parked_id.as_deref() == Some(ARCHIVE_PARKED_ID) {
            return Err(PageTreeError::forbidden("cannot move the archive page"));
        }
        if moved.is_parked() {
            return Err(PageTreeError::forbidden(format!(
                "cannot move parked page {}",
                moved.id
            )));
        }

        let old_parent = self
            .parent(ctx, &moved)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("parent of {}", moved.id)))?;

        let children = if position.is_child() || matches!(position, Position::Index(_)) {
            self.children(ctx, &target_page).await?
        } else {
            Vec::new()
        };
        let archive = self.find_archive(ctx).await?;
        let placement = resolve_placement(
            &target_page,
            position,
            &children,
            Some(&moved.apos_doc_id),
            archive.as_ref().map(|a| a.apos_doc_id.as_str()),
        )?;

        let new_parent = if placement.parent_is_anchor() {
            placement.anchor.clone()
        } else {
            self.parent(ctx, &placement.anchor)
                .await?
                .ok_or_else(|| PageTreeError::not_found(format!("parent of {}", placement.anchor.id)))?
        };

        check_not_self_ancestor(&moved, &new_parent)?;
        check_parent_published(&moved, &new_parent)?;

        self.emit_event(TreeEvent::BeforeMove {
            page_id: moved.id.clone(),
            target_id: placement.anchor.id.clone(),
            position: placement.position,
        });

        let mut changes = ChangeSet::new();
        if let Some(from) = placement.nudge_from {
            changes.extend(
                self.nudge(ctx, &new_parent, from, &[moved.apos_doc_id.as_str()])
                    .await?,
            );
        }

        let into_archive = new_parent.archived;
        let new_path = child_path(&new_parent.path, &moved.apos_doc_id);
        let patch = PagePatch {
            path: Some(new_path.clone()),
            slug: Some(moved_slug(&moved, &old_parent.slug, &new_parent.slug, into_archive)),
            level: Some(path_level(&new_path)),
            rank: Some(placement.rank),
            archived: Some(new_parent.archived),
            last_published_at: None,
        };
        self.write_patch(&moved.id, patch).await?;

        let relocated = self.get(ctx, &moved.id).await?;
        changes.record_page(&relocated);

        let relocation = Relocation {
            old_path: &moved.path,
            new_path: &relocated.path,
            old_slug: &moved.slug,
            new_slug: &relocated.slug,
            archived: Some(relocated.archived),
            into_archive,
        };
        let written = self.cascade(ctx, &moved, &relocation).await?;
        changes.extend(self.load_changes(written).await?);

        info!(
            "Moved {} {} {} ({} changes)",
            moved.id,
            placement.position,
            placement.anchor.id,
            changes.len()
        );
        self.emit_event(TreeEvent::AfterMove {
            page_id: moved.id.clone(),
            changes: changes.clone(),
        });
        Ok(changes)
    }

    // ---------------------------------------------------------------------
    // Archive / restore
    // ---------------------------------------------------------------------

    /// Move a page to the top of the archive
    pub async fn archive(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ArchiveOutcome, PageTreeError> {
        self.lock.run(ctx, self.archive_locked(ctx, id)).await
    }

    async fn archive_locked(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> Result<ArchiveOutcome, PageTreeError> {
        let archive = self.archive_root(ctx).await?;
        let page = self.get(ctx, id).await?;
        let parent = self
            .parent(ctx, &page)
            .await?
            .ok_or_else(|| PageTreeError::forbidden(format!("{} has no parent", page.id)))?;

        let changes = self
            .move_page(
                ctx,
                &page.id,
                TargetRef::Id(archive.id.clone()),
                Position::FirstChild,
            )
            .await?;

        self.emit_event(TreeEvent::PageArchived {
            page_id: page.id.clone(),
            parent_slug: parent.slug.clone(),
        });
        Ok(ArchiveOutcome {
            parent_slug: parent.slug,
            changes,
        })
    }

    /// Move an archived page back into the live tree
    ///
    /// Defaults to the last child of the home page.
    pub async fn restore(
        &self,
        ctx: &RequestContext,
        id: &str,
        destination: Option<(TargetRef, Position)>,
    ) -> Result<ChangeSet, PageTreeError> {
        self.lock
            .run(ctx, self.restore_locked(ctx, id, destination))
            .await
    }

    async fn restore_locked(
        &self,
        ctx: &RequestContext,
        id: &str,
        destination: Option<(TargetRef, Position)>,
    ) -> Result<ChangeSet, PageTreeError> {
        let page = self.get(ctx, id).await?;
        if !page.archived {
            return Err(PageTreeError::invalid(format!("{} is not archived", page.id)));
        }

        let (target, position) = destination.unwrap_or((TargetRef::Home, Position::LastChild));
        let target_page = self
            .resolve_target(ctx, &target)
            .await?
            .ok_or_else(|| PageTreeError::not_found(format!("target {}", target)))?;
        if target_page.archived {
            return Err(PageTreeError::invalid(format!(
                "cannot restore into archived page {}",
                target_page.id
            )));
        }

        let changes = self
            .move_page(ctx, &page.id, TargetRef::Id(target_page.id.clone()), position)
            .await?;
        self.emit_event(TreeEvent::PageRestored {
            page_id: page.id.clone(),
        });
        Ok(changes)
    }

    // ---------------------------------------------------------------------
    // Field updates
    // ---------------------------------------------------------------------

    /// Overwrite parked fields of `input` with the persisted values
    pub fn enforce_parked(&self, existing: &Page, input: &mut Map<String, Value>) {
        for name in &existing.parked {
            match existing.field_value(name) {
                Some(value) => {
                    input.insert(name.clone(), value);
                }
                None => {
                    input.remove(name);
                }
            }
        }
    }

    /// Partial update
    ///
    /// Parked fields are enforced first. A `_targetId` (with an optional
    /// `_position`, default `lastChild`) moves the page after the fields
    /// are written.
    pub async fn patch(
        &self,
        ctx: &RequestContext,
        id: &str,
        input: Map<String, Value>,
    ) -> Result<(Page, ChangeSet), PageTreeError> {
        self.lock.run(ctx, self.patch_locked(ctx, id, input)).await
    }

    async fn patch_locked(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut input: Map<String, Value>,
    ) -> Result<(Page, ChangeSet), PageTreeError> {
        let existing = self.get(ctx, id).await?;
        if !self.permissions.can_edit(ctx, &existing) {
            return Err(PageTreeError::forbidden(format!(
                "not allowed to edit {}",
                existing.id
            )));
        }

        self.enforce_parked(&existing, &mut input);
        let relocation = take_move_directive(&mut input)?;

        let type_name = input
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(&existing.page_type)
            .to_string();
        let manager = self.types.require(&type_name)?;

        let mut updated = existing.clone();
        manager.convert(&input, &mut updated)?;

        let mut changes = self.write_fields(ctx, &existing, updated).await?;

        if let Some((target, position)) = relocation {
            changes.extend(self.move_page(ctx, &existing.id, target, position).await?);
        }

        let page = self.get(ctx, &existing.id).await?;
        Ok((page, changes))
    }

    /// Full replacement of a page's editable content
    ///
    /// Parked and structural fields keep their persisted values.
    pub async fn update(&self, ctx: &RequestContext, page: Page) -> Result<Page, PageTreeError> {
        self.lock.run(ctx, self.update_locked(ctx, page)).await
    }

    async fn update_locked(
        &self,
        ctx: &RequestContext,
        mut page: Page,
    ) -> Result<Page, PageTreeError> {
        let existing = self.get(ctx, &page.id).await?;
        if !self.permissions.can_edit(ctx, &existing) {
            return Err(PageTreeError::forbidden(format!(
                "not allowed to edit {}",
                existing.id
            )));
        }
        self.types.require(&page.page_type)?;

        for name in &existing.parked {
            let value = existing.field_value(name).unwrap_or(Value::Null);
            page.set_field(name, value).map_err(PageTreeError::invalid)?;
        }
        page.apos_doc_id = existing.apos_doc_id.clone();
        page.apos_locale = existing.apos_locale.clone();
        page.apos_mode = existing.apos_mode;
        page.path = existing.path.clone();
        page.level = existing.level;
        page.rank = existing.rank;
        page.archived = existing.archived;
        page.parked = existing.parked.clone();
        page.parked_id = existing.parked_id.clone();
        page.last_published_at = existing.last_published_at;
        page.created_at = existing.created_at;

        if !is_valid_slug(&page.slug) {
            return Err(PageTreeError::invalid(format!("invalid slug '{}'", page.slug)));
        }

        self.write_fields(ctx, &existing, page).await?;
        self.get(ctx, &existing.id).await
    }

    /// Persist `updated` and cascade a slug change to descendants
    pub(crate) async fn write_fields(
        &self,
        ctx: &RequestContext,
        existing: &Page,
        updated: Page,
    ) -> Result<ChangeSet, PageTreeError> {
        let saved = self.store.update(updated).await?;
        let mut changes = ChangeSet::new();

        if saved.slug != existing.slug {
            changes.record_page(&saved);
            let relocation = Relocation::slug_only(&existing.path, &existing.slug, &saved.slug);
            let written = self.cascade(ctx, existing, &relocation).await?;
            changes.extend(self.load_changes(written).await?);
        }

        self.emit_event(TreeEvent::PageUpdated {
            page_id: saved.id.clone(),
        });
        Ok(changes)
    }

    /// Delete a leaf page
    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<(), PageTreeError> {
        self.lock.run(ctx, self.delete_locked(ctx, id)).await
    }

    async fn delete_locked(&self, ctx: &RequestContext, id: &str) -> Result<(), PageTreeError> {
        let page = self.get(ctx, id).await?;
        if page.is_root() {
            return Err(PageTreeError::forbidden("cannot delete the root page"));
        }
        if page.is_parked() {
            return Err(PageTreeError::forbidden(format!(
                "cannot delete parked page {}",
                page.id
            )));
        }
        if !self.children(ctx, &page).await?.is_empty() {
            return Err(PageTreeError::forbidden(format!(
                "{} still has child pages",
                page.id
            )));
        }

        self.store.delete(&page.id).await?;
        info!("Deleted {}", page.id);
        self.emit_event(TreeEvent::PageDeleted { page_id: page.id });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Publish / localize
    // ---------------------------------------------------------------------

    /// Copy the draft of a page to its published variant
    ///
    /// The replaced published copy is kept as the `previous` variant.
    pub async fn publish(&self, ctx: &RequestContext, id: &str) -> Result<Page, PageTreeError> {
        self.lock.run(ctx, self.publish_locked(ctx, id)).await
    }

    async fn publish_locked(&self, ctx: &RequestContext, id: &str) -> Result<Page, PageTreeError> {
        let draft_ctx = ctx.with_mode(Mode::Draft);
        let published_ctx = ctx.with_mode(Mode::Published);
        let doc_id = PageId::doc_id_of(id).to_string();
        let draft = self.get(&draft_ctx, &doc_id).await?;

        if let Some(parent_path) = draft.parent_path() {
            let query = PageQuery::scoped(ctx.locale(), Mode::Published).with_path(parent_path);
            match self.store.find_one(query).await? {
                Some(parent) if parent.last_published_at.is_some() => {}
                _ => {
                    return Err(PageTreeError::forbidden(format!(
                        "publish the parent of {} first",
                        draft.id
                    )))
                }
            }
        }

        let now = Utc::now();
        let mut published = draft.as_variant(ctx.locale(), Mode::Published);
        published.last_published_at = Some(now);

        let published = match self.find(&published_ctx, &doc_id).await? {
            Some(old) => {
                let previous_id = PageId::compose(&doc_id, ctx.locale(), Mode::Previous);
                self.store.delete(&previous_id).await?;
                self.store
                    .insert(old.as_variant(ctx.locale(), Mode::Previous))
                    .await?;
                published.created_at = old.created_at;
                self.store.update(published).await?
            }
            None => self.store.insert(published).await?,
        };

        self.store
            .update_many(
                PageQuery::by_id(draft.id.clone()),
                PageMutation::Set(PagePatch {
                    last_published_at: Some(now),
                    ..Default::default()
                }),
            )
            .await?;

        info!("Published {}", published.id);
        self.emit_event(TreeEvent::PagePublished {
            page_id: published.id.clone(),
        });
        Ok(published)
    }

    /// Copy the draft of a page into another locale
    pub async fn localize(
        &self,
        ctx: &RequestContext,
        id: &str,
        locale: &str,
    ) -> Result<Page, PageTreeError> {
        self.lock.run(ctx, self.localize_locked(ctx, id, locale)).await
    }

    async fn localize_locked(
        &self,
        ctx: &RequestContext,
        id: &str,
        locale: &str,
    ) -> Result<Page, PageTreeError> {
        let source_ctx = ctx.with_mode(Mode::Draft);
        let target_ctx = source_ctx.with_locale(locale);
        let doc_id = PageId::doc_id_of(id).to_string();
        let source = self.get(&source_ctx, &doc_id).await?;

        if let Some(existing) = self.find(&target_ctx, &doc_id).await? {
            return Err(PageTreeError::conflict("_id", existing.id));
        }

        let mut localized = source.as_variant(locale, Mode::Draft);
        localized.last_published_at = None;

        if let Some(parent_path) = source.parent_path() {
            let query = PageQuery::scoped(locale, Mode::Draft).with_path(parent_path);
            let parent = self.store.find_one(query).await?.ok_or_else(|| {
                PageTreeError::invalid(format!(
                    "parent of {} is not localized in {}",
                    source.id, locale
                ))
            })?;
            let siblings = self.children(&target_ctx, &parent).await?;
            if siblings.iter().any(|s| s.rank == localized.rank) {
                localized.rank = siblings.iter().map(|s| s.rank).max().unwrap_or(0) + 1;
            }
        }

        let localized = self.store.insert(localized).await?;
        info!("Localized {} into {}", source.id, locale);
        self.emit_event(TreeEvent::PageLocalized {
            page_id: localized.id.clone(),
            locale: locale.to_string(),
        });
        Ok(localized)
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Make the ranks of a sibling group strictly increasing again
    pub async fn repair_ranks(
        &self,
        ctx: &RequestContext,
        parent_id: &str,
    ) -> Result<ChangeSet, PageTreeError> {
        self.lock.run(ctx, self.repair_ranks_locked(ctx, parent_id)).await
    }

    async fn repair_ranks_locked(
        &self,
        ctx: &RequestContext,
        parent_id: &str,
    ) -> Result<ChangeSet, PageTreeError> {
        let parent = self.get(ctx, parent_id).await?;
        let siblings = self.children(ctx, &parent).await?;
        let archive = self.find_archive(ctx).await?;
        let plan = repair_plan(&siblings, archive.as_ref().map(|a| a.apos_doc_id.as_str()));

        let mut ids = Vec::with_capacity(plan.len());
        for (id, rank) in plan {
            self.store
                .update_many(
                    PageQuery::by_id(id.clone()),
                    PageMutation::Set(PagePatch {
                        rank: Some(rank),
                        ..Default::default()
                    }),
                )
                .await?;
            ids.push(id);
        }
        if !ids.is_empty() {
            info!("Repaired {} ranks under {}", ids.len(), parent.id);
        }
        self.load_changes(ids).await
    }
}

impl std::fmt::Debug for PageTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTree")
            .field("lock", &self.lock)
            .field("types", &self.types)
            .finish()
    }
}

/// Validate an explicit `_id` against the request and extract its doc id
fn explicit_doc_id(ctx: &RequestContext, id: &str) -> Result<String, PageTreeError> {
    let parsed = PageId::parse(id).ok_or_else(|| {
        PageTreeError::invalid(format!("explicit _id '{}' needs a :locale:mode suffix", id))
    })?;
    if parsed.locale != ctx.locale() || parsed.mode != ctx.mode() {
        return Err(PageTreeError::invalid(format!(
            "explicit _id '{}' does not match {}:{}",
            id,
            ctx.locale(),
            ctx.mode()
        )));
    }
    Ok(parsed.doc_id)
}

/// Remove `_targetId`/`_position` from a patch input
fn take_move_directive(
    input: &mut Map<String, Value>,
) -> Result<Option<(TargetRef, Position)>, PageTreeError> {
    let position = input.remove("_position");
    let Some(target) = input.remove("_targetId") else {
        return Ok(None);
    };
    let target: TargetRef = match target {
        Value::String(s) => s.parse().map_err(PageTreeError::invalid)?,
        other => return Err(PageTreeError::invalid(format!("invalid _targetId {}", other))),
    };
    let position = match position {
        None | Some(Value::Null) => Position::LastChild,
        Some(Value::String(s)) => s.parse().map_err(PageTreeError::invalid)?,
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Position::Index(n as usize))
            .ok_or_else(|| PageTreeError::invalid(format!("invalid _position {}", n)))?,
        Some(other) => return Err(PageTreeError::invalid(format!("invalid _position {}", other))),
    };
    Ok(Some((target, position)))
}

#[cfg(test)]
#[path = "page_tree_test.rs"]
mod page_tree_test;
