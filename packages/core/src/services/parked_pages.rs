//! Parked Page Enforcer
//!
//! Parked pages are pinned by configuration: they must exist in every
//! locale and mode, and the fields their configuration names are read-only
//! through ordinary edits. `ParkedPages` materializes the configured set and
//! restores drifted parked fields.
//!
//! Reconciliation is a function of `(config, store state)`: running it
//! twice in a row writes nothing the second time.

use crate::config::ParkedPageSpec;
use crate::db::{PageField, PageQuery, TreeEvent};
use crate::models::{Mode, Page, PageId, Position, TargetRef};
use crate::services::context::RequestContext;
use crate::services::error::PageTreeError;
use crate::services::page_tree::{NewPage, PageTree};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Pages created or corrected by a reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
    }
}

/// Enforcer for the configured parked pages
#[derive(Debug, Clone)]
pub struct ParkedPages {
    tree: PageTree,
}

impl ParkedPages {
    pub fn new(tree: PageTree) -> Self {
        Self { tree }
    }

    pub fn specs(&self) -> Vec<ParkedPageSpec> {
        self.tree.config().parked_specs()
    }

    /// Startup pass: default locale draft then published, then every other
    /// configured locale
    pub async fn initialize(&self) -> Result<ReconcileReport, PageTreeError> {
        let config = self.tree.config();
        let base = RequestContext::draft(config.default_locale.clone());
        let mut report = ReconcileReport::default();
        for locale in config.all_locales() {
            let ctx = base.with_locale(locale);
            for mode in Mode::live() {
                report.merge(self.reconcile(&ctx.with_mode(mode)).await?);
            }
        }
        info!(
            "Parked pages initialized: {} created, {} updated",
            report.created.len(),
            report.updated.len()
        );
        Ok(report)
    }

    /// Rerun for one locale once its pages were replicated from another
    pub async fn after_locale_replication(
        &self,
        locale: &str,
    ) -> Result<ReconcileReport, PageTreeError> {
        let ctx = RequestContext::draft(locale);
        let mut report = ReconcileReport::default();
        for mode in Mode::live() {
            report.merge(self.reconcile(&ctx.with_mode(mode)).await?);
        }
        Ok(report)
    }

    /// Reconcile every parked spec in the request's locale and mode
    pub async fn reconcile(&self, ctx: &RequestContext) -> Result<ReconcileReport, PageTreeError> {
        self.tree
            .lock()
            .run(ctx, self.reconcile_locked(ctx))
            .await
    }

    async fn reconcile_locked(
        &self,
        ctx: &RequestContext,
    ) -> Result<ReconcileReport, PageTreeError> {
        let mut report = ReconcileReport::default();

        // Depth-first: children follow their parent, inheriting its slug
        let mut pending: Vec<(ParkedPageSpec, Option<String>)> = self
            .specs()
            .into_iter()
            .rev()
            .map(|spec| (spec, None))
            .collect();

        while let Some((mut spec, inherited_parent)) = pending.pop() {
            if spec.parent.is_none() {
                spec.parent = inherited_parent;
            }

            match self.tree.find_parked(ctx, &spec.parked_id).await? {
                Some(existing) => {
                    let id = existing.id.clone();
                    if self.restore_parked_fields(ctx, &spec, existing).await? {
                        report.updated.push(id);
                    }
                }
                None => match self.create(ctx, &spec).await? {
                    Some(created) => report.created.push(created.id),
                    None => continue,
                },
            }

            for child in spec.children.iter().rev() {
                pending.push((child.clone(), Some(spec.slug.clone())));
            }
        }

        debug!(
            "Reconciled parked pages for {}:{} ({} created, {} updated)",
            ctx.locale(),
            ctx.mode(),
            report.created.len(),
            report.updated.len()
        );
        Ok(report)
    }

    /// Overwrite drifted parked fields; true when anything was written
    async fn restore_parked_fields(
        &self,
        ctx: &RequestContext,
        spec: &ParkedPageSpec,
        existing: Page,
    ) -> Result<bool, PageTreeError> {
        let mut updated = existing.clone();
        if !apply_parked(spec, &mut updated)? {
            return Ok(false);
        }

        self.tree.write_fields(ctx, &existing, updated).await?;
        info!("Restored parked fields of {}", existing.id);
        self.tree.emit_event(TreeEvent::ParkedPageReconciled {
            page_id: existing.id,
            created: false,
        });
        Ok(true)
    }

    /// Create a missing parked page; `None` when its parent does not exist
    async fn create(
        &self,
        ctx: &RequestContext,
        spec: &ParkedPageSpec,
    ) -> Result<Option<Page>, PageTreeError> {
        let manager = self.tree.types().require(&spec.page_type)?;

        let mut fields = manager.new_instance();
        fields.extend(spec.defaults.clone());
        fields.extend(spec.fields.clone());
        let title = spec
            .title
            .clone()
            .or_else(|| {
                fields
                    .remove("title")
                    .and_then(|v| v.as_str().map(str::to_string))
            })
            .unwrap_or_else(|| spec.parked_id.clone());

        // Reuse the aposDocId this parkedId has in any other locale or mode
        let bound = self
            .tree
            .store()
            .distinct(
                PageField::DocId,
                PageQuery::new().with_parked_id(spec.parked_id.clone()),
            )
            .await?;
        let doc_id = match bound.into_iter().next() {
            Some(doc_id) => doc_id,
            None => self.tree.generate_id(),
        };

        let new_page = NewPage {
            id: Some(PageId::compose(&doc_id, ctx.locale(), ctx.mode())),
            page_type: Some(spec.page_type.clone()),
            title,
            slug: Some(spec.slug.clone()),
            orphan: spec.orphan.unwrap_or(false),
            parked: spec.parked_fields(),
            parked_id: Some(spec.parked_id.clone()),
            last_published_at: Some(Utc::now()),
            relationships: Default::default(),
            fields,
        };

        let page = if spec.is_root() {
            self.tree.insert_root(ctx, new_page).await?
        } else {
            let parent_slug = spec.parent.clone().unwrap_or_else(|| "/".to_string());
            let query = PageQuery::scoped(ctx.locale(), ctx.mode()).with_slug(parent_slug.clone());
            let Some(parent) = self.tree.store().find_one(query).await? else {
                warn!(
                    "Parent {} of parked page {} not found in {}:{}; skipping",
                    parent_slug,
                    spec.parked_id,
                    ctx.locale(),
                    ctx.mode()
                );
                return Ok(None);
            };
            self.tree
                .insert(ctx, TargetRef::Id(parent.id), Position::LastChild, new_page)
                .await?
        };

        // Insert derives `archived` from the parent; the configuration may pin it
        let mut pinned = page.clone();
        let page = if apply_parked(spec, &mut pinned)? {
            self.tree.write_fields(ctx, &page, pinned).await?;
            self.tree.get(ctx, &page.id).await?
        } else {
            page
        };

        info!("Created parked page {} ({})", page.id, spec.parked_id);
        self.tree.emit_event(TreeEvent::ParkedPageReconciled {
            page_id: page.id.clone(),
            created: true,
        });
        Ok(Some(page))
    }
}

/// Force the configured parked values onto `page`; true when anything changed
fn apply_parked(spec: &ParkedPageSpec, page: &mut Page) -> Result<bool, PageTreeError> {
    let names = spec.parked_fields();
    let mut changed = false;

    for name in &names {
        let Some(desired) = spec.parked_value(name) else {
            continue;
        };
        if page.field_value(name).as_ref() != Some(&desired) {
            page.set_field(name, desired)
                .map_err(PageTreeError::invalid)?;
            changed = true;
        }
    }

    if page.parked != names {
        page.parked = names;
        changed = true;
    }
    Ok(changed)
}
