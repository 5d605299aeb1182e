//! Batch archive/restore
//!
//! Applies plans from [`crate::operations::batch`] under a single tree lock
//! acquisition. Failures are collected per page; one bad record never
//! aborts the rest of the batch.

use crate::models::{ChangeSet, Page, Position, TargetRef};
use crate::operations::{plan_batch, BatchKind, BatchPatch};
use crate::services::context::RequestContext;
use crate::services::error::PageTreeError;
use crate::services::page_tree::PageTree;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Per-record failure in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub id: String,
    pub reason: String,
}

impl BatchFailure {
    pub fn new(id: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a batch archive or restore
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// Pages that needed no change
    pub skipped: Vec<String>,
    pub failed: Vec<BatchFailure>,
    pub changes: ChangeSet,
}

impl PageTree {
    /// Planned archive patches for a selection
    pub async fn batch_archive_patches(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<Vec<BatchPatch>, PageTreeError> {
        let (patches, _) = self.plan(ctx, BatchKind::Archive, ids).await?;
        Ok(patches)
    }

    /// Planned restore patches for a selection
    pub async fn batch_restore_patches(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<Vec<BatchPatch>, PageTreeError> {
        let (patches, _) = self.plan(ctx, BatchKind::Restore, ids).await?;
        Ok(patches)
    }

    pub async fn archive_batch(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<BatchReport, PageTreeError> {
        self.lock()
            .run(ctx, self.apply_batch(ctx, BatchKind::Archive, ids))
            .await
    }

    pub async fn restore_batch(
        &self,
        ctx: &RequestContext,
        ids: &[String],
    ) -> Result<BatchReport, PageTreeError> {
        self.lock()
            .run(ctx, self.apply_batch(ctx, BatchKind::Restore, ids))
            .await
    }

    async fn plan(
        &self,
        ctx: &RequestContext,
        kind: BatchKind,
        ids: &[String],
    ) -> Result<(Vec<BatchPatch>, Vec<BatchFailure>), PageTreeError> {
        let mut selected: Vec<Page> = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.find(ctx, id).await? {
                Some(page) if !selected.iter().any(|p| p.id == page.id) => selected.push(page),
                Some(_) => {}
                None => missing.push(BatchFailure::new(id.as_str(), "page not found")),
            }
        }

        let mut children: HashMap<String, Vec<Page>> = HashMap::new();
        for page in &selected {
            children.insert(page.apos_doc_id.clone(), self.children(ctx, page).await?);
        }

        Ok((plan_batch(kind, &selected, &children), missing))
    }

    async fn apply_batch(
        &self,
        ctx: &RequestContext,
        kind: BatchKind,
        ids: &[String],
    ) -> Result<BatchReport, PageTreeError> {
        let (patches, missing) = self.plan(ctx, kind, ids).await?;
        let mut report = BatchReport {
            failed: missing,
            ..Default::default()
        };

        // Promote every unselected child while its selected parent is still
        // in place; reversed so siblings keep their relative order
        for patch in patches.iter().filter(|p| !p.noop) {
            for promotion in patch.promotions.iter().rev() {
                let outcome = self
                    .move_page(
                        ctx,
                        &promotion.id,
                        TargetRef::Id(promotion.target_id.clone()),
                        promotion.position,
                    )
                    .await;
                match outcome {
                    Ok(changes) => report.changes.extend(changes),
                    Err(e) => {
                        warn!("Failed to promote {} out of {}: {}", promotion.id, patch.id, e);
                        report.failed.push(BatchFailure::new(promotion.id.as_str(), e));
                    }
                }
            }
        }

        for patch in &patches {
            if patch.noop {
                report.skipped.push(patch.id.clone());
                continue;
            }
            let outcome = match (&patch.target, kind) {
                (TargetRef::Archive, BatchKind::Archive) => {
                    self.archive(ctx, &patch.id).await.map(|o| o.changes)
                }
                (TargetRef::Home, BatchKind::Restore) => {
                    self.restore(ctx, &patch.id, Some((TargetRef::Home, Position::LastChild)))
                        .await
                }
                (target, _) => {
                    self.move_page(ctx, &patch.id, target.clone(), patch.position)
                        .await
                }
            };
            match outcome {
                Ok(changes) => {
                    report.changes.extend(changes);
                    report.succeeded.push(patch.id.clone());
                }
                Err(e) => {
                    warn!("Batch {:?} failed for {}: {}", kind, patch.id, e);
                    report.failed.push(BatchFailure::new(patch.id.as_str(), e));
                }
            }
        }

        info!(
            "Batch {:?}: {} succeeded, {} skipped, {} failed",
            kind,
            report.succeeded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
