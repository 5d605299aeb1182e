//! Tree Invariant Tests
//!
//! End-to-end checks of the structural guarantees of the page tree over the
//! in-memory store, starting from a tree initialized by `ParkedPages`:
//! rank uniqueness, path prefixes, archive placement, parked reconciliation,
//! slug cascade scoping and batch relocation.

#[cfg(test)]
mod tree_invariant_tests {
    use anyhow::Result;
    use pagetree_core::config::{TreeConfig, ARCHIVE_PARKED_ID};
    use pagetree_core::db::{MemoryPageStore, PageQuery, PageStore, SortOrder};
    use pagetree_core::models::{Mode, Page, Position, TargetRef};
    use pagetree_core::services::{
        ErrorKind, NewPage, PageTree, PageTreeError, ParkedPages, RequestContext,
    };
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio_test::assert_ok;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Tree with parked home and archive in every live mode
    async fn setup() -> Result<(PageTree, Arc<MemoryPageStore>, RequestContext)> {
        init_tracing();
        let store = Arc::new(MemoryPageStore::new());
        let tree = PageTree::new(store.clone(), TreeConfig::default())?;
        ParkedPages::new(tree.clone()).initialize().await?;
        Ok((tree, store, RequestContext::draft("en")))
    }

    async fn add(
        tree: &PageTree,
        ctx: &RequestContext,
        doc: &str,
        target: TargetRef,
        position: Position,
    ) -> Result<Page> {
        let new_page = NewPage::titled(doc.to_uppercase()).with_id(format!("{}:en:draft", doc));
        Ok(tree.insert(ctx, target, position, new_page).await?)
    }

    fn id(doc: &str) -> TargetRef {
        TargetRef::Id(format!("{}:en:draft", doc))
    }

    /// Every page's parent exists, levels match paths and sibling ranks are
    /// unique
    async fn assert_tree_invariants(store: &MemoryPageStore) {
        let pages = store.all().await;
        let paths: HashSet<(&str, &str, Mode)> = pages
            .iter()
            .map(|p| (p.path.as_str(), p.apos_locale.as_str(), p.apos_mode))
            .collect();

        let mut ranks: HashMap<(String, String, Mode), Vec<i64>> = HashMap::new();
        for page in &pages {
            assert_eq!(
                page.level as usize,
                page.path.matches('/').count(),
                "level of {} does not match its path",
                page.id
            );
            if let Some(parent) = page.parent_path() {
                assert!(
                    paths.contains(&(parent, page.apos_locale.as_str(), page.apos_mode)),
                    "parent of {} is missing",
                    page.id
                );
                ranks
                    .entry((parent.to_string(), page.apos_locale.clone(), page.apos_mode))
                    .or_default()
                    .push(page.rank);
            }
        }

        for (group, mut group_ranks) in ranks {
            let count = group_ranks.len();
            group_ranks.sort_unstable();
            group_ranks.dedup();
            assert_eq!(group_ranks.len(), count, "duplicate ranks under {:?}", group);
        }
    }

    async fn top_level(store: &MemoryPageStore) -> Vec<Page> {
        store
            .find(
                PageQuery::scoped("en", Mode::Draft)
                    .with_level(1)
                    .sorted(SortOrder::Rank),
            )
            .await
            .unwrap()
    }

    fn is_rejection(err: &PageTreeError) -> bool {
        matches!(err.kind(), ErrorKind::Forbidden | ErrorKind::Invalid)
    }

    #[tokio::test]
    async fn test_ranks_and_paths_hold_across_moves() -> Result<()> {
        let (tree, store, ctx) = setup().await?;

        for doc in ["p0", "p1", "p2", "p3"] {
            add(&tree, &ctx, doc, TargetRef::Home, Position::LastChild).await?;
        }
        add(&tree, &ctx, "p4", id("p0"), Position::FirstChild).await?;
        add(&tree, &ctx, "p5", id("p4"), Position::After).await?;
        add(&tree, &ctx, "p6", id("p1"), Position::Before).await?;
        add(&tree, &ctx, "p7", TargetRef::Home, Position::Index(1)).await?;
        assert_tree_invariants(&store).await;

        let docs = ["p0", "p1", "p2", "p3", "p4", "p5", "p6", "p7"];
        let positions = [
            Position::FirstChild,
            Position::LastChild,
            Position::Before,
            Position::After,
            Position::Index(0),
        ];
        for step in 0..20 {
            let moved = docs[(step * 3) % docs.len()];
            let target = docs[(step * 5 + 1) % docs.len()];
            let position = positions[step % positions.len()];

            match tree
                .move_page(&ctx, &format!("{}:en:draft", moved), id(target), position)
                .await
            {
                Ok(_) => {}
                Err(e) if is_rejection(&e) => {}
                Err(e) => panic!("move {} {} {} failed: {}", moved, position, target, e),
            }
            assert_tree_invariants(&store).await;

            let order = top_level(&store).await;
            assert_eq!(
                order.last().and_then(|p| p.parked_id.as_deref()),
                Some(ARCHIVE_PARKED_ID),
                "archive is not last after step {}",
                step
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_inserts_get_distinct_ranks() -> Result<()> {
        let (tree, store, _ctx) = setup().await?;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tree = tree.clone();
                tokio::spawn(async move {
                    let ctx = RequestContext::draft("en");
                    tree.insert(
                        &ctx,
                        TargetRef::Home,
                        Position::LastChild,
                        NewPage::titled(format!("Page {}", i)),
                    )
                    .await
                })
            })
            .collect();
        for handle in handles {
            assert_ok!(handle.await?);
        }

        assert_tree_invariants(&store).await;
        let order = top_level(&store).await;
        assert_eq!(order.len(), 9);
        assert_eq!(order[8].parked_id.as_deref(), Some(ARCHIVE_PARKED_ID));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_under_own_descendant_is_forbidden() -> Result<()> {
        let (tree, _store, ctx) = setup().await?;
        add(&tree, &ctx, "x", TargetRef::Home, Position::LastChild).await?;
        add(&tree, &ctx, "y", id("x"), Position::LastChild).await?;
        add(&tree, &ctx, "z", id("y"), Position::LastChild).await?;

        for target in ["x", "z"] {
            let err = tree
                .move_page(&ctx, "x", id(target), Position::FirstChild)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Forbidden);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_twice_changes_nothing() -> Result<()> {
        let (tree, _store, ctx) = setup().await?;
        let parked = ParkedPages::new(tree.clone());

        let first = parked.reconcile(&ctx).await?;
        assert!(first.is_empty(), "initialized tree drifted: {:?}", first);
        let second = parked.reconcile(&ctx).await?;
        assert!(second.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_slug_cascade_scoping() -> Result<()> {
        let (tree, _store, ctx) = setup().await?;
        add(&tree, &ctx, "a", TargetRef::Home, Position::LastChild).await?;
        add(&tree, &ctx, "b", TargetRef::Home, Position::LastChild).await?;
        add(&tree, &ctx, "c", id("a"), Position::LastChild).await?;
        tree.insert(
            &ctx,
            id("a"),
            Position::LastChild,
            NewPage::titled("D").with_id("d:en:draft").with_slug("/custom"),
        )
        .await?;
        assert_eq!(tree.get(&ctx, "c").await?.slug, "/a/c");

        tree.move_page(&ctx, "c", id("b"), Position::LastChild).await?;
        assert_eq!(tree.get(&ctx, "c").await?.slug, "/b/c");

        tree.move_page(&ctx, "d", id("b"), Position::LastChild).await?;
        let d = tree.get(&ctx, "d").await?;
        assert_eq!(d.slug, "/custom");
        assert!(d.path.ends_with("/b/d"));

        tree.archive(&ctx, "d").await?;
        assert_eq!(tree.get(&ctx, "d").await?.slug, "/archive/custom");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_archive_keeps_selection_shape() -> Result<()> {
        let (tree, _store, ctx) = setup().await?;
        let x = add(&tree, &ctx, "x", TargetRef::Home, Position::LastChild).await?;
        let y = add(&tree, &ctx, "y", id("x"), Position::LastChild).await?;
        add(&tree, &ctx, "w", id("x"), Position::LastChild).await?;

        let selection = vec![x.id.clone(), y.id.clone()];
        let patches = tree.batch_archive_patches(&ctx, &selection).await?;
        let y_patch = patches.iter().find(|p| p.id == y.id).unwrap();
        let x_patch = patches.iter().find(|p| p.id == x.id).unwrap();
        assert_eq!(y_patch.target, TargetRef::Id(x.id.clone()));
        assert_eq!(x_patch.target, TargetRef::Archive);
        assert_eq!(x_patch.promotions.len(), 1);

        let report = tree.archive_batch(&ctx, &selection).await?;
        assert!(report.failed.is_empty(), "{:?}", report.failed);

        let archive = tree.archive_root(&ctx).await?;
        let x = tree.get(&ctx, "x").await?;
        let y = tree.get(&ctx, "y").await?;
        let w = tree.get(&ctx, "w").await?;
        assert!(x.archived && y.archived);
        assert_eq!(x.path, format!("{}/x", archive.path));
        assert_eq!(y.path, format!("{}/y", x.path));
        // Unselected child stayed live, right after where x used to be
        assert!(!w.archived);
        assert_eq!(w.level, 1);

        let restored = tree.restore_batch(&ctx, &[x.id.clone(), y.id.clone()]).await?;
        assert!(restored.failed.is_empty(), "{:?}", restored.failed);
        assert!(!tree.get(&ctx, "y").await?.archived);
        Ok(())
    }

    #[tokio::test]
    async fn test_first_child_move_reports_both_siblings() -> Result<()> {
        let (tree, _store, ctx) = setup().await?;
        let a = add(&tree, &ctx, "a", TargetRef::Home, Position::LastChild).await?;
        let b = add(&tree, &ctx, "b", TargetRef::Home, Position::LastChild).await?;

        let changes = tree
            .move_page(&ctx, &b.id, TargetRef::Home, Position::FirstChild)
            .await?;

        assert_eq!(tree.get(&ctx, "b").await?.rank, 0);
        assert_eq!(tree.get(&ctx, "a").await?.rank, 1);
        assert!(changes.contains(&a.id));
        assert!(changes.contains(&b.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_archive_with_descendants() -> Result<()> {
        let (tree, store, ctx) = setup().await?;
        add(&tree, &ctx, "a", TargetRef::Home, Position::LastChild).await?;
        add(&tree, &ctx, "b", id("a"), Position::LastChild).await?;
        add(&tree, &ctx, "c", id("b"), Position::LastChild).await?;

        let outcome = tree.archive(&ctx, "a").await?;
        assert_eq!(outcome.parent_slug, "/");

        let archive = tree.archive_root(&ctx).await?;
        for (doc, slug) in [("a", "/archive/a"), ("b", "/archive/a/b"), ("c", "/archive/a/b/c")] {
            let page = tree.get(&ctx, doc).await?;
            assert!(page.archived, "{} not archived", doc);
            assert!(page.path.starts_with(&format!("{}/", archive.path)));
            assert_eq!(page.slug, slug);
            assert!(outcome.changes.contains(&page.id));
        }
        assert_tree_invariants(&store).await;

        tree.restore(&ctx, "a", None).await?;
        let c = tree.get(&ctx, "c").await?;
        assert!(!c.archived);
        assert_eq!(c.slug, "/a/b/c");
        assert_tree_invariants(&store).await;
        Ok(())
    }
}
