//! Import Resolution Tests
//!
//! Tests that verify duplicate detection, conflict handling and parked page
//! deduplication against a store that counts bulk id remaps.

#[cfg(test)]
mod import_tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use pagetree_core::config::TreeConfig;
    use pagetree_core::db::{
        MemoryPageStore, PageField, PageMutation, PageQuery, PageStore, StoreError,
    };
    use pagetree_core::models::{Mode, Page, Position, TargetRef};
    use pagetree_core::services::{
        ImportRecord, ImportResolver, NewPage, PageTree, ParkedPages, RequestContext,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    /// Memory store that counts `remap_doc_ids` calls
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPageStore,
        remaps: AtomicUsize,
    }

    #[async_trait]
    impl PageStore for CountingStore {
        async fn find(&self, query: PageQuery) -> Result<Vec<Page>, StoreError> {
            self.inner.find(query).await
        }

        async fn distinct(
            &self,
            field: PageField,
            query: PageQuery,
        ) -> Result<Vec<String>, StoreError> {
            self.inner.distinct(field, query).await
        }

        async fn insert(&self, page: Page) -> Result<Page, StoreError> {
            self.inner.insert(page).await
        }

        async fn update(&self, page: Page) -> Result<Page, StoreError> {
            self.inner.update(page).await
        }

        async fn delete(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.delete(id).await
        }

        async fn update_many(
            &self,
            query: PageQuery,
            mutation: PageMutation,
        ) -> Result<usize, StoreError> {
            self.inner.update_many(query, mutation).await
        }

        async fn remap_doc_ids(
            &self,
            remap: &HashMap<String, String>,
        ) -> Result<usize, StoreError> {
            self.remaps.fetch_add(1, Ordering::SeqCst);
            self.inner.remap_doc_ids(remap).await
        }
    }

    async fn setup() -> Result<(PageTree, Arc<CountingStore>, RequestContext)> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let store = Arc::new(CountingStore::default());
        let tree = PageTree::new(store.clone(), TreeConfig::default())?;
        ParkedPages::new(tree.clone()).initialize().await?;
        Ok((tree, store, RequestContext::draft("en")))
    }

    fn parked_copy(doc: &str, home: &Page, mode: Mode, rank: i64) -> Page {
        let mut page = Page::new(doc, "en", mode, "default-page", "Search");
        page.path = format!("{}/{}", home.apos_doc_id, doc);
        page.level = 1;
        page.rank = rank;
        page.slug = format!("/{}", doc);
        page.parked_id = Some("search".to_string());
        page.parked = vec!["parkedId".to_string(), "slug".to_string(), "type".to_string()];
        page
    }

    #[tokio::test]
    async fn test_duplicate_parked_pages_merge_with_one_remap() -> Result<()> {
        let (tree, store, ctx) = setup().await?;
        let home = tree.home(&ctx).await?;

        for mode in Mode::live() {
            store.insert(parked_copy("search-a", &home, mode, 10)).await?;
            store.insert(parked_copy("search-b", &home, mode, 11)).await?;
        }
        let mut kid = Page::new("kid", "en", Mode::Draft, "default-page", "Kid");
        kid.path = format!("{}/search-b/kid", home.apos_doc_id);
        kid.level = 2;
        kid.slug = "/search-b/kid".to_string();
        store.insert(kid).await?;

        let mut linking = tree
            .insert(
                &ctx,
                TargetRef::Home,
                Position::LastChild,
                NewPage::titled("Links").with_id("links:en:draft"),
            )
            .await?;
        linking
            .relationships
            .insert("_search".to_string(), vec!["search-b".to_string()]);
        tree.update(&ctx, linking).await?;

        let resolver = ImportResolver::new(tree.clone());
        let report = resolver.dedupe_parked(&ctx).await?;

        assert_eq!(report.kept.get("search").map(String::as_str), Some("search-a"));
        assert_eq!(report.removed.len(), 2);
        assert_eq!(store.remaps.load(Ordering::SeqCst), 1);

        for mode in Mode::live() {
            let copies = store
                .find(PageQuery::scoped("en", mode).with_parked_id("search"))
                .await?;
            assert_eq!(copies.len(), 1, "{:?} has {} copies", mode, copies.len());
            assert_eq!(copies[0].apos_doc_id, "search-a");
        }

        let kid = tree.get(&ctx, "kid").await?;
        assert_eq!(kid.path, format!("{}/search-a/kid", home.apos_doc_id));
        let links = tree.get(&ctx, "links").await?;
        assert_eq!(links.relationships["_search"], vec!["search-a".to_string()]);

        // Nothing left to merge
        let again = resolver.dedupe_parked(&ctx).await?;
        assert!(again.removed.is_empty());
        assert_eq!(store.remaps.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_merged_parked_pages_renumber_adopted_children() -> Result<()> {
        let (tree, store, ctx) = setup().await?;
        let home = tree.home(&ctx).await?;

        for mode in Mode::live() {
            store.insert(parked_copy("search-a", &home, mode, 10)).await?;
            store.insert(parked_copy("search-b", &home, mode, 11)).await?;
        }
        let mut children = Vec::new();
        for parent in ["search-a", "search-b"] {
            let doc = format!("kid-{}", parent);
            let mut kid = Page::new(&doc, "en", Mode::Draft, "default-page", "Kid");
            kid.path = format!("{}/{}/{}", home.apos_doc_id, parent, doc);
            kid.level = 2;
            kid.rank = 0;
            kid.slug = format!("/{}/{}", parent, doc);
            children.push(kid);
        }
        let mut grandchild = Page::new("leaf", "en", Mode::Draft, "default-page", "Leaf");
        grandchild.path = format!("{}/search-b/kid-search-b/leaf", home.apos_doc_id);
        grandchild.level = 3;
        grandchild.slug = "/search-b/kid-search-b/leaf".to_string();
        children.push(grandchild);
        for page in children {
            store.insert(page).await?;
        }

        let report = ImportResolver::new(tree.clone()).dedupe_parked(&ctx).await?;
        assert_eq!(report.reparented, vec!["kid-search-b:en:draft".to_string()]);

        let keeper = tree.get(&ctx, "search-a").await?;
        let adopted: Vec<(String, i64)> = tree
            .children(&ctx, &keeper)
            .await?
            .into_iter()
            .map(|p| (p.apos_doc_id, p.rank))
            .collect();
        assert_eq!(
            adopted,
            vec![
                ("kid-search-a".to_string(), 0),
                ("kid-search-b".to_string(), 1)
            ]
        );

        let moved = tree.get(&ctx, "kid-search-b").await?;
        assert_eq!(moved.path, format!("{}/search-a/kid-search-b", home.apos_doc_id));
        assert_eq!(moved.slug, "/search-a/kid-search-b");
        let leaf = tree.get(&ctx, "leaf").await?;
        assert_eq!(leaf.path, format!("{}/leaf", moved.path));
        assert_eq!(leaf.slug, "/search-a/kid-search-b/leaf");
        assert_eq!(leaf.level, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_import_stream_into_existing_tree() -> Result<()> {
        let (tree, store, ctx) = setup().await?;
        let local_home = tree.home(&ctx).await?;

        let records: Vec<ImportRecord> = serde_json::from_value(json!([
            {
                "aposDocId": "remote-home", "path": "remote-home", "slug": "/",
                "type": "home-page", "parkedId": "home",
                "aposMode": "draft", "aposLocale": "en", "title": "Home"
            },
            {
                "aposDocId": "about", "path": "remote-home/about", "slug": "/about",
                "type": "default-page", "aposMode": "draft", "aposLocale": "en",
                "title": "About", "attachments": ["logo"]
            },
            {
                "aposDocId": "team", "path": "remote-home/about/team", "slug": "/about/team",
                "type": "default-page", "aposMode": "draft", "aposLocale": "en",
                "title": "Team", "relationships": { "_home": ["remote-home"] }
            },
            {
                "aposDocId": "about", "path": "remote-home/about", "slug": "/about",
                "type": "default-page", "aposMode": "published", "aposLocale": "en",
                "title": "About"
            },
            {
                "aposDocId": "widget", "path": "remote-home/widget", "slug": "/widget",
                "type": "widget-page", "aposMode": "draft", "aposLocale": "en",
                "title": "Widget", "attachments": ["icon"]
            }
        ]))?;

        let resolver = ImportResolver::new(tree.clone());
        let duplicates = resolver.detect_duplicates(&ctx, &records).await?;
        assert_eq!(duplicates.replacements.len(), 1);
        assert_eq!(duplicates.inserts, vec!["about".to_string(), "team".to_string()]);
        assert_eq!(duplicates.failed.len(), 1);

        let report = resolver.apply(&ctx, &records, &duplicates, &[]).await?;
        assert_eq!(report.imported, vec!["about".to_string(), "team".to_string()]);
        assert_eq!(report.updated, vec!["remote-home".to_string()]);
        assert_eq!(report.deferred_attachments, vec!["icon".to_string()]);
        assert_eq!(store.remaps.load(Ordering::SeqCst), 1);

        let team = tree.get(&ctx, "team").await?;
        assert_eq!(team.path, format!("{}/about/team", local_home.apos_doc_id));
        assert_eq!(team.slug, "/about/team");
        assert_eq!(
            team.relationships["_home"],
            vec![local_home.apos_doc_id.clone()]
        );

        let published = ctx.with_mode(Mode::Published);
        assert!(tree.find(&published, "about").await?.is_some());
        assert!(tree.find(&published, "team").await?.is_none());

        // A second pass sees only conflicts
        let again = resolver.detect_duplicates(&ctx, &records).await?;
        assert_eq!(again.conflicts.len(), 2);
        assert!(again.inserts.is_empty());
        Ok(())
    }
}
