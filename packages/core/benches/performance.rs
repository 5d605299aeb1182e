//! Performance benchmarks for PageTree core operations
//!
//! Run with: `cargo bench -p pagetree-core`
//!
//! These benchmarks measure critical path performance:
//! - Placement resolution over wide sibling groups
//! - Subtree cascade planning for deep moves
//! - Batch archive planning
//! - Locked insert/move round trips against the in-memory store

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pagetree_core::config::TreeConfig;
use pagetree_core::models::{child_path, path_level, Mode, Page, Position, TargetRef};
use pagetree_core::operations::{
    dedupe_ranks, plan_batch, resolve_placement, BatchKind, Relocation,
};
use pagetree_core::services::{NewPage, PageTree, ParkedPages, RequestContext};
use pagetree_core::MemoryPageStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn page_at(doc: &str, path: &str, rank: i64) -> Page {
    let mut page = Page::new(doc, "en", Mode::Draft, "default-page", doc);
    page.path = path.to_string();
    page.level = path_level(path);
    page.rank = rank;
    page.slug = format!("/{}", path.replace('/', "-"));
    page
}

/// Home with `count` children, the archive last
fn wide_tree(count: usize) -> (Page, Vec<Page>) {
    let home = page_at("home", "home", 0);
    let mut children: Vec<Page> = (0..count)
        .map(|i| {
            let doc = format!("p{}", i);
            page_at(&doc, &child_path("home", &doc), i as i64)
        })
        .collect();
    let mut archive = page_at("archive", "home/archive", count as i64);
    archive.archived = true;
    children.push(archive);
    (home, children)
}

/// Chain of `depth` nested pages under `root`
fn deep_subtree(depth: usize) -> Vec<Page> {
    let mut path = "home/root".to_string();
    (0..depth)
        .map(|i| {
            path = child_path(&path, &format!("d{}", i));
            let mut page = page_at(&format!("d{}", i), &path, 0);
            page.slug = format!("/root{}", "/d".repeat(i + 1));
            page
        })
        .collect()
}

/// Benchmark placement resolution among 1000 siblings
fn bench_placement(c: &mut Criterion) {
    let (home, children) = wide_tree(1000);
    let mut group = c.benchmark_group("placement");

    group.bench_function("last_child_of_1000", |b| {
        b.iter(|| {
            resolve_placement(
                black_box(&home),
                Position::LastChild,
                black_box(&children),
                Some("new"),
                Some("archive"),
            )
        })
    });

    group.bench_function("index_500_of_1000", |b| {
        b.iter(|| {
            resolve_placement(
                black_box(&home),
                Position::Index(500),
                black_box(&children),
                Some("p10"),
                Some("archive"),
            )
        })
    });

    let ranks: Vec<i64> = (0..1000).map(|i| i / 3).collect();
    group.bench_function("dedupe_1000_ranks", |b| {
        b.iter(|| dedupe_ranks(black_box(&ranks)))
    });

    group.finish();
}

/// Benchmark cascade planning for a 500-deep subtree move
fn bench_cascade(c: &mut Criterion) {
    let descendants = deep_subtree(500);
    let relocation = Relocation {
        old_path: "home/root",
        new_path: "home/archive/root",
        old_slug: "/root",
        new_slug: "/archive/root",
        archived: Some(true),
        into_archive: true,
    };

    c.bench_function("cascade_500_descendants", |b| {
        b.iter(|| relocation.cascade(black_box(&descendants)))
    });
}

/// Benchmark batch planning for 200 selected pages with children
fn bench_batch_plan(c: &mut Criterion) {
    let (_, mut selected) = wide_tree(200);
    selected.pop();
    let children: HashMap<String, Vec<Page>> = selected
        .iter()
        .map(|page| {
            let kids = (0..5)
                .map(|i| {
                    let doc = format!("{}-k{}", page.apos_doc_id, i);
                    page_at(&doc, &child_path(&page.path, &doc), i)
                })
                .collect();
            (page.apos_doc_id.clone(), kids)
        })
        .collect();

    c.bench_function("plan_archive_200", |b| {
        b.iter(|| plan_batch(BatchKind::Archive, black_box(&selected), black_box(&children)))
    });
}

/// Benchmark locked insert + move round trips
///
/// Measures tree lock, placement and nudging overhead through the service.
fn bench_tree_mutations(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("tree_mutations");
    group.sample_size(20);

    group.bench_function("insert_then_move_first", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let store = Arc::new(MemoryPageStore::new());
                let tree = PageTree::new(store, TreeConfig::default()).unwrap();
                ParkedPages::new(tree.clone()).initialize().await.unwrap();
                let ctx = RequestContext::draft("en");

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let page = tree
                        .insert(
                            &ctx,
                            TargetRef::Home,
                            Position::LastChild,
                            NewPage::titled(format!("Page {}", i)),
                        )
                        .await
                        .unwrap();
                    tree.move_page(&ctx, &page.id, TargetRef::Home, Position::FirstChild)
                        .await
                        .unwrap();
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_placement,
    bench_cascade,
    bench_batch_plan,
    bench_tree_mutations
);
criterion_main!(benches);
