//! Integration tests for the time tree.
//!
//! These tests check tree shape, linkage and idempotency against the
//! in-memory store.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use timetree::store::InMemoryGraphStore;
use timetree::{
    ManualClock, NodeId, RelType, Resolution, Root, TimeInstant, TimeRange, TimeTree,
    TimeTreeConfig, TimeTreeError, TIME_TREE_ROOT_LABEL,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp_millis()
}

fn day(y: i32, mo: u32, d: u32) -> i64 {
    utc(y, mo, d, 0, 0)
}

fn setup() -> (TimeTree<InMemoryGraphStore>, InMemoryGraphStore) {
    let store = InMemoryGraphStore::new();
    (TimeTree::new(Arc::new(store.clone())), store)
}

async fn single(store: &InMemoryGraphStore, node: NodeId, rel: RelType) -> Option<NodeId> {
    let targets = store.outgoing(node, rel).await;
    assert!(targets.len() <= 1, "{} has {} {} edges", node, targets.len(), rel);
    targets.first().copied()
}

async fn value(store: &InMemoryGraphStore, node: NodeId) -> i64 {
    store.property(node, "value").await.and_then(|v| v.as_i64()).unwrap()
}

/// Values along the NEXT chain from FIRST, checked against LAST and CHILD.
async fn chain(store: &InMemoryGraphStore, parent: NodeId) -> Vec<i64> {
    let mut values = Vec::new();
    let mut visited = Vec::new();
    let mut cursor = single(store, parent, RelType::First).await;
    while let Some(node) = cursor {
        values.push(value(store, node).await);
        visited.push(node);
        cursor = single(store, node, RelType::Next).await;
    }

    assert_eq!(visited.last().copied(), single(store, parent, RelType::Last).await);
    let mut children = store.outgoing(parent, RelType::Child).await;
    children.sort();
    visited.sort();
    assert_eq!(visited, children, "NEXT chain and CHILD set differ under {}", parent);
    values
}

async fn only_child(store: &InMemoryGraphStore, parent: NodeId) -> NodeId {
    let children = store.outgoing(parent, RelType::Child).await;
    assert_eq!(children.len(), 1);
    assert_eq!(single(store, parent, RelType::First).await, Some(children[0]));
    assert_eq!(single(store, parent, RelType::Last).await, Some(children[0]));
    children[0]
}

async fn singleton_root(store: &InMemoryGraphStore) -> NodeId {
    let roots = store.nodes_with_label(TIME_TREE_ROOT_LABEL).await;
    assert_eq!(roots.len(), 1);
    roots[0]
}

/// Year → Month → Day path below `root`, asserting each level has one child.
async fn assert_single_day_path(store: &InMemoryGraphStore, root: NodeId) {
    let year = only_child(store, root).await;
    assert_eq!(store.labels(year).await, vec!["Year"]);
    assert_eq!(value(store, year).await, 2013);

    let month = only_child(store, year).await;
    assert_eq!(store.labels(month).await, vec!["Month"]);
    assert_eq!(value(store, month).await, 5);

    let day = only_child(store, month).await;
    assert_eq!(store.labels(day).await, vec!["Day"]);
    assert_eq!(value(store, day).await, 4);

    for node in [year, month, day] {
        assert!(store.outgoing(node, RelType::Next).await.is_empty());
    }
    assert!(store.outgoing(day, RelType::Child).await.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Shape Scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_day_in_empty_tree() {
    let (tree, store) = setup();
    let leaf = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, 4)))
        .await
        .unwrap();

    assert_eq!(leaf.resolution, Resolution::Day);
    assert_eq!(leaf.value, 4);
    assert_single_day_path(&store, singleton_root(&store).await).await;
    assert_eq!(store.stats().await.nodes, 4);
}

#[tokio::test]
async fn test_range_links_days_in_order() {
    let (tree, store) = setup();
    let leaves = tree
        .get_or_create_range(Root::Singleton, TimeRange::new(day(2013, 5, 4), day(2013, 5, 7)))
        .await
        .unwrap();

    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![4, 5, 6, 7]);

    let root = singleton_root(&store).await;
    let month = only_child(&store, only_child(&store, root).await).await;
    assert_eq!(chain(&store, month).await, vec![4, 5, 6, 7]);
    assert_eq!(single(&store, month, RelType::First).await, Some(leaves[0].id));
    assert_eq!(single(&store, month, RelType::Last).await, Some(leaves[3].id));
}

#[tokio::test]
async fn test_earlier_day_becomes_first() {
    let (tree, store) = setup();
    let may4 = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, 4)))
        .await
        .unwrap();
    let may2 = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, 2)))
        .await
        .unwrap();

    let root = singleton_root(&store).await;
    let month = only_child(&store, only_child(&store, root).await).await;
    assert_eq!(single(&store, month, RelType::First).await, Some(may2.id));
    assert_eq!(single(&store, month, RelType::Last).await, Some(may4.id));
    assert_eq!(chain(&store, month).await, vec![2, 4]);
}

#[tokio::test]
async fn test_custom_root_gets_same_shape() {
    let (tree, store) = setup();
    let custom = store.create_node(&["CustomRoot"]).await.unwrap();

    tree.get_or_create_instant(Root::Explicit(custom), TimeInstant::new(day(2013, 5, 4)))
        .await
        .unwrap();

    assert_single_day_path(&store, custom).await;
    assert!(store.nodes_with_label(TIME_TREE_ROOT_LABEL).await.is_empty());
}

#[tokio::test]
async fn test_middle_insert_splices_chain() {
    let (tree, store) = setup();
    for d in [1, 9, 5, 3, 7] {
        tree.get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, d)))
            .await
            .unwrap();
    }
    let root = singleton_root(&store).await;
    let month = only_child(&store, only_child(&store, root).await).await;
    assert_eq!(chain(&store, month).await, vec![1, 3, 5, 7, 9]);
    tree.verify_integrity(Root::Singleton).await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Idempotency and Resolution
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeat_instant_writes_nothing() {
    let (tree, store) = setup();
    let instant = TimeInstant::new(utc(2014, 2, 18, 13, 33)).with_resolution(Resolution::Minute);

    let first = tree.get_or_create_instant(Root::Singleton, instant).await.unwrap();
    let before = store.stats().await;
    let second = tree.get_or_create_instant(Root::Singleton, instant).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.stats().await, before);
}

#[tokio::test]
async fn test_repeat_range_writes_nothing() {
    let (tree, store) = setup();
    let range = TimeRange::new(day(2013, 12, 30), day(2014, 1, 2));

    let first = tree.get_or_create_range(Root::Singleton, range).await.unwrap();
    let before = store.stats().await;
    let second = tree.get_or_create_range(Root::Singleton, range).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.stats().await, before);
}

#[tokio::test]
async fn test_no_node_below_resolution() {
    let (tree, store) = setup();
    let leaf = tree
        .get_or_create_instant(
            Root::Singleton,
            TimeInstant::new(utc(2013, 5, 4, 10, 30)).with_resolution(Resolution::Month),
        )
        .await
        .unwrap();

    assert_eq!(leaf.resolution, Resolution::Month);
    assert!(store.outgoing(leaf.id, RelType::Child).await.is_empty());
    assert!(store.nodes_with_label("Day").await.is_empty());
    assert!(store.nodes_with_label("Hour").await.is_empty());
}

#[tokio::test]
async fn test_millisecond_resolution() {
    let (tree, _) = setup();
    let millis = utc(2013, 5, 4, 10, 30) + 12_345;
    let leaf = tree
        .get_or_create_instant(
            Root::Singleton,
            TimeInstant::new(millis).with_resolution(Resolution::Millisecond),
        )
        .await
        .unwrap();

    assert_eq!(leaf.resolution, Resolution::Millisecond);
    assert_eq!(leaf.value, 345);
    let report = tree.verify_integrity(Root::Singleton).await.unwrap();
    assert_eq!(report.total_nodes(), 7);
}

// ─────────────────────────────────────────────────────────────────────────────
// Ranges
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_range_endpoints_match_instants() {
    let (tree, _) = setup();
    let start = day(2013, 5, 30) + 3_600_000;
    let end = day(2013, 6, 2) + 7_200_000;

    let leaves = tree
        .get_or_create_range(Root::Singleton, TimeRange::new(start, end))
        .await
        .unwrap();
    let first = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(start))
        .await
        .unwrap();
    let last = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(end))
        .await
        .unwrap();

    assert_eq!(leaves.first(), Some(&first));
    assert_eq!(leaves.last(), Some(&last));
    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![30, 31, 1, 2]);
}

#[tokio::test]
async fn test_range_across_years() {
    let (tree, store) = setup();
    let leaves = tree
        .get_or_create_range(
            Root::Singleton,
            TimeRange::new(day(2012, 11, 15), day(2013, 2, 15)).with_resolution(Resolution::Month),
        )
        .await
        .unwrap();

    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![11, 12, 1, 2]);

    let root = singleton_root(&store).await;
    assert_eq!(chain(&store, root).await, vec![2012, 2013]);
    let report = tree.verify_integrity(Root::Singleton).await.unwrap();
    assert_eq!(report.count(Resolution::Year), 2);
    assert_eq!(report.count(Resolution::Month), 4);
}

#[tokio::test]
async fn test_range_fills_gaps_between_existing_days() {
    let (tree, store) = setup();
    for d in [2, 9] {
        tree.get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, d)))
            .await
            .unwrap();
    }

    let leaves = tree
        .get_or_create_range(Root::Singleton, TimeRange::new(day(2013, 5, 1), day(2013, 5, 10)))
        .await
        .unwrap();
    assert_eq!(leaves.len(), 10);

    let root = singleton_root(&store).await;
    let month = only_child(&store, only_child(&store, root).await).await;
    assert_eq!(chain(&store, month).await, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_range_in_time_zone() {
    let (tree, _) = setup();
    let prague = timetree::parse_time_zone("Europe/Prague").unwrap();
    // 2013-05-03T22:30Z is already May 4th in Prague (UTC+2)
    let leaves = tree
        .get_or_create_range(
            Root::Singleton,
            TimeRange::new(utc(2013, 5, 3, 22, 30), utc(2013, 5, 4, 23, 0)).with_time_zone(prague),
        )
        .await
        .unwrap();

    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![4, 5]);
}

#[tokio::test]
async fn test_range_over_fall_back_has_no_duplicates() {
    let (tree, _) = setup();
    let new_york = timetree::parse_time_zone("America/New_York").unwrap();
    // 2013-11-03 01:00 local happens twice; 04:00Z is 00:00 EDT
    let leaves = tree
        .get_or_create_range(
            Root::Singleton,
            TimeRange::new(utc(2013, 11, 3, 4, 0), utc(2013, 11, 3, 8, 0))
                .with_resolution(Resolution::Hour)
                .with_time_zone(new_york),
        )
        .await
        .unwrap();

    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_range_over_spring_forward_skips_missing_hour() {
    let (tree, store) = setup();
    let new_york = timetree::parse_time_zone("America/New_York").unwrap();
    // 2013-03-10 02:00 local does not exist; 06:00Z is 01:00 EST, 07:00Z is 03:00 EDT
    let leaves = tree
        .get_or_create_range(
            Root::Singleton,
            TimeRange::new(utc(2013, 3, 10, 6, 0), utc(2013, 3, 10, 8, 0))
                .with_resolution(Resolution::Hour)
                .with_time_zone(new_york),
        )
        .await
        .unwrap();

    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![1, 3, 4]);

    let root = singleton_root(&store).await;
    let day = only_child(&store, only_child(&store, only_child(&store, root).await).await).await;
    assert_eq!(chain(&store, day).await, vec![1, 3, 4]);
    tree.verify_integrity(Root::Singleton).await.unwrap();
}

#[tokio::test]
async fn test_minute_range_over_fall_back_lists_each_minute_once() {
    let (tree, store) = setup();
    let new_york = timetree::parse_time_zone("America/New_York").unwrap();
    // 05:00Z is 01:00 EDT, 06:59Z is 01:59 EST: the local hour 1 twice
    let range = TimeRange::new(utc(2013, 11, 3, 5, 0), utc(2013, 11, 3, 6, 59))
        .with_resolution(Resolution::Minute)
        .with_time_zone(new_york);

    let leaves = tree.get_or_create_range(Root::Singleton, range).await.unwrap();

    let mut ids: Vec<NodeId> = leaves.iter().map(|n| n.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), leaves.len());
    let values: Vec<i32> = leaves.iter().map(|n| n.value).collect();
    assert_eq!(values, (0..60).collect::<Vec<_>>());
    assert_eq!(store.nodes_with_label("Minute").await.len(), 60);
}

#[tokio::test]
async fn test_read_only_range_matches_created_range_over_fall_back() {
    let (tree, _) = setup();
    let new_york = timetree::parse_time_zone("America/New_York").unwrap();
    // 01:30 EDT through 01:10 EST: local start lies after local end
    let range = TimeRange::new(utc(2013, 11, 3, 5, 30), utc(2013, 11, 3, 6, 10))
        .with_resolution(Resolution::Minute)
        .with_time_zone(new_york);

    let created = tree.get_or_create_range(Root::Singleton, range).await.unwrap();
    assert_eq!(created.len(), 41);
    assert_eq!(created.first().map(|n| n.value), Some(30));
    assert_eq!(created.last().map(|n| n.value), Some(10));

    let found = tree.get_range(Root::Singleton, range).await.unwrap();
    assert_eq!(found, created);
}

#[tokio::test]
async fn test_read_only_range_skips_missing_units() {
    let (tree, _) = setup();
    for (y, mo, d) in [(2012, 12, 31), (2014, 1, 2)] {
        tree.get_or_create_instant(Root::Singleton, TimeInstant::new(day(y, mo, d)))
            .await
            .unwrap();
    }

    let found = tree
        .get_range(Root::Singleton, TimeRange::new(day(2012, 12, 1), day(2014, 12, 31)))
        .await
        .unwrap();
    let values: Vec<i32> = found.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![31, 2]);
}

#[tokio::test]
async fn test_range_creates_nothing_below_resolution() {
    let (tree, store) = setup();
    let leaves = tree
        .get_or_create_range(
            Root::Singleton,
            TimeRange::new(day(2013, 3, 15), day(2013, 6, 15)).with_resolution(Resolution::Month),
        )
        .await
        .unwrap();

    assert_eq!(leaves.len(), 4);
    for leaf in &leaves {
        assert!(store.outgoing(leaf.id, RelType::Child).await.is_empty());
    }
    assert!(store.nodes_with_label("Day").await.is_empty());
    assert_eq!(store.stats().await.nodes, 6);
}

#[tokio::test]
async fn test_invalid_range_rejected() {
    let (tree, store) = setup();
    let err = tree
        .get_or_create_range(Root::Singleton, TimeRange::new(day(2013, 5, 7), day(2013, 5, 4)))
        .await
        .unwrap_err();

    assert!(matches!(err, TimeTreeError::InvalidRange { .. }));
    assert!(err.is_input_error());
    assert_eq!(store.stats().await.nodes, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Roots
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_custom_roots_are_isolated() {
    let (tree, store) = setup();
    let a = store.create_node(&["RootA"]).await.unwrap();
    let b = store.create_node(&["RootB"]).await.unwrap();

    let range = TimeRange::new(day(2013, 5, 4), day(2013, 5, 6));
    let in_a = tree.get_or_create_range(Root::Explicit(a), range).await.unwrap();
    let in_b = tree.get_or_create_range(Root::Explicit(b), range).await.unwrap();

    for (x, y) in in_a.iter().zip(&in_b) {
        assert_ne!(x.id, y.id);
        assert_eq!(x.value, y.value);
    }
    let year_a = only_child(&store, a).await;
    let year_b = only_child(&store, b).await;
    assert_ne!(year_a, year_b);
    assert_eq!(tree.children(year_a, Resolution::Month).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_custom_root() {
    let (tree, store) = setup();
    let missing = NodeId::new(12_345);
    let err = tree
        .get_or_create_instant(Root::Explicit(missing), TimeInstant::new(day(2013, 5, 4)))
        .await
        .unwrap_err();

    assert_eq!(err, TimeTreeError::MissingRoot(missing));
    assert_eq!(store.stats().await.nodes, 0);
}

#[tokio::test]
async fn test_concurrent_first_use_creates_one_tree() {
    let store = InMemoryGraphStore::new();
    let tree = Arc::new(TimeTree::new(Arc::new(store.clone())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tree = Arc::clone(&tree);
            tokio::spawn(async move {
                tree.get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, 5, 4)))
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.stats().await.nodes, 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Read-only Lookups, Clock, Integrity
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_lookups_never_write() {
    let (tree, store) = setup();
    let instant = TimeInstant::new(day(2013, 5, 4));

    assert_eq!(tree.get_instant(Root::Singleton, instant).await.unwrap(), None);
    assert!(tree
        .get_range(Root::Singleton, TimeRange::new(day(2013, 1, 1), day(2013, 12, 31)))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.stats().await.nodes, 0);

    let created = tree.get_or_create_instant(Root::Singleton, instant).await.unwrap();
    let before = store.stats().await;
    assert_eq!(tree.get_instant(Root::Singleton, instant).await.unwrap(), Some(created));
    assert_eq!(store.stats().await, before);
}

#[tokio::test]
async fn test_get_range_across_months_is_sparse() {
    let (tree, _) = setup();
    for (mo, d) in [(4, 28), (5, 2), (5, 20), (6, 1), (6, 15)] {
        tree.get_or_create_instant(Root::Singleton, TimeInstant::new(day(2013, mo, d)))
            .await
            .unwrap();
    }

    let found = tree
        .get_range(Root::Singleton, TimeRange::new(day(2013, 4, 30), day(2013, 6, 1)))
        .await
        .unwrap();
    let values: Vec<i32> = found.iter().map(|n| n.value).collect();
    assert_eq!(values, vec![2, 20, 1]);
}

#[tokio::test]
async fn test_now_snapshots_clock() {
    let store = Arc::new(InMemoryGraphStore::new());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2013, 5, 4, 23, 30, 0).unwrap());
    let tree = TimeTree::with_clock(store, TimeTreeConfig::default(), clock);

    let today = tree.now(Root::Singleton, None, None).await.unwrap();
    assert_eq!(today.value, 4);

    tree.clock().advance(chrono::Duration::hours(1));
    let tomorrow = tree.now(Root::Singleton, None, None).await.unwrap();
    assert_eq!(tomorrow.value, 5);

    let prague = timetree::parse_time_zone("Europe/Prague").unwrap();
    tree.clock().set(Utc.with_ymd_and_hms(2013, 5, 4, 23, 30, 0).unwrap());
    let in_prague = tree.now(Root::Singleton, None, Some(prague)).await.unwrap();
    assert_eq!(in_prague, tomorrow);
}

#[tokio::test]
async fn test_config_defaults_apply() {
    let store = Arc::new(InMemoryGraphStore::new());
    let config = TimeTreeConfig::new(Resolution::Hour, timetree::parse_time_zone("Asia/Tokyo").unwrap());
    let tree = TimeTree::with_config(store, config);

    // 2013-05-04T20:00Z is 05:00 on May 5th in Tokyo
    let leaf = tree
        .get_or_create_instant(Root::Singleton, TimeInstant::new(utc(2013, 5, 4, 20, 0)))
        .await
        .unwrap();
    assert_eq!(leaf.resolution, Resolution::Hour);
    assert_eq!(leaf.value, 5);
}

#[tokio::test]
async fn test_verify_integrity_counts_levels() {
    let (tree, _) = setup();
    tree.get_or_create_range(Root::Singleton, TimeRange::new(day(2013, 5, 4), day(2013, 5, 7)))
        .await
        .unwrap();

    let report = tree.verify_integrity(Root::Singleton).await.unwrap();
    assert_eq!(report.count(Resolution::Year), 1);
    assert_eq!(report.count(Resolution::Month), 1);
    assert_eq!(report.count(Resolution::Day), 4);
    assert_eq!(report.total_nodes(), 6);
}

#[tokio::test]
async fn test_verify_integrity_reports_broken_chain() {
    let (tree, store) = setup();
    tree.get_or_create_range(Root::Singleton, TimeRange::new(day(2013, 5, 4), day(2013, 5, 6)))
        .await
        .unwrap();

    // Stray CHILD edge to a node outside the NEXT chain
    let root = singleton_root(&store).await;
    let month = only_child(&store, only_child(&store, root).await).await;
    let stray = store.create_node(&["Day"]).await.unwrap();
    let mut tx = timetree::GraphStore::begin(&store).await.unwrap();
    timetree::GraphTransaction::create_edge(&mut tx, month, stray, RelType::Child)
        .await
        .unwrap();
    timetree::GraphTransaction::commit(tx).await.unwrap();

    let err = tree.verify_integrity(Root::Singleton).await.unwrap_err();
    assert!(matches!(err, TimeTreeError::CorruptTree { .. }));
}
