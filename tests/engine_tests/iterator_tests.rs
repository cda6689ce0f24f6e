//! Tests for DbIterator
//!
//! These tests verify:
//! - Ascending and descending traversal
//! - Prefix filtering on every positioning operation
//! - Seek semantics in both directions
//! - Snapshot isolation from later writes
//! - Values resolved through the engine

use caskdb::{CaskError, Config, DbIterator, Engine, IndexType, IteratorConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_engine_with(index_type: IndexType, keys: &[&str]) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .dir_path(temp_dir.path())
        .index_type(index_type)
        .build();
    let engine = Engine::open(config).unwrap();
    for key in keys {
        engine.put(key.as_bytes(), format!("val:{}", key).as_bytes()).unwrap();
    }
    (temp_dir, engine)
}

fn collect_keys(iter: &mut DbIterator<'_>) -> Vec<String> {
    let mut keys = Vec::new();
    while let Some(key) = iter.key() {
        keys.push(String::from_utf8(key.to_vec()).unwrap());
        iter.next();
    }
    keys
}

fn prefixed(prefix: &str, reverse: bool) -> IteratorConfig {
    IteratorConfig {
        reverse,
        prefix: prefix.as_bytes().to_vec(),
    }
}

const FRUIT: [&str; 6] = ["apple", "apricot", "banana", "blueberry", "cherry", "avocado"];

// =============================================================================
// Traversal Tests
// =============================================================================

#[test]
fn test_ascending_order() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(IteratorConfig::default());

    assert_eq!(
        collect_keys(&mut iter),
        vec!["apple", "apricot", "avocado", "banana", "blueberry", "cherry"]
    );
}

#[test]
fn test_descending_order() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(IteratorConfig {
        reverse: true,
        ..Default::default()
    });

    assert_eq!(
        collect_keys(&mut iter),
        vec!["cherry", "blueberry", "banana", "avocado", "apricot", "apple"]
    );
}

#[test]
fn test_empty_engine() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &[]);
    let iter = engine.new_iterator(IteratorConfig::default());

    assert!(!iter.valid());
    assert!(iter.key().is_none());
    assert!(matches!(iter.value(), Err(CaskError::KeyNotFound)));
}

#[test]
fn test_values_resolve_through_engine() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &["k1", "k2"]);
    engine.put(b"k2", b"updated").unwrap();

    let mut iter = engine.new_iterator(IteratorConfig::default());
    assert_eq!(iter.value().unwrap(), b"val:k1");
    iter.next();
    assert_eq!(iter.value().unwrap(), b"updated");
}

// =============================================================================
// Prefix Tests
// =============================================================================

#[test]
fn test_prefix_filter_every_backend() {
    for index_type in [
        IndexType::BTree,
        IndexType::AdaptiveRadixTree,
        IndexType::Persistent,
    ] {
        let (_temp, engine) = setup_engine_with(index_type, &FRUIT);

        let mut forward = engine.new_iterator(prefixed("a", false));
        assert_eq!(
            collect_keys(&mut forward),
            vec!["apple", "apricot", "avocado"],
            "{:?}",
            index_type
        );

        let mut backward = engine.new_iterator(prefixed("b", true));
        assert_eq!(
            collect_keys(&mut backward),
            vec!["blueberry", "banana"],
            "{:?}",
            index_type
        );
    }
}

#[test]
fn test_prefix_with_no_matches() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let iter = engine.new_iterator(prefixed("zz", false));

    assert!(!iter.valid());
}

#[test]
fn test_prefix_equal_to_key() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &["user", "user:1", "users", "usa"]);
    let mut iter = engine.new_iterator(prefixed("user", false));

    assert_eq!(collect_keys(&mut iter), vec!["user", "user:1", "users"]);
}

#[test]
fn test_rewind_respects_prefix() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(prefixed("b", false));

    iter.next();
    iter.next();
    assert!(!iter.valid());

    iter.rewind();
    assert_eq!(iter.key(), Some(b"banana".as_slice()));
}

// =============================================================================
// Seek Tests
// =============================================================================

#[test]
fn test_seek_ascending() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(IteratorConfig::default());

    iter.seek(b"b");
    assert_eq!(iter.key(), Some(b"banana".as_slice()));

    iter.seek(b"banana");
    assert_eq!(iter.key(), Some(b"banana".as_slice()));

    iter.seek(b"c");
    assert_eq!(iter.key(), Some(b"cherry".as_slice()));

    iter.seek(b"d");
    assert!(!iter.valid());
}

#[test]
fn test_seek_descending() {
    let (_temp, engine) = setup_engine_with(IndexType::AdaptiveRadixTree, &FRUIT);
    let mut iter = engine.new_iterator(IteratorConfig {
        reverse: true,
        ..Default::default()
    });

    iter.seek(b"c");
    assert_eq!(iter.key(), Some(b"blueberry".as_slice()));

    iter.seek(b"cherry");
    assert_eq!(iter.key(), Some(b"cherry".as_slice()));

    iter.seek(b"a");
    assert!(!iter.valid());
}

#[test]
fn test_seek_then_prefix_skip() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(prefixed("b", false));

    // "apricot" is not under the prefix, so the cursor moves on to "banana"
    iter.seek(b"apricot");
    assert_eq!(iter.key(), Some(b"banana".as_slice()));
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_ignores_later_puts() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &["a", "b"]);
    let mut iter = engine.new_iterator(IteratorConfig::default());

    engine.put(b"c", b"late").unwrap();

    assert_eq!(collect_keys(&mut iter), vec!["a", "b"]);
}

#[test]
fn test_snapshot_keeps_deleted_key_readable() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &["a", "b"]);
    let iter = engine.new_iterator(IteratorConfig::default());

    engine.delete(b"a").unwrap();

    // Key stays in the snapshot and its record is still on disk
    assert_eq!(iter.key(), Some(b"a".as_slice()));
    assert_eq!(iter.value().unwrap(), b"val:a");
}

#[test]
fn test_close_invalidates() {
    let (_temp, engine) = setup_engine_with(IndexType::BTree, &FRUIT);
    let mut iter = engine.new_iterator(IteratorConfig::default());

    iter.close();

    assert!(!iter.valid());
    assert!(iter.key().is_none());
}
