//! Tests for merge (compaction)
//!
//! These tests verify:
//! - Live values survive merge + reopen, stale ones are dropped
//! - Segment count and disk usage shrink
//! - Hint file and merge-finished marker handling
//! - Incomplete merge directories are discarded
//! - Writes made after a merge are kept
//! - Merge with every index backend
//! - Persistent index catching up with output adopted by an earlier open

use std::fs;
use std::path::{Path, PathBuf};

use caskdb::data::{segment_file_name, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME};
use caskdb::merge::{adopt_merge_output, merge_path};
use caskdb::{CaskError, Config, Engine, IndexType, WriteBatchConfig};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Data dir one level down so `<dir>-merge` also lands inside the TempDir
fn setup_temp_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("data");
    (temp_dir, path)
}

fn small_segments(dir: &Path, index_type: IndexType) -> Config {
    Config::builder()
        .dir_path(dir)
        .max_segment_size(600)
        .index_type(index_type)
        .build()
}

fn count_segments(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".data")
        })
        .count()
}

fn value(round: usize) -> Vec<u8> {
    format!("{:0>100}", round).into_bytes()
}

/// Three full segments, each overwriting "x" five times
fn write_overwrites(engine: &Engine) {
    for round in 0..15 {
        engine.put(b"x", &value(round)).unwrap();
    }
}

// =============================================================================
// Core Merge Tests
// =============================================================================

#[test]
fn test_merge_keeps_last_value_and_shrinks() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        write_overwrites(&engine);
        assert_eq!(count_segments(&dir), 3);

        engine.merge().unwrap();

        // Output waits next to the data dir until the next open
        let merge_dir = merge_path(&dir);
        assert!(merge_dir.join(MERGE_FINISHED_FILE_NAME).exists());
        assert!(merge_dir.join(HINT_FILE_NAME).exists());
        assert_eq!(engine.get(b"x").unwrap(), value(14));
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"x").unwrap(), value(14));

    // One merged segment plus the active segment opened at merge start
    assert_eq!(count_segments(&dir), 2);
    assert!(dir.join(segment_file_name(0)).exists());
    assert!(dir.join(segment_file_name(3)).exists());
    assert!(!merge_path(&dir).exists());
}

#[test]
fn test_merge_drops_deleted_keys() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        for i in 0..10 {
            engine.put(format!("key{}", i).as_bytes(), &value(i)).unwrap();
        }
        for i in 0..5 {
            engine.delete(format!("key{}", i).as_bytes()).unwrap();
        }
        engine.merge().unwrap();
    }

    let engine = Engine::open(config).unwrap();
    for i in 0..5 {
        assert!(matches!(
            engine.get(format!("key{}", i).as_bytes()),
            Err(CaskError::KeyNotFound)
        ));
    }
    for i in 5..10 {
        assert_eq!(engine.get(format!("key{}", i).as_bytes()).unwrap(), value(i));
    }
    assert_eq!(engine.stat().unwrap().key_count, 5);
}

#[test]
fn test_merge_reduces_disk_usage() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    let before = {
        let engine = Engine::open(config.clone()).unwrap();
        write_overwrites(&engine);
        let before = engine.stat().unwrap().disk_size;
        engine.merge().unwrap();
        before
    };

    let engine = Engine::open(config).unwrap();
    assert!(engine.stat().unwrap().disk_size < before);
}

#[test]
fn test_writes_after_merge_survive_adoption() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        write_overwrites(&engine);
        engine.put(b"y", b"before-merge").unwrap();
        engine.merge().unwrap();

        engine.put(b"x", b"after-merge").unwrap();
        engine.delete(b"y").unwrap();
        engine.put(b"z", b"new").unwrap();
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"x").unwrap(), b"after-merge");
    assert!(matches!(engine.get(b"y"), Err(CaskError::KeyNotFound)));
    assert_eq!(engine.get(b"z").unwrap(), b"new");
}

#[test]
fn test_reopen_twice_after_merge() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        write_overwrites(&engine);
        engine.put(b"other", b"1").unwrap();
        engine.merge().unwrap();
    }
    {
        let engine = Engine::open(config.clone()).unwrap();
        assert_eq!(engine.get(b"x").unwrap(), value(14));
        engine.put(b"other", b"2").unwrap();
    }

    // Hint and marker stay in place; later segments are still replayed
    assert!(dir.join(HINT_FILE_NAME).exists());
    assert!(dir.join(MERGE_FINISHED_FILE_NAME).exists());

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"x").unwrap(), value(14));
    assert_eq!(engine.get(b"other").unwrap(), b"2");
}

#[test]
fn test_repeated_merges() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    for pass in 0..3 {
        let engine = Engine::open(config.clone()).unwrap();
        for round in 0..15 {
            engine.put(b"x", &value(pass * 100 + round)).unwrap();
        }
        engine.put(format!("pass{}", pass).as_bytes(), b"done").unwrap();
        engine.merge().unwrap();
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"x").unwrap(), value(214));
    for pass in 0..3 {
        assert_eq!(
            engine.get(format!("pass{}", pass).as_bytes()).unwrap(),
            b"done"
        );
    }
}

#[test]
fn test_merged_batch_records_stay_visible() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        let batch = engine.new_write_batch(WriteBatchConfig::default()).unwrap();
        batch.put(b"b1", b"one").unwrap();
        batch.put(b"b2", b"two").unwrap();
        batch.commit().unwrap();
        write_overwrites(&engine);
        engine.merge().unwrap();
    }

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"b1").unwrap(), b"one");
    assert_eq!(engine.get(b"b2").unwrap(), b"two");
    assert_eq!(engine.get(b"x").unwrap(), value(14));
}

#[test]
fn test_merge_with_every_backend() {
    for index_type in [
        IndexType::BTree,
        IndexType::AdaptiveRadixTree,
        IndexType::Persistent,
    ] {
        let (_temp, dir) = setup_temp_dir();
        let config = small_segments(&dir, index_type);

        {
            let engine = Engine::open(config.clone()).unwrap();
            write_overwrites(&engine);
            engine.put(b"keep", b"me").unwrap();
            engine.merge().unwrap();
            engine.put(b"late", b"write").unwrap();
            engine.close().unwrap();
        }

        {
            let engine = Engine::open(config.clone()).unwrap();
            assert_eq!(engine.get(b"x").unwrap(), value(14), "{:?}", index_type);
            assert_eq!(engine.get(b"keep").unwrap(), b"me", "{:?}", index_type);
            assert_eq!(engine.get(b"late").unwrap(), b"write", "{:?}", index_type);
            engine.close().unwrap();
        }

        let engine = Engine::open(config).unwrap();
        assert_eq!(engine.list_keys().len(), 3, "{:?}", index_type);
    }
}

#[test]
fn test_persistent_index_follows_output_adopted_before_open() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::Persistent);
    let expected = |i: usize| format!("v{}-4-padding-padding", i).into_bytes();

    {
        let engine = Engine::open(config.clone()).unwrap();
        for round in 0..5 {
            for i in 0..10 {
                let value = format!("v{}-{}-padding-padding", i, round);
                engine.put(format!("key{:02}", i).as_bytes(), value.as_bytes()).unwrap();
            }
        }
        engine.merge().unwrap();
        engine.put(b"late", b"write").unwrap();
        engine.close().unwrap();
    }

    // Output moved in by an open that died before touching the index
    assert!(adopt_merge_output(&dir).unwrap().is_some());

    for _ in 0..2 {
        let engine = Engine::open(config.clone()).unwrap();
        for i in 0..10 {
            assert_eq!(
                engine.get(format!("key{:02}", i).as_bytes()).unwrap(),
                expected(i)
            );
        }
        assert_eq!(engine.get(b"late").unwrap(), b"write");
        engine.close().unwrap();
    }
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_merge_empty_engine() {
    let (_temp, dir) = setup_temp_dir();
    let engine = Engine::open(small_segments(&dir, IndexType::BTree)).unwrap();

    engine.merge().unwrap();

    assert!(!merge_path(&dir).exists());
    assert_eq!(count_segments(&dir), 0);
}

#[test]
fn test_merge_with_nothing_live() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.put(b"a", b"1").unwrap();
        engine.delete(b"a").unwrap();
        engine.merge().unwrap();
    }

    let engine = Engine::open(config).unwrap();
    assert!(engine.list_keys().is_empty());
    // Only the active segment opened at merge start remains
    assert_eq!(count_segments(&dir), 1);
}

#[test]
fn test_incomplete_merge_directory_is_discarded() {
    let (_temp, dir) = setup_temp_dir();
    let config = small_segments(&dir, IndexType::BTree);

    {
        let engine = Engine::open(config.clone()).unwrap();
        engine.put(b"k", b"v").unwrap();
    }

    // A merge that died before writing its marker
    let merge_dir = merge_path(&dir);
    fs::create_dir_all(&merge_dir).unwrap();
    fs::write(merge_dir.join(segment_file_name(0)), b"partial garbage").unwrap();
    fs::write(merge_dir.join(HINT_FILE_NAME), b"").unwrap();

    let engine = Engine::open(config).unwrap();
    assert!(!merge_dir.exists());
    assert_eq!(engine.get(b"k").unwrap(), b"v");
    assert!(!dir.join(HINT_FILE_NAME).exists());
}

#[test]
fn test_merge_does_not_touch_originals_before_reopen() {
    let (_temp, dir) = setup_temp_dir();
    let engine = Engine::open(small_segments(&dir, IndexType::BTree)).unwrap();

    write_overwrites(&engine);
    engine.merge().unwrap();

    for id in 0..3 {
        assert!(dir.join(segment_file_name(id)).exists());
    }
    engine.put(b"x", b"still-writable").unwrap();
    assert_eq!(engine.get(b"x").unwrap(), b"still-writable");
}
