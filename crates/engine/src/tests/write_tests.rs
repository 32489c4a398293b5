use crate::*;
use anyhow::Result;
use tempfile::tempdir;

use super::helpers::{count_run_files, open_small};

// --------------------- Put / remove basics ---------------------

#[test]
fn put_then_get() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    tree.put(1, 100)?;
    assert_eq!(tree.get(1)?, Some(100));
    assert_eq!(tree.get(2)?, None);
    Ok(())
}

#[test]
fn put_overwrites_in_buffer() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    tree.put(1, 100)?;
    tree.put(1, 200)?;
    assert_eq!(tree.get(1)?, Some(200));
    assert_eq!(tree.buffer_len(), 1, "re-put must update in place");
    Ok(())
}

#[test]
fn remove_reports_true_and_hides_key() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    tree.put(5, 50)?;
    assert!(tree.remove(5)?);
    assert_eq!(tree.get(5)?, None);

    // Removing a key never written also reports true.
    assert!(tree.remove(999)?);
    assert_eq!(tree.get(999)?, None);
    Ok(())
}

// --------------------- Flush ---------------------

#[test]
fn explicit_flush_creates_a_level1_run() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    for k in 0..100 {
        tree.put(k, k)?;
    }
    assert_eq!(tree.run_count(1), 0);

    tree.flush()?;
    assert_eq!(tree.run_count(1), 1);
    assert_eq!(tree.buffer_len(), 0);
    assert_eq!(count_run_files(dir.path()), 1);

    // Data still readable from disk.
    assert_eq!(tree.get(42)?, Some(42));
    Ok(())
}

#[test]
fn flush_of_empty_buffer_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    tree.flush()?;
    tree.flush()?;
    assert_eq!(tree.run_count(1), 0);
    assert_eq!(count_run_files(dir.path()), 0);
    Ok(())
}

#[test]
fn full_buffer_flushes_automatically() -> Result<()> {
    let dir = tempdir()?;
    let tree = open_small(dir.path(), 100);

    for k in 0..500 {
        tree.put(k, k * 2)?;
    }

    assert!(
        tree.run_count(1) > 0 || tree.level_key_count(2) > 0,
        "500 puts through a ~100-pair buffer must have flushed"
    );
    for k in 0..500 {
        assert_eq!(tree.get(k)?, Some(k * 2));
    }
    Ok(())
}

#[test]
fn buffer_byte_count_is_monotone_until_clear() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    let mut last = tree.buffer_bytes();
    for k in 0..50 {
        tree.put(k, k)?;
        let now = tree.buffer_bytes();
        assert!(now > last, "new key must grow the estimate");
        last = now;
    }

    tree.flush()?;
    assert_eq!(tree.buffer_bytes(), 0);
    Ok(())
}

// --------------------- Tunables ---------------------

#[test]
fn zero_buffer_capacity_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    assert!(tree.set_buffer_capacity(0).is_err());
    assert_eq!(tree.buffer_capacity(), DEFAULT_BUFFER_SIZE_BYTES);

    tree.set_buffer_capacity(1024)?;
    assert_eq!(tree.buffer_capacity(), 1024);
    Ok(())
}

#[test]
fn invalid_tunables_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    assert!(tree.set_total_fpr(0.0).is_err());
    assert!(tree.set_total_fpr(-1.0).is_err());
    assert!(tree.set_size_ratio(1).is_err());

    tree.set_total_fpr(0.01)?;
    tree.set_size_ratio(8)?;
    assert_eq!(tree.size_ratio(), 8);
    Ok(())
}

#[test]
fn latency_counters_advance() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    tree.put(1, 1)?;
    tree.get(1)?;
    tree.get(2)?;

    assert_eq!(tree.write_count(), 1);
    assert_eq!(tree.read_count(), 2);
    Ok(())
}
