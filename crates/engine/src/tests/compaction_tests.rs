use crate::compaction::merge_pairs;
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Merge helper ---------------------

#[test]
fn merge_keeps_last_record_per_key() {
    let input = vec![
        KeyValuePair::new(1, 10), // older
        KeyValuePair::new(2, 20),
        KeyValuePair::new(1, 11), // newer, appended later
    ];
    let merged = merge_pairs(input);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].key, 1);
    assert_eq!(merged[0].value, 11);
    assert_eq!(merged[1].value, 20);
}

#[test]
fn merge_drops_tombstones() {
    let input = vec![
        KeyValuePair::new(1, 10),
        KeyValuePair::new(2, 20),
        KeyValuePair::new(1, TOMBSTONE),
    ];
    let merged = merge_pairs(input);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].key, 2);
}

#[test]
fn merge_output_is_sorted_and_unique() {
    let mut input = Vec::new();
    for k in (0..100).rev() {
        input.push(KeyValuePair::new(k, k));
        input.push(KeyValuePair::new(k, k + 1000));
    }
    let merged = merge_pairs(input);
    assert_eq!(merged.len(), 100);
    assert!(merged.windows(2).all(|w| w[0].key < w[1].key));
    assert!(merged.iter().all(|p| p.value >= 1000), "later records win");
    assert!(merged.iter().all(|p| !p.is_tombstone()));
}

#[test]
fn merge_of_only_tombstones_is_empty() {
    let input = vec![
        KeyValuePair::new(1, TOMBSTONE),
        KeyValuePair::new(2, TOMBSTONE),
    ];
    assert!(merge_pairs(input).is_empty());
}

// --------------------- Strategy assignment and triggers ---------------------

#[test]
fn strategies_are_a_function_of_level_number() {
    assert_eq!(strategy_for_level(1), CompactionStrategy::Tiering);
    for level in 2..=4 {
        assert_eq!(strategy_for_level(level), CompactionStrategy::LazyLeveling);
    }
    for level in 5..=9 {
        assert_eq!(strategy_for_level(level), CompactionStrategy::Leveling);
    }
}

#[test]
fn tiering_waits_for_threshold() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    // Three flushes: below the tiering threshold of four.
    for batch in 0..3 {
        for k in 0..10 {
            tree.put(batch * 10 + k, k)?;
        }
        tree.flush()?;
    }
    assert_eq!(tree.run_count(1), 3);
    assert_eq!(tree.run_count(2), 0);

    tree.compact()?;
    assert_eq!(tree.run_count(1), 3, "below threshold, nothing moves");
    Ok(())
}

#[test]
fn fourth_flush_triggers_tiering_merge() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    for batch in 0..4i64 {
        for k in 0..10 {
            tree.put(batch * 10 + k, batch)?;
        }
        tree.flush()?;
    }

    // The flush cascade merged all of level 1 into one level-2 run.
    assert_eq!(tree.run_count(1), 0);
    assert_eq!(tree.run_count(2), 1);
    assert_eq!(tree.level_key_count(2), 40);

    for k in 0..40 {
        assert_eq!(tree.get(k)?, Some(k / 10));
    }
    Ok(())
}

#[test]
fn tiering_threshold_invariant_after_compact() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    for batch in 0..9i64 {
        for k in 0..20 {
            tree.put(batch * 20 + k, k)?;
        }
        tree.flush()?;
    }
    tree.compact()?;

    assert!(
        tree.run_count(1) < TIERING_THRESHOLD,
        "tiering level must sit below its threshold after compact()"
    );
    Ok(())
}

#[test]
fn compaction_eliminates_duplicates_and_keeps_newest() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    // Same keys in all four flushed runs, values distinguish the rounds.
    for round in 0..4i64 {
        for k in 0..10 {
            tree.put(k, round * 100 + k)?;
        }
        tree.flush()?;
    }

    assert_eq!(tree.run_count(2), 1);
    assert_eq!(tree.level_key_count(2), 10, "duplicates merged away");
    for k in 0..10 {
        assert_eq!(tree.get(k)?, Some(300 + k), "round 3 values survive");
    }
    Ok(())
}

#[test]
fn compaction_purges_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    for k in 0..10 {
        tree.put(k, k)?;
    }
    tree.flush()?;
    for k in 0..5 {
        tree.remove(k)?;
    }
    tree.flush()?;

    // Two more flushes reach the tiering threshold and force the merge.
    tree.put(100, 100)?;
    tree.flush()?;
    tree.put(101, 101)?;
    tree.flush()?;

    assert_eq!(tree.run_count(1), 0);
    // 5 live of the original 10, plus keys 100 and 101.
    assert_eq!(tree.level_key_count(2), 7);

    for k in 0..5 {
        assert_eq!(tree.get(k)?, None);
    }
    for k in 5..10 {
        assert_eq!(tree.get(k)?, Some(k));
    }
    Ok(())
}

#[test]
fn all_tombstone_merge_writes_no_run() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    // Four flushes of nothing but tombstones.
    for batch in 0..4i64 {
        for k in 0..5 {
            tree.remove(batch * 5 + k)?;
        }
        tree.flush()?;
    }

    assert_eq!(tree.run_count(1), 0);
    assert_eq!(tree.run_count(2), 0, "all-tombstone merge vanishes");
    Ok(())
}

#[test]
fn disabled_compaction_lets_runs_accumulate() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;
    tree.set_compaction_enabled(false);

    for batch in 0..6i64 {
        tree.put(batch, batch)?;
        tree.flush()?;
    }
    assert_eq!(tree.run_count(1), 6, "no merges while disabled");

    tree.compact()?;
    assert_eq!(tree.run_count(1), 6, "compact() is a no-op while disabled");

    tree.set_compaction_enabled(true);
    tree.compact()?;
    assert_eq!(tree.run_count(1), 0);
    assert_eq!(tree.run_count(2), 1);
    Ok(())
}

// --------------------- Level extension ---------------------

#[test]
fn depositing_into_the_deepest_level_extends_the_tree() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    // Shrink the tree so a single tiering merge reaches the deepest level.
    {
        let mut state = tree.lock_state();
        state.levels.truncate(3);
        state.max_level = 2;
    }

    for batch in 0..4i64 {
        for k in 0..10 {
            tree.put(batch * 10 + k, k)?;
        }
        tree.flush()?;
    }

    // The merge landed in level 2 (the old deepest), so a new empty level 3
    // was appended and the filters rebuilt.
    assert_eq!(tree.max_level(), 3);
    assert_eq!(tree.level_count(), 4);
    assert_eq!(tree.run_count(2), 1);
    assert_eq!(tree.run_count(3), 0);
    assert_eq!(strategy_for_level(3), CompactionStrategy::LazyLeveling);

    for k in 0..40 {
        assert!(tree.get(k)?.is_some());
    }
    Ok(())
}

// --------------------- FPR allocation ---------------------

#[test]
fn monkey_allocation_tightens_with_depth() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;
    let state = tree.lock_state();

    // r = 1, T = 4, L = 6: FPR(6) = 1, FPR(5) = 1/4, FPR(4) = 1/16, ...
    assert_eq!(state.fpr_for_level(6), 1.0);
    assert!((state.fpr_for_level(5) - 0.25).abs() < 1e-12);
    assert!((state.fpr_for_level(4) - 0.0625).abs() < 1e-12);

    // Shallow levels cap at 1.
    assert!(state.fpr_for_level(1) <= 1.0);
    Ok(())
}

#[test]
fn target_level_tracks_capacity() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;
    let state = tree.lock_state();

    let mib = 1024 * 1024u64;
    // Capacities: 4, 16, 64, 256 MiB ...
    assert_eq!(state.target_level_for_size(1), 1);
    assert_eq!(state.target_level_for_size(4 * mib), 1);
    assert_eq!(state.target_level_for_size(4 * mib + 1), 2);
    assert_eq!(state.target_level_for_size(16 * mib + 1), 3);
    // Beyond every capacity: clamp to the deepest level.
    assert_eq!(state.target_level_for_size(u64::MAX), 6);
    Ok(())
}

#[test]
fn rebuild_filters_preserves_membership() -> Result<()> {
    let dir = tempdir()?;
    let tree = LsmTree::open(dir.path())?;

    for k in 0..1000 {
        tree.put(k, k)?;
    }
    tree.flush()?;

    tree.set_total_fpr(0.001)?;
    tree.rebuild_filters()?;

    for k in 0..1000 {
        assert_eq!(tree.get(k)?, Some(k));
    }
    Ok(())
}
