//! Compaction: the three level policies, the shared merge, cascades, and
//! level extension with filter rebuilds.
//!
//! A merge gathers every pair in the level (runs oldest to newest), stable
//! sorts by key, keeps the last record per key (the newest, since newer runs
//! were appended later), and drops tombstones. Tiering ships the result one
//! level deeper; lazy leveling and leveling rewrite in place unless the
//! merged size demands a deeper level.

use anyhow::Result;
use run::Run;
use tracing::debug;

use crate::{CompactionStrategy, KeyValuePair, LsmTree, TreeState, TIERING_THRESHOLD};

/// Stable-sorts by key, keeps the last record per key, drops tombstones.
/// Input order carries precedence: later records win.
pub(crate) fn merge_pairs(mut pairs: Vec<KeyValuePair>) -> Vec<KeyValuePair> {
    pairs.sort(); // stable, ordered by key only

    let mut merged = Vec::with_capacity(pairs.len());
    let mut iter = pairs.into_iter().peekable();
    while let Some(pair) = iter.next() {
        if let Some(next) = iter.peek() {
            if next.key == pair.key {
                continue; // a newer record for this key follows
            }
        }
        if !pair.is_tombstone() {
            merged.push(pair);
        }
    }
    merged
}

impl LsmTree {
    /// Runs compaction on every level whose trigger is met, cascading as
    /// merges push data deeper. A no-op while compaction is disabled.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.lock_state();
        for level in 1..state.levels.len() {
            if state.levels[level].needs_compaction() {
                self.perform_compaction_locked(&mut state, level)?;
            }
        }
        Ok(())
    }

    /// Rebuilds every run's bloom filter against the current per-level
    /// allocation. Invoked automatically when the tree deepens.
    pub fn rebuild_filters(&self) -> Result<()> {
        let mut state = self.lock_state();
        self.rebuild_filters_locked(&mut state)
    }

    pub(crate) fn perform_compaction_locked(
        &self,
        state: &mut TreeState,
        level: usize,
    ) -> Result<()> {
        if !state.compaction_enabled {
            debug!("compaction disabled, skipping level {}", level);
            return Ok(());
        }

        let strategy = state.levels[level].strategy;
        debug!(
            "compacting level {} ({:?}, {} runs)",
            level,
            strategy,
            state.levels[level].run_count()
        );

        // Gather oldest to newest so the merge's last-record-wins rule keeps
        // the newest value per key.
        let mut all_pairs = Vec::new();
        for run in &state.levels[level].runs {
            all_pairs.extend(run.all_pairs()?);
        }
        if all_pairs.is_empty() {
            debug!("no data to compact in level {}", level);
            return Ok(());
        }

        let merged = merge_pairs(all_pairs);
        let merged_bytes = (merged.len() * crate::PAIR_BYTES) as u64;

        match strategy {
            CompactionStrategy::Tiering => {
                let next = level + 1;
                debug_assert!(next < state.levels.len(), "tiering at the deepest level");

                // Recursive cascades can land here with the trigger no
                // longer met; re-check before moving anything.
                if state.levels[level].run_count() >= TIERING_THRESHOLD {
                    if merged.is_empty() {
                        // Every surviving record was a tombstone.
                        state.levels[level].clear_runs();
                    } else {
                        self.write_merged_run(state, next, &merged)?;
                        state.levels[level].clear_runs();
                        debug!(
                            "tiering moved {} pairs from level {} to level {}",
                            merged.len(),
                            level,
                            next
                        );
                        if state.levels[next].needs_compaction() {
                            self.perform_compaction_locked(state, next)?;
                        }
                    }
                }

                if next == state.max_level && state.levels[next].run_count() > 0 {
                    self.extend_levels_locked(state)?;
                }
            }

            CompactionStrategy::LazyLeveling | CompactionStrategy::Leveling => {
                let target = state.target_level_for_size(merged_bytes);

                if merged.is_empty() {
                    state.levels[level].clear_runs();
                } else if target > level {
                    // Too large for this level: move the merged run deeper.
                    self.write_merged_run(state, target, &merged)?;
                    state.levels[level].clear_runs();
                    debug!(
                        "{:?} moved {} pairs from level {} to level {} by size",
                        strategy,
                        merged.len(),
                        level,
                        target
                    );
                    if state.levels[target].needs_compaction() {
                        self.perform_compaction_locked(state, target)?;
                    }
                } else {
                    // Rewrite in place as a single run. The old files go
                    // first so run id 0 is free to reuse.
                    state.levels[level].clear_runs();
                    let fpr = state.fpr_for_level(level);
                    let run = Run::create(
                        self.data_dir(),
                        level,
                        0,
                        &merged,
                        fpr,
                        self.io_handle(),
                    )?;
                    state.levels[level].runs.push(run);
                    debug!(
                        "{:?} rewrote level {} in place as one run of {} pairs",
                        strategy,
                        level,
                        merged.len()
                    );
                }

                if level == state.max_level && state.levels[level].run_count() > 0 {
                    self.extend_levels_locked(state)?;
                }
            }
        }

        Ok(())
    }

    /// Appends the merged result as a new run of `target`, with the filter
    /// built at that level's allocation.
    fn write_merged_run(
        &self,
        state: &mut TreeState,
        target: usize,
        merged: &[KeyValuePair],
    ) -> Result<()> {
        let run_id = state.levels[target].run_count();
        let fpr = state.fpr_for_level(target);
        let run = Run::create(self.data_dir(), target, run_id, merged, fpr, self.io_handle())?;
        state.levels[target].runs.push(run);
        Ok(())
    }

    /// Appends a fresh leveling level, bumps `max_level`, and rebuilds every
    /// bloom filter — the allocation depends on the tree depth, so all
    /// existing filters are now misallocated.
    pub(crate) fn extend_levels_locked(&self, state: &mut TreeState) -> Result<()> {
        let new_level = state.max_level + 1;
        debug!("extending tree with level {}", new_level);

        state.levels.push(crate::Level::new(new_level));
        state.max_level = new_level;

        self.rebuild_filters_locked(state)
    }

    pub(crate) fn rebuild_filters_locked(&self, state: &mut TreeState) -> Result<()> {
        for level in 1..state.levels.len() {
            let fpr = state.fpr_for_level(level);
            debug!("rebuilding level {} filters at fpr {:.5}", level, fpr);
            for run in &mut state.levels[level].runs {
                run.rebuild_bloom_filter(fpr)?;
            }
        }
        Ok(())
    }
}
