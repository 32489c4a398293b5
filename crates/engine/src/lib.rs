//! # Engine — the SiltDB storage engine
//!
//! An LSM-tree over fixed-width `i64` keys and values, tying together the
//! [`memtable`], [`bloom`], [`fence`], and [`run`] crates.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────────┐
//! │                    LSM TREE                       │
//! │                                                   │
//! │ write.rs → skip-list buffer insert                │
//! │              |                                    │
//! │              |  (byte budget exceeded?)           │
//! │              v            yes                     │
//! │          flush() → new run in level 1             │
//! │              |                                    │
//! │              |  (level trigger reached?)          │
//! │              v            yes                     │
//! │      compaction.rs → merge, cascade deeper        │
//! │                                                   │
//! │ read.rs → buffer → L1 runs → L2 runs → ...        │
//! │            (newest first, first match wins)       │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `LsmTree` struct, levels, tunables, `Debug`, `Drop`  |
//! | [`recovery`]   | Directory scan, run reloading, level extension       |
//! | [`write`]      | `put()`, `remove()`, `flush()`                       |
//! | [`read`]       | `get()`, `range()`                                   |
//! | [`compaction`] | Per-level policies, merge, cascade, filter rebuilds  |
//! | [`load`]       | Streamed `load_file()`, distributing `bulk_load_file()` |
//! | [`stats`]      | Multi-line report, I/O and latency accessors         |
//!
//! ## Levels and policies
//!
//! ```text
//! ┌────────────────────────────┐  ← freshest, checked first
//! │ BUFFER (level 0)           │     skip list, no filter
//! ├────────────────────────────┤
//! │ Level 1   TIERING          │     up to 3 runs, merge on the 4th
//! ├────────────────────────────┤
//! │ Levels 2–4  LAZY LEVELING  │     up to 2 runs, merge on the 3rd
//! ├────────────────────────────┤
//! │ Levels ≥5  LEVELING        │     at most one run
//! └────────────────────────────┘
//! ```
//!
//! Bloom filter budgets follow the Monkey allocation: the deepest level gets
//! the full target rate `r` and each shallower level gets `r / T` of its
//! child's, capped at 1. When compaction deepens the tree every filter is
//! rebuilt against the new allocation.
//!
//! ## Concurrency
//!
//! One mutex guards the tree state (buffer, levels, tunables); the public
//! API takes `&self` so the tree can sit behind an `Arc` shared across
//! threads. I/O and latency counters are atomics updated outside the lock.
//! Bulk load drops the lock before its closing compaction so readers can
//! proceed while the post-load merge grinds.

mod compaction;
mod load;
mod read;
mod recovery;
mod stats;
mod write;

use anyhow::{Context, Result};
use memtable::SkipList;
use metrics::{IoCounters, LatencyRecorder};
use run::Run;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

pub use memtable::{KeyValuePair, PAIR_BYTES, TOMBSTONE};

/// Default write buffer budget (4 MiB).
pub const DEFAULT_BUFFER_SIZE_BYTES: usize = 4 * 1024 * 1024;
/// Default size ratio `T` between adjacent level capacities.
pub const DEFAULT_SIZE_RATIO: usize = 4;
/// Number of disk levels a fresh tree starts with.
pub const INITIAL_MAX_LEVEL: usize = 6;
/// Run count that triggers a tiering merge.
pub const TIERING_THRESHOLD: usize = 4;
/// Run count that triggers a lazy-leveling merge.
pub const LAZY_LEVELING_THRESHOLD: usize = 3;
/// Default total false-positive budget `r` across the tree.
pub const DEFAULT_TOTAL_FPR: f64 = 1.0;
/// Buffer budget while a bulk load is in flight (100 MiB).
pub const BULK_LOAD_BUFFER_BYTES: usize = 100 * 1024 * 1024;

/// How a level reacts to accumulating runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategy {
    /// Accumulate runs, merge them all into the next level at the threshold.
    Tiering,
    /// Tolerate a few runs, then merge in place (or deeper if too large).
    LazyLeveling,
    /// At most one run; any second run forces a merge.
    Leveling,
}

/// Policy assignment is a pure function of the level number.
#[must_use]
pub fn strategy_for_level(level: usize) -> CompactionStrategy {
    match level {
        1 => CompactionStrategy::Tiering,
        2..=4 => CompactionStrategy::LazyLeveling,
        _ => CompactionStrategy::Leveling,
    }
}

/// One disk level: an ordered bag of runs (newest last) sharing a strategy.
pub(crate) struct Level {
    pub(crate) number: usize,
    pub(crate) strategy: CompactionStrategy,
    pub(crate) runs: Vec<Run>,
}

impl Level {
    pub(crate) fn new(number: usize) -> Self {
        Self {
            number,
            strategy: strategy_for_level(number),
            runs: Vec::new(),
        }
    }

    pub(crate) fn needs_compaction(&self) -> bool {
        match self.strategy {
            CompactionStrategy::Tiering => self.runs.len() >= TIERING_THRESHOLD,
            CompactionStrategy::LazyLeveling => self.runs.len() >= LAZY_LEVELING_THRESHOLD,
            CompactionStrategy::Leveling => self.runs.len() > 1,
        }
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub(crate) fn key_count(&self) -> usize {
        self.runs.iter().map(Run::len).sum()
    }

    /// Deletes every run's files and empties the level.
    pub(crate) fn clear_runs(&mut self) {
        for run in &self.runs {
            run.delete_files_from_disk();
        }
        self.runs.clear();
    }
}

/// Everything the engine mutex protects.
pub(crate) struct TreeState {
    pub(crate) buffer: SkipList,
    /// Indexed by level number; index 0 is the (always empty) slot for the
    /// buffer so arithmetic stays 1-based like the capacity formulas.
    pub(crate) levels: Vec<Level>,
    pub(crate) max_level: usize,
    pub(crate) buffer_capacity: usize,
    pub(crate) compaction_enabled: bool,
    pub(crate) total_fpr: f64,
    pub(crate) size_ratio: usize,
}

impl TreeState {
    /// Monkey allocation: `FPR(i) = min(1, r / T^(L - i))`. The buffer
    /// (level 0) carries no filter.
    pub(crate) fn fpr_for_level(&self, level: usize) -> f64 {
        if level == 0 {
            return 1.0;
        }
        let exponent = self.max_level.saturating_sub(level) as i32;
        let fpr = self.total_fpr / (self.size_ratio as f64).powi(exponent);
        fpr.min(1.0)
    }

    /// Capacity of disk level `i`: `DEFAULT_BUFFER * T^(i-1)`. Derived from
    /// the default buffer size, not the runtime capacity, so a temporarily
    /// enlarged buffer (bulk load) cannot skew placement.
    pub(crate) fn level_capacity_bytes(&self, level: usize) -> u64 {
        let ratio = self.size_ratio as f64;
        (DEFAULT_BUFFER_SIZE_BYTES as f64 * ratio.powi(level as i32 - 1)) as u64
    }

    /// Shallowest level whose capacity holds `size_bytes`; `max_level` when
    /// nothing does.
    pub(crate) fn target_level_for_size(&self, size_bytes: u64) -> usize {
        for level in 1..=self.max_level {
            if self.level_capacity_bytes(level) >= size_bytes {
                return level;
            }
        }
        self.max_level
    }

    pub(crate) fn logical_size(&self) -> usize {
        self.buffer.element_count() + self.levels.iter().map(Level::key_count).sum::<usize>()
    }
}

/// The LSM-tree key-value store.
///
/// # Write path
///
/// 1. Insert into the skip-list buffer (updates in place on re-put).
/// 2. When the buffer's byte estimate reaches the capacity, flush it as a
///    new run into level 1.
/// 3. If level 1 now meets its trigger, compaction cascades down the tree.
///
/// # Read path
///
/// 1. Probe the buffer (freshest data, may hold tombstones).
/// 2. Walk levels shallow-to-deep, runs newest-first; bloom filters and
///    fence pointers keep most runs untouched. First match wins.
/// 3. A tombstone value anywhere reports as "not found".
///
/// # Recovery
///
/// [`LsmTree::open`] scans the data directory for `run_{level}_{id}.data`
/// files and reloads them; a malformed run is skipped with a warning, and
/// missing sidecars merely degrade that run.
pub struct LsmTree {
    data_dir: PathBuf,
    state: Mutex<TreeState>,
    io: Arc<IoCounters>,
    read_latency: LatencyRecorder,
    write_latency: LatencyRecorder,
}

impl LsmTree {
    /// Opens (or creates) a store rooted at `data_dir`, recovering any runs
    /// already on disk.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let io = IoCounters::new();
        let mut state = TreeState {
            buffer: SkipList::new(),
            levels: (0..=INITIAL_MAX_LEVEL).map(Level::new).collect(),
            max_level: INITIAL_MAX_LEVEL,
            buffer_capacity: DEFAULT_BUFFER_SIZE_BYTES,
            compaction_enabled: true,
            total_fpr: DEFAULT_TOTAL_FPR,
            size_ratio: DEFAULT_SIZE_RATIO,
        };

        recovery::load_runs_from_disk(&mut state, &data_dir, &io);

        let tree = Self {
            data_dir,
            state: Mutex::new(state),
            io,
            read_latency: LatencyRecorder::default(),
            write_latency: LatencyRecorder::default(),
        };

        // Loaded levels may already sit past their triggers.
        {
            let mut state = tree.lock_state();
            for level in 1..state.levels.len() {
                if state.levels[level].needs_compaction() {
                    tree.perform_compaction_locked(&mut state, level)?;
                }
            }
        }

        info!(
            "lsm-tree opened at {} with {} levels",
            tree.data_dir.display(),
            tree.max_level()
        );
        Ok(tree)
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().expect("engine lock poisoned")
    }

    pub(crate) fn io_handle(&self) -> Arc<IoCounters> {
        self.io.clone()
    }

    pub(crate) fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ---- Tunables ----

    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.lock_state().buffer_capacity
    }

    /// Sets the buffer byte budget. Zero is rejected — the buffer would
    /// flush on every write.
    pub fn set_buffer_capacity(&self, bytes: usize) -> Result<()> {
        anyhow::ensure!(bytes > 0, "buffer capacity must be positive");
        self.lock_state().buffer_capacity = bytes;
        Ok(())
    }

    #[must_use]
    pub fn compaction_enabled(&self) -> bool {
        self.lock_state().compaction_enabled
    }

    pub fn set_compaction_enabled(&self, enabled: bool) {
        self.lock_state().compaction_enabled = enabled;
    }

    #[must_use]
    pub fn total_fpr(&self) -> f64 {
        self.lock_state().total_fpr
    }

    /// Sets the tree-wide false-positive budget. Takes effect on the next
    /// filter build or [`rebuild_filters`](Self::rebuild_filters).
    pub fn set_total_fpr(&self, fpr: f64) -> Result<()> {
        anyhow::ensure!(fpr > 0.0, "total FPR must be positive");
        self.lock_state().total_fpr = fpr;
        Ok(())
    }

    #[must_use]
    pub fn size_ratio(&self) -> usize {
        self.lock_state().size_ratio
    }

    pub fn set_size_ratio(&self, ratio: usize) -> Result<()> {
        anyhow::ensure!(ratio >= 2, "size ratio must be at least 2");
        self.lock_state().size_ratio = ratio;
        Ok(())
    }

    // ---- Diagnostics ----

    /// Logical pair count: buffer entries plus every run's pairs (counting
    /// not-yet-compacted duplicates and tombstones).
    #[must_use]
    pub fn size(&self) -> usize {
        self.lock_state().logical_size()
    }

    #[must_use]
    pub fn max_level(&self) -> usize {
        self.lock_state().max_level
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.lock_state().levels.len()
    }

    /// Runs currently sitting in `level` (0 for the buffer level or any
    /// level beyond the tree).
    #[must_use]
    pub fn run_count(&self, level: usize) -> usize {
        self.lock_state().levels.get(level).map_or(0, Level::run_count)
    }

    /// Pairs stored in `level`'s runs.
    #[must_use]
    pub fn level_key_count(&self, level: usize) -> usize {
        self.lock_state().levels.get(level).map_or(0, Level::key_count)
    }

    #[must_use]
    pub fn buffer_len(&self) -> usize {
        self.lock_state().buffer.element_count()
    }

    #[must_use]
    pub fn buffer_bytes(&self) -> usize {
        self.lock_state().buffer.byte_count()
    }
}

impl std::fmt::Debug for LsmTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("LsmTree")
            .field("data_dir", &self.data_dir)
            .field("max_level", &state.max_level)
            .field("buffer_entries", &state.buffer.element_count())
            .field("buffer_bytes", &state.buffer.byte_count())
            .field("buffer_capacity", &state.buffer_capacity)
            .field("compaction_enabled", &state.compaction_enabled)
            .field(
                "runs_per_level",
                &state.levels.iter().map(Level::run_count).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Best-effort flush on drop so buffered writes survive a clean shutdown.
/// Errors are logged and swallowed — `Drop` cannot propagate them.
impl Drop for LsmTree {
    fn drop(&mut self) {
        let needs_flush = !self.lock_state().buffer.is_empty();
        if needs_flush {
            info!("flushing buffer during shutdown");
            if let Err(e) = self.flush() {
                warn!("shutdown flush failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests;
