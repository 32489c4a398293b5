//! Write path: `put()`, `remove()`, and the buffer flush.
//!
//! Writes land in the skip-list buffer. When the buffer's byte estimate
//! reaches the configured capacity the buffer is flushed as one new run
//! into level 1, and level 1's trigger may start a compaction cascade.

use anyhow::Result;
use run::Run;
use std::time::Instant;
use tracing::debug;

use crate::{LsmTree, TreeState, TOMBSTONE};

impl LsmTree {
    /// Inserts or updates a key.
    ///
    /// The value `i64::MIN` is reserved as the tombstone sentinel; storing
    /// it is indistinguishable from [`remove`](Self::remove).
    ///
    /// # Errors
    ///
    /// Returns an error if the write triggers a flush or compaction and the
    /// disk I/O fails.
    pub fn put(&self, key: i64, value: i64) -> Result<()> {
        let start = Instant::now();
        let result = self.put_inner(key, value);
        self.write_latency.observe(start.elapsed());
        result
    }

    /// Deletes a key by writing a tombstone that shadows any older value
    /// until compaction drops both. Always reports `true`.
    pub fn remove(&self, key: i64) -> Result<bool> {
        self.put(key, TOMBSTONE)?;
        Ok(true)
    }

    /// Flushes the buffer to a new run in level 1. No-op when empty.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock_state();
        self.flush_locked(&mut state)
    }

    fn put_inner(&self, key: i64, value: i64) -> Result<()> {
        let mut state = self.lock_state();
        state.buffer.insert(key, value);

        if state.buffer.byte_count() >= state.buffer_capacity {
            debug!(
                "buffer full ({} bytes >= {}), flushing",
                state.buffer.byte_count(),
                state.buffer_capacity
            );
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Writes the buffer's sorted contents as the next run of level 1,
    /// clears the buffer, and cascades if level 1 now meets its trigger.
    pub(crate) fn flush_locked(&self, state: &mut TreeState) -> Result<()> {
        let pairs = state.buffer.get_all_sorted();
        if pairs.is_empty() {
            debug!("buffer empty, nothing to flush");
            return Ok(());
        }

        let run_id = state.levels[1].run_count();
        let fpr = state.fpr_for_level(1);
        let run = Run::create(self.data_dir(), 1, run_id, &pairs, fpr, self.io_handle())?;

        debug!(
            "flushed {} pairs into run_1_{} (fpr {:.4})",
            pairs.len(),
            run_id,
            fpr
        );

        state.levels[1].runs.push(run);
        state.buffer.clear();

        if state.levels[1].needs_compaction() {
            debug!("level 1 needs compaction after flush");
            self.perform_compaction_locked(state, 1)?;
        }
        Ok(())
    }
}
