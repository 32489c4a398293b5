//! File ingestion: the streamed `load_file` and the distributing
//! `bulk_load_file`.
//!
//! `load_file` is just puts read off disk — every pair takes the normal
//! write path, with flushes and compactions happening as they naturally
//! would.
//!
//! `bulk_load_file` trades memory for throughput: it reads the whole input,
//! sorts and deduplicates it once, and writes one run per level directly,
//! sized so each level receives an integer number of "hypothetical flushes"
//! from the level above. Compaction is suspended for the duration and the
//! buffer budget is enlarged so concurrent writers cannot force flushes into
//! the middle of the distribution; both settings are restored afterwards
//! (or on failure).

use anyhow::{ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use memtable::{KeyValuePair, PAIR_BYTES};
use metrics::CountingReader;
use run::Run;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::compaction::merge_pairs;
use crate::{LsmTree, BULK_LOAD_BUFFER_BYTES, DEFAULT_BUFFER_SIZE_BYTES};

const MIB: f64 = (1024 * 1024) as f64;

impl LsmTree {
    /// Loads a binary pair file through the normal write path.
    ///
    /// The file holds raw `(i64 key, i64 value)` records, little-endian, no
    /// header — the same layout as a run data file. A truncated trailing
    /// record is ignored.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open load file {}", path.display()))?;
        let mut reader = BufReader::new(CountingReader::new(file, self.io_handle()));

        let mut count = 0usize;
        loop {
            let key = match reader.read_i64::<LittleEndian>() {
                Ok(k) => k,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("read error during load"),
            };
            let value = match reader.read_i64::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e).context("read error during load"),
            };
            self.put(key, value)?;
            count += 1;
        }

        info!("loaded {} pairs from {}", count, path.display());
        Ok(())
    }

    /// Bulk-loads a binary pair file by distributing it across levels.
    ///
    /// 1. Save the buffer capacity and compaction flag; enlarge the buffer
    ///    to [`BULK_LOAD_BUFFER_BYTES`] and disable compaction.
    /// 2. Read, sort, and deduplicate the whole input (later occurrence of a
    ///    key wins, tombstones drop out).
    /// 3. Pick the shallowest level whose capacity holds the data, then
    ///    allocate backwards toward level 1 in integer multiples of the
    ///    parent level's capacity; level 1 absorbs the remainder.
    /// 4. Write one run per non-empty level from contiguous slices of the
    ///    sorted data, release the engine lock, re-enable compaction, and
    ///    compact.
    /// 5. Restore the saved buffer capacity (compaction stays enabled).
    ///
    /// On failure both saved settings are restored before the error
    /// propagates.
    pub fn bulk_load_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (saved_capacity, saved_compaction) = {
            let mut state = self.lock_state();
            let saved = (state.buffer_capacity, state.compaction_enabled);
            state.buffer_capacity = BULK_LOAD_BUFFER_BYTES;
            state.compaction_enabled = false;
            saved
        };

        let result = self
            .distribute_bulk_load(path.as_ref())
            .and_then(|()| {
                // The distribution released the lock; re-enable compaction
                // and let readers interleave with the post-load merges.
                self.set_compaction_enabled(true);
                self.compact()
            });

        let mut state = self.lock_state();
        state.buffer_capacity = saved_capacity;
        if result.is_err() {
            state.compaction_enabled = saved_compaction;
        }
        drop(state);

        result.with_context(|| format!("bulk load of {} failed", path.as_ref().display()))
    }

    /// Steps 2–4 of the bulk load, holding the engine lock only while levels
    /// are touched.
    fn distribute_bulk_load(&self, path: &Path) -> Result<()> {
        // Pass 1: size the input.
        let file_bytes = std::fs::metadata(path)
            .with_context(|| format!("failed to stat bulk-load file {}", path.display()))?
            .len();
        ensure!(
            file_bytes % PAIR_BYTES as u64 == 0,
            "bulk-load file {} has size {}, not a multiple of {}",
            path.display(),
            file_bytes,
            PAIR_BYTES
        );
        let total_pairs = (file_bytes / PAIR_BYTES as u64) as usize;
        if total_pairs == 0 {
            return Ok(());
        }

        // Pass 2: read everything.
        let file = File::open(path)?;
        let mut reader = BufReader::new(CountingReader::new(file, self.io_handle()));
        let mut pairs = Vec::with_capacity(total_pairs);
        for _ in 0..total_pairs {
            let key = reader.read_i64::<LittleEndian>()?;
            let value = reader.read_i64::<LittleEndian>()?;
            pairs.push(KeyValuePair::new(key, value));
        }

        // Sort and deduplicate; the later occurrence per key wins, exactly
        // like a compaction merge.
        let pairs = merge_pairs(pairs);
        if pairs.is_empty() {
            return Ok(());
        }

        let mut state = self.lock_state();
        let ratio = state.size_ratio as f64;
        let default_mib = DEFAULT_BUFFER_SIZE_BYTES as f64 / MIB;
        let total_mib = (pairs.len() * PAIR_BYTES) as f64 / MIB;

        // Capacity of level i in MiB, from the default buffer size.
        let cap_mib = |level: usize| default_mib * ratio.powi(level as i32 - 1);

        // Shallowest level that holds everything, clamped to the deepest.
        let target_level = (1..=state.max_level)
            .find(|&level| cap_mib(level) >= total_mib)
            .unwrap_or(state.max_level);

        // Allocate backwards: each level takes an integer number of
        // parent-level capacities (hypothetical flushes from above); the
        // tail lands in level 1.
        let mut alloc_mib = vec![0.0f64; target_level + 1];
        let mut remaining = total_mib;
        for level in (1..=target_level).rev() {
            let parent_cap = if level == 1 {
                default_mib
            } else {
                cap_mib(level - 1)
            };
            let take = ((remaining / parent_cap).floor() * parent_cap).min(remaining);
            alloc_mib[level] = take;
            remaining -= take;
        }
        alloc_mib[1] += remaining;

        // Translate MiB allocations into pair counts.
        let pairs_per_mib = pairs.len() as f64 / total_mib;
        let mut counts = vec![0usize; target_level + 1];
        let mut assigned = 0usize;
        for level in 1..=target_level {
            let n = ((alloc_mib[level] * pairs_per_mib).floor() as usize)
                .min(pairs.len() - assigned);
            counts[level] = n;
            assigned += n;
        }
        // Flooring leaves a residue; it goes to the deepest level that
        // received data.
        if assigned < pairs.len() {
            let deepest = (1..=target_level)
                .rev()
                .find(|&level| counts[level] > 0)
                .unwrap_or(target_level);
            counts[deepest] += pairs.len() - assigned;
        }

        // Write one run per non-empty level, deepest first, consuming
        // contiguous slices of the sorted data.
        let mut offset = 0usize;
        for level in (1..=target_level).rev() {
            if counts[level] == 0 {
                continue;
            }
            let slice = &pairs[offset..offset + counts[level]];
            offset += counts[level];

            let run_id = state.levels[level].run_count();
            let fpr = state.fpr_for_level(level);
            let run = Run::create(
                self.data_dir(),
                level,
                run_id,
                slice,
                fpr,
                self.io_handle(),
            )?;
            state.levels[level].runs.push(run);
            debug!(
                "bulk load placed {} pairs into run_{}_{}",
                slice.len(),
                level,
                run_id
            );
        }
        debug_assert_eq!(offset, pairs.len());

        info!(
            "bulk loaded {} pairs ({:.1} MiB) from {} down to level {}",
            pairs.len(),
            total_mib,
            path.display(),
            target_level
        );
        Ok(())
    }
}
