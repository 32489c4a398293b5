//! Read path: `get()` and `range()`.
//!
//! Point lookups probe the buffer first, then every level shallow-to-deep
//! with each level's runs scanned newest-first; the first hit wins. Range
//! scans gather from everything, then sort, deduplicate (newest wins), and
//! drop tombstones.

use anyhow::Result;
use std::time::Instant;

use crate::{KeyValuePair, LsmTree, TOMBSTONE};

impl LsmTree {
    /// Point lookup. Returns `None` for keys never written *and* for keys
    /// whose newest record is a tombstone.
    ///
    /// # Errors
    ///
    /// Returns an error if a run's disk read fails after its bloom filter
    /// admitted the key.
    pub fn get(&self, key: i64) -> Result<Option<i64>> {
        let start = Instant::now();
        let result = self.get_inner(key);
        self.read_latency.observe(start.elapsed());
        result
    }

    /// All live pairs with `start <= key < end` in ascending key order.
    /// Empty when `start >= end`. The result is a snapshot as of lock
    /// acquisition.
    pub fn range(&self, start: i64, end: i64) -> Result<Vec<KeyValuePair>> {
        let t = Instant::now();
        let result = self.range_inner(start, end);
        self.read_latency.observe(t.elapsed());
        result
    }

    fn get_inner(&self, key: i64) -> Result<Option<i64>> {
        let state = self.lock_state();

        // 1. Buffer holds the freshest record, tombstones included.
        if let Some(value) = state.buffer.get(key) {
            return Ok(live_value(value));
        }

        // 2. Levels shallow-to-deep, runs newest-first within a level.
        for level in &state.levels {
            for run in level.runs.iter().rev() {
                if run.has_bloom_filter() && !run.might_contain(key) {
                    continue;
                }
                if let Some(value) = run.get(key)? {
                    return Ok(live_value(value));
                }
            }
        }

        Ok(None)
    }

    fn range_inner(&self, start: i64, end: i64) -> Result<Vec<KeyValuePair>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let state = self.lock_state();

        // Gather newest-first: buffer, then each level's runs newest-first.
        let mut results = state.buffer.range(start, end);
        for level in &state.levels {
            for run in level.runs.iter().rev() {
                results.extend(run.range(start, end)?);
            }
        }

        // Stable sort keeps insertion order within equal keys, so the first
        // record per key is the newest one.
        results.sort();
        results.dedup_by_key(|pair| pair.key);
        results.retain(|pair| pair.value != TOMBSTONE);

        Ok(results)
    }
}

fn live_value(value: i64) -> Option<i64> {
    if value == TOMBSTONE {
        None
    } else {
        Some(value)
    }
}
