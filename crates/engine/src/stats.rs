//! The multi-line stats report plus programmatic I/O and latency accessors.

use anyhow::Result;
use std::io::Write;

use crate::{LsmTree, TOMBSTONE};

/// Keys shown per run or buffer in the distribution section.
const MAX_KEYS_TO_DISPLAY: usize = 10;

impl LsmTree {
    /// Writes a human-readable report: logical pair counts, per-level
    /// layouts, bloom filter shapes, a capped key sample per run, and the
    /// I/O and latency counters.
    pub fn stats<W: Write>(&self, out: &mut W) -> Result<()> {
        let state = self.lock_state();

        writeln!(out, "Logical Pairs: {}", state.logical_size())?;

        write!(out, "LVL0: {}", state.buffer.element_count())?;
        for level in state.levels.iter().skip(1) {
            write!(out, ", LVL{}: {}", level.number, level.key_count())?;
        }
        writeln!(out)?;

        // Bloom filter shape per non-empty level.
        for level in state.levels.iter().skip(1) {
            if level.runs.is_empty() {
                continue;
            }
            let fpr = state.fpr_for_level(level.number);
            let avg_keys = level.key_count() / level.run_count();
            if avg_keys == 0 {
                continue;
            }
            let bits = optimal_bits(avg_keys, fpr);
            writeln!(
                out,
                "Level {} Bloom filter: FPR={}, Bits per element={}, Hash functions={}",
                level.number,
                fpr,
                bits / avg_keys as u64,
                optimal_hashes(bits, avg_keys)
            )?;
        }

        writeln!(out, "\nKey distribution:")?;

        write!(out, "Buffer (Level 0): ")?;
        let buffer_pairs = state.buffer.get_all_sorted();
        let mut shown = 0;
        for pair in &buffer_pairs {
            if pair.value == TOMBSTONE {
                continue;
            }
            write!(out, "{}:{} ", pair.key, pair.value)?;
            shown += 1;
            if shown >= MAX_KEYS_TO_DISPLAY {
                write!(out, "... ({} more)", buffer_pairs.len() - shown)?;
                break;
            }
        }
        writeln!(out)?;

        for level in state.levels.iter().skip(1) {
            if level.runs.is_empty() {
                continue;
            }
            writeln!(out, "\nLevel {} keys:", level.number)?;
            for (idx, run) in level.runs.iter().enumerate() {
                write!(out, "Run {} ({} keys): ", idx, run.len())?;
                let sample = run.sample_pairs(MAX_KEYS_TO_DISPLAY)?;
                let mut displayed = 0;
                for pair in &sample {
                    if pair.value == TOMBSTONE {
                        continue;
                    }
                    write!(out, "{}:{} ", pair.key, pair.value)?;
                    displayed += 1;
                }
                if run.len() > displayed {
                    write!(out, "... ({} more)", run.len() - displayed)?;
                }
                writeln!(out)?;
            }
        }

        writeln!(out, "\nI/O:")?;
        writeln!(
            out,
            "Reads:  {} ops, {} bytes",
            self.io_counters().read_ops(),
            self.io_counters().read_bytes()
        )?;
        writeln!(
            out,
            "Writes: {} ops, {} bytes",
            self.io_counters().write_ops(),
            self.io_counters().write_bytes()
        )?;
        writeln!(
            out,
            "Read latency:  {} ops, avg {:.3} ms",
            self.read_count(),
            self.avg_read_latency_ms()
        )?;
        writeln!(
            out,
            "Write latency: {} ops, avg {:.3} ms",
            self.write_count(),
            self.avg_write_latency_ms()
        )?;

        Ok(())
    }

    #[must_use]
    pub fn io_counters(&self) -> &metrics::IoCounters {
        &self.io
    }

    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.read_latency.ops()
    }

    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_latency.ops()
    }

    #[must_use]
    pub fn avg_read_latency_ms(&self) -> f64 {
        self.read_latency.avg_millis()
    }

    #[must_use]
    pub fn avg_write_latency_ms(&self) -> f64 {
        self.write_latency.avg_millis()
    }

    pub fn reset_io_stats(&self) {
        self.io.reset();
        self.read_latency.reset();
        self.write_latency.reset();
    }
}

/// `m = ceil(-n ln(p) / ln(2)^2)` — reported only; the filters themselves
/// size via [`bloom::BloomFilter::new`].
fn optimal_bits(n: usize, p: f64) -> u64 {
    ((-(n as f64) * p.ln()) / std::f64::consts::LN_2.powi(2)).ceil() as u64
}

fn optimal_hashes(bits: u64, n: usize) -> u64 {
    (((bits as f64 / n as f64) * std::f64::consts::LN_2).ceil() as u64).max(1)
}
