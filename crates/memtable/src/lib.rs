//! # Memtable — the in-memory write buffer
//!
//! Every write lands here first. The buffer is a skip list ordered by key,
//! which gives `O(log n)` inserts and lookups plus cheap ordered iteration
//! for flushes and range scans.
//!
//! Deletes are writes too: a delete inserts the [`TOMBSTONE`] sentinel as the
//! key's value, and the sentinel shadows any older value in deeper levels
//! until compaction drops both.
//!
//! This crate also owns the pair type shared by the run and engine crates.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Reserved value marking a deleted key. Clients must never store it as a
/// live value.
pub const TOMBSTONE: i64 = i64::MIN;

/// Bytes of one encoded pair on disk (key then value, both `i64`).
pub const PAIR_BYTES: usize = 16;

/// A key/value pair. Ordering and equality consider only the key, so sorting
/// a mixed-origin batch and deduplicating keeps exactly one record per key.
#[derive(Debug, Clone, Copy)]
pub struct KeyValuePair {
    pub key: i64,
    pub value: i64,
}

impl KeyValuePair {
    pub fn new(key: i64, value: i64) -> Self {
        Self { key, value }
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }
}

impl PartialEq for KeyValuePair {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for KeyValuePair {}

impl PartialOrd for KeyValuePair {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValuePair {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Maximum node height. With p = 1/4 this comfortably covers any buffer that
/// fits in memory.
pub const MAX_HEIGHT: usize = 32;

/// Probability of promoting a node one level during insertion.
const PROMOTE_P: f64 = 0.25;

/// Sentinel "null" index into the node arena.
const NIL: usize = usize::MAX;

/// Fixed per-node cost in the byte estimate: key + value + arena slot
/// bookkeeping. Pointer cost is added per level of height.
const NODE_BASE_BYTES: usize = PAIR_BYTES + 8;

struct Node {
    key: i64,
    value: i64,
    /// Forward pointers, one per level of this node's height. Values index
    /// into the arena; `NIL` terminates a level.
    next: Vec<usize>,
}

/// An ordered key→value map backed by a skip list over an index arena.
///
/// Nodes live in a `Vec` and link to each other by index, so no `unsafe` and
/// no reference-counting is needed; `clear` drops the whole arena at once.
pub struct SkipList {
    nodes: Vec<Node>,
    /// Head sentinel's forward pointers, one per level.
    head: [usize; MAX_HEIGHT],
    element_count: usize,
    byte_count: usize,
    rng: SmallRng,
}

impl SkipList {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            head: [NIL; MAX_HEIGHT],
            element_count: 0,
            byte_count: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Inserts or updates a key. An existing key is updated in place and the
    /// byte estimate does not change; a new key adds its estimated footprint.
    pub fn insert(&mut self, key: i64, value: i64) {
        let preds = self.find_predecessors(key);

        // Existing key: update in place.
        let candidate = match preds[0] {
            NIL => self.head[0],
            p => self.nodes[p].next[0],
        };
        if candidate != NIL && self.nodes[candidate].key == key {
            self.nodes[candidate].value = value;
            return;
        }

        let height = self.random_height();
        let idx = self.nodes.len();
        let mut next = vec![NIL; height];

        for (level, slot) in next.iter_mut().enumerate() {
            match preds[level] {
                NIL => {
                    *slot = self.head[level];
                    self.head[level] = idx;
                }
                p => {
                    *slot = self.nodes[p].next[level];
                    self.nodes[p].next[level] = idx;
                }
            }
        }

        self.nodes.push(Node { key, value, next });
        self.element_count += 1;
        self.byte_count += Self::entry_size(height);
    }

    /// Point lookup. The returned value may be the [`TOMBSTONE`] sentinel;
    /// translating that to "absent" is the caller's concern.
    #[must_use]
    pub fn get(&self, key: i64) -> Option<i64> {
        let preds = self.find_predecessors(key);
        let candidate = match preds[0] {
            NIL => self.head[0],
            p => self.nodes[p].next[0],
        };
        if candidate != NIL && self.nodes[candidate].key == key {
            return Some(self.nodes[candidate].value);
        }
        None
    }

    /// All pairs with `start <= key < end`, ascending. Tombstones included.
    #[must_use]
    pub fn range(&self, start: i64, end: i64) -> Vec<KeyValuePair> {
        if start >= end {
            return Vec::new();
        }

        let preds = self.find_predecessors(start);
        let mut current = match preds[0] {
            NIL => self.head[0],
            p => self.nodes[p].next[0],
        };

        let mut results = Vec::new();
        while current != NIL && self.nodes[current].key < end {
            results.push(KeyValuePair::new(
                self.nodes[current].key,
                self.nodes[current].value,
            ));
            current = self.nodes[current].next[0];
        }
        results
    }

    /// All pairs in ascending key order. Tombstones included.
    #[must_use]
    pub fn get_all_sorted(&self) -> Vec<KeyValuePair> {
        let mut results = Vec::with_capacity(self.element_count);
        let mut current = self.head[0];
        while current != NIL {
            results.push(KeyValuePair::new(
                self.nodes[current].key,
                self.nodes[current].value,
            ));
            current = self.nodes[current].next[0];
        }
        results
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Estimated memory footprint of the buffered entries. Monotone across
    /// inserts of new keys, unchanged by in-place updates, zero after
    /// [`clear`](Self::clear).
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = [NIL; MAX_HEIGHT];
        self.element_count = 0;
        self.byte_count = 0;
    }

    /// Estimated bytes for one entry of the given node height.
    fn entry_size(height: usize) -> usize {
        NODE_BASE_BYTES + 8 * height
    }

    /// Geometric height: start at 1, promote with probability 1/4, cap at
    /// [`MAX_HEIGHT`].
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen::<f64>() < PROMOTE_P {
            height += 1;
        }
        height
    }

    /// For each level, the index of the last node with `node.key < key`
    /// (`NIL` when that is the head sentinel).
    fn find_predecessors(&self, key: i64) -> [usize; MAX_HEIGHT] {
        let mut preds = [NIL; MAX_HEIGHT];
        let mut current = NIL; // NIL here means "at the head sentinel"

        for level in (0..MAX_HEIGHT).rev() {
            loop {
                let next = match current {
                    NIL => self.head[level],
                    c => {
                        if level < self.nodes[c].next.len() {
                            self.nodes[c].next[level]
                        } else {
                            NIL
                        }
                    }
                };
                if next != NIL && self.nodes[next].key < key {
                    current = next;
                } else {
                    break;
                }
            }
            preds[level] = current;
        }
        preds
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipList")
            .field("element_count", &self.element_count)
            .field("byte_count", &self.byte_count)
            .finish()
    }
}

#[cfg(test)]
mod tests;
