use crate::LsmTree;
use byteorder::{LittleEndian, WriteBytesExt};
use std::path::Path;

/// Opens a tree rooted in `dir`, with a buffer small enough that tests can
/// force flushes by key count instead of megabytes.
pub fn open_small(dir: &Path, approx_pairs_per_flush: usize) -> LsmTree {
    let tree = LsmTree::open(dir).unwrap();
    // A buffer entry costs roughly 34 bytes (16 for the pair, the rest for
    // skip-list pointers at expected height ~1.33).
    tree.set_buffer_capacity(approx_pairs_per_flush * 34).unwrap();
    tree
}

/// Writes a binary pair file in the run/bulk-load layout.
pub fn write_pair_file(path: &Path, pairs: &[(i64, i64)]) {
    let mut buf = Vec::with_capacity(pairs.len() * 16);
    for &(k, v) in pairs {
        buf.write_i64::<LittleEndian>(k).unwrap();
        buf.write_i64::<LittleEndian>(v).unwrap();
    }
    std::fs::write(path, buf).unwrap();
}

/// Counts files in `dir` whose name matches the run data pattern.
pub fn count_run_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(run::parse_data_file_name)
                .is_some()
        })
        .count()
}
