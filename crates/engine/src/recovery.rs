//! Cold-start recovery: scan the data directory for run files and reload
//! them into their levels.
//!
//! Recovery is deliberately forgiving. A file that does not match the
//! `run_{level}_{id}.data` pattern is ignored; a run whose data file is
//! malformed is skipped with a warning; missing sidecars degrade the run
//! without failing it. Only the runs that load cleanly come back.

use metrics::IoCounters;
use run::Run;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Level, TreeState};

/// Scans `data_dir` and loads every parseable run into `state`, growing the
/// level vector (and `max_level`) if the directory holds deeper levels than
/// a fresh tree starts with.
pub(crate) fn load_runs_from_disk(state: &mut TreeState, data_dir: &Path, io: &Arc<IoCounters>) {
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot scan {}: {}", data_dir.display(), e);
            return;
        }
    };

    // Group discovered files by level so runs load in id order.
    let mut found: BTreeMap<usize, Vec<(usize, PathBuf)>> = BTreeMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some((level, id)) = run::parse_data_file_name(name) {
            found.entry(level).or_default().push((id, path));
        }
    }

    for (level, mut runs) in found {
        // Deeper levels than the initial layout mean a previous incarnation
        // extended the tree; mirror that here so the FPR allocation and
        // capacity arithmetic stay consistent.
        while state.levels.len() <= level {
            state.levels.push(Level::new(state.levels.len()));
        }
        if level > state.max_level {
            state.max_level = level;
        }

        runs.sort_by_key(|(id, _)| *id);
        for (id, path) in runs {
            match Run::open(&path, level, id, io.clone()) {
                Ok(run) => {
                    debug!("recovered run_{}_{} ({} pairs)", level, id, run.len());
                    state.levels[level].runs.push(run);
                }
                Err(e) => {
                    warn!("skipping unloadable run {}: {}", path.display(), e);
                }
            }
        }
    }
}
