//! # Run — one immutable sorted table on disk
//!
//! When the buffer flushes, or a level compacts, the result is a *run*: a
//! file of 16-byte `(key, value)` records sorted by key, plus two sidecars
//! built from the same data:
//!
//! ```text
//! run_{level}_{id}.data          sorted pairs, little-endian, no header
//! run_{level}_{id}.data.bloom    serialized bloom filter
//! run_{level}_{id}.data.fence    serialized fence pointers
//! ```
//!
//! Runs are write-once. A point lookup probes the bloom filter, seeks to the
//! fence-pointer offset, and scans forward at most one page. A missing or
//! unreadable sidecar degrades the run (full scans, no filtering) but never
//! fails it — only a malformed data file does.
//!
//! All reads and writes go through the [`metrics`] counting adapters, so the
//! engine's I/O statistics account for every byte a run touches.

use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fence::FencePointers;
use memtable::{KeyValuePair, PAIR_BYTES};
use metrics::{CountingReader, CountingWriter, IoCounters};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

/// Errors a run can surface. Sidecar problems are deliberately absent —
/// they degrade the run instead of failing it.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Data file size is not a multiple of the pair size.
    #[error("run file {} has size {size}, not a multiple of {PAIR_BYTES}", path.display())]
    InvalidSize { path: PathBuf, size: u64 },

    /// Data file exists but holds zero pairs.
    #[error("run file {} is empty", path.display())]
    Empty { path: PathBuf },
}

/// Canonical data file name for a run at `(level, run_id)`.
#[must_use]
pub fn data_file_name(level: usize, run_id: usize) -> String {
    format!("run_{}_{}.data", level, run_id)
}

/// Parses `run_{level}_{id}.data` back into `(level, run_id)`. Returns
/// `None` for any file name not matching the pattern.
#[must_use]
pub fn parse_data_file_name(name: &str) -> Option<(usize, usize)> {
    let rest = name.strip_prefix("run_")?.strip_suffix(".data")?;
    let (level, id) = rest.split_once('_')?;
    Some((level.parse().ok()?, id.parse().ok()?))
}

/// An immutable sorted sequence of pairs on disk with its bloom filter and
/// fence pointer sidecars.
pub struct Run {
    level: usize,
    run_id: usize,
    /// Path of the `.data` file; sidecar paths are derived from it.
    path: PathBuf,
    num_pairs: usize,
    bytes: u64,
    bloom: Option<BloomFilter>,
    fences: Option<FencePointers>,
    /// Persistent read handle. A `Mutex` gives `get`/`range` interior
    /// mutability through `&self`; the filter and fences need none, being
    /// immutable after construction. The counting adapter sits under the
    /// buffer so the counters see disk-sized transfers, not 8-byte reads.
    file: Mutex<BufReader<CountingReader<File>>>,
    io: Arc<IoCounters>,
}

impl Run {
    /// Writes a new run from an already sorted, deduplicated pair slice and
    /// builds both sidecars, with the bloom filter targeting `fpr`.
    ///
    /// # Panics
    ///
    /// Panics if `pairs` is empty — callers skip run creation for empty merge
    /// results. Debug builds also assert the keys are strictly ascending.
    pub fn create(
        dir: &Path,
        level: usize,
        run_id: usize,
        pairs: &[KeyValuePair],
        fpr: f64,
        io: Arc<IoCounters>,
    ) -> Result<Self, RunError> {
        assert!(!pairs.is_empty(), "refusing to write an empty run");
        debug_assert!(
            pairs.windows(2).all(|w| w[0].key < w[1].key),
            "run input must be strictly ascending by key"
        );

        std::fs::create_dir_all(dir)?;
        let path = dir.join(data_file_name(level, run_id));

        // Data file first; sidecars are rebuildable from it.
        let file = File::create(&path)?;
        let mut w = BufWriter::new(CountingWriter::new(file, io.clone()));
        for pair in pairs {
            w.write_i64::<LittleEndian>(pair.key)?;
            w.write_i64::<LittleEndian>(pair.value)?;
        }
        w.flush()?;
        let file = w
            .into_inner()
            .map_err(|e| RunError::Io(e.into_error()))?
            .into_inner();
        file.sync_all()?;

        let bytes = (pairs.len() * PAIR_BYTES) as u64;

        let mut bloom = BloomFilter::new(fpr, pairs.len());
        for pair in pairs {
            bloom.insert(pair.key);
        }

        let key_offsets: Vec<(i64, u64)> = pairs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key, (i * PAIR_BYTES) as u64))
            .collect();
        let fences = FencePointers::new(data_file_name(level, run_id), &key_offsets);

        let run = Self {
            level,
            run_id,
            path: path.clone(),
            num_pairs: pairs.len(),
            bytes,
            bloom: Some(bloom),
            fences: Some(fences),
            file: Mutex::new(BufReader::new(CountingReader::new(
                File::open(&path)?,
                io.clone(),
            ))),
            io,
        };
        run.save_bloom()?;
        run.save_fences()?;
        Ok(run)
    }

    /// Opens an existing run file, deriving the pair count from its size.
    ///
    /// A size of zero or one not divisible by 16 is fatal for this run. A
    /// missing or unreadable sidecar is only a warning: the run then scans
    /// from offset 0 and/or admits every key.
    pub fn open(
        path: impl AsRef<Path>,
        level: usize,
        run_id: usize,
        io: Arc<IoCounters>,
    ) -> Result<Self, RunError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let bytes = file.metadata()?.len();

        if bytes == 0 {
            return Err(RunError::Empty { path });
        }
        if bytes % PAIR_BYTES as u64 != 0 {
            return Err(RunError::InvalidSize { path, size: bytes });
        }
        let num_pairs = (bytes / PAIR_BYTES as u64) as usize;

        let mut run = Self {
            level,
            run_id,
            path,
            num_pairs,
            bytes,
            bloom: None,
            fences: None,
            file: Mutex::new(BufReader::new(CountingReader::new(file, io.clone()))),
            io,
        };
        run.load_sidecars();
        Ok(run)
    }

    /// Point lookup. Probes the bloom filter, then scans forward from the
    /// fence-pointer offset until the key is found or passed.
    pub fn get(&self, key: i64) -> Result<Option<i64>, RunError> {
        if let Some(bf) = &self.bloom {
            if !bf.might_contain(key) {
                return Ok(None);
            }
        }

        let offset = self.fences.as_ref().map_or(0, |f| f.find_offset(key));

        let mut file = self.file.lock().expect("run file lock poisoned");
        file.seek(SeekFrom::Start(offset))?;

        loop {
            let file_key = match file.read_i64::<LittleEndian>() {
                Ok(k) => k,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let value = file.read_i64::<LittleEndian>()?;

            if file_key == key {
                return Ok(Some(value));
            }
            if file_key > key {
                return Ok(None);
            }
        }
    }

    /// All pairs with `start <= key < end`, ascending. The fence pointers
    /// bound the scan to the pages that can intersect the range.
    pub fn range(&self, start: i64, end: i64) -> Result<Vec<KeyValuePair>, RunError> {
        if start >= end {
            return Ok(Vec::new());
        }

        let (start_offset, end_offset) = self
            .fences
            .as_ref()
            .map_or((0, None), |f| f.find_range_offsets(start, end));

        let mut results = Vec::new();
        let mut file = self.file.lock().expect("run file lock poisoned");
        file.seek(SeekFrom::Start(start_offset))?;
        let mut pos = start_offset;

        loop {
            let file_key = match file.read_i64::<LittleEndian>() {
                Ok(k) => k,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            let value = file.read_i64::<LittleEndian>()?;
            pos += PAIR_BYTES as u64;

            if let Some(end_off) = end_offset {
                if pos > end_off {
                    break;
                }
            }
            if file_key >= end {
                break;
            }
            if file_key >= start {
                results.push(KeyValuePair::new(file_key, value));
            }
        }

        Ok(results)
    }

    /// Reads the whole run back into memory (compaction, filter rebuilds).
    pub fn all_pairs(&self) -> Result<Vec<KeyValuePair>, RunError> {
        self.read_prefix(self.num_pairs)
    }

    /// The first `max_count` pairs, for diagnostics output.
    pub fn sample_pairs(&self, max_count: usize) -> Result<Vec<KeyValuePair>, RunError> {
        self.read_prefix(max_count.min(self.num_pairs))
    }

    /// Re-reads all pairs and replaces the bloom filter sidecar with one
    /// built at `new_fpr`. Used when the tree deepens and the per-level
    /// allocation shifts.
    pub fn rebuild_bloom_filter(&mut self, new_fpr: f64) -> Result<(), RunError> {
        let pairs = self.all_pairs()?;
        let mut bloom = BloomFilter::new(new_fpr, pairs.len());
        for pair in &pairs {
            bloom.insert(pair.key);
        }
        self.bloom = Some(bloom);
        self.save_bloom()
    }

    /// Unlinks the data file and both sidecars. Individual failures are
    /// logged and skipped so one stubborn file cannot strand the others.
    pub fn delete_files_from_disk(&self) {
        for path in [self.data_path(), self.bloom_path(), self.fence_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("failed to delete {}: {}", path.display(), e),
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.num_pairs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_pairs == 0
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level
    }

    #[must_use]
    pub fn run_id(&self) -> usize {
        self.run_id
    }

    #[must_use]
    pub fn has_bloom_filter(&self) -> bool {
        self.bloom.is_some()
    }

    /// Filter probe; a run without a loaded filter admits every key.
    #[must_use]
    pub fn might_contain(&self, key: i64) -> bool {
        self.bloom.as_ref().map_or(true, |bf| bf.might_contain(key))
    }

    #[must_use]
    pub fn has_fence_pointers(&self) -> bool {
        self.fences.is_some()
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.path.clone()
    }

    fn bloom_path(&self) -> PathBuf {
        sidecar_path(&self.path, "bloom")
    }

    fn fence_path(&self) -> PathBuf {
        sidecar_path(&self.path, "fence")
    }

    fn read_prefix(&self, count: usize) -> Result<Vec<KeyValuePair>, RunError> {
        let mut pairs = Vec::with_capacity(count);
        let mut file = self.file.lock().expect("run file lock poisoned");
        file.seek(SeekFrom::Start(0))?;

        for _ in 0..count {
            let key = file.read_i64::<LittleEndian>()?;
            let value = file.read_i64::<LittleEndian>()?;
            pairs.push(KeyValuePair::new(key, value));
        }
        Ok(pairs)
    }

    fn save_bloom(&self) -> Result<(), RunError> {
        let bloom = self.bloom.as_ref().expect("no bloom filter to save");
        let file = File::create(self.bloom_path())?;
        let mut w = BufWriter::new(CountingWriter::new(file, self.io.clone()));
        bloom.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    fn save_fences(&self) -> Result<(), RunError> {
        let fences = self.fences.as_ref().expect("no fence pointers to save");
        let file = File::create(self.fence_path())?;
        let mut w = BufWriter::new(CountingWriter::new(file, self.io.clone()));
        fences.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    fn load_sidecars(&mut self) {
        self.bloom = match self.read_sidecar(self.bloom_path(), BloomFilter::read_from) {
            Ok(bf) => Some(bf),
            Err(e) => {
                warn!(
                    "bloom sidecar unavailable for {}: {} (run degrades to no filtering)",
                    self.path.display(),
                    e
                );
                None
            }
        };
        self.fences = match self.read_sidecar(self.fence_path(), FencePointers::read_from) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!(
                    "fence sidecar unavailable for {}: {} (run degrades to full scans)",
                    self.path.display(),
                    e
                );
                None
            }
        };
    }

    fn read_sidecar<T>(
        &self,
        path: PathBuf,
        read: impl Fn(&mut BufReader<CountingReader<File>>) -> io::Result<T>,
    ) -> io::Result<T> {
        let file = File::open(path)?;
        let mut r = BufReader::new(CountingReader::new(file, self.io.clone()));
        read(&mut r)
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("level", &self.level)
            .field("run_id", &self.run_id)
            .field("num_pairs", &self.num_pairs)
            .field("bloom", &self.bloom.is_some())
            .field("fences", &self.fences.is_some())
            .finish()
    }
}

fn sidecar_path(data_path: &Path, suffix: &str) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
