//! # Fence Pointers
//!
//! A sparse key→offset index over a run's data file.
//!
//! A run stores its pairs sorted by key, so a point lookup only needs to know
//! roughly where to start scanning. Fence pointers record the first key of
//! each 4 KiB page of the data file; a predecessor search over them turns a
//! full-file scan into a seek plus at most one page of reads.
//!
//! The index is immutable after construction and is persisted next to the
//! data file as a `.fence` sidecar.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Page granularity for fence pointer emission.
pub const PAGE_SIZE: u64 = 4096;

/// One index entry: the first key whose record starts a new page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencePointer {
    pub key: i64,
    pub offset: u64,
}

/// Sparse page index for one run file.
#[derive(Debug, Clone)]
pub struct FencePointers {
    /// Name of the data file this index describes (kept for diagnostics and
    /// persisted in the sidecar).
    run_file: String,
    entries: Vec<FencePointer>,
}

impl FencePointers {
    /// Builds the index from a run's full `(key, offset)` sequence.
    ///
    /// Emits one entry per newly entered page: the first key whose offset
    /// falls on a page not yet represented. An empty sequence yields an
    /// empty index.
    pub fn new(run_file: impl Into<String>, key_offsets: &[(i64, u64)]) -> Self {
        Self::with_page_size(run_file, key_offsets, PAGE_SIZE)
    }

    /// Like [`new`](Self::new) with an explicit page size.
    pub fn with_page_size(
        run_file: impl Into<String>,
        key_offsets: &[(i64, u64)],
        page_size: u64,
    ) -> Self {
        let mut entries = Vec::new();
        let mut current_page = 0u64;

        for &(key, offset) in key_offsets {
            let page = offset / page_size;
            if page > current_page || entries.is_empty() {
                entries.push(FencePointer { key, offset });
                current_page = page;
            }
        }

        Self {
            run_file: run_file.into(),
            entries,
        }
    }

    /// Returns the byte offset at which a scan for `key` should start: the
    /// offset of the largest entry with `entry.key <= key`, or 0 if `key` is
    /// below every indexed key (or the index is empty).
    #[must_use]
    pub fn find_offset(&self, key: i64) -> u64 {
        if self.entries.is_empty() {
            return 0;
        }
        self.entries[self.predecessor(key)].offset
    }

    /// Returns `(start_offset, end_offset)` bounding a scan for the half-open
    /// range `[start, end)`. `end_offset` is `None` when the range extends
    /// into the last indexed page, meaning "scan to end of file".
    #[must_use]
    pub fn find_range_offsets(&self, start: i64, end: i64) -> (u64, Option<u64>) {
        if self.entries.is_empty() {
            return (0, Some(0));
        }

        let start_offset = self.entries[self.predecessor(start)].offset;

        let end_idx = self.predecessor(end);
        let end_offset = if end_idx == self.entries.len() - 1 {
            None
        } else {
            Some(self.entries[end_idx + 1].offset)
        };

        (start_offset, end_offset)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn run_file(&self) -> &str {
        &self.run_file
    }

    /// Serializes the index to a writer.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [name_len: u64][name bytes][count: u64] then count x [key: i64][offset: u64]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.run_file.len() as u64)?;
        w.write_all(self.run_file.as_bytes())?;
        w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for fp in &self.entries {
            w.write_i64::<LittleEndian>(fp.key)?;
            w.write_u64::<LittleEndian>(fp.offset)?;
        }
        Ok(())
    }

    /// Deserializes an index from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        // Guard both length fields; a corrupt sidecar must not drive an
        // enormous allocation.
        const MAX_NAME_BYTES: u64 = 4096;
        const MAX_ENTRIES: u64 = 1 << 32;

        let name_len = r.read_u64::<LittleEndian>()?;
        if name_len > MAX_NAME_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible run file name length: {}", name_len),
            ));
        }
        let mut name = vec![0u8; name_len as usize];
        r.read_exact(&mut name)?;
        let run_file = String::from_utf8(name)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let count = r.read_u64::<LittleEndian>()?;
        if count > MAX_ENTRIES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible fence pointer count: {}", count),
            ));
        }

        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = r.read_i64::<LittleEndian>()?;
            let offset = r.read_u64::<LittleEndian>()?;
            entries.push(FencePointer { key, offset });
        }

        Ok(Self { run_file, entries })
    }

    /// Writes the index to `path`, truncating any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_to(&mut w)?;
        w.flush()
    }

    /// Loads an index previously written with [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        Self::read_from(&mut r)
    }

    /// Index of the largest entry with `entry.key <= key`; 0 if `key` is
    /// below every entry. Caller guarantees the index is non-empty.
    fn predecessor(&self, key: i64) -> usize {
        if key < self.entries[0].key {
            return 0;
        }
        if key >= self.entries[self.entries.len() - 1].key {
            return self.entries.len() - 1;
        }

        let mut left = 0;
        let mut right = self.entries.len() - 1;
        while left < right {
            let mid = left + (right - left + 1) / 2;
            if self.entries[mid].key <= key {
                left = mid;
            } else {
                right = mid - 1;
            }
        }
        left
    }
}
