//! # Metrics — I/O and latency accounting
//!
//! Lock-free counters shared between the engine and its runs. The engine's
//! top-level mutex is *not* held while these are updated, so everything here
//! is a plain atomic.
//!
//! Disk I/O is counted at a single point: the [`CountingReader`] and
//! [`CountingWriter`] adapters. Every file handle the store reads or writes
//! through is wrapped in one of these, so the operation and byte counters
//! cannot drift from the actual I/O performed.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared read/write I/O counters.
///
/// One "operation" is one `read`/`write` call issued through a counting
/// adapter; the byte counters advance by the actual transfer size.
#[derive(Debug, Default)]
pub struct IoCounters {
    read_ops: AtomicU64,
    write_ops: AtomicU64,
    read_bytes: AtomicU64,
    write_bytes: AtomicU64,
}

impl IoCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_read(&self, bytes: u64) {
        self.read_ops.fetch_add(1, Ordering::Relaxed);
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_write(&self, bytes: u64) {
        self.write_ops.fetch_add(1, Ordering::Relaxed);
        self.write_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    #[must_use]
    pub fn read_ops(&self) -> u64 {
        self.read_ops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn write_ops(&self) -> u64 {
        self.write_ops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn read_bytes(&self) -> u64 {
        self.read_bytes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn write_bytes(&self) -> u64 {
        self.write_bytes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.read_ops.store(0, Ordering::Relaxed);
        self.write_ops.store(0, Ordering::Relaxed);
        self.read_bytes.store(0, Ordering::Relaxed);
        self.write_bytes.store(0, Ordering::Relaxed);
    }
}

/// Accumulates operation count and total elapsed time; the average is
/// derived on read so the hot path is two relaxed adds.
#[derive(Debug, Default)]
pub struct LatencyRecorder {
    ops: AtomicU64,
    total_nanos: AtomicU64,
}

impl LatencyRecorder {
    pub fn observe(&self, elapsed: Duration) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        self.total_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ops(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    /// Mean latency in milliseconds, or 0.0 before the first observation.
    #[must_use]
    pub fn avg_millis(&self) -> f64 {
        let ops = self.ops.load(Ordering::Relaxed);
        if ops == 0 {
            return 0.0;
        }
        let total = self.total_nanos.load(Ordering::Relaxed) as f64;
        total / ops as f64 / 1_000_000.0
    }

    pub fn reset(&self) {
        self.ops.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
    }
}

/// A `Read + Seek` adapter that reports transfer sizes to an [`IoCounters`].
pub struct CountingReader<R> {
    inner: R,
    io: Arc<IoCounters>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, io: Arc<IoCounters>) -> Self {
        Self { inner, io }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.io.record_read(n as u64);
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// A `Write` adapter that reports transfer sizes to an [`IoCounters`].
pub struct CountingWriter<W> {
    inner: W,
    io: Arc<IoCounters>,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W, io: Arc<IoCounters>) -> Self {
        Self { inner, io }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.io.record_write(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counters_track_reads_and_writes() {
        let io = IoCounters::new();

        let mut w = CountingWriter::new(Vec::new(), io.clone());
        w.write_all(&[0u8; 32]).unwrap();
        w.write_all(&[0u8; 16]).unwrap();

        assert_eq!(io.write_ops(), 2);
        assert_eq!(io.write_bytes(), 48);

        let data = w.into_inner();
        let mut r = CountingReader::new(Cursor::new(data), io.clone());
        let mut buf = [0u8; 48];
        r.read_exact(&mut buf).unwrap();

        assert!(io.read_ops() >= 1);
        assert_eq!(io.read_bytes(), 48);
    }

    #[test]
    fn latency_average_is_derived() {
        let lat = LatencyRecorder::default();
        assert_eq!(lat.avg_millis(), 0.0);

        lat.observe(Duration::from_millis(2));
        lat.observe(Duration::from_millis(4));

        assert_eq!(lat.ops(), 2);
        let avg = lat.avg_millis();
        assert!((avg - 3.0).abs() < 0.01, "avg was {}", avg);
    }

    #[test]
    fn reset_zeroes_everything() {
        let io = IoCounters::new();
        io.record_read(100);
        io.record_write(200);
        io.reset();
        assert_eq!(io.read_ops(), 0);
        assert_eq!(io.write_bytes(), 0);
    }
}
