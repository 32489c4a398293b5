//! # Bloom Filter
//!
//! A space-efficient probabilistic data structure for set membership testing.
//!
//! A bloom filter can tell you with certainty that a key is **not** in the set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives). The false positive rate depends on the
//! number of bits and hash functions used.
//!
//! ## Usage in SiltDB
//!
//! Every on-disk run carries a bloom filter sidecar built from its keys.
//! During point lookups the engine probes the filter first — a negative
//! answer skips the run without touching its data file. The target false
//! positive rate per run comes from the engine's per-level allocation, so
//! deep levels get tight filters and shallow levels get cheap ones.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(0.01, 1000);
//! bf.insert(42);
//! assert!(bf.might_contain(42));
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 1099511628211;

/// A bloom filter over `i64` keys, backed by a packed bit vector with `k`
/// hash functions.
///
/// Uses double hashing: `h_i(key) = h1 + i * h2 (mod m)` where `h1` hashes
/// the key bytes and `h2` hashes the complemented key bytes, both FNV-1a.
pub struct BloomFilter {
    /// Target false positive rate this filter was sized for.
    fpr: f64,
    /// Element count this filter was sized for.
    expected_n: u64,
    /// Number of hash functions (k).
    num_hashes: u64,
    /// Number of bits in the filter.
    num_bits: u64,
    /// Packed bit vector, bit `i` at `bits[i / 8] >> (i % 8)`.
    bits: Vec<u8>,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_n` elements at the given target
    /// `fpr`.
    ///
    /// Derived parameters: `m = ceil(-n * ln(p) / ln(2)^2)` bits and
    /// `k = max(1, ceil((m/n) * ln 2))` hash functions.
    ///
    /// # Panics
    ///
    /// Panics if `expected_n` is 0 or `fpr` is not in `(0, 1]`.
    pub fn new(fpr: f64, expected_n: usize) -> Self {
        assert!(expected_n > 0, "expected_n must be > 0");
        assert!(fpr > 0.0 && fpr <= 1.0, "fpr must be in (0, 1]");

        let n = expected_n as f64;
        let m = (-n * fpr.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        // fpr == 1.0 derives m == 0; keep one addressable bit so the modulus
        // stays valid (such a filter admits everything, as intended).
        let m = m.max(1);

        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u64;
        let k = k.max(1);

        let byte_len = ((m + 7) / 8) as usize;

        Self {
            fpr,
            expected_n: expected_n as u64,
            num_hashes: k,
            num_bits: m,
            bits: vec![0u8; byte_len],
        }
    }

    /// Inserts a key into the filter.
    pub fn insert(&mut self, key: i64) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn might_contain(&self, key: i64) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn bit_count(&self) -> u64 {
        self.num_bits
    }

    #[must_use]
    pub fn hash_count(&self) -> u64 {
        self.num_hashes
    }

    #[must_use]
    pub fn fpr(&self) -> f64 {
        self.fpr
    }

    /// Serializes the filter to a writer.
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [fpr: f64][expected_n: u64][num_hashes: u64][bit_count: u64][bits]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_f64::<LittleEndian>(self.fpr)?;
        w.write_u64::<LittleEndian>(self.expected_n)?;
        w.write_u64::<LittleEndian>(self.num_hashes)?;
        w.write_u64::<LittleEndian>(self.num_bits)?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let fpr = r.read_f64::<LittleEndian>()?;
        let expected_n = r.read_u64::<LittleEndian>()?;
        let num_hashes = r.read_u64::<LittleEndian>()?;
        let num_bits = r.read_u64::<LittleEndian>()?;

        // Safety cap: a filter sidecar should never come close to 128 MiB.
        const MAX_BLOOM_BYTES: u64 = 128 * 1024 * 1024;
        let byte_len = (num_bits + 7) / 8;
        if byte_len > MAX_BLOOM_BYTES || num_bits == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible bloom filter size: {} bits", num_bits),
            ));
        }

        let mut bits = vec![0u8; byte_len as usize];
        r.read_exact(&mut bits)?;

        Ok(Self {
            fpr,
            expected_n,
            num_hashes,
            num_bits,
            bits,
        })
    }

    /// Writes the filter to `path`, truncating any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_to(&mut w)?;
        w.flush()
    }

    /// Loads a filter previously written with [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut r = BufReader::new(File::open(path)?);
        Self::read_from(&mut r)
    }

    /// Double hashing: h(i) = (h1 + i * h2) mod num_bits.
    fn bit_index(&self, h1: u64, h2: u64, i: u64) -> u64 {
        h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("fpr", &self.fpr)
            .field("expected_n", &self.expected_n)
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .finish()
    }
}

/// The two independent hashes for double hashing: FNV-1a over the key bytes
/// and over the bitwise-complemented key bytes.
fn hash_pair(key: i64) -> (u64, u64) {
    (fnv1a_64(key.to_le_bytes()), fnv1a_64((!key).to_le_bytes()))
}

fn fnv1a_64(data: [u8; 8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
