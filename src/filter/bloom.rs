//! Bloom filter over segment keys.
//!
//! Written next to each segment as `sstable_<n>.blm`. A point lookup that the
//! filter rejects never touches the segment's index.
//!
//! ## Encoding
//!
//! ```text
//! [magic: "BLM1"][num_hashes: u32 BE][num_bits: u64 BE][bits...]
//! ```

use crate::error::{Error, Result};
use crate::filter::Filter;
use bytes::{Buf, BufMut};
use std::hash::Hasher;

const BLOOM_MAGIC: &[u8; 4] = b"BLM1";
const HEADER_LEN: usize = BLOOM_MAGIC.len() + 4 + 8;
const MIN_BITS: usize = 64;
const MAX_HASHES: u32 = 30;

/// Probabilistic key membership test. No false negatives.
///
/// # Example
/// ```
/// use boxstore::filter::{BloomFilter, Filter};
///
/// let mut filter = BloomFilter::new(1000, 0.01);
/// filter.add(b"key1");
///
/// assert!(filter.may_contain(b"key1"));
/// ```
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    num_hashes: u32,
    num_bits: usize,
}

impl BloomFilter {
    /// Sizes the filter for `expected_keys` at the given false positive rate.
    pub fn new(expected_keys: usize, false_positive_rate: f64) -> Self {
        if expected_keys == 0 {
            return Self::with_bits_and_hashes(MIN_BITS, 1);
        }

        // m = -n * ln(p) / (ln(2)^2)
        let n = expected_keys as f64;
        let p = false_positive_rate.clamp(0.0001, 0.9999);
        let num_bits = ((-n * p.ln() / 2.0_f64.ln().powi(2)).ceil() as usize).max(MIN_BITS);

        // k = (m/n) * ln(2)
        let num_hashes =
            ((num_bits as f64 / n) * 2.0_f64.ln()).ceil().clamp(1.0, MAX_HASHES as f64) as u32;

        Self::with_bits_and_hashes(num_bits, num_hashes)
    }

    /// Builds a filter holding every key of `keys`.
    pub fn from_keys<'a, I>(keys: I, expected_keys: usize, false_positive_rate: f64) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut filter = Self::new(expected_keys, false_positive_rate);
        for key in keys {
            filter.add(key);
        }
        filter
    }

    fn with_bits_and_hashes(num_bits: usize, num_hashes: u32) -> Self {
        Self { bits: vec![0u8; num_bits.div_ceil(8)], num_hashes, num_bits }
    }

    /// Double hashing: `h_i = h1 + i * h2 (mod m)`.
    fn bit_positions(&self, key: &[u8]) -> impl Iterator<Item = usize> + '_ {
        let hash1 = hash_with_seed(key, 0xbc9f1d34);
        let hash2 = hash_with_seed(key, 0xd0e89c7b);

        (0..self.num_hashes)
            .map(move |i| (hash1.wrapping_add(i.wrapping_mul(hash2)) as usize) % self.num_bits)
    }

    fn is_bit_set(&self, pos: usize) -> bool {
        self.bits[pos / 8] & (1 << (pos % 8)) != 0
    }

    /// Size of the bit array in bytes.
    pub fn size(&self) -> usize {
        self.bits.len()
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }
}

impl Filter for BloomFilter {
    fn may_contain(&self, key: &[u8]) -> bool {
        self.bit_positions(key).all(|pos| self.is_bit_set(pos))
    }

    fn add(&mut self, key: &[u8]) {
        let positions: Vec<usize> = self.bit_positions(key).collect();
        for pos in positions {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut encoded = Vec::with_capacity(HEADER_LEN + self.bits.len());
        encoded.put_slice(BLOOM_MAGIC);
        encoded.put_u32(self.num_hashes);
        encoded.put_u64(self.num_bits as u64);
        encoded.put_slice(&self.bits);
        encoded
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::corruption("Bloom filter data too short"));
        }
        if &data[..BLOOM_MAGIC.len()] != BLOOM_MAGIC {
            return Err(Error::corruption("Bloom filter has an unknown preamble"));
        }

        let mut header = &data[BLOOM_MAGIC.len()..HEADER_LEN];
        let num_hashes = header.get_u32();
        let num_bits = header.get_u64() as usize;

        if num_bits == 0 || num_hashes == 0 || data.len() != HEADER_LEN + num_bits.div_ceil(8) {
            return Err(Error::corruption("Bloom filter size mismatch"));
        }

        Ok(Self { bits: data[HEADER_LEN..].to_vec(), num_hashes, num_bits })
    }
}

fn hash_with_seed(key: &[u8], seed: u32) -> u32 {
    let mut hasher = FnvHasher::new_with_seed(seed);
    hasher.write(key);
    hasher.finish() as u32
}

/// FNV-1a, seeded.
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new_with_seed(seed: u32) -> Self {
        Self { state: Self::FNV_OFFSET_BASIS ^ (seed as u64) }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}
