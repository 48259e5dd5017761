//! Key filters that let a point lookup skip segments.

pub mod bloom;

pub use bloom::BloomFilter;

/// Key membership test with possible false positives and no false negatives.
pub trait Filter {
    /// Might the key be present?
    fn may_contain(&self, key: &[u8]) -> bool;

    fn add(&mut self, key: &[u8]);

    fn encode(&self) -> Vec<u8>;

    fn decode(data: &[u8]) -> crate::Result<Self>
    where
        Self: Sized;
}
