//! Component checksums.
//!
//! A checksum folds every numeric field of a component into a seeded `xxh3`
//! hash. Two components with bit-identical state produce the same value, so
//! comparing checksums before and after a persistence round-trip detects any
//! loss of precision or forgotten field.
//!
//! Floats are hashed through their bit pattern, which distinguishes `0.0`
//! from `-0.0`; serde round-trips preserve that distinction.
use ndarray::Array1;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seeded hash over the numeric state of a component.
pub trait Checksum {
    fn checksum(&self, seed: u64) -> u64;
}

impl Checksum for f64 {
    fn checksum(&self, seed: u64) -> u64 {
        xxh3_64_with_seed(&self.to_bits().to_le_bytes(), seed)
    }
}

impl Checksum for u64 {
    fn checksum(&self, seed: u64) -> u64 {
        xxh3_64_with_seed(&self.to_le_bytes(), seed)
    }
}

impl Checksum for i64 {
    fn checksum(&self, seed: u64) -> u64 {
        xxh3_64_with_seed(&self.to_le_bytes(), seed)
    }
}

impl Checksum for usize {
    fn checksum(&self, seed: u64) -> u64 {
        (*self as u64).checksum(seed)
    }
}

impl Checksum for bool {
    fn checksum(&self, seed: u64) -> u64 {
        xxh3_64_with_seed(&[u8::from(*self)], seed)
    }
}

impl<T: Checksum> Checksum for Option<T> {
    fn checksum(&self, seed: u64) -> u64 {
        match self {
            Some(value) => value.checksum(true.checksum(seed)),
            None => false.checksum(seed),
        }
    }
}

impl<T: Checksum> Checksum for [T] {
    fn checksum(&self, seed: u64) -> u64 {
        self.iter().fold(self.len().checksum(seed), |acc, value| value.checksum(acc))
    }
}

impl<T: Checksum> Checksum for Vec<T> {
    fn checksum(&self, seed: u64) -> u64 {
        self.as_slice().checksum(seed)
    }
}

impl Checksum for Array1<f64> {
    fn checksum(&self, seed: u64) -> u64 {
        self.iter().fold(self.len().checksum(seed), |acc, value| value.checksum(acc))
    }
}
