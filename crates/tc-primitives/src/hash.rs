//! BLAKE2b hashing — block hashes, fingerprints, key-safe associated data.
//!
//! The trustchain wire format is bit-exact with the existing server, which
//! fixes the hash function at BLAKE2b with a 32-byte digest (libsodium's
//! `crypto_generichash`). Do not swap this for BLAKE3 or SHA-256 — every
//! block hash, and therefore every signature, is computed over it.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

pub const HASH_SIZE: usize = 32;

/// One-shot BLAKE2b-256 over a single buffer.
pub fn hash(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental hasher for multi-part inputs (block hashing concatenates
/// several fields without ever materializing the full buffer).
#[derive(Default)]
pub struct Hasher(Blake2b256);

impl Hasher {
    pub fn new() -> Self {
        Self(Blake2b256::new())
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    pub fn finalize(self) -> [u8; HASH_SIZE] {
        self.0.finalize().into()
    }
}

/// Hash several byte slices as if they had been concatenated, without
/// allocating the concatenation.
pub fn hash_parts(parts: &[&[u8]]) -> [u8; HASH_SIZE] {
    let mut h = Hasher::new();
    for part in parts {
        h.update(part);
    }
    h.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash(b"hello"), hash(b"hello"));
        assert_ne!(hash(b"hello"), hash(b"hellp"));
    }

    #[test]
    fn parts_equal_concat() {
        let concat = hash(b"ab cd");
        let parts = hash_parts(&[b"ab ", b"cd"]);
        assert_eq!(concat, parts);
    }
}
