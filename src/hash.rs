//! SHA-256 hashing helpers.
//!
//! Wraps `sha2` with the one-shot/streaming split the teacher's `hash.rs`
//! used for SHA-1, plus the hex round-trip helpers objects are addressed by.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;

pub const HASH_LEN: usize = 32;

pub type Hash = [u8; HASH_LEN];

/// Hex string for the all-zero hash, used where the spec calls for "no
/// parent block" or "no tree" sentinels (§3, §4.E).
pub const ZERO_HASH: Hash = [0u8; HASH_LEN];

/// Streaming SHA-256, for content read incrementally (large files, EBOF
/// block bytes, etc).
pub struct StreamingHasher {
    inner: Sha256,
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}

/// One-shot SHA-256 over an in-memory buffer.
pub fn digest_bytes(contents: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hasher.finalize().into()
}

/// Streams a file's contents through SHA-256 without loading it whole.
pub fn digest_file(file: &mut File) -> Result<Hash> {
    let mut hasher = StreamingHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

#[inline]
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Parses a 64-character lowercase hex string into a `Hash`.
pub fn from_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| Error::MalformedInput(format!("invalid hash hex {s:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::MalformedInput(format!("hash {s:?} is not {HASH_LEN} bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let h = digest_bytes(b"hello\n");
        let s = to_hex(&h);
        assert_eq!(s.len(), 64);
        assert_eq!(from_hex(&s).unwrap(), h);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let one_shot = digest_bytes(&data);
        let mut hasher = StreamingHasher::new();
        for chunk in data.chunks(37) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), one_shot);
    }

    #[test]
    fn known_vector() {
        // Scenario A from spec §8: SHA-256("hello\n").
        let h = digest_bytes(b"hello\n");
        assert_eq!(
            to_hex(&h),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }
}
