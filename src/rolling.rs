//! Rolling-hash signature index and byte-delta script (§4.D).
//!
//! Builds a weak+strong signature map over a base buffer in fixed 4 KiB
//! windows, then scans new content for matching windows, emitting a script
//! of copy/insert operations. `size_t` fields in the wire format are pinned
//! to 64-bit little-endian per the spec's portability note (§4.D, §9).

use crate::adler::{adler32, RollingAdler32};
use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use std::collections::HashMap;

pub const BLOCK_SIZE: usize = 4096;
const HASH_MAP_BUCKETS: usize = 16_381;
/// A delta is only used if its script is strictly under this fraction of
/// the new content's length (§4.D acceptance rule).
pub const DELTA_ACCEPTANCE_RATIO: f64 = 0.75;

#[derive(Debug, Clone, Copy)]
struct SignatureEntry {
    strong: Hash,
    base_offset: u64,
}

/// Weak+strong signature map over a base buffer, bucketed by Adler-32.
pub struct SignatureMap {
    buckets: Vec<Vec<SignatureEntry>>,
}

impl SignatureMap {
    /// Signs `base` in non-overlapping `BLOCK_SIZE` windows (§4.D "Signing").
    pub fn build(base: &[u8]) -> Self {
        let mut buckets: Vec<Vec<SignatureEntry>> = vec![Vec::new(); HASH_MAP_BUCKETS];
        let mut offset = 0usize;
        while offset < base.len() {
            let end = (offset + BLOCK_SIZE).min(base.len());
            let window = &base[offset..end];
            let weak = adler32(window);
            let strong = hash::digest_bytes(window);
            let bucket = (weak as usize) % HASH_MAP_BUCKETS;
            buckets[bucket].push(SignatureEntry {
                strong,
                base_offset: offset as u64,
            });
            offset += BLOCK_SIZE;
        }
        Self { buckets }
    }

    fn find(&self, weak: u32, strong: &Hash) -> Option<u64> {
        let bucket = (weak as usize) % HASH_MAP_BUCKETS;
        self.buckets[bucket]
            .iter()
            .find(|e| &e.strong == strong)
            .map(|e| e.base_offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Copy `length` bytes starting at `offset` in the base buffer.
    Copy { offset: u64, length: u64 },
    /// Insert these literal bytes.
    Insert(Vec<u8>),
}

const OP_COPY: u8 = b'C';
const OP_INSERT: u8 = b'I';

/// Scans `new_content` against `sig_map`, matching `BLOCK_SIZE`-byte windows
/// and emitting copy/insert operations (§4.D "Scanning").
pub fn build_delta_ops(sig_map: &SignatureMap, new_content: &[u8]) -> Vec<DeltaOp> {
    let mut ops = Vec::new();
    let mut last_match_end = 0usize;
    let mut i = 0usize;
    let len = new_content.len();

    if len < BLOCK_SIZE {
        if len > 0 {
            ops.push(DeltaOp::Insert(new_content.to_vec()));
        }
        return ops;
    }

    let mut roller = RollingAdler32::from_window(&new_content[0..BLOCK_SIZE]);
    let mut have_window = true;

    while i + BLOCK_SIZE <= len {
        if !have_window {
            roller = RollingAdler32::from_window(&new_content[i..i + BLOCK_SIZE]);
            have_window = true;
        }
        let weak = roller.value();
        let window = &new_content[i..i + BLOCK_SIZE];
        let strong = hash::digest_bytes(window);

        if let Some(base_offset) = sig_map.find(weak, &strong) {
            if last_match_end < i {
                ops.push(DeltaOp::Insert(new_content[last_match_end..i].to_vec()));
            }
            ops.push(DeltaOp::Copy {
                offset: base_offset,
                length: BLOCK_SIZE as u64,
            });
            i += BLOCK_SIZE;
            last_match_end = i;
            have_window = false;
        } else {
            if i + BLOCK_SIZE < len {
                roller.roll(new_content[i], new_content[i + BLOCK_SIZE]);
            }
            i += 1;
        }
    }

    if last_match_end < len {
        ops.push(DeltaOp::Insert(new_content[last_match_end..len].to_vec()));
    }

    ops
}

/// Serializes delta ops into the wire format: `'C'+offset+length` or
/// `'I'+length+bytes`, all integers 64-bit little-endian.
pub fn encode_delta_script(ops: &[DeltaOp]) -> Vec<u8> {
    let mut out = Vec::new();
    for op in ops {
        match op {
            DeltaOp::Copy { offset, length } => {
                out.push(OP_COPY);
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(&length.to_le_bytes());
            }
            DeltaOp::Insert(bytes) => {
                out.push(OP_INSERT);
                out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
    out
}

/// Reconstructs content by replaying a delta script against `base`. Fails
/// on out-of-bounds copies, malformed ops, or a script that runs past its
/// declared length (§4.D).
pub fn apply_delta_script(base: &[u8], script: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < script.len() {
        let op = script[pos];
        pos += 1;
        match op {
            OP_COPY => {
                let (offset, length) = read_two_u64(script, &mut pos)?;
                let start = offset as usize;
                let end = start
                    .checked_add(length as usize)
                    .ok_or_else(|| Error::corrupt("<delta>", "copy length overflow"))?;
                if end > base.len() {
                    return Err(Error::corrupt("<delta>", "copy op out of bounds"));
                }
                out.extend_from_slice(&base[start..end]);
            }
            OP_INSERT => {
                let length = read_u64(script, &mut pos)? as usize;
                if pos + length > script.len() {
                    return Err(Error::corrupt("<delta>", "insert op exceeds script length"));
                }
                out.extend_from_slice(&script[pos..pos + length]);
                pos += length;
            }
            _ => return Err(Error::corrupt("<delta>", "malformed delta op")),
        }
    }
    Ok(out)
}

fn read_u64(script: &[u8], pos: &mut usize) -> Result<u64> {
    if *pos + 8 > script.len() {
        return Err(Error::corrupt("<delta>", "truncated delta op"));
    }
    let v = u64::from_le_bytes(script[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok(v)
}

fn read_two_u64(script: &[u8], pos: &mut usize) -> Result<(u64, u64)> {
    let a = read_u64(script, pos)?;
    let b = read_u64(script, pos)?;
    Ok((a, b))
}

/// Whether a script is small enough to accept as a delta rather than
/// falling back to a full blob (§4.D, §8.12).
pub fn accept_delta(script_len: usize, new_content_len: usize) -> bool {
    (script_len as f64) < DELTA_ACCEPTANCE_RATIO * (new_content_len as f64)
}

/// Builds and encodes a delta script for `new_content` against `base`,
/// returning `None` if the 75% acceptance rule rejects it.
pub fn try_build_delta(base: &[u8], new_content: &[u8]) -> Option<Vec<u8>> {
    let sig_map = SignatureMap::build(base);
    let ops = build_delta_ops(&sig_map, new_content);
    let script = encode_delta_script(&ops);
    if accept_delta(script.len(), new_content.len()) {
        Some(script)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_round_trip_identical_blocks() {
        let base = vec![b'x'; BLOCK_SIZE * 4];
        let mut new_content = base.clone();
        new_content.extend_from_slice(b"tail bytes not in base");
        let sig_map = SignatureMap::build(&base);
        let ops = build_delta_ops(&sig_map, &new_content);
        let script = encode_delta_script(&ops);
        let reconstructed = apply_delta_script(&base, &script).unwrap();
        assert_eq!(reconstructed, new_content);
    }

    #[test]
    fn small_edit_near_middle_accepted_as_delta() {
        let mut base = vec![0u8; 10_000];
        for (i, b) in base.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut new_content = base.clone();
        for b in new_content.iter_mut().skip(4950).take(100) {
            *b ^= 0xFF;
        }
        let script = try_build_delta(&base, &new_content).expect("delta should be accepted");
        assert!(script.len() < 7_500);
        let reconstructed = apply_delta_script(&base, &script).unwrap();
        assert_eq!(reconstructed, new_content);
    }

    #[test]
    fn completely_different_content_rejected() {
        let base = vec![0u8; BLOCK_SIZE * 4];
        let new_content: Vec<u8> = (0..BLOCK_SIZE * 4).map(|i| (i % 256) as u8).collect();
        assert!(try_build_delta(&base, &new_content).is_none());
    }

    #[test]
    fn out_of_bounds_copy_fails() {
        let base = vec![0u8; 10];
        let mut script = Vec::new();
        script.push(b'C');
        script.extend_from_slice(&100u64.to_le_bytes());
        script.extend_from_slice(&5u64.to_le_bytes());
        assert!(apply_delta_script(&base, &script).is_err());
    }

    #[test]
    fn empty_new_content_yields_empty_script() {
        let base = vec![1u8; BLOCK_SIZE];
        let sig_map = SignatureMap::build(&base);
        let ops = build_delta_ops(&sig_map, &[]);
        assert!(ops.is_empty());
    }
}
