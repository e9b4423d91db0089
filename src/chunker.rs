//! Content-defined chunker (§4.E): splits files at or above the
//! deconstruction threshold into variable-length blocks using a rolling
//! hash boundary, storing each as an EBOF v4 binary-block object.

use crate::adler::RollingAdler32;
use crate::codec::{self, EBOF_TYPE_BBLK};
use crate::crc;
use crate::entropy;
use crate::error::{Error, Result};
use crate::hash::{self, Hash, ZERO_HASH};
use crate::manifest::{Manifest, ManifestEntry};
use crate::store::{self, Paths};
use memmap2::Mmap;
use std::collections::{HashMap, HashSet};
use std::fs::File;

/// Rolling window over which the chunk boundary hash is computed.
pub const CDC_WINDOW: usize = 4096;
pub const CDC_MIN_BLOCK: usize = 2048;
pub const CDC_MAX_BLOCK: usize = 65536;
/// A boundary falls where the low bits of the rolling hash all match this
/// mask, giving an expected block size of `CDC_MASK + 1` bytes.
pub const CDC_MASK: u32 = 0x1FFF;

/// Files at or above this size are deconstructed into blocks rather than
/// stored (or delta-encoded) as a single object (§4.E, §8 Scenario C).
pub const DECONSTRUCT_THRESHOLD: u64 = 5 * 1024 * 1024 * 1024;

pub struct Block {
    pub parent: Hash,
    pub entropy: f32,
    pub offset: u64,
    pub length: u64,
    pub data: Vec<u8>,
}

/// Scans `content` for content-defined chunk boundaries, returning
/// `(offset, length)` pairs covering the whole buffer (§4.E step 2).
pub fn find_boundaries(content: &[u8]) -> Vec<(u64, u64)> {
    let mut boundaries = Vec::new();
    let len = content.len();
    if len == 0 {
        return boundaries;
    }
    let mut block_start = 0usize;

    while block_start < len {
        let remaining = len - block_start;
        if remaining <= CDC_MIN_BLOCK {
            boundaries.push((block_start as u64, remaining as u64));
            break;
        }

        let max_cut = (block_start + CDC_MAX_BLOCK).min(len);
        let min_check = block_start + CDC_MIN_BLOCK;
        let mut i = min_check.max(CDC_WINDOW);

        if i > max_cut {
            boundaries.push((block_start as u64, (max_cut - block_start) as u64));
            block_start = max_cut;
            continue;
        }

        let mut roller = RollingAdler32::from_window(&content[i - CDC_WINDOW..i]);
        let mut cut = max_cut;
        loop {
            if roller.value() & CDC_MASK == CDC_MASK {
                cut = i;
                break;
            }
            if i >= max_cut {
                break;
            }
            let outgoing = content[i - CDC_WINDOW];
            let incoming = content[i];
            roller.roll(outgoing, incoming);
            i += 1;
        }
        boundaries.push((block_start as u64, (cut - block_start) as u64));
        block_start = cut;
    }

    boundaries
}

/// Layout: 32-byte parent hash, float entropy, u64 offset, u64 length,
/// u32 CRC-32, then the raw bytes padded to an 8-byte boundary (§3).
fn build_block_payload(parent: &Hash, entropy_val: f32, offset: u64, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 4 + 8 + 8 + 4 + data.len());
    buf.extend_from_slice(parent);
    buf.extend_from_slice(&entropy_val.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&(data.len() as u64).to_le_bytes());
    buf.extend_from_slice(&crc::crc32(data).to_le_bytes());
    buf.extend_from_slice(data);
    codec::pad_to_8(&mut buf);
    buf
}

fn parse_block_payload(buf: &[u8]) -> Result<Block> {
    const HEADER_LEN: usize = 32 + 4 + 8 + 8 + 4;
    if buf.len() < HEADER_LEN {
        return Err(Error::corrupt("<block>", "block payload truncated"));
    }
    let mut parent = [0u8; 32];
    parent.copy_from_slice(&buf[0..32]);
    let entropy_val = f32::from_le_bytes(buf[32..36].try_into().unwrap());
    let offset = u64::from_le_bytes(buf[36..44].try_into().unwrap());
    let length = u64::from_le_bytes(buf[44..52].try_into().unwrap());
    let stored_crc = u32::from_le_bytes(buf[52..56].try_into().unwrap());
    let data_len = length as usize;
    if buf.len() < HEADER_LEN + data_len {
        return Err(Error::corrupt("<block>", "block data truncated"));
    }
    let data = buf[HEADER_LEN..HEADER_LEN + data_len].to_vec();
    if crc::crc32(&data) != stored_crc {
        return Err(Error::corrupt("<block>", "block CRC-32 mismatch"));
    }
    Ok(Block {
        parent,
        entropy: entropy_val,
        offset,
        length,
        data,
    })
}

/// Writes one binary-block object framed as EBOF v4, if absent.
fn write_block(paths: &Paths, parent: &Hash, offset: u64, data: &[u8]) -> Result<(Hash, f32)> {
    let id = hash::digest_bytes(data);
    let entropy_val = entropy::entropy_of_bytes(data) as f32;
    if store::block_exists(paths, &id) {
        return Ok((id, entropy_val));
    }
    let payload = build_block_payload(parent, entropy_val, offset, data);
    let mut framed = Vec::with_capacity(codec::EBOF_HEADER_LEN + payload.len());
    codec::write_ebof_header(&mut framed, EBOF_TYPE_BBLK, payload.len() as u64);
    framed.extend_from_slice(&payload);
    store::write_block_raw(paths, &id, &framed)?;
    Ok((id, entropy_val))
}

/// Reads and verifies a binary-block object.
pub fn read_block(paths: &Paths, id: &Hash) -> Result<Block> {
    let framed = store::read_block_raw(paths, id)?;
    let (object_type, payload_size) = codec::read_ebof_header(&framed)?;
    if object_type != EBOF_TYPE_BBLK {
        return Err(Error::corrupt(hash::to_hex(id), "not a binary-block object"));
    }
    let start = codec::EBOF_HEADER_LEN;
    let end = start + payload_size as usize;
    if framed.len() < end {
        return Err(Error::corrupt(hash::to_hex(id), "binary-block payload truncated"));
    }
    parse_block_payload(&framed[start..end])
}

/// Works out the parent-block back-pointer for a freshly cut block (§4.E
/// "Parent-block linkage"): no link if the block's content already appears
/// anywhere in the previous manifest (it's being reused), else a link to
/// whatever block previously occupied the same offset, else none.
fn parent_link(prev: Option<&Manifest>, reused_hashes: &HashSet<Hash>, offset_index: &HashMap<u64, Hash>, new_hash: &Hash, offset: u64) -> Hash {
    if prev.is_none() {
        return ZERO_HASH;
    }
    if reused_hashes.contains(new_hash) {
        return ZERO_HASH;
    }
    offset_index.get(&offset).copied().unwrap_or(ZERO_HASH)
}

/// Deconstructs the file at `file_path` into binary blocks, storing each
/// and returning `(entries, total_size, mean_entropy)` (§4.E, §4.F).
pub fn deconstruct(paths: &Paths, file_path: &std::path::Path, prev_manifest: Option<&Manifest>) -> Result<(Vec<ManifestEntry>, u64, f32)> {
    let file = File::open(file_path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let content: &[u8] = &mmap;
    let total_size = content.len() as u64;

    let reused_hashes: HashSet<Hash> = prev_manifest
        .map(|m| m.entries.iter().map(|e| e.hash).collect())
        .unwrap_or_default();
    let offset_index: HashMap<u64, Hash> = prev_manifest
        .map(|m| m.entries.iter().map(|e| (e.offset, e.hash)).collect())
        .unwrap_or_default();

    let boundaries = find_boundaries(content);
    let mut entries = Vec::with_capacity(boundaries.len());
    let mut entropy_sum = 0f64;
    for (offset, length) in &boundaries {
        let data = &content[*offset as usize..(*offset + *length) as usize];
        // parent candidacy is resolved against the previous version's
        // blocks only, so compute the plain hash first.
        let new_hash = hash::digest_bytes(data);
        let parent = parent_link(prev_manifest, &reused_hashes, &offset_index, &new_hash, *offset);
        let (block_hash, block_entropy) = write_block(paths, &parent, *offset, data)?;
        entropy_sum += block_entropy as f64;
        entries.push(ManifestEntry {
            hash: block_hash,
            offset: *offset,
            length: *length,
        });
    }
    let mean_entropy = if entries.is_empty() {
        0.0
    } else {
        (entropy_sum / entries.len() as f64) as f32
    };
    Ok((entries, total_size, mean_entropy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn boundaries_cover_whole_buffer_contiguously() {
        let mut content = vec![0u8; 200_000];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i as u64).wrapping_mul(2_654_435_761) as u8;
        }
        let boundaries = find_boundaries(&content);
        assert!(!boundaries.is_empty());
        let mut expect_start = 0u64;
        for (offset, length) in &boundaries {
            assert_eq!(*offset, expect_start);
            assert!(*length > 0);
            expect_start += length;
        }
        assert_eq!(expect_start, content.len() as u64);
    }

    #[test]
    fn blocks_respect_size_bounds_except_final() {
        let mut content = vec![0u8; 500_000];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i as u64).wrapping_mul(40503) as u8;
        }
        let boundaries = find_boundaries(&content);
        for (idx, (_, length)) in boundaries.iter().enumerate() {
            assert!(*length as usize <= CDC_MAX_BLOCK);
            if idx + 1 < boundaries.len() {
                assert!(*length as usize >= CDC_MIN_BLOCK);
            }
        }
    }

    #[test]
    fn deconstruct_round_trips_through_block_store() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();

        let mut content = vec![0u8; 300_000];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i as u64).wrapping_mul(6_364_136_223_846_793_005) as u8;
        }
        let file_path = dir.path().join("big.bin");
        std::fs::write(&file_path, &content).unwrap();

        let (entries, total_size, mean_entropy) = deconstruct(&paths, &file_path, None).unwrap();
        assert_eq!(total_size, content.len() as u64);
        assert!(mean_entropy > 0.0);

        let mut rebuilt = Vec::with_capacity(content.len());
        for entry in &entries {
            let block = read_block(&paths, &entry.hash).unwrap();
            assert_eq!(block.parent, ZERO_HASH);
            rebuilt.extend_from_slice(&block.data);
        }
        assert_eq!(rebuilt, content);
    }

    #[test]
    fn empty_file_has_no_blocks() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let file_path = dir.path().join("empty.bin");
        std::fs::write(&file_path, b"").unwrap();
        let (entries, total_size, mean_entropy) = deconstruct(&paths, &file_path, None).unwrap();
        assert!(entries.is_empty());
        assert_eq!(total_size, 0);
        assert_eq!(mean_entropy, 0.0);
    }

    #[test]
    fn changed_block_links_to_parents_block_at_same_offset() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();

        let mut content = vec![7u8; 200_000];
        for (i, b) in content.iter_mut().enumerate().skip(150_000) {
            *b = (i as u64).wrapping_mul(12_345) as u8;
        }
        let file_path = dir.path().join("v1.bin");
        std::fs::write(&file_path, &content).unwrap();
        let (v1_entries, v1_size, v1_entropy) = deconstruct(&paths, &file_path, None).unwrap();
        let v1 = Manifest::new("v.bin".to_string(), 0o644, v1_size, v1_entropy, v1_entries);

        let mut content2 = content.clone();
        content2[180_000] ^= 0xFF;
        std::fs::write(&file_path, &content2).unwrap();
        let (v2_entries, _v2_size, _v2_entropy) = deconstruct(&paths, &file_path, Some(&v1)).unwrap();

        let v1_by_offset: HashMap<u64, Hash> = v1.entries.iter().map(|e| (e.offset, e.hash)).collect();
        let mut saw_reused = false;
        let mut saw_linked_change = false;
        for entry in &v2_entries {
            let block = read_block(&paths, &entry.hash).unwrap();
            match v1_by_offset.get(&entry.offset) {
                Some(prev_hash) if *prev_hash == entry.hash => {
                    assert_eq!(block.parent, ZERO_HASH, "reused block must not carry a parent link");
                    saw_reused = true;
                }
                Some(prev_hash) => {
                    assert_eq!(block.parent, *prev_hash, "changed block must link to its predecessor");
                    saw_linked_change = true;
                }
                None => {}
            }
        }
        assert!(saw_reused, "expected at least one unchanged block");
        assert!(saw_linked_change, "expected at least one changed block");
    }
}
