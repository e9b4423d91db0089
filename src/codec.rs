//! Object codec (§4.B): zlib framing for blob/delta/tree/commit objects, and
//! EBOF v4 packed framing for binary blocks and manifests.
//!
//! This module is pure: it turns buffers into buffers. Recursive resolution
//! of delta base objects (which needs the object store) lives in
//! `store::read_object`.

use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub const BLOB_HEADER: &[u8] = b"BLOB\0";
pub const DELTA_BYTE_HEADER: &[u8] = b"DELTA-BYTE\0";
pub const DELTA_LCS_HEADER: &[u8] = b"DELTA-LCS\0";

/// The result of inflating and parsing a non-framed object file.
pub enum ObjectPayload {
    Blob(Vec<u8>),
    DeltaByte { base: Hash, script: Vec<u8> },
    /// Deprecated line-based delta, supported for read-back only (§4.B).
    DeltaLcs { base: Hash, patch: Vec<u8> },
}

/// Deflates `payload` at the default compression level, matching the
/// teacher's `format_blob_content` shape.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}

/// Inflates a zlib-compressed object file. `flate2`'s `Read` impl already
/// grows its internal buffer as needed, which is this crate's rendition of
/// the spec's "on buffer-too-small, retry with doubled capacity" policy;
/// any other zlib error (bad header, truncated stream) fails the read.
pub fn decompress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(raw);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupt("<object>", format!("zlib inflate failed: {e}")))?;
    Ok(out)
}

pub fn format_blob_payload(content: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(BLOB_HEADER.len() + content.len());
    buf.extend_from_slice(BLOB_HEADER);
    buf.extend_from_slice(content);
    buf
}

pub fn format_delta_byte_payload(base: &Hash, script: &[u8]) -> Vec<u8> {
    let base_hex = hash::to_hex(base);
    let mut buf = Vec::with_capacity(DELTA_BYTE_HEADER.len() + base_hex.len() + 1 + script.len());
    buf.extend_from_slice(DELTA_BYTE_HEADER);
    buf.extend_from_slice(base_hex.as_bytes());
    buf.push(0);
    buf.extend_from_slice(script);
    buf
}

/// Parses an inflated object payload's header and splits off its body.
pub fn parse_object_payload(inflated: &[u8]) -> Result<ObjectPayload> {
    if let Some(rest) = inflated.strip_prefix(BLOB_HEADER) {
        return Ok(ObjectPayload::Blob(rest.to_vec()));
    }
    if let Some(rest) = inflated.strip_prefix(DELTA_BYTE_HEADER) {
        let (base, script) = split_base_hash(rest)?;
        return Ok(ObjectPayload::DeltaByte {
            base,
            script: script.to_vec(),
        });
    }
    if let Some(rest) = inflated.strip_prefix(DELTA_LCS_HEADER) {
        let (base, patch) = split_base_hash(rest)?;
        return Ok(ObjectPayload::DeltaLcs {
            base,
            patch: patch.to_vec(),
        });
    }
    Err(Error::corrupt("<object>", "unrecognized object header"))
}

/// Splits `<64-hex-base-hash>\0<rest>` as used by both delta header kinds.
fn split_base_hash(rest: &[u8]) -> Result<(Hash, &[u8])> {
    const HEX_LEN: usize = 64;
    if rest.len() < HEX_LEN + 1 || rest[HEX_LEN] != 0 {
        return Err(Error::corrupt("<object>", "malformed delta base hash"));
    }
    let hex_str = std::str::from_utf8(&rest[..HEX_LEN])
        .map_err(|_| Error::corrupt("<object>", "delta base hash is not UTF-8"))?;
    let base = hash::from_hex(hex_str)?;
    Ok((base, &rest[HEX_LEN + 1..]))
}

/// Applies a deprecated `DELTA-LCS` line-oriented patch to `base`, for
/// read-back only (§4.B, SPEC_FULL §E). Patch lines are one of:
/// - `A <text>\n`  — append a literal line from the patch itself.
/// - `S <n>\n`     — copy line `n` (0-indexed) from the base unchanged.
/// - `D\n`         — a deleted base line; contributes nothing to the output.
pub fn apply_lcs_patch(base: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    log::warn!("reading deprecated DELTA-LCS object; no new DELTA-LCS objects are ever written");
    let base_lines: Vec<&[u8]> = split_lines(base);
    let mut out = Vec::with_capacity(base.len());
    for line in split_lines(patch) {
        if let Some(rest) = line.strip_prefix(b"A ") {
            out.extend_from_slice(rest);
            out.push(b'\n');
        } else if line == b"D" {
            // deleted base line, nothing emitted
        } else if let Some(rest) = line.strip_prefix(b"S ") {
            let n: usize = std::str::from_utf8(rest)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| Error::corrupt("<object>", "malformed DELTA-LCS 'S' op"))?;
            let src = base_lines
                .get(n)
                .ok_or_else(|| Error::corrupt("<object>", "DELTA-LCS 'S' op out of range"))?;
            out.extend_from_slice(src);
            out.push(b'\n');
        } else if !line.is_empty() {
            return Err(Error::corrupt("<object>", "unrecognized DELTA-LCS op"));
        }
    }
    Ok(out)
}

fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    buf.split(|&b| b == b'\n').filter(|l| !l.is_empty()).collect()
}

// --- EBOF v4 framing (§3, §4.B) ---

pub const EBOF_MAGIC: u32 = 0xE7B0_B0E8;
pub const EBOF_VERSION: u16 = 0x0400;
pub const EBOF_TYPE_BBLK: u16 = 0x0010;
pub const EBOF_TYPE_MOBJ: u16 = 0x0011;
pub const EBOF_HEADER_LEN: usize = 16;

/// Writes the 16-byte packed little-endian EBOF v4 header.
pub fn write_ebof_header(out: &mut Vec<u8>, object_type: u16, payload_size: u64) {
    out.extend_from_slice(&EBOF_MAGIC.to_le_bytes());
    out.extend_from_slice(&EBOF_VERSION.to_le_bytes());
    out.extend_from_slice(&object_type.to_le_bytes());
    out.extend_from_slice(&payload_size.to_le_bytes());
}

/// Reads and validates an EBOF v4 header, returning `(object_type, payload_size)`.
pub fn read_ebof_header(buf: &[u8]) -> Result<(u16, u64)> {
    if buf.len() < EBOF_HEADER_LEN {
        return Err(Error::corrupt("<object>", "EBOF header truncated"));
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != EBOF_MAGIC {
        return Err(Error::corrupt("<object>", "bad EBOF magic"));
    }
    let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
    if version != EBOF_VERSION {
        return Err(Error::corrupt("<object>", "unsupported EBOF version"));
    }
    let object_type = u16::from_le_bytes(buf[6..8].try_into().unwrap());
    let payload_size = u64::from_le_bytes(buf[8..16].try_into().unwrap());
    Ok((object_type, payload_size))
}

/// Pads `buf` up to the next 8-byte boundary, as §3 requires for the block
/// region following a `BinaryBlockHeader`.
pub fn pad_to_8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}
