//! Manifest assembler (§4.F): serialize/write/read/reconstruct the ordered
//! block list that reconstructs one large file.

use crate::codec::{self, EBOF_TYPE_MOBJ};
use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::store::{self, Paths};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub hash: Hash,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: String,
    pub file_mode: u32,
    pub total_size: u64,
    pub entropy_mean: f32,
    /// SHA-256 of the raw block-entry array in the first 32 bytes, zeroed
    /// when there are no blocks; the remaining 32 bytes are reserved (§3).
    pub file_signature: [u8; 64],
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(path: String, file_mode: u32, total_size: u64, entropy_mean: f32, entries: Vec<ManifestEntry>) -> Self {
        let file_signature = compute_signature(&entries);
        Self {
            path,
            file_mode,
            total_size,
            entropy_mean,
            file_signature,
            entries,
        }
    }

    /// Serializes header + path + entries into one buffer; its hash is the
    /// manifest's identifier.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let path_bytes = self.path.as_bytes();
        buf.extend_from_slice(&(path_bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.file_mode.to_le_bytes());
        buf.extend_from_slice(&self.total_size.to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.entropy_mean.to_le_bytes());
        buf.extend_from_slice(&self.file_signature);
        buf.extend_from_slice(path_bytes);
        for e in &self.entries {
            buf.extend_from_slice(&e.hash);
            buf.extend_from_slice(&e.offset.to_le_bytes());
            buf.extend_from_slice(&e.length.to_le_bytes());
        }
        buf
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| Error::corrupt("<manifest>", reason.to_string());
        if buf.len() < 2 + 4 + 8 + 4 + 4 + 64 {
            return Err(corrupt("manifest payload truncated"));
        }
        let mut pos = 0usize;
        let path_len = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;
        let file_mode = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let total_size = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let block_count = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;
        let entropy_mean = f32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let mut file_signature = [0u8; 64];
        file_signature.copy_from_slice(&buf[pos..pos + 64]);
        pos += 64;

        if buf.len() < pos + path_len {
            return Err(corrupt("manifest path truncated"));
        }
        let path = std::str::from_utf8(&buf[pos..pos + path_len])
            .map_err(|_| corrupt("manifest path is not UTF-8"))?
            .to_string();
        pos += path_len;

        let entry_size = 32 + 8 + 8;
        let mut entries = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            if buf.len() < pos + entry_size {
                return Err(corrupt("manifest block table truncated"));
            }
            let mut h = [0u8; 32];
            h.copy_from_slice(&buf[pos..pos + 32]);
            pos += 32;
            let offset = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            pos += 8;
            let length = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
            pos += 8;
            entries.push(ManifestEntry {
                hash: h,
                offset,
                length,
            });
        }

        Ok(Self {
            path,
            file_mode,
            total_size,
            entropy_mean,
            file_signature,
            entries,
        })
    }

    pub fn identifier(&self) -> Hash {
        hash::digest_bytes(&self.serialize())
    }

    /// Verifies the stored file signature against the actual block-entry
    /// array (§3 invariant 4, §8.3).
    pub fn verify_signature(&self) -> bool {
        compute_signature(&self.entries) == self.file_signature
    }
}

fn compute_signature(entries: &[ManifestEntry]) -> [u8; 64] {
    let mut sig = [0u8; 64];
    if entries.is_empty() {
        return sig;
    }
    let mut buf = Vec::with_capacity(entries.len() * 48);
    for e in entries {
        buf.extend_from_slice(&e.hash);
        buf.extend_from_slice(&e.offset.to_le_bytes());
        buf.extend_from_slice(&e.length.to_le_bytes());
    }
    let digest = hash::digest_bytes(&buf);
    sig[..32].copy_from_slice(&digest);
    sig
}

/// Writes a manifest object under `objects/m/`, if absent.
pub fn write(paths: &Paths, manifest: &Manifest) -> Result<Hash> {
    let payload = manifest.serialize();
    let id = hash::digest_bytes(&payload);
    if store::read_manifest_raw(paths, &id).is_ok() {
        return Ok(id);
    }
    let mut framed = Vec::with_capacity(codec::EBOF_HEADER_LEN + payload.len());
    codec::write_ebof_header(&mut framed, EBOF_TYPE_MOBJ, payload.len() as u64);
    framed.extend_from_slice(&payload);
    store::write_manifest_raw(paths, &id, &framed)?;
    Ok(id)
}

pub fn read(paths: &Paths, id: &Hash) -> Result<Manifest> {
    let framed = store::read_manifest_raw(paths, id)?;
    let (object_type, payload_size) = codec::read_ebof_header(&framed)?;
    if object_type != EBOF_TYPE_MOBJ {
        return Err(Error::corrupt(hash::to_hex(id), "not a manifest object"));
    }
    let start = codec::EBOF_HEADER_LEN;
    let end = start + payload_size as usize;
    if framed.len() < end {
        return Err(Error::corrupt(hash::to_hex(id), "manifest payload truncated"));
    }
    Manifest::deserialize(&framed[start..end])
}

/// Reconstructs `manifest`'s content fully in memory, without touching the
/// working directory. Used by tree diffing, where a file never needs to
/// land on disk (§4.I).
pub fn reconstruct_bytes(paths: &Paths, manifest: &Manifest) -> Result<Vec<u8>> {
    if !manifest.verify_signature() {
        return Err(Error::corrupt(
            "<manifest>",
            "file signature mismatch; refusing to reconstruct",
        ));
    }
    let mut out = vec![0u8; manifest.total_size as usize];
    for entry in &manifest.entries {
        let block = crate::chunker::read_block(paths, &entry.hash)?;
        let start = entry.offset as usize;
        let end = start + block.data.len();
        if end > out.len() {
            return Err(Error::corrupt("<manifest>", "block extends past total_size"));
        }
        out[start..end].copy_from_slice(&block.data);
    }
    Ok(out)
}

/// Reconstructs `manifest` into `out_path`, verifying the file signature
/// first and each block's CRC-32 along the way (§4.F, §8.3).
pub fn reconstruct(paths: &Paths, manifest: &Manifest, out_path: &Path) -> Result<()> {
    if !manifest.verify_signature() {
        return Err(Error::corrupt(
            "<manifest>",
            "file signature mismatch; refusing to reconstruct",
        ));
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(out_path)?;
    file.set_len(manifest.total_size)?;
    drop(file);

    let mut out = OpenOptions::new().write(true).open(out_path)?;
    for entry in &manifest.entries {
        let block = crate::chunker::read_block(paths, &entry.hash)?;
        out.seek(SeekFrom::Start(entry.offset))?;
        out.write_all(&block.data)?;
    }
    out.set_len(manifest.total_size)?;

    let mut perms = std::fs::metadata(out_path)?.permissions();
    perms.set_mode(manifest.file_mode);
    std::fs::set_permissions(out_path, perms)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trips() {
        let entries = vec![
            ManifestEntry {
                hash: hash::digest_bytes(b"block0"),
                offset: 0,
                length: 4096,
            },
            ManifestEntry {
                hash: hash::digest_bytes(b"block1"),
                offset: 4096,
                length: 2048,
            },
        ];
        let m = Manifest::new("some/path.bin".to_string(), 0o644, 6144, 3.5, entries);
        let bytes = m.serialize();
        let back = Manifest::deserialize(&bytes).unwrap();
        assert_eq!(back.path, m.path);
        assert_eq!(back.file_mode, m.file_mode);
        assert_eq!(back.total_size, m.total_size);
        assert_eq!(back.entries, m.entries);
        assert_eq!(back.file_signature, m.file_signature);
        assert!(back.verify_signature());
    }

    #[test]
    fn empty_manifest_has_zero_signature() {
        let m = Manifest::new("empty.bin".to_string(), 0o644, 0, 0.0, vec![]);
        assert_eq!(m.file_signature, [0u8; 64]);
        assert!(m.verify_signature());
    }

    #[test]
    fn tampered_entries_fail_signature_check() {
        let entries = vec![ManifestEntry {
            hash: hash::digest_bytes(b"block0"),
            offset: 0,
            length: 10,
        }];
        let mut m = Manifest::new("p".to_string(), 0o644, 10, 1.0, entries);
        m.entries[0].length = 999; // tamper after signature computed
        assert!(!m.verify_signature());
    }
}
