//! Object store (§4.C): fan-out path layout, existence checks, and the
//! recursive object reader that resolves delta chains (§4.B).
//!
//! `Paths` replaces the teacher's per-call `gyat_paths()` helper (which
//! re-derived the repo root from `std::env::current_dir()` on every call)
//! with a value resolved once and threaded explicitly, per spec §9's
//! guidance against process-wide statics.

use crate::codec::{self, ObjectPayload};
use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::rolling;
use std::fs;
use std::path::{Path, PathBuf};

/// All the paths under `<node>/.log/` a running engine needs.
#[derive(Debug, Clone)]
pub struct Paths {
    pub node_root: PathBuf,
    pub log_dir: PathBuf,
    pub objects_dir: PathBuf,
    pub blocks_dir: PathBuf,
    pub manifests_dir: PathBuf,
    pub trunk_head: PathBuf,
    pub subsections_dir: PathBuf,
    pub retain_file: PathBuf,
}

impl Paths {
    pub fn for_node(node_root: &Path) -> Self {
        let log_dir = node_root.join(".log");
        Self {
            node_root: node_root.to_path_buf(),
            objects_dir: log_dir.join("objects"),
            blocks_dir: log_dir.join("objects").join("b"),
            manifests_dir: log_dir.join("objects").join("m"),
            trunk_head: log_dir.join("TRUNK_HEAD"),
            subsections_dir: log_dir.join("subsections"),
            retain_file: node_root.join(".retain"),
            log_dir,
        }
    }

    /// Creates the on-disk skeleton for a brand-new node (analogous to the
    /// teacher's `cli/create.rs`).
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.objects_dir)?;
        fs::create_dir_all(&self.blocks_dir)?;
        fs::create_dir_all(&self.manifests_dir)?;
        fs::create_dir_all(&self.subsections_dir)?;
        if !self.trunk_head.exists() {
            fs::write(&self.trunk_head, "")?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.log_dir.is_dir()
    }

    fn fan_out(dir: &Path, hash_hex: &str, suffix: &str) -> PathBuf {
        let (prefix, rest) = hash_hex.split_at(2);
        dir.join(prefix).join(format!("{rest}{suffix}"))
    }

    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        Self::fan_out(&self.objects_dir, &hash::to_hex(hash), "")
    }

    pub fn block_path(&self, hash: &Hash) -> PathBuf {
        Self::fan_out(&self.blocks_dir, &hash::to_hex(hash), ".bblk")
    }

    pub fn manifest_path(&self, hash: &Hash) -> PathBuf {
        Self::fan_out(&self.manifests_dir, &hash::to_hex(hash), ".mobj")
    }

    pub fn subsection_file(&self, name: &str) -> PathBuf {
        self.subsections_dir.join(format!("{name}.subsec"))
    }

    pub fn subsection_versions_file(&self, name: &str) -> PathBuf {
        self.subsections_dir.join(format!("{name}.versions.json"))
    }

    pub fn trunk_versions_file(&self) -> PathBuf {
        self.log_dir.join("TRUNK.versions.json")
    }
}

fn write_if_absent(path: &Path, bytes: &[u8]) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Writes a full blob object (compressed `"BLOB\0"` + content) if it
/// doesn't already exist (§3 invariant 1: write-once, idempotent creation).
pub fn write_blob(paths: &Paths, hash: &Hash, content: &[u8]) -> Result<()> {
    let path = paths.object_path(hash);
    if path.exists() {
        return Ok(());
    }
    let payload = codec::format_blob_payload(content);
    write_if_absent(&path, &codec::compress(&payload)?)
}

/// Writes a delta-byte object (compressed `"DELTA-BYTE\0"` + base hex +
/// script) if it doesn't already exist.
pub fn write_delta(paths: &Paths, hash: &Hash, base: &Hash, script: &[u8]) -> Result<()> {
    let path = paths.object_path(hash);
    if path.exists() {
        return Ok(());
    }
    let payload = codec::format_delta_byte_payload(base, script);
    write_if_absent(&path, &codec::compress(&payload)?)
}

pub fn object_exists(paths: &Paths, hash: &Hash) -> bool {
    paths.object_path(hash).exists()
}

/// Writes a full blob by streaming the source file straight through a zlib
/// encoder, for files too large to comfortably hold twice in memory
/// (§4.G, 512 MiB < S ≤ 5 GiB).
pub fn write_blob_streaming(paths: &Paths, hash: &Hash, file_path: &Path) -> Result<()> {
    let path = paths.object_path(hash);
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut src = fs::File::open(file_path)?;
    let dest = fs::File::create(&path)?;
    let mut encoder = flate2::write::ZlibEncoder::new(dest, flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, codec::BLOB_HEADER)?;
    std::io::copy(&mut src, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// Reads a non-framed object and fully resolves it to its final content,
/// recursively applying delta scripts / LCS patches against their base
/// object as needed (§4.B).
pub fn read_object(paths: &Paths, hash: &Hash) -> Result<Vec<u8>> {
    let path = paths.object_path(hash);
    if !path.exists() {
        return Err(Error::ObjectNotFound(hash::to_hex(hash)));
    }
    let raw = fs::read(&path)?;
    let inflated = codec::decompress(&raw)?;
    match codec::parse_object_payload(&inflated)? {
        ObjectPayload::Blob(bytes) => Ok(bytes),
        ObjectPayload::DeltaByte { base, script } => {
            let base_content = read_object(paths, &base)?;
            let content = rolling::apply_delta_script(&base_content, &script)?;
            let got = hash::digest_bytes(&content);
            if got != *hash {
                return Err(Error::corrupt(
                    hash::to_hex(hash),
                    "delta reconstruction does not hash to its identifier",
                ));
            }
            Ok(content)
        }
        ObjectPayload::DeltaLcs { base, patch } => {
            let base_content = read_object(paths, &base)?;
            codec::apply_lcs_patch(&base_content, &patch)
        }
    }
}

/// Writes an EBOF v4 framed binary block, if absent (§4.E step 3).
pub fn write_block_raw(paths: &Paths, hash: &Hash, framed: &[u8]) -> Result<()> {
    write_if_absent(&paths.block_path(hash), framed)
}

pub fn read_block_raw(paths: &Paths, hash: &Hash) -> Result<Vec<u8>> {
    let path = paths.block_path(hash);
    if !path.exists() {
        return Err(Error::ObjectNotFound(hash::to_hex(hash)));
    }
    Ok(fs::read(path)?)
}

pub fn block_exists(paths: &Paths, hash: &Hash) -> bool {
    paths.block_path(hash).exists()
}

/// Writes an EBOF v4 framed manifest object, if absent (§4.F).
pub fn write_manifest_raw(paths: &Paths, hash: &Hash, framed: &[u8]) -> Result<()> {
    write_if_absent(&paths.manifest_path(hash), framed)
}

pub fn read_manifest_raw(paths: &Paths, hash: &Hash) -> Result<Vec<u8>> {
    let path = paths.manifest_path(hash);
    if !path.exists() {
        return Err(Error::ObjectNotFound(hash::to_hex(hash)));
    }
    Ok(fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blob_write_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let content = b"hello\n";
        let h = hash::digest_bytes(content);
        write_blob(&paths, &h, content).unwrap();
        let first = fs::read(paths.object_path(&h)).unwrap();
        write_blob(&paths, &h, content).unwrap();
        let second = fs::read(paths.object_path(&h)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn read_object_round_trips_blob() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let content = b"some content here".to_vec();
        let h = hash::digest_bytes(&content);
        write_blob(&paths, &h, &content).unwrap();
        let got = read_object(&paths, &h).unwrap();
        assert_eq!(got, content);
    }

    #[test]
    fn read_object_resolves_delta_chain() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();

        let base = vec![b'a'; 10_000];
        let base_hash = hash::digest_bytes(&base);
        write_blob(&paths, &base_hash, &base).unwrap();

        let mut new_content = base.clone();
        for b in new_content.iter_mut().skip(5000).take(50) {
            *b = b'z';
        }
        let new_hash = hash::digest_bytes(&new_content);
        let script = rolling::try_build_delta(&base, &new_content).unwrap();
        write_delta(&paths, &new_hash, &base_hash, &script).unwrap();

        let got = read_object(&paths, &new_hash).unwrap();
        assert_eq!(got, new_content);
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let h = hash::digest_bytes(b"nope");
        assert!(read_object(&paths, &h).is_err());
    }
}
