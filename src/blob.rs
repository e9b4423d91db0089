//! Blob ingestor (§4.G): per-file storage-form selection by size and by
//! the previous tree entry at the same path.

use crate::chunker::{self, DECONSTRUCT_THRESHOLD};
use crate::entropy;
use crate::error::Result;
use crate::hash::{self, Hash};
use crate::manifest::Manifest;
use crate::rolling;
use crate::store::{self, Paths};
use std::fs::File;
use std::path::Path;

/// Files at or under this size are read fully into memory for hashing and
/// delta candidacy; above it (and below `DECONSTRUCT_THRESHOLD`) they are
/// stream-hashed and written with no delta attempt (§4.G).
pub const IN_MEMORY_FILE_LIMIT: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Tree,
    Blob,
    Symlink,
    Manifest,
}

impl EntryKind {
    pub fn code(self) -> char {
        match self {
            EntryKind::Tree => 'T',
            EntryKind::Blob => 'B',
            EntryKind::Symlink => 'L',
            EntryKind::Manifest => 'M',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'T' => Some(EntryKind::Tree),
            'B' => Some(EntryKind::Blob),
            'L' => Some(EntryKind::Symlink),
            'M' => Some(EntryKind::Manifest),
            _ => None,
        }
    }
}

/// The prior tree entry at this same relative path, if any, used to pick a
/// delta base or a parent-manifest for block linkage.
pub struct PrevVersion {
    pub kind: EntryKind,
    pub hash: Hash,
}

pub struct IngestResult {
    pub kind: EntryKind,
    pub hash: Hash,
    pub entropy: f32,
}

/// Ingests one regular file or symlink at `abs_path` (stored under
/// `rel_path` when it must be recorded in a manifest).
pub fn ingest(paths: &Paths, abs_path: &Path, rel_path: &str, file_mode: u32, prev: Option<&PrevVersion>) -> Result<IngestResult> {
    let meta = std::fs::symlink_metadata(abs_path)?;

    if meta.file_type().is_symlink() {
        return ingest_symlink(paths, abs_path);
    }

    let size = meta.len();
    if size > DECONSTRUCT_THRESHOLD {
        return ingest_large(paths, abs_path, rel_path, file_mode, prev);
    }
    if size > IN_MEMORY_FILE_LIMIT {
        return ingest_streamed(paths, abs_path);
    }
    ingest_in_memory(paths, abs_path, prev)
}

fn ingest_symlink(paths: &Paths, abs_path: &Path) -> Result<IngestResult> {
    let target = std::fs::read_link(abs_path)?;
    let bytes = target.to_string_lossy().into_owned().into_bytes();
    let hash_val = hash::digest_bytes(&bytes);
    let entropy_val = entropy::entropy_of_bytes(&bytes) as f32;
    store::write_blob(paths, &hash_val, &bytes)?;
    Ok(IngestResult {
        kind: EntryKind::Symlink,
        hash: hash_val,
        entropy: entropy_val,
    })
}

fn ingest_large(paths: &Paths, abs_path: &Path, rel_path: &str, file_mode: u32, prev: Option<&PrevVersion>) -> Result<IngestResult> {
    let prev_manifest: Option<Manifest> = match prev {
        Some(PrevVersion {
            kind: EntryKind::Manifest,
            hash,
        }) => manifest::read_opt(paths, hash),
        _ => None,
    };
    let (entries, total_size, entropy_mean) = chunker::deconstruct(paths, abs_path, prev_manifest.as_ref())?;
    let m = Manifest::new(rel_path.to_string(), file_mode, total_size, entropy_mean, entries);
    let id = manifest::write(paths, &m)?;
    Ok(IngestResult {
        kind: EntryKind::Manifest,
        hash: id,
        entropy: entropy_mean,
    })
}

fn ingest_streamed(paths: &Paths, abs_path: &Path) -> Result<IngestResult> {
    let mut for_hash = File::open(abs_path)?;
    let hash_val = hash::digest_file(&mut for_hash)?;
    if store::object_exists(paths, &hash_val) {
        let mut for_entropy = File::open(abs_path)?;
        let entropy_val = entropy::entropy_of_file(&mut for_entropy)? as f32;
        return Ok(IngestResult {
            kind: EntryKind::Blob,
            hash: hash_val,
            entropy: entropy_val,
        });
    }
    store::write_blob_streaming(paths, &hash_val, abs_path)?;
    let mut for_entropy = File::open(abs_path)?;
    let entropy_val = entropy::entropy_of_file(&mut for_entropy)? as f32;
    Ok(IngestResult {
        kind: EntryKind::Blob,
        hash: hash_val,
        entropy: entropy_val,
    })
}

fn ingest_in_memory(paths: &Paths, abs_path: &Path, prev: Option<&PrevVersion>) -> Result<IngestResult> {
    let content = std::fs::read(abs_path)?;
    let hash_val = hash::digest_bytes(&content);
    let entropy_val = entropy::entropy_of_bytes(&content) as f32;

    if store::object_exists(paths, &hash_val) {
        return Ok(IngestResult {
            kind: EntryKind::Blob,
            hash: hash_val,
            entropy: entropy_val,
        });
    }

    if let Some(prev) = prev {
        if matches!(prev.kind, EntryKind::Blob | EntryKind::Symlink) {
            if let Ok(base_content) = store::read_object(paths, &prev.hash) {
                if let Some(script) = rolling::try_build_delta(&base_content, &content) {
                    store::write_delta(paths, &hash_val, &prev.hash, &script)?;
                    return Ok(IngestResult {
                        kind: EntryKind::Blob,
                        hash: hash_val,
                        entropy: entropy_val,
                    });
                }
            }
        }
    }

    store::write_blob(paths, &hash_val, &content)?;
    Ok(IngestResult {
        kind: EntryKind::Blob,
        hash: hash_val,
        entropy: entropy_val,
    })
}

mod manifest {
    use super::*;
    use crate::manifest::Manifest;

    /// Best-effort manifest read: a missing or corrupt parent manifest must
    /// never block ingestion of the new version, it just disables block
    /// linkage for this file.
    pub fn read_opt(paths: &Paths, hash: &Hash) -> Option<Manifest> {
        crate::manifest::read(paths, hash).ok()
    }

    pub fn write(paths: &Paths, m: &Manifest) -> Result<Hash> {
        crate::manifest::write(paths, m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn small_new_file_is_written_as_full_blob() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"hello\n").unwrap();

        let result = ingest(&paths, &file_path, "a.txt", 0o644, None).unwrap();
        assert_eq!(result.kind, EntryKind::Blob);
        assert!(store::object_exists(&paths, &result.hash));
    }

    #[test]
    fn small_edit_against_prior_blob_becomes_delta() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();

        let mut base = vec![0u8; 20_000];
        for (i, b) in base.iter_mut().enumerate() {
            *b = (i as u64).wrapping_mul(97) as u8;
        }
        let base_hash = hash::digest_bytes(&base);
        store::write_blob(&paths, &base_hash, &base).unwrap();

        let mut edited = base.clone();
        for b in edited.iter_mut().skip(10_000).take(40) {
            *b ^= 0xFF;
        }
        let file_path = dir.path().join("b.bin");
        std::fs::write(&file_path, &edited).unwrap();

        let prev = PrevVersion {
            kind: EntryKind::Blob,
            hash: base_hash,
        };
        let result = ingest(&paths, &file_path, "b.bin", 0o644, Some(&prev)).unwrap();
        assert_eq!(result.kind, EntryKind::Blob);
        let roundtrip = store::read_object(&paths, &result.hash).unwrap();
        assert_eq!(roundtrip, edited);
    }

    #[test]
    fn symlink_is_stored_as_target_blob() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let link_path = dir.path().join("link");
        std::os::unix::fs::symlink("target/path", &link_path).unwrap();

        let result = ingest(&paths, &link_path, "link", 0, None).unwrap();
        assert_eq!(result.kind, EntryKind::Symlink);
        let content = store::read_object(&paths, &result.hash).unwrap();
        assert_eq!(content, b"target/path");
    }
}
