//! Tree builder (§4.H): recursive working-tree walk producing
//! content-addressed tree objects in the canonical text format (§3).

use crate::blob::{self, EntryKind, PrevVersion};
use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::ignore::Ignore;
use crate::store::{self, Paths};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub const MODE_TREE: u32 = 0o040000;
pub const MODE_REGULAR_BASE: u32 = 0o100000;
pub const MODE_SYMLINK: u32 = 0o120000;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeEntry {
    pub mode: u32,
    pub kind: EntryKind,
    pub hash: Hash,
    pub entropy: f32,
    pub author: String,
    pub name: String,
}

/// One prior attribution event; later entries in the slice win ties on the
/// same path (§4.H "most recent event").
#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub path: String,
    pub author: String,
}

fn author_for(history: &[HistoryEvent], rel_path: &str) -> String {
    history
        .iter()
        .rev()
        .find(|e| e.path == rel_path)
        .map(|e| e.author.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn format_entry_line(entry: &TreeEntry) -> String {
    format!(
        "{:o} {} {} E:{:.4} U:{}\t{}\n",
        entry.mode,
        entry.kind.code(),
        hash::to_hex(&entry.hash),
        entry.entropy,
        entry.author,
        entry.name
    )
}

fn parse_entry_line(line: &str) -> Result<TreeEntry> {
    let corrupt = || Error::corrupt("<tree>", "malformed tree entry line");
    let (header, name) = line.split_once('\t').ok_or_else(corrupt)?;
    let mut fields = header.split(' ');
    let mode = u32::from_str_radix(fields.next().ok_or_else(corrupt)?, 8).map_err(|_| corrupt())?;
    let kind_str = fields.next().ok_or_else(corrupt)?;
    let kind = kind_str
        .chars()
        .next()
        .and_then(EntryKind::from_code)
        .ok_or_else(corrupt)?;
    let hash_hex = fields.next().ok_or_else(corrupt)?;
    let hash_val = hash::from_hex(hash_hex)?;
    let entropy_field = fields.next().ok_or_else(corrupt)?;
    let entropy: f32 = entropy_field
        .strip_prefix("E:")
        .ok_or_else(corrupt)?
        .parse()
        .map_err(|_| corrupt())?;
    let author_field = fields.next().ok_or_else(corrupt)?;
    let author = author_field.strip_prefix("U:").ok_or_else(corrupt)?.to_string();

    Ok(TreeEntry {
        mode,
        kind,
        hash: hash_val,
        entropy,
        author,
        name: name.to_string(),
    })
}

pub fn serialize(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = String::new();
    for e in entries {
        out.push_str(&format_entry_line(e));
    }
    out.into_bytes()
}

pub fn parse(bytes: &[u8]) -> Result<Vec<TreeEntry>> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::corrupt("<tree>", "tree listing is not UTF-8"))?;
    text.lines().filter(|l| !l.is_empty()).map(parse_entry_line).collect()
}

pub fn write(paths: &Paths, entries: &[TreeEntry]) -> Result<Hash> {
    let content = serialize(entries);
    let hash_val = hash::digest_bytes(&content);
    store::write_blob(paths, &hash_val, &content)?;
    Ok(hash_val)
}

pub fn read(paths: &Paths, hash_val: &Hash) -> Result<Vec<TreeEntry>> {
    let content = store::read_object(paths, hash_val)?;
    parse(&content)
}

fn find_prev<'a>(prev: Option<&'a [TreeEntry]>, name: &str) -> Option<&'a TreeEntry> {
    prev?.iter().find(|e| e.name == name)
}

/// Recursively walks `abs_dir` (working directory `rel_prefix` component),
/// consulting `prev_entries` (the same directory's prior tree, if any) for
/// delta bases and block linkage, and returns the resulting tree's hash.
pub fn build(paths: &Paths, ignore: &Ignore, history: &[HistoryEvent], abs_dir: &Path, rel_prefix: &str, prev_entries: Option<&[TreeEntry]>) -> Result<Hash> {
    let mut entries = Vec::new();
    let mut dir_entries: Vec<_> = std::fs::read_dir(abs_dir)?.collect::<std::io::Result<_>>()?;
    dir_entries.sort_by_key(|e| e.file_name());

    for dir_entry in dir_entries {
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        let rel_path = if rel_prefix.is_empty() {
            name.clone()
        } else {
            format!("{rel_prefix}/{name}")
        };
        if ignore.is_ignored(&rel_path) {
            continue;
        }

        let abs_child = abs_dir.join(&name);
        let meta = std::fs::symlink_metadata(&abs_child)?;
        let prev_entry = find_prev(prev_entries, &name);

        let entry = if meta.is_dir() {
            let child_prev: Option<Vec<TreeEntry>> = match prev_entry {
                Some(e) if e.kind == EntryKind::Tree => read(paths, &e.hash).ok(),
                _ => None,
            };
            let child_hash = build(paths, ignore, history, &abs_child, &rel_path, child_prev.as_deref())?;
            TreeEntry {
                mode: MODE_TREE,
                kind: EntryKind::Tree,
                hash: child_hash,
                entropy: 0.0,
                author: author_for(history, &rel_path),
                name,
            }
        } else {
            let perm_bits = meta.permissions().mode() & 0o777;
            let prev_version = prev_entry.map(|e| PrevVersion { kind: e.kind, hash: e.hash });
            let result = blob::ingest(paths, &abs_child, &rel_path, perm_bits, prev_version.as_ref())?;
            let mode = match result.kind {
                EntryKind::Symlink => MODE_SYMLINK,
                _ => MODE_REGULAR_BASE | perm_bits,
            };
            TreeEntry {
                mode,
                kind: result.kind,
                hash: result.hash,
                entropy: result.entropy,
                author: author_for(history, &rel_path),
                name,
            }
        };
        entries.push(entry);
    }

    write(paths, &entries)
}
