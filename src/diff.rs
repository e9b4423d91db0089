//! Pairwise tree diff (§4.I): structural diff between two tree hashes, with
//! a line-oriented LCS diff for file-like content changes.

use crate::blob::EntryKind;
use crate::error::Result;
use crate::hash::Hash;
use crate::manifest;
use crate::store::{self, Paths};
use crate::tree::{self, TreeEntry};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum LineOp {
    Equal(String),
    Insert(String),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentChange {
    Binary,
    Lines(Vec<LineOp>),
}

#[derive(Debug, Clone)]
pub enum Change {
    Added { kind: EntryKind, hash: Hash, entropy: f32 },
    Deleted { kind: EntryKind, hash: Hash, entropy: f32 },
    TypeChanged { old_kind: EntryKind, new_kind: EntryKind },
    Content(ContentChange),
}

#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub path: String,
    pub change: Change,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn load(paths: &Paths, hash_val: Option<&Hash>) -> Result<Option<Vec<TreeEntry>>> {
    match hash_val {
        Some(h) => Ok(Some(tree::read(paths, h)?)),
        None => Ok(None),
    }
}

fn read_content(paths: &Paths, entry: &TreeEntry) -> Result<Vec<u8>> {
    match entry.kind {
        EntryKind::Manifest => {
            let m = manifest::read(paths, &entry.hash)?;
            manifest::reconstruct_bytes(paths, &m)
        }
        _ => store::read_object(paths, &entry.hash),
    }
}

fn is_binary(data: &[u8]) -> bool {
    data.iter().take(4096).any(|&b| b == 0)
}

fn split_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data).lines().map(str::to_string).collect()
}

/// Classic O(n*m) LCS line diff.
pub fn lcs_diff(a: &[String], b: &[String]) -> Vec<LineOp> {
    let n = a.len();
    let m = b.len();
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            ops.push(LineOp::Equal(a[i].clone()));
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            ops.push(LineOp::Delete(a[i].clone()));
            i += 1;
        } else {
            ops.push(LineOp::Insert(b[j].clone()));
            j += 1;
        }
    }
    while i < n {
        ops.push(LineOp::Delete(a[i].clone()));
        i += 1;
    }
    while j < m {
        ops.push(LineOp::Insert(b[j].clone()));
        j += 1;
    }
    ops
}

fn diff_dir(paths: &Paths, left: Option<&[TreeEntry]>, right: Option<&[TreeEntry]>, prefix: &str, out: &mut Vec<DiffEntry>) -> Result<()> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for entries in [left, right].into_iter().flatten() {
        for e in entries {
            if seen.insert(e.name.clone()) {
                names.push(e.name.clone());
            }
        }
    }

    for name in names {
        let path = join(prefix, &name);
        let l = left.and_then(|es| es.iter().find(|e| e.name == name));
        let r = right.and_then(|es| es.iter().find(|e| e.name == name));

        match (l, r) {
            (Some(l), None) => out.push(DiffEntry {
                path,
                change: Change::Deleted {
                    kind: l.kind,
                    hash: l.hash,
                    entropy: l.entropy,
                },
            }),
            (None, Some(r)) => out.push(DiffEntry {
                path,
                change: Change::Added {
                    kind: r.kind,
                    hash: r.hash,
                    entropy: r.entropy,
                },
            }),
            (Some(l), Some(r)) => {
                if l.hash == r.hash && l.kind == r.kind {
                    continue;
                }
                let l_is_tree = l.kind == EntryKind::Tree;
                let r_is_tree = r.kind == EntryKind::Tree;
                if l_is_tree && r_is_tree {
                    let l_entries = tree::read(paths, &l.hash)?;
                    let r_entries = tree::read(paths, &r.hash)?;
                    diff_dir(paths, Some(&l_entries), Some(&r_entries), &path, out)?;
                } else if l_is_tree != r_is_tree {
                    out.push(DiffEntry {
                        path,
                        change: Change::TypeChanged {
                            old_kind: l.kind,
                            new_kind: r.kind,
                        },
                    });
                } else {
                    let l_content = read_content(paths, l)?;
                    let r_content = read_content(paths, r)?;
                    let change = if is_binary(&l_content) || is_binary(&r_content) {
                        ContentChange::Binary
                    } else {
                        ContentChange::Lines(lcs_diff(&split_lines(&l_content), &split_lines(&r_content)))
                    };
                    out.push(DiffEntry {
                        path,
                        change: Change::Content(change),
                    });
                }
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(())
}

/// Diffs two trees (either side may be absent, i.e. `None` meaning "no
/// tree"), returning entries in tree-walk order.
pub fn diff(paths: &Paths, left: Option<&Hash>, right: Option<&Hash>) -> Result<Vec<DiffEntry>> {
    let left_entries = load(paths, left)?;
    let right_entries = load(paths, right)?;
    let mut out = Vec::new();
    diff_dir(paths, left_entries.as_deref(), right_entries.as_deref(), "", &mut out)?;
    Ok(out)
}

const C_GREEN: &str = "\x1b[32m";
const C_RED: &str = "\x1b[31m";
const C_CYAN: &str = "\x1b[36m";
const C_YELLOW: &str = "\x1b[33m";
const C_RESET: &str = "\x1b[0m";

/// Renders `entries` the way the original tool's terminal `diff` verb did,
/// colored by change kind. Core diffing itself stays plain; only the CLI
/// front-end calls this.
pub fn render_colored(entries: &[DiffEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match &entry.change {
            Change::Added { .. } => out.push_str(&format!("{C_GREEN}+ {}{C_RESET}\n", entry.path)),
            Change::Deleted { .. } => out.push_str(&format!("{C_RED}- {}{C_RESET}\n", entry.path)),
            Change::TypeChanged { old_kind, new_kind } => {
                out.push_str(&format!("{C_YELLOW}~ {} ({} -> {}){C_RESET}\n", entry.path, old_kind.code(), new_kind.code()));
            }
            Change::Content(ContentChange::Binary) => {
                out.push_str(&format!("{C_CYAN}~ {} (binary files differ){C_RESET}\n", entry.path));
            }
            Change::Content(ContentChange::Lines(ops)) => {
                out.push_str(&format!("{C_CYAN}~ {}{C_RESET}\n", entry.path));
                for op in ops {
                    match op {
                        LineOp::Equal(line) => out.push_str(&format!("  {line}\n")),
                        LineOp::Insert(line) => out.push_str(&format!("{C_GREEN}+ {line}{C_RESET}\n")),
                        LineOp::Delete(line) => out.push_str(&format!("{C_RED}- {line}{C_RESET}\n")),
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Paths;
    use tempfile::tempdir;

    #[test]
    fn lcs_diff_detects_single_line_change() {
        let a = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let b = vec!["one".to_string(), "TWO".to_string(), "three".to_string()];
        let ops = lcs_diff(&a, &b);
        assert_eq!(
            ops,
            vec![
                LineOp::Equal("one".to_string()),
                LineOp::Delete("two".to_string()),
                LineOp::Insert("TWO".to_string()),
                LineOp::Equal("three".to_string()),
            ]
        );
    }

    #[test]
    fn identical_trees_produce_no_entries() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("a.txt"), b"same\n").unwrap();
        let ignore = crate::ignore::Ignore::default();
        let h = tree::build(&paths, &ignore, &[], &work, "", None).unwrap();
        let entries = diff(&paths, Some(&h), Some(&h)).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn added_and_modified_files_are_reported() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("a.txt"), b"hello\n").unwrap();
        let ignore = crate::ignore::Ignore::default();
        let h1 = tree::build(&paths, &ignore, &[], &work, "", None).unwrap();

        std::fs::write(work.join("a.txt"), b"hello world\n").unwrap();
        std::fs::write(work.join("b.txt"), b"new file\n").unwrap();
        let prev_entries = tree::read(&paths, &h1).unwrap();
        let h2 = tree::build(&paths, &ignore, &[], &work, "", Some(&prev_entries)).unwrap();

        let entries = diff(&paths, Some(&h1), Some(&h2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.path == "b.txt" && matches!(e.change, Change::Added { .. })));
        assert!(entries.iter().any(|e| e.path == "a.txt" && matches!(e.change, Change::Content(_))));
    }
}
