//! Three-way merge (§4.I) between a common ancestor tree, "ours", and
//! "theirs", producing a merged tree or a conflict.

use crate::blob::EntryKind;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::store::Paths;
use crate::tree::{self, TreeEntry};
use std::collections::HashSet;
use std::path::PathBuf;

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn load_entries(paths: &Paths, hash_val: Option<&Hash>) -> Result<Vec<TreeEntry>> {
    match hash_val {
        Some(h) => tree::read(paths, h),
        None => Ok(Vec::new()),
    }
}

fn entry_equiv(a: Option<&TreeEntry>, b: Option<&TreeEntry>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x.hash == y.hash && x.kind == y.kind,
        _ => false,
    }
}

fn child_entries(paths: &Paths, entry: Option<&TreeEntry>) -> Result<Vec<TreeEntry>> {
    match entry {
        Some(e) if e.kind == EntryKind::Tree => tree::read(paths, &e.hash),
        _ => Ok(Vec::new()),
    }
}

fn merge_dir(paths: &Paths, base: &[TreeEntry], ours: &[TreeEntry], theirs: &[TreeEntry], prefix: &str) -> Result<Vec<TreeEntry>> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for entries in [base, ours, theirs] {
        for e in entries {
            if seen.insert(e.name.clone()) {
                names.push(e.name.clone());
            }
        }
    }

    let find = |entries: &[TreeEntry], name: &str| entries.iter().find(|e| e.name == name).cloned();

    let mut out = Vec::new();
    for name in names {
        let path = join(prefix, &name);
        let b = find(base, &name);
        let o = find(ours, &name);
        let t = find(theirs, &name);

        let changed_ours = !entry_equiv(b.as_ref(), o.as_ref());
        let changed_theirs = !entry_equiv(b.as_ref(), t.as_ref());

        match (changed_ours, changed_theirs) {
            (false, false) => {
                if let Some(b) = b {
                    out.push(b);
                }
            }
            (true, false) => {
                if let Some(o) = o {
                    out.push(o);
                }
            }
            (false, true) => {
                if let Some(t) = t {
                    out.push(t);
                }
            }
            (true, true) => {
                if entry_equiv(o.as_ref(), t.as_ref()) {
                    if let Some(o) = o {
                        out.push(o);
                    }
                    continue;
                }
                match (&o, &t) {
                    (Some(o), Some(t)) if o.kind == EntryKind::Tree && t.kind == EntryKind::Tree => {
                        let base_children = child_entries(paths, b.as_ref())?;
                        let our_children = child_entries(paths, Some(o))?;
                        let their_children = child_entries(paths, Some(t))?;
                        let merged_children = merge_dir(paths, &base_children, &our_children, &their_children, &path)?;
                        let child_hash = tree::write(paths, &merged_children)?;
                        out.push(TreeEntry {
                            mode: o.mode,
                            kind: EntryKind::Tree,
                            hash: child_hash,
                            entropy: 0.0,
                            author: o.author.clone(),
                            name: name.clone(),
                        });
                    }
                    _ => {
                        return Err(Error::MergeConflict { path: PathBuf::from(path) });
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Performs the three-way merge and writes the resulting tree, returning
/// its hash. `None` for any tree means "no tree" (e.g. first commit).
pub fn merge(paths: &Paths, base: Option<&Hash>, ours: Option<&Hash>, theirs: Option<&Hash>) -> Result<Hash> {
    if ours == theirs {
        return match ours {
            Some(h) => Ok(*h),
            None => tree::write(paths, &[]),
        };
    }
    if base == ours && base != theirs {
        return match theirs {
            Some(h) => Ok(*h),
            None => tree::write(paths, &[]),
        };
    }
    if base == theirs && base != ours {
        return match ours {
            Some(h) => Ok(*h),
            None => tree::write(paths, &[]),
        };
    }

    let base_entries = load_entries(paths, base)?;
    let our_entries = load_entries(paths, ours)?;
    let their_entries = load_entries(paths, theirs)?;
    let merged = merge_dir(paths, &base_entries, &our_entries, &their_entries, "")?;
    tree::write(paths, &merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::Ignore;
    use tempfile::tempdir;

    fn build(paths: &Paths, work: &std::path::Path) -> Hash {
        tree::build(paths, &Ignore::default(), &[], work, "", None).unwrap()
    }

    #[test]
    fn ours_equals_theirs_short_circuits() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("w");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("a.txt"), b"hi\n").unwrap();
        let h = build(&paths, &work);
        let merged = merge(&paths, Some(&h), Some(&h), Some(&h)).unwrap();
        assert_eq!(merged, h);
    }

    #[test]
    fn non_conflicting_changes_merge() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("w");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("a.txt"), b"base\n").unwrap();
        std::fs::write(work.join("b.txt"), b"base\n").unwrap();
        let base = build(&paths, &work);

        std::fs::write(work.join("a.txt"), b"ours changed a\n").unwrap();
        let ours = build(&paths, &work);

        std::fs::write(work.join("a.txt"), b"base\n").unwrap();
        std::fs::write(work.join("b.txt"), b"theirs changed b\n").unwrap();
        let theirs = build(&paths, &work);

        let merged_hash = merge(&paths, Some(&base), Some(&ours), Some(&theirs)).unwrap();
        let merged_entries = tree::read(&paths, &merged_hash).unwrap();
        let a = merged_entries.iter().find(|e| e.name == "a.txt").unwrap();
        let b = merged_entries.iter().find(|e| e.name == "b.txt").unwrap();

        let ours_entries = tree::read(&paths, &ours).unwrap();
        let theirs_entries = tree::read(&paths, &theirs).unwrap();
        assert_eq!(a.hash, ours_entries.iter().find(|e| e.name == "a.txt").unwrap().hash);
        assert_eq!(b.hash, theirs_entries.iter().find(|e| e.name == "b.txt").unwrap().hash);
    }

    #[test]
    fn conflicting_changes_abort_merge() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("w");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("a.txt"), b"base\n").unwrap();
        let base = build(&paths, &work);

        std::fs::write(work.join("a.txt"), b"ours\n").unwrap();
        let ours = build(&paths, &work);

        std::fs::write(work.join("a.txt"), b"theirs\n").unwrap();
        let theirs = build(&paths, &work);

        let result = merge(&paths, Some(&base), Some(&ours), Some(&theirs));
        assert!(matches!(result, Err(Error::MergeConflict { .. })));
    }
}
