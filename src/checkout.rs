//! Checkout and rebuild (§4.L): single-file materialization and
//! working-tree reconciliation between two commits.

use crate::blob::EntryKind;
use crate::commit;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::manifest;
use crate::refs;
use crate::store::{self, Paths};
use crate::tree::{self, TreeEntry};
use std::collections::HashSet;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn unpack_entry(paths: &Paths, entry: &TreeEntry, abs_path: &Path) -> Result<()> {
    if let Some(parent) = abs_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match entry.kind {
        EntryKind::Blob => {
            let content = store::read_object(paths, &entry.hash)?;
            std::fs::write(abs_path, &content)?;
            let mut perms = std::fs::metadata(abs_path)?.permissions();
            perms.set_mode(entry.mode & 0o777);
            std::fs::set_permissions(abs_path, perms)?;
        }
        EntryKind::Symlink => {
            let target = store::read_object(paths, &entry.hash)?;
            let target_str = String::from_utf8(target).map_err(|_| Error::corrupt(hash_hex(&entry.hash), "symlink target is not UTF-8"))?;
            if abs_path.symlink_metadata().is_ok() {
                std::fs::remove_file(abs_path)?;
            }
            std::os::unix::fs::symlink(target_str, abs_path)?;
        }
        EntryKind::Manifest => {
            let m = manifest::read(paths, &entry.hash)?;
            manifest::reconstruct(paths, &m, abs_path)?;
        }
        EntryKind::Tree => unreachable!("unpack_entry is only called for file-like entries"),
    }
    Ok(())
}

fn hash_hex(h: &Hash) -> String {
    crate::hash::to_hex(h)
}

/// Resolves `tag` on `active`, walks the resulting tree by `rel_path`'s
/// components, and writes the found entry to `out_path` (§4.L "Checkout
/// one file").
pub fn checkout_file(paths: &Paths, active: &str, tag: &str, rel_path: &str, out_path: &Path) -> Result<()> {
    let commit_id = commit::resolve_tag(paths, active, tag)?;
    let commit_obj = commit::read_object(paths, &commit_id)?;
    let components: Vec<&str> = rel_path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return Err(Error::Path(format!("empty checkout path: {rel_path:?}")));
    }

    let mut entries = tree::read(paths, &commit_obj.tree)?;
    for (i, component) in components.iter().enumerate() {
        let is_last = i == components.len() - 1;
        let entry = entries
            .iter()
            .find(|e| e.name == *component)
            .ok_or_else(|| Error::Path(format!("no such path in tree: {rel_path}")))?;
        if is_last {
            return unpack_entry(paths, entry, out_path);
        }
        if entry.kind != EntryKind::Tree {
            return Err(Error::Path(format!("{rel_path} crosses a non-directory entry")));
        }
        entries = tree::read(paths, &entry.hash)?;
    }
    unreachable!()
}

fn name_union(a: &[TreeEntry], b: &[TreeEntry]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for e in a.iter().chain(b.iter()) {
        if seen.insert(e.name.clone()) {
            names.push(e.name.clone());
        }
    }
    names
}

fn delete_recursive(paths: &Paths, entry: &TreeEntry, abs_path: &Path) {
    if entry.kind == EntryKind::Tree {
        match tree::read(paths, &entry.hash) {
            Ok(children) => {
                for child in &children {
                    delete_recursive(paths, child, &abs_path.join(&child.name));
                }
            }
            Err(e) => log::warn!("rebuild: failed to read tree {} for deletion: {e}", hash_hex(&entry.hash)),
        }
        if let Err(e) = std::fs::remove_dir(abs_path) {
            log::warn!("rebuild: rmdir {} failed: {e}", abs_path.display());
        }
    } else if let Err(e) = std::fs::remove_file(abs_path) {
        log::warn!("rebuild: unlink {} failed: {e}", abs_path.display());
    }
}

fn create_recursive(paths: &Paths, entry: &TreeEntry, abs_path: &Path) -> Result<()> {
    if entry.kind == EntryKind::Tree {
        std::fs::create_dir_all(abs_path)?;
        let children = tree::read(paths, &entry.hash)?;
        for child in &children {
            create_recursive(paths, child, &abs_path.join(&child.name))?;
        }
        Ok(())
    } else {
        unpack_entry(paths, entry, abs_path)
    }
}

fn apply_dir(paths: &Paths, old: &[TreeEntry], new: &[TreeEntry], abs_dir: &Path) -> Result<()> {
    for name in name_union(old, new) {
        let o = old.iter().find(|e| e.name == name);
        let n = new.iter().find(|e| e.name == name);
        let abs_child = abs_dir.join(&name);

        match (o, n) {
            (Some(o), None) => delete_recursive(paths, o, &abs_child),
            (None, Some(n)) => create_recursive(paths, n, &abs_child)?,
            (Some(o), Some(n)) => {
                if o.hash == n.hash && o.kind == n.kind {
                    continue;
                }
                if o.kind == EntryKind::Tree && n.kind == EntryKind::Tree {
                    let old_children = tree::read(paths, &o.hash)?;
                    let new_children = tree::read(paths, &n.hash)?;
                    std::fs::create_dir_all(&abs_child)?;
                    apply_dir(paths, &old_children, &new_children, &abs_child)?;
                } else if o.kind != n.kind {
                    delete_recursive(paths, o, &abs_child);
                    create_recursive(paths, n, &abs_child)?;
                } else {
                    unpack_entry(paths, n, &abs_child)?;
                }
            }
            (None, None) => unreachable!(),
        }
    }
    Ok(())
}

/// Switches `work_dir` from `source_commit`'s tree to `target_tag`'s tree
/// on `active`, then updates the active HEAD (§4.L "Rebuild").
pub fn rebuild(paths: &Paths, active: &str, source_commit: &Hash, target_tag: &str, work_dir: &Path) -> Result<()> {
    let source_tree = commit::read_object(paths, source_commit)?.tree;
    let target_id = commit::resolve_tag(paths, active, target_tag)?;
    let target_tree = commit::read_object(paths, &target_id)?.tree;

    if source_tree != target_tree {
        let old_entries = tree::read(paths, &source_tree)?;
        let new_entries = tree::read(paths, &target_tree)?;
        apply_dir(paths, &old_entries, &new_entries, work_dir)?;
    }

    refs::write_active_head(paths, active, &target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::Ignore;
    use tempfile::tempdir;

    #[test]
    fn checkout_single_file_restores_content() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("w");
        std::fs::create_dir_all(work.join("sub")).unwrap();
        std::fs::write(work.join("sub").join("a.txt"), b"hello\n").unwrap();

        let tree_hash = tree::build(&paths, &Ignore::default(), &[], &work, "", None).unwrap();
        let commit_id = commit::create(&paths, "master", tree_hash, "v1", "alice", 1000, 1).unwrap();
        let _ = commit_id;

        let out = dir.path().join("out.txt");
        checkout_file(&paths, "master", "v1", "sub/a.txt", &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"hello\n");
    }

    #[test]
    fn rebuild_applies_add_modify_delete() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let work = dir.path().join("w");
        std::fs::create_dir_all(&work).unwrap();
        std::fs::write(work.join("keep.txt"), b"keep\n").unwrap();
        std::fs::write(work.join("gone.txt"), b"bye\n").unwrap();

        let ignore = Ignore::default();
        let tree1 = tree::build(&paths, &ignore, &[], &work, "", None).unwrap();
        let c1 = commit::create(&paths, "master", tree1, "v1", "alice", 1000, 1).unwrap();

        std::fs::remove_file(work.join("gone.txt")).unwrap();
        std::fs::write(work.join("keep.txt"), b"keep v2\n").unwrap();
        std::fs::write(work.join("new.txt"), b"new\n").unwrap();
        let prev_entries = tree::read(&paths, &tree1).unwrap();
        let tree2 = tree::build(&paths, &ignore, &[], &work, "", Some(&prev_entries)).unwrap();
        commit::create(&paths, "master", tree2, "v2", "alice", 1000, 2).unwrap();

        // simulate a working tree still at v1's layout, rebuild forward to v2
        std::fs::write(work.join("gone.txt"), b"bye\n").unwrap();
        std::fs::write(work.join("keep.txt"), b"keep\n").unwrap();
        std::fs::remove_file(work.join("new.txt")).unwrap();

        rebuild(&paths, "master", &c1, "v2", &work).unwrap();

        assert!(!work.join("gone.txt").exists());
        assert_eq!(std::fs::read(work.join("keep.txt")).unwrap(), b"keep v2\n");
        assert_eq!(std::fs::read(work.join("new.txt")).unwrap(), b"new\n");
        assert_eq!(refs::read_active_head(&paths, "master").unwrap(), Some(commit::resolve_tag(&paths, "master", "v2").unwrap()));
    }
}
