//! Reference manager (§4.K): trunk/subsection HEAD files, subsection
//! creation, versions index emission, and promotion.

use crate::commit::{self, Commit, CommitKind};
use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::merge;
use crate::store::Paths;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

fn active_head_path(paths: &Paths, active: &str) -> PathBuf {
    if active == "master" {
        paths.trunk_head.clone()
    } else {
        paths.subsection_file(active)
    }
}

fn versions_path(paths: &Paths, active: &str) -> PathBuf {
    if active == "master" {
        paths.trunk_versions_file()
    } else {
        paths.subsection_versions_file(active)
    }
}

/// Reads `active`'s HEAD file; an absent or empty file means "no commits
/// yet" (§4.K).
pub fn read_active_head(paths: &Paths, active: &str) -> Result<Option<Hash>> {
    let path = active_head_path(paths, active);
    match fs::read_to_string(&path) {
        Ok(content) if !content.trim().is_empty() => Ok(Some(hash::from_hex(content.trim())?)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_active_head(paths: &Paths, active: &str, id: &Hash) -> Result<()> {
    let path = active_head_path(paths, active);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{}\n", hash::to_hex(id)))?;
    Ok(())
}

/// Creates a subsection anchored on the current trunk head (§4.K "Create
/// subsection"). Rejects the reserved name `master`, an empty trunk, and a
/// name that already exists.
pub fn create_subsection(paths: &Paths, name: &str) -> Result<()> {
    if name == "master" {
        return Err(Error::MalformedInput("subsection name 'master' is reserved".to_string()));
    }
    let trunk_head = read_active_head(paths, "master")?
        .ok_or_else(|| Error::MissingReference("trunk has no commits to anchor a subsection on".to_string()))?;
    let path = paths.subsection_file(name);
    if path.exists() {
        return Err(Error::MalformedInput(format!("subsection '{name}' already exists")));
    }
    fs::create_dir_all(&paths.subsections_dir)?;
    fs::write(path, format!("{}\n", hash::to_hex(&trunk_head)))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct VersionEntry {
    commit: String,
    #[serde(rename = "type")]
    kind: &'static str,
    tree: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    promoted: Option<String>,
    author: String,
    timestamp: i64,
    tag: String,
}

fn to_entry(id: &Hash, commit: &Commit) -> VersionEntry {
    VersionEntry {
        commit: hash::to_hex(id),
        kind: match commit.kind {
            CommitKind::Trunk => "T-COMMIT",
            CommitKind::Subsection => "S-COMMIT",
        },
        tree: hash::to_hex(&commit.tree),
        parent: commit.parent.as_ref().map(hash::to_hex),
        anchor: commit.anchor.as_ref().map(hash::to_hex),
        promoted: commit.promoted.as_ref().map(hash::to_hex),
        author: commit.author_name.clone(),
        timestamp: commit.timestamp,
        tag: commit.message.clone(),
    }
}

/// Walks `active`'s chain to root and (re)writes its versions index, newest
/// to oldest (§4.K "Versions index"). Consumers read this file; the engine
/// itself never does.
pub fn regenerate_versions_index(paths: &Paths, active: &str) -> Result<()> {
    let mut entries = Vec::new();
    let mut cursor = read_active_head(paths, active)?;
    for _ in 0..commit::MAX_CHAIN_DEPTH {
        let Some(id) = cursor else { break };
        let c = commit::read_object(paths, &id)?;
        cursor = c.parent;
        entries.push(to_entry(&id, &c));
    }
    let json = serde_json::to_vec_pretty(&entries).map_err(|e| Error::MalformedInput(format!("failed to serialize versions index: {e}")))?;
    let path = versions_path(paths, active);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}

/// Promotes a subsection into trunk via three-way merge, then records the
/// result as a new T-commit (§4.K "Promotion").
pub fn promote(paths: &Paths, sub_name: &str, message: &str, author_name: &str, author_uid: u32, timestamp: i64, delete: bool) -> Result<Hash> {
    let ours = read_active_head(paths, "master")?;
    let theirs = read_active_head(paths, sub_name)?
        .ok_or_else(|| Error::MissingReference(format!("subsection '{sub_name}' has no commits")))?;

    let theirs_commit = commit::read_object(paths, &theirs)?;
    let anchor_id = match theirs_commit.kind {
        CommitKind::Subsection => theirs_commit
            .anchor
            .ok_or_else(|| Error::corrupt(hash::to_hex(&theirs), "S-commit missing anchor"))?,
        CommitKind::Trunk => theirs,
    };
    let anchor_commit = commit::read_object(paths, &anchor_id)?;
    let base_tree = anchor_commit.tree;
    let theirs_tree = theirs_commit.tree;

    let ours_tree = match ours {
        Some(h) => Some(commit::read_object(paths, &h)?.tree),
        None => None,
    };

    let merged_tree = merge::merge(paths, Some(&base_tree), ours_tree.as_ref(), Some(&theirs_tree))?;

    let promoted_commit = Commit {
        kind: CommitKind::Trunk,
        tree: merged_tree,
        parent: ours,
        anchor: None,
        promoted: Some(theirs),
        author_name: author_name.to_string(),
        author_uid,
        timestamp,
        message: format!("Promoted subsection '{sub_name}': {message}"),
    };
    let new_head = commit::write_object(paths, &promoted_commit)?;
    write_active_head(paths, "master", &new_head)?;
    regenerate_versions_index(paths, "master")?;

    if delete {
        let _ = fs::remove_file(paths.subsection_file(sub_name));
        let _ = fs::remove_file(paths.subsection_versions_file(sub_name));
    }

    Ok(new_head)
}
