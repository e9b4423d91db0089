//! Commit graph (§4.J): commit object format, creation for trunk and
//! subsection refs, tag-to-commit resolution, and parent-tree lookup.

use crate::error::{Error, Result};
use crate::hash::{self, Hash};
use crate::refs;
use crate::store::{self, Paths};

/// Hops past which tag resolution gives up rather than loop forever on a
/// malformed or cyclic chain (§8 invariant 5).
pub const MAX_CHAIN_DEPTH: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Trunk,
    Subsection,
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub kind: CommitKind,
    pub tree: Hash,
    pub parent: Option<Hash>,
    pub anchor: Option<Hash>,
    pub promoted: Option<Hash>,
    pub author_name: String,
    pub author_uid: u32,
    pub timestamp: i64,
    pub message: String,
}

fn format_person_line(tag: &str, name: &str, uid: u32, timestamp: i64) -> String {
    format!("{tag} {name} {uid}@exodus {timestamp} +0000\n")
}

impl Commit {
    pub fn format(&self) -> Vec<u8> {
        let mut s = String::new();
        s.push_str(match self.kind {
            CommitKind::Trunk => "type: T-COMMIT\n",
            CommitKind::Subsection => "type: S-COMMIT\n",
        });
        s.push_str(&format!("tree {}\n", hash::to_hex(&self.tree)));
        if let Some(p) = &self.parent {
            s.push_str(&format!("parent {}\n", hash::to_hex(p)));
        }
        if let Some(a) = &self.anchor {
            s.push_str(&format!("anchor {}\n", hash::to_hex(a)));
        }
        if let Some(p) = &self.promoted {
            s.push_str(&format!("promoted {}\n", hash::to_hex(p)));
        }
        s.push_str(&format_person_line("author", &self.author_name, self.author_uid, self.timestamp));
        s.push_str(&format_person_line("committer", &self.author_name, self.author_uid, self.timestamp));
        s.push('\n');
        s.push_str(&self.message);
        s.into_bytes()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let corrupt = || Error::corrupt("<commit>", "malformed commit object");
        let text = std::str::from_utf8(bytes).map_err(|_| corrupt())?;
        let (header, message) = text.split_once("\n\n").ok_or_else(corrupt)?;

        let mut kind = None;
        let mut tree = None;
        let mut parent = None;
        let mut anchor = None;
        let mut promoted = None;
        let mut author_name = None;
        let mut author_uid = None;
        let mut timestamp = None;

        for line in header.lines() {
            let mut parts = line.split(' ');
            let key = parts.next().ok_or_else(corrupt)?;
            match key {
                "type:" => {
                    kind = Some(match parts.next().ok_or_else(corrupt)? {
                        "T-COMMIT" => CommitKind::Trunk,
                        "S-COMMIT" => CommitKind::Subsection,
                        _ => return Err(corrupt()),
                    });
                }
                "tree" => tree = Some(hash::from_hex(parts.next().ok_or_else(corrupt)?)?),
                "parent" => parent = Some(hash::from_hex(parts.next().ok_or_else(corrupt)?)?),
                "anchor" => anchor = Some(hash::from_hex(parts.next().ok_or_else(corrupt)?)?),
                "promoted" => promoted = Some(hash::from_hex(parts.next().ok_or_else(corrupt)?)?),
                "author" | "committer" => {
                    let name = parts.next().ok_or_else(corrupt)?;
                    let uid_at = parts.next().ok_or_else(corrupt)?;
                    let ts = parts.next().ok_or_else(corrupt)?;
                    if key == "author" {
                        author_name = Some(name.to_string());
                        author_uid = Some(
                            uid_at
                                .strip_suffix("@exodus")
                                .and_then(|u| u.parse::<u32>().ok())
                                .ok_or_else(corrupt)?,
                        );
                        timestamp = Some(ts.parse::<i64>().map_err(|_| corrupt())?);
                    }
                }
                _ => return Err(corrupt()),
            }
        }

        Ok(Commit {
            kind: kind.ok_or_else(corrupt)?,
            tree: tree.ok_or_else(corrupt)?,
            parent,
            anchor,
            promoted,
            author_name: author_name.ok_or_else(corrupt)?,
            author_uid: author_uid.ok_or_else(corrupt)?,
            timestamp: timestamp.ok_or_else(corrupt)?,
            message: message.to_string(),
        })
    }
}

pub fn write_object(paths: &Paths, commit: &Commit) -> Result<Hash> {
    let bytes = commit.format();
    let id = hash::digest_bytes(&bytes);
    store::write_blob(paths, &id, &bytes)?;
    Ok(id)
}

pub fn read_object(paths: &Paths, id: &Hash) -> Result<Commit> {
    let bytes = store::read_object(paths, id)?;
    Commit::parse(&bytes)
}

/// Creates a new commit on `active` (`"master"` for trunk, else a
/// subsection name), updates its HEAD file and versions index (§4.J,
/// §4.K "Versions index").
#[allow(clippy::too_many_arguments)]
pub fn create(paths: &Paths, active: &str, tree: Hash, message: &str, author_name: &str, author_uid: u32, timestamp: i64) -> Result<Hash> {
    let id = if active == "master" {
        let parent = refs::read_active_head(paths, active)?;
        let commit = Commit {
            kind: CommitKind::Trunk,
            tree,
            parent,
            anchor: None,
            promoted: None,
            author_name: author_name.to_string(),
            author_uid,
            timestamp,
            message: message.to_string(),
        };
        write_object(paths, &commit)?
    } else {
        let head_ref = refs::read_active_head(paths, active)?
            .ok_or_else(|| Error::MissingReference(format!("subsection '{active}' has no head")))?;
        let prior = read_object(paths, &head_ref)?;
        let (anchor, parent) = match prior.kind {
            CommitKind::Trunk => (head_ref, None),
            CommitKind::Subsection => (
                prior.anchor.ok_or_else(|| Error::corrupt(hash::to_hex(&head_ref), "S-commit missing anchor"))?,
                Some(head_ref),
            ),
        };
        let commit = Commit {
            kind: CommitKind::Subsection,
            tree,
            parent,
            anchor: Some(anchor),
            promoted: None,
            author_name: author_name.to_string(),
            author_uid,
            timestamp,
            message: message.to_string(),
        };
        write_object(paths, &commit)?
    };

    refs::write_active_head(paths, active, &id)?;
    refs::regenerate_versions_index(paths, active)?;
    Ok(id)
}

/// Walks `active`'s chain looking for a commit whose message equals `tag`;
/// `LATEST_HEAD` resolves to the head directly without walking (§4.J).
pub fn resolve_tag(paths: &Paths, active: &str, tag: &str) -> Result<Hash> {
    let head = refs::read_active_head(paths, active)?
        .ok_or_else(|| Error::MissingReference(format!("'{active}' has no commits")))?;
    if tag == "LATEST_HEAD" {
        return Ok(head);
    }

    let mut cursor = head;
    for _ in 0..MAX_CHAIN_DEPTH {
        let commit = read_object(paths, &cursor)?;
        if commit.message == tag {
            return Ok(cursor);
        }
        match commit.parent {
            Some(p) => cursor = p,
            None => return Err(Error::MissingReference(format!("tag '{tag}' not found on '{active}'"))),
        }
    }
    Err(Error::MalformedInput(format!("tag lookup on '{active}' exceeded depth cap")))
}

/// The tree to diff new files against while building the next commit:
/// the active head's tree, or `None` before the first commit (§4.J
/// "Parent-data resolution").
pub fn parent_tree(paths: &Paths, active: &str) -> Result<Option<Hash>> {
    match refs::read_active_head(paths, active)? {
        Some(head) => Ok(Some(read_object(paths, &head)?.tree)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_text_round_trips() {
        let commit = Commit {
            kind: CommitKind::Subsection,
            tree: hash::digest_bytes(b"tree"),
            parent: Some(hash::digest_bytes(b"parent")),
            anchor: Some(hash::digest_bytes(b"anchor")),
            promoted: None,
            author_name: "alice".to_string(),
            author_uid: 1000,
            timestamp: 1_700_000_000,
            message: "v1.0.0".to_string(),
        };
        let bytes = commit.format();
        let back = Commit::parse(&bytes).unwrap();
        assert_eq!(back.kind, commit.kind);
        assert_eq!(back.tree, commit.tree);
        assert_eq!(back.parent, commit.parent);
        assert_eq!(back.anchor, commit.anchor);
        assert_eq!(back.author_name, commit.author_name);
        assert_eq!(back.author_uid, commit.author_uid);
        assert_eq!(back.timestamp, commit.timestamp);
        assert_eq!(back.message, commit.message);
    }

    #[test]
    fn trunk_commits_chain_and_resolve_by_tag() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();

        let tree1 = hash::digest_bytes(b"tree1");
        let first = create(&paths, "master", tree1, "initial", "alice", 1000, 1_700_000_000).unwrap();

        let tree2 = hash::digest_bytes(b"tree2");
        let second = create(&paths, "master", tree2, "second commit", "alice", 1000, 1_700_000_100).unwrap();

        let resolved = resolve_tag(&paths, "master", "initial").unwrap();
        assert_eq!(resolved, first);
        let resolved_second = resolve_tag(&paths, "master", "second commit").unwrap();
        assert_eq!(resolved_second, second);
        let latest = resolve_tag(&paths, "master", "LATEST_HEAD").unwrap();
        assert_eq!(latest, second);

        let second_commit = read_object(&paths, &second).unwrap();
        assert_eq!(second_commit.parent, Some(first));
        assert_eq!(second_commit.anchor, None);
    }

    #[test]
    fn missing_tag_is_reported() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        let tree1 = hash::digest_bytes(b"tree1");
        create(&paths, "master", tree1, "initial", "alice", 1000, 1_700_000_000).unwrap();
        assert!(resolve_tag(&paths, "master", "nonexistent").is_err());
    }
}
