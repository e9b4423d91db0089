//! Dispatcher (§4.N): a typed command envelope in, a result (and whatever
//! a verb needs to print) out. Never parses argv itself — `cli/` builds
//! the envelope from clap and hands it here.

use crate::checkout;
use crate::commit;
use crate::diff::{self, DiffEntry};
use crate::error::Result;
use crate::hash::{self, Hash};
use crate::identity::{self, Identity};
use crate::ignore::Ignore;
use crate::refs;
use crate::store::Paths;
use crate::tree;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Verb {
    Commit { tag: String },
    Rebuild { target_tag: String, source_commit: String },
    Checkout { tag: String, file_path: String },
    Diff { tag1: String, tag2: String },
    Log,
    AddSubs { new_name: String },
    Promote { message: String, delete: bool },
}

/// Everything the dispatcher needs: node name (logging only), absolute
/// node path, active subsection name, and the per-verb arguments (§4.N).
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub node_name: String,
    pub node_path: PathBuf,
    pub active: String,
    pub verb: Verb,
}

#[derive(Debug, Clone)]
pub enum Output {
    None,
    CommitCreated(Hash),
    Log(Vec<String>),
    Diff(Vec<DiffEntry>),
}

fn log_lines(paths: &Paths, active: &str) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let mut cursor = refs::read_active_head(paths, active)?;
    for _ in 0..commit::MAX_CHAIN_DEPTH {
        let Some(id) = cursor else { break };
        let c = commit::read_object(paths, &id)?;
        let first_line = c.message.lines().next().unwrap_or("");
        lines.push(format!("{} {} {} {}", &hash::to_hex(&id)[..12], c.author_name, c.timestamp, first_line));
        cursor = c.parent;
    }
    Ok(lines)
}

/// Runs one verb against `env.node_path`, logging milestones and returning
/// whatever the caller needs to present (log lines, diff entries, ...).
pub fn run(env: &CommandEnvelope) -> Result<Output> {
    let paths = Paths::for_node(&env.node_path);
    let ignore = Ignore::load(&paths.retain_file)?;
    let identity: Identity = identity::resolve();
    let timestamp = chrono::Utc::now().timestamp();

    log::info!("[{}] dispatching {:?} on '{}'", env.node_name, env.verb, env.active);

    match &env.verb {
        Verb::Commit { tag } => {
            let prev_tree = commit::parent_tree(&paths, &env.active)?;
            let prev_entries = match prev_tree {
                Some(h) => Some(tree::read(&paths, &h)?),
                None => None,
            };
            let new_tree = tree::build(&paths, &ignore, &[], &env.node_path, "", prev_entries.as_deref())?;
            let id = commit::create(&paths, &env.active, new_tree, tag, &identity.name, identity.uid, timestamp)?;
            log::info!("[{}] committed {} on '{}'", env.node_name, hash::to_hex(&id), env.active);
            Ok(Output::CommitCreated(id))
        }
        Verb::Rebuild { target_tag, source_commit } => {
            let source = hash::from_hex(source_commit)?;
            checkout::rebuild(&paths, &env.active, &source, target_tag, &env.node_path)?;
            log::info!("[{}] rebuilt '{}' to tag '{}'", env.node_name, env.active, target_tag);
            Ok(Output::None)
        }
        Verb::Checkout { tag, file_path } => {
            let out = env.node_path.join(file_path);
            checkout::checkout_file(&paths, &env.active, tag, file_path, &out)?;
            Ok(Output::None)
        }
        Verb::Diff { tag1, tag2 } => {
            let left = commit::resolve_tag(&paths, &env.active, tag1)?;
            let right = commit::resolve_tag(&paths, &env.active, tag2)?;
            let left_tree = commit::read_object(&paths, &left)?.tree;
            let right_tree = commit::read_object(&paths, &right)?.tree;
            let entries = diff::diff(&paths, Some(&left_tree), Some(&right_tree))?;
            Ok(Output::Diff(entries))
        }
        Verb::Log => Ok(Output::Log(log_lines(&paths, &env.active)?)),
        Verb::AddSubs { new_name } => {
            refs::create_subsection(&paths, new_name)?;
            log::info!("[{}] created subsection '{}'", env.node_name, new_name);
            Ok(Output::None)
        }
        Verb::Promote { message, delete } => {
            let id = refs::promote(&paths, &env.active, message, &identity.name, identity.uid, timestamp, *delete)?;
            log::info!("[{}] promoted '{}' into trunk as {}", env.node_name, env.active, hash::to_hex(&id));
            Ok(Output::CommitCreated(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_then_log_round_trips() {
        let dir = tempdir().unwrap();
        let paths = Paths::for_node(dir.path());
        paths.init().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi\n").unwrap();

        let env = CommandEnvelope {
            node_name: "test-node".to_string(),
            node_path: dir.path().to_path_buf(),
            active: "master".to_string(),
            verb: Verb::Commit { tag: "v1".to_string() },
        };
        let out = run(&env).unwrap();
        assert!(matches!(out, Output::CommitCreated(_)));

        let log_env = CommandEnvelope {
            verb: Verb::Log,
            ..env
        };
        let out = run(&log_env).unwrap();
        match out {
            Output::Log(lines) => assert_eq!(lines.len(), 1),
            _ => panic!("expected log output"),
        }
    }
}
