//! Manual-invocation CLI front-end (non-core): a thin clap binary that
//! builds a `CommandEnvelope` and calls into the engine's dispatcher.
//! The external IPC transport this stands in for is out of scope (§1).

mod node;

use anchor_weave::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "manual harness for the anchor-weave engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initializes a new node's `.log/` structure.
    Init { path: Option<PathBuf> },
    /// Snapshots the working tree as a new commit (§4.J).
    Commit {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
        tag: String,
    },
    /// Switches the working tree to a different commit (§4.L).
    Rebuild {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
        target_tag: String,
        source_commit: String,
    },
    /// Materializes one file from a commit (§4.L).
    Checkout {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
        tag: String,
        file_path: String,
    },
    /// Diffs two tags on the active subsection (§4.I).
    Diff {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
        tag1: String,
        tag2: String,
    },
    /// Walks the active HEAD printing one line per commit.
    Log {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
    },
    /// Creates a new subsection anchored on trunk (§4.K).
    AddSubs { node: PathBuf, new_name: String },
    /// Merges a subsection into trunk (§4.K).
    Promote {
        node: PathBuf,
        #[arg(long, default_value = "master")]
        active: String,
        message: String,
        #[arg(long)]
        delete: bool,
    },
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        node::run(&self.command)
    }
}
