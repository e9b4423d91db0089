use super::Command;
use anchor_weave::dispatch::{CommandEnvelope, Output, Verb};
use anchor_weave::store::Paths;
use anchor_weave::{diff, hash, Result};

fn node_name(path: &std::path::Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "node".to_string())
}

fn envelope(node: &std::path::Path, active: &str, verb: Verb) -> CommandEnvelope {
    CommandEnvelope {
        node_name: node_name(node),
        node_path: node.to_path_buf(),
        active: active.to_string(),
        verb,
    }
}

pub fn run(command: &Command) -> Result<()> {
    match command {
        Command::Init { path } => {
            let path = path.clone().unwrap_or(std::env::current_dir()?);
            std::fs::create_dir_all(&path)?;
            Paths::for_node(&path).init()?;
            println!("Initialized empty anchor-weave node in {}", path.display());
            Ok(())
        }
        Command::Commit { node, active, tag } => {
            let env = envelope(node, active, Verb::Commit { tag: tag.clone() });
            match anchor_weave::dispatch::run(&env)? {
                Output::CommitCreated(id) => println!("{}", hash::to_hex(&id)),
                _ => {}
            }
            Ok(())
        }
        Command::Rebuild { node, active, target_tag, source_commit } => {
            let env = envelope(
                node,
                active,
                Verb::Rebuild {
                    target_tag: target_tag.clone(),
                    source_commit: source_commit.clone(),
                },
            );
            anchor_weave::dispatch::run(&env)?;
            Ok(())
        }
        Command::Checkout { node, active, tag, file_path } => {
            let env = envelope(
                node,
                active,
                Verb::Checkout {
                    tag: tag.clone(),
                    file_path: file_path.clone(),
                },
            );
            anchor_weave::dispatch::run(&env)?;
            Ok(())
        }
        Command::Diff { node, active, tag1, tag2 } => {
            let env = envelope(node, active, Verb::Diff { tag1: tag1.clone(), tag2: tag2.clone() });
            if let Output::Diff(entries) = anchor_weave::dispatch::run(&env)? {
                print!("{}", diff::render_colored(&entries));
            }
            Ok(())
        }
        Command::Log { node, active } => {
            let env = envelope(node, active, Verb::Log);
            if let Output::Log(lines) = anchor_weave::dispatch::run(&env)? {
                for line in lines {
                    println!("{line}");
                }
            }
            Ok(())
        }
        Command::AddSubs { node, new_name } => {
            let env = envelope(node, "master", Verb::AddSubs { new_name: new_name.clone() });
            anchor_weave::dispatch::run(&env)?;
            Ok(())
        }
        Command::Promote { node, active, message, delete } => {
            let env = envelope(
                node,
                active,
                Verb::Promote {
                    message: message.clone(),
                    delete: *delete,
                },
            );
            if let Output::CommitCreated(id) = anchor_weave::dispatch::run(&env)? {
                println!("{}", hash::to_hex(&id));
            }
            Ok(())
        }
    }
}
