//! Ignore list (§4.M): `.retain` prefix-pattern loading and matching.

use crate::error::Result;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Ignore {
    patterns: Vec<String>,
}

impl Ignore {
    /// Reads `<node>/.retain` if present; absent file means no extra rules.
    pub fn load(retain_path: &Path) -> Result<Self> {
        if !retain_path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(retain_path)?;
        let patterns = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_end_matches('/').to_string())
            .collect();
        Ok(Self { patterns })
    }

    /// Whether `rel_path` (forward-slash separated, relative to the node
    /// root) should be skipped. `.log` and `.retain` are always ignored
    /// regardless of `.retain`'s contents.
    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if rel_path == ".log" || rel_path == ".retain" || rel_path.starts_with(".log/") {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| rel_path == p || rel_path.starts_with(&format!("{p}/")))
    }
}
