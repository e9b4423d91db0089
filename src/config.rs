//! Ambient configuration: node root and the size/format thresholds the
//! engine's pipeline stages are parameterized by (§4.D, §4.E, §4.G).
//!
//! Threaded explicitly wherever it's needed, replacing the teacher's
//! per-call `gyat_paths()` re-derivation with one resolved value (§9
//! "Global mutable state").

use crate::blob::IN_MEMORY_FILE_LIMIT;
use crate::chunker::{CDC_MASK, CDC_MAX_BLOCK, CDC_MIN_BLOCK, CDC_WINDOW, DECONSTRUCT_THRESHOLD};
use crate::store::Paths;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    pub paths: Paths,
    pub deconstruct_threshold: u64,
    pub in_memory_file_limit: u64,
    pub cdc_window: usize,
    pub cdc_min_block: usize,
    pub cdc_max_block: usize,
    pub cdc_mask: u32,
}

impl Config {
    pub fn for_node(node_root: &Path) -> Self {
        Self {
            paths: Paths::for_node(node_root),
            deconstruct_threshold: DECONSTRUCT_THRESHOLD,
            in_memory_file_limit: IN_MEMORY_FILE_LIMIT,
            cdc_window: CDC_WINDOW,
            cdc_min_block: CDC_MIN_BLOCK,
            cdc_max_block: CDC_MAX_BLOCK,
            cdc_mask: CDC_MASK,
        }
    }
}
