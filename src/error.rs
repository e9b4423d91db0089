//! Crate-wide error taxonomy (spec §7).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// The six error kinds from the spec's error-handling design, plus the
/// conversions needed to bubble up std/zlib failures into them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("corrupt object {hash}: {reason}")]
    CorruptObject { hash: String, reason: String },

    #[error("merge conflict at {path}")]
    MergeConflict { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path error: {0}")]
    Path(String),
}

impl Error {
    pub fn corrupt(hash: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptObject {
            hash: hash.into(),
            reason: reason.into(),
        }
    }

    /// Maps an error onto the process exit status described in spec §6:
    /// zero on success, non-zero on any fatal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedInput(_) => 2,
            Error::MissingReference(_) => 3,
            Error::ObjectNotFound(_) => 4,
            Error::CorruptObject { .. } => 5,
            Error::MergeConflict { .. } => 6,
            Error::Io(_) => 7,
            Error::Path(_) => 8,
        }
    }
}
