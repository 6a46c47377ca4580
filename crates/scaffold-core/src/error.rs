//! Error taxonomy for sandboxed filesystem operations.

use std::path::PathBuf;

/// Errors produced by the scaffold core.
///
/// Per-file failures (`PathEscape`, `FileExistsNoOverwrite`, `IsADirectory`,
/// `Encoding`, `Io`) are captured into write results by the batch layer;
/// `BaseDirectory` is the only run-fatal variant.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("refusing to touch path outside base directory: {path} resolves to {resolved:?}")]
    PathEscape { path: String, resolved: PathBuf },

    #[error("File exists and overwrite=False")]
    FileExistsNoOverwrite { path: PathBuf },

    #[error("content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("invalid file batch: {0}")]
    InvalidBatch(String),

    #[error("base directory {path:?} unusable: {reason}")]
    BaseDirectory { path: PathBuf, reason: String },

    #[error("not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("not a directory: {path:?}")]
    NotADirectory { path: PathBuf },

    #[error("target is a directory, not a file: {path:?}")]
    IsADirectory { path: PathBuf },

    #[error("file exceeds max_bytes ({size} > {limit}): {path:?}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("requirements error: {0}")]
    Requirements(String),
}

impl ScaffoldError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable error kind, used in per-file results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PathEscape { .. } => "path_escape",
            Self::FileExistsNoOverwrite { .. } => "file_exists",
            Self::Encoding(_) => "encoding",
            Self::InvalidBatch(_) => "invalid_batch",
            Self::BaseDirectory { .. } => "base_directory",
            Self::NotFound { .. } => "not_found",
            Self::NotADirectory { .. } => "not_a_directory",
            Self::IsADirectory { .. } => "is_a_directory",
            Self::TooLarge { .. } => "too_large",
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::Requirements(_) => "requirements",
        }
    }

    /// Whether this error invalidates the whole run rather than one operation.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::BaseDirectory { .. })
    }
}

/// Result type for scaffold core operations.
pub type Result<T> = std::result::Result<T, ScaffoldError>;
