//! Scaffold Core
//!
//! Sandboxed materialization of generated project files plus the validation
//! report model:
//! - Path sandbox confining every write and read to one base directory
//! - Content normalization from loosely shaped payloads to text
//! - Batch writes with per-file outcomes and atomic replacement
//! - The `validation.json` report store

pub mod content;
pub mod context;
pub mod error;
pub mod file_map;
pub mod obs;
pub mod reader;
pub mod report;
pub mod requirements;
pub mod sandbox;
pub mod telemetry;
pub mod writer;

pub use content::{normalize, normalize_value, Content};
pub use context::RunContext;
pub use error::{Result, ScaffoldError};
pub use file_map::{FileBatch, FileEntry};
pub use reader::{list_directory, read_text_file, DirEntryInfo, TextFile};
pub use report::{
    persist_report, PersistedReport, StageRole, StageStatus, ValidationArtifact,
    ValidationReport, ValidationStageResult, ARTIFACTS_DIR, REPORT_FILE,
};
pub use requirements::{load_requirements, seed_placeholders, PlaceholderHints};
pub use sandbox::{resolve, BaseDirectory};
pub use telemetry::init_tracing;
pub use writer::{
    content_digest, create_directory, ensure_file, write_batch, write_file, BatchWriteResult,
    WriteResult, WriteStatus,
};

/// Version of the scaffold core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
