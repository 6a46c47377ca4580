//! Scaffold Validate - checks a materialized project
//!
//! Provides the validation side of a scaffold run:
//! - A subprocess runner with hard timeouts and process-group kill
//! - Compile-check, lint and test stages
//! - A sequential pipeline producing a `ValidationReport`

pub mod config;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use config::{LintMode, ValidationConfig};
pub use pipeline::{PipelineError, PipelineState, ValidationPipeline};
pub use runner::{
    find_executable, RunnerError, SubprocessRequest, SubprocessResult, SubprocessRunner,
    TIMEOUT_EXIT_CODE,
};
pub use stage::{
    BuiltinStage, CommandStage, CompileCheckStage, SetupStep, StageConfig, StageKind,
    ValidationStage,
};
