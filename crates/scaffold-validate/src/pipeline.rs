//! Validation pipeline orchestration.

use std::path::{Path, PathBuf};
use std::time::Instant;

use scaffold_core::{
    obs, persist_report, PersistedReport, RunContext, ScaffoldError, StageStatus,
    ValidationReport, ValidationStageResult,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ValidationConfig;
use crate::stage::{StageConfig, ValidationStage};

/// Failures that stop the pipeline itself. Stage failures are never errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("base directory no longer exists: {path:?}")]
    BaseDirectoryMissing { path: PathBuf },

    #[error("invalid validation config: {0}")]
    Config(String),

    #[error("failed to persist validation report: {0}")]
    Report(#[from] ScaffoldError),
}

/// Pipeline-level state: `NotStarted -> InProgress -> Completed`.
///
/// `Aborted` is reached only on a run-fatal error, never on stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    InProgress,
    Completed,
    Aborted,
}

/// Runs stages strictly in order and collects their results.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
    statuses: Vec<StageStatus>,
    state: PipelineState,
}

impl ValidationPipeline {
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        let statuses = vec![StageStatus::Pending; stages.len()];
        Self {
            stages,
            statuses,
            state: PipelineState::NotStarted,
        }
    }

    pub fn from_stage_configs(configs: Vec<StageConfig>) -> Self {
        Self::new(configs.into_iter().map(StageConfig::into_stage).collect())
    }

    /// The default compile-check, lint, test pipeline for `base`.
    pub fn from_config(config: &ValidationConfig, base: &Path) -> Self {
        Self::from_stage_configs(config.stages(base))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Current status of the named stage.
    pub fn stage_status(&self, name: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .position(|s| s.name() == name)
            .map(|i| self.statuses[i])
    }

    /// Execute every enabled stage.
    ///
    /// A failing stage does not stop later ones; the base directory vanishing
    /// does, since every later stage depends on it.
    pub async fn run(&mut self, ctx: &RunContext) -> Result<ValidationReport, PipelineError> {
        let start = Instant::now();
        let run_id = ctx.run_id().to_string();
        self.state = PipelineState::InProgress;
        self.statuses.fill(StageStatus::Pending);

        info!(run_id = %run_id, dry_run = ctx.dry_run(), "Starting validation pipeline");

        let mut report = ValidationReport::new(ctx.run_id());
        for (index, stage) in self.stages.iter().enumerate() {
            if !stage.enabled() {
                info!(stage = %stage.name(), "Skipping disabled stage");
                continue;
            }
            if !ctx.base().exists() {
                self.state = PipelineState::Aborted;
                return Err(PipelineError::BaseDirectoryMissing {
                    path: ctx.base_path().to_path_buf(),
                });
            }

            self.statuses[index] = StageStatus::Running;
            obs::emit_stage_started(stage.name());

            let result = if ctx.dry_run() {
                info!(stage = %stage.name(), "[dry-run] stage not executed");
                ValidationStageResult::passed(stage.name(), stage.role())
                    .with_output(0, "dry-run: stage not executed", "")
            } else {
                stage.run(ctx).await
            };

            self.statuses[index] = result.status;
            obs::emit_stage_finished(stage.name(), result.ok, result.return_code, result.duration_ms);
            report.push(result);
        }

        self.state = PipelineState::Completed;
        obs::emit_pipeline_finished(
            &run_id,
            report.ok(),
            report.stages().len(),
            start.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    /// Run the pipeline, then hand the report to the report store.
    pub async fn run_and_persist(
        &mut self,
        ctx: &RunContext,
    ) -> Result<PersistedReport, PipelineError> {
        let report = self.run(ctx).await?;
        Ok(persist_report(ctx, report)?)
    }
}
