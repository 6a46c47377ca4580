//! Log events for a scaffold run.
//!
//! Each emitter logs one `event = "..."` key (`write.file`, `batch.written`,
//! `stage.started` and so on) plus the fields a reader needs to follow the
//! run from the log alone. A [`RunSpan`] held over a command attaches the
//! run id, base directory and dry-run flag to everything logged under it.

use tracing::{info, warn};

use crate::context::RunContext;
use crate::writer::{WriteResult, WriteStatus};

/// Keeps the `scaffold.run` span entered until dropped.
pub struct RunSpan {
    _entered: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(ctx: &RunContext) -> Self {
        let span = tracing::info_span!(
            "scaffold.run",
            run_id = %ctx.run_id(),
            base = %ctx.base_path().display(),
            dry_run = ctx.dry_run(),
        );
        Self {
            _entered: span.entered(),
        }
    }
}

/// Emit event: one path was written, simulated, kept or failed.
pub fn emit_write_result(result: &WriteResult) {
    match result.status {
        WriteStatus::Failed => warn!(
            event = "write.file",
            path = %result.path,
            status = "failed",
            kind = result.error_kind.as_deref().unwrap_or("unknown"),
            error = result.error.as_deref().unwrap_or(""),
        ),
        status => info!(
            event = "write.file",
            path = %result.path,
            status = ?status,
            bytes = result.bytes_written.unwrap_or(0),
        ),
    }
}

/// Emit event: a batch finished writing.
pub fn emit_batch_written(entries: usize, unique_paths: usize, failed: usize, dry_run: bool) {
    info!(
        event = "write.batch",
        entries = entries,
        unique_paths = unique_paths,
        failed = failed,
        dry_run = dry_run,
    );
}

/// Emit event: a validation stage started.
pub fn emit_stage_started(stage: &str) {
    info!(event = "stage.started", stage = %stage);
}

/// Emit event: a validation stage reached a terminal state.
pub fn emit_stage_finished(stage: &str, ok: bool, return_code: Option<i32>, duration_ms: u64) {
    info!(
        event = "stage.finished",
        stage = %stage,
        ok = ok,
        return_code = return_code.unwrap_or(0),
        duration_ms = duration_ms,
    );
}

/// Emit event: every stage ran and the pipeline completed.
pub fn emit_pipeline_finished(run_id: &str, ok: bool, stages: usize, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        ok = ok,
        stages = stages,
        duration_ms = duration_ms,
    );
}

/// Emit event: the validation report was written (or skipped on dry run).
pub fn emit_report_persisted(path: &str, dry_run: bool) {
    info!(event = "report.persisted", path = %path, dry_run = dry_run);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_over_context() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::prepare(dir.path(), true).unwrap();
        let _span = RunSpan::enter(&ctx);
        emit_report_persisted("artifacts/validation.json", ctx.dry_run());
    }

    #[test]
    fn test_emitters_without_subscriber() {
        emit_batch_written(3, 2, 1, false);
        emit_stage_started("lint");
        emit_stage_finished("lint", true, Some(0), 12);
        emit_pipeline_finished("run", true, 3, 40);
        emit_report_persisted("artifacts/validation.json", true);
    }
}
