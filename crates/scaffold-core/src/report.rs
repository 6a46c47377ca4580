//! Validation report model and its persisted artifact.
//!
//! A [`ValidationReport`] is built in memory while the pipeline runs and is
//! consumed by [`persist_report`], which writes
//! `<base>/artifacts/validation.json` exactly once.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::RunContext;
use crate::error::{Result, ScaffoldError};
use crate::obs;
use crate::writer::persist_atomically;

/// Directory (under the base) holding run artifacts.
pub const ARTIFACTS_DIR: &str = "artifacts";

/// Well-known report filename inside [`ARTIFACTS_DIR`].
pub const REPORT_FILE: &str = "validation.json";

/// Artifact schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// What a stage checks, used to fill the flat report fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Compile,
    Lint,
    Test,
    Custom,
}

/// Per-stage state: `Pending -> Running -> {Passed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }
}

/// Outcome of one validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStageResult {
    pub name: String,
    pub role: StageRole,
    pub status: StageStatus,
    pub ok: bool,
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Itemized problems (e.g. one entry per file that failed to compile).
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ValidationStageResult {
    pub fn passed(name: impl Into<String>, role: StageRole) -> Self {
        Self {
            name: name.into(),
            role,
            status: StageStatus::Passed,
            ok: true,
            return_code: None,
            stdout: String::new(),
            stderr: String::new(),
            errors: Vec::new(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    pub fn failed(name: impl Into<String>, role: StageRole, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Self::passed(name, role)
        }
        .with_ok(false)
    }

    /// Set the verdict, keeping `status` in step with `ok`.
    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self.status = if ok {
            StageStatus::Passed
        } else {
            StageStatus::Failed
        };
        self
    }

    pub fn with_output(
        mut self,
        return_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        self.return_code = Some(return_code);
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Ordered stage results for one run. Overall `ok` is the AND of all stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    run_id: Uuid,
    stages: Vec<ValidationStageResult>,
}

impl ValidationReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, stage: ValidationStageResult) {
        self.stages.push(stage);
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stages(&self) -> &[ValidationStageResult] {
        &self.stages
    }

    pub fn ok(&self) -> bool {
        self.stages.iter().all(|s| s.ok)
    }

    /// First stage with the given role.
    pub fn stage(&self, role: StageRole) -> Option<&ValidationStageResult> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.ok).count()
    }

    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|s| !s.ok).count()
    }

    /// Flatten into the persisted artifact shape.
    pub fn to_artifact(&self, generated_at: DateTime<Utc>) -> ValidationArtifact {
        let compile = self.stage(StageRole::Compile);
        let lint = self.stage(StageRole::Lint);
        let test = self.stage(StageRole::Test);
        ValidationArtifact {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: self.run_id,
            generated_at,
            ok: self.ok(),
            compiled_ok: compile.map(|s| s.ok),
            compile_errors: compile.map(|s| s.errors.clone()).unwrap_or_default(),
            lint_ok: lint.map(|s| s.ok),
            lint_return_code: lint.and_then(|s| s.return_code),
            lint_stdout: lint.map(|s| s.stdout.clone()),
            lint_stderr: lint.map(|s| s.stderr.clone()),
            test_ok: test.map(|s| s.ok),
            pytest_ok: test.map(|s| s.ok),
            test_return_code: test.and_then(|s| s.return_code),
            test_stdout: test.map(|s| s.stdout.clone()),
            test_stderr: test.map(|s| s.stderr.clone()),
            stages: self.stages.clone(),
        }
    }
}

/// Canonical `validation.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationArtifact {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_ok: Option<bool>,
    #[serde(default)]
    pub compile_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_return_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_ok: Option<bool>,
    /// Same value as `test_ok`, kept for consumers of the pytest-era field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pytest_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_return_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_stderr: Option<String>,
    pub stages: Vec<ValidationStageResult>,
}

/// A report after its one and only persistence attempt.
#[derive(Debug, Clone)]
pub struct PersistedReport {
    report: ValidationReport,
    path: Option<PathBuf>,
}

impl PersistedReport {
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Where the artifact was written; `None` on dry run.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn is_dry_run(&self) -> bool {
        self.path.is_none()
    }
}

/// Write the report to `<base>/artifacts/validation.json`, replacing any
/// previous one. Skipped (and acknowledged) on dry run.
pub fn persist_report(ctx: &RunContext, report: ValidationReport) -> Result<PersistedReport> {
    let rel = format!("{ARTIFACTS_DIR}/{REPORT_FILE}");
    if ctx.dry_run() {
        obs::emit_report_persisted(&rel, true);
        return Ok(PersistedReport { report, path: None });
    }

    let artifacts_dir = ctx.base().resolve(ARTIFACTS_DIR)?;
    fs::create_dir_all(&artifacts_dir).map_err(|e| ScaffoldError::io(&artifacts_dir, e))?;
    let path = ctx.base().resolve(&rel)?;

    let artifact = report.to_artifact(Utc::now());
    let body = serde_json::to_string_pretty(&artifact)?;
    persist_atomically(&path, body.as_bytes())?;

    obs::emit_report_persisted(&path.to_string_lossy(), false);
    Ok(PersistedReport {
        report,
        path: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::BaseDirectory;
    use serde_json::{json, Value};

    fn sample_report() -> ValidationReport {
        let mut report = ValidationReport::new(Uuid::nil());
        report.push(
            ValidationStageResult::passed("compile-check", StageRole::Compile)
                .with_errors(vec![]),
        );
        report.push(
            ValidationStageResult::passed("test", StageRole::Test)
                .with_output(0, "1 passed", "")
                .with_duration_ms(120),
        );
        report
    }

    #[test]
    fn test_failed_keeps_status_in_step() {
        let stage = ValidationStageResult::failed("lint", StageRole::Lint, "boom");
        assert!(!stage.ok);
        assert_eq!(stage.status, StageStatus::Failed);
        assert_eq!(stage.stderr, "boom");
        assert!(stage.status.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_report_ok_is_and_of_stages() {
        let mut report = sample_report();
        assert!(report.ok());
        report.push(ValidationStageResult::failed("lint", StageRole::Lint, "x"));
        assert!(!report.ok());
        assert_eq!(report.passed_count(), 2);
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn test_artifact_has_expected_keys() {
        let generated_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        let raw = serde_json::to_value(sample_report().to_artifact(generated_at)).unwrap();
        let obj = raw.as_object().expect("artifact object");
        for key in [
            "schemaVersion",
            "runId",
            "generatedAt",
            "ok",
            "compiledOk",
            "compileErrors",
            "testOk",
            "pytestOk",
            "testReturnCode",
            "testStdout",
            "testStderr",
            "stages",
        ] {
            assert!(obj.contains_key(key), "missing key: {key}");
        }
        assert!(!obj.contains_key("lintOk"));
        assert_eq!(raw["testReturnCode"], json!(0));
        assert_eq!(raw["stages"][1]["status"], json!("passed"));
        assert_eq!(raw["stages"][0]["role"], json!("compile"));
    }

    #[test]
    fn test_persist_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(BaseDirectory::open(dir.path()).unwrap(), false);
        let persisted = persist_report(&ctx, sample_report()).unwrap();

        let path = persisted.path().expect("written").clone();
        assert_eq!(path, ctx.base_path().join("artifacts").join("validation.json"));
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["compiledOk"], json!(true));
        assert_eq!(raw["testOk"], json!(true));
        assert!(persisted.report().ok());
    }

    #[test]
    fn test_persist_overwrites_previous_report() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(BaseDirectory::open(dir.path()).unwrap(), false);
        persist_report(&ctx, sample_report()).unwrap();

        let mut failing = ValidationReport::new(Uuid::nil());
        failing.push(ValidationStageResult::failed("test", StageRole::Test, "1 failed"));
        let persisted = persist_report(&ctx, failing).unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(persisted.path().unwrap()).unwrap()).unwrap();
        assert_eq!(raw["ok"], json!(false));
        assert_eq!(raw["testOk"], json!(false));
    }

    #[test]
    fn test_dry_run_skips_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(BaseDirectory::open(dir.path()).unwrap(), true);
        let persisted = persist_report(&ctx, sample_report()).unwrap();
        assert!(persisted.is_dry_run());
        assert!(!dir.path().join("artifacts").exists());
    }
}
