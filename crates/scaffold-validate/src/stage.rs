//! Validation stage definitions and their execution.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scaffold_core::{RunContext, StageRole, ValidationStageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::runner::{RunnerError, SubprocessRequest, SubprocessResult, SubprocessRunner};

/// Directory names never descended into by the compile check.
const SKIPPED_DIRS: [&str; 4] = ["node_modules", "__pycache__", "artifacts", ".venv"];

/// Config files that frontend tooling reads as JSON with comments.
const JSONC_PREFIXES: [&str; 3] = ["tsconfig", "jsconfig", ".eslintrc"];

/// Walk depth limit for the compile check.
const MAX_WALK_DEPTH: usize = 10;

/// Compiles each file in memory and prints one JSON line per failure.
const PY_COMPILE_SCRIPT: &str = r#"import json, sys
bad = 0
for p in sys.argv[1:]:
    try:
        with open(p, 'rb') as fh:
            compile(fh.read(), p, 'exec')
    except Exception as exc:
        bad += 1
        print(json.dumps({'path': p, 'error': '%s: %s' % (type(exc).__name__, exc)}))
sys.exit(1 if bad else 0)
"#;

/// Builtin validation stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// Syntax check of every `.py` and strict `.json` file under the base
    CompileCheck,

    /// npm run lint:fix
    Lint,

    /// python -m pytest -q
    Test,
}

impl BuiltinStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::CompileCheck => "compile-check",
            BuiltinStage::Lint => "lint",
            BuiltinStage::Test => "test",
        }
    }

    pub fn role(&self) -> StageRole {
        match self {
            BuiltinStage::CompileCheck => StageRole::Compile,
            BuiltinStage::Lint => StageRole::Lint,
            BuiltinStage::Test => StageRole::Test,
        }
    }

    /// Get the stage's main command. The compile check only needs the interpreter.
    pub fn command(&self, python: &str) -> Vec<String> {
        match self {
            BuiltinStage::CompileCheck => vec![python.to_string()],
            BuiltinStage::Lint => vec!["npm".to_string(), "run".to_string(), "lint:fix".to_string()],
            BuiltinStage::Test => vec![
                python.to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
            ],
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            BuiltinStage::CompileCheck => StageKind::CompileSources,
            BuiltinStage::Lint | BuiltinStage::Test => StageKind::Command,
        }
    }
}

/// How a stage does its work.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Run `command` and judge by its exit code.
    #[default]
    Command,
    /// Walk the base and syntax-check sources; `command[0]` is the interpreter.
    CompileSources,
}

/// A command run before the stage's own command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupStep {
    pub command: Vec<String>,

    /// Skip the setup when this path (relative to the base) exists.
    pub skip_if_exists: Option<String>,

    pub timeout_secs: u64,
}

/// Configuration for a validation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    pub role: StageRole,

    #[serde(default)]
    pub kind: StageKind,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds.
    pub timeout_secs: u64,

    /// Whether this stage is enabled.
    pub enabled: bool,

    /// Extra environment for this stage's processes.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub setup: Option<SetupStep>,
}

impl StageConfig {
    /// Create a new stage configuration from a builtin stage.
    pub fn from_builtin(stage: BuiltinStage, python: &str, timeout_secs: u64) -> Self {
        Self {
            name: stage.name().to_string(),
            role: stage.role(),
            kind: stage.kind(),
            command: stage.command(python),
            timeout_secs,
            enabled: true,
            env: BTreeMap::new(),
            setup: None,
        }
    }

    /// Create a custom command stage.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            role: StageRole::Custom,
            kind: StageKind::Command,
            command,
            timeout_secs,
            enabled: true,
            env: BTreeMap::new(),
            setup: None,
        }
    }

    pub fn with_role(mut self, role: StageRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_setup(mut self, setup: SetupStep) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Disable this stage.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Hard bound for the stage process. Zero is not "unbounded": the process
    /// is killed as soon as it starts.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the executable stage this configuration describes.
    pub fn into_stage(self) -> Box<dyn ValidationStage> {
        match self.kind {
            StageKind::Command => Box::new(CommandStage::new(self)),
            StageKind::CompileSources => Box::new(CompileCheckStage::new(self)),
        }
    }
}

/// One named check in the pipeline.
///
/// Stage failures are reported in the returned result, never raised.
#[async_trait]
pub trait ValidationStage: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> StageRole;

    fn enabled(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &RunContext) -> ValidationStageResult;
}

/// A stage that delegates to an external command.
pub struct CommandStage {
    config: StageConfig,
}

impl CommandStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }

    /// Run the setup step unless its marker path exists. `Some` means it failed.
    async fn run_setup(&self, ctx: &RunContext) -> Option<ValidationStageResult> {
        let setup = self.config.setup.as_ref()?;
        if let Some(marker) = &setup.skip_if_exists {
            if matches!(ctx.base().resolve(marker), Ok(path) if path.exists()) {
                debug!(stage = %self.config.name, marker = %marker, "Setup skipped");
                return None;
            }
        }

        info!(stage = %self.config.name, command = %setup.command.join(" "), "Running stage setup");
        let outcome = match SubprocessRequest::from_command(&setup.command) {
            Ok(request) => {
                let request = request
                    .cwd(ctx.base_path())
                    .timeout(Duration::from_secs(setup.timeout_secs))
                    .envs(&self.config.env);
                SubprocessRunner::run(&request).await
            }
            Err(err) => Err(err),
        };
        let label = format!("setup `{}` failed", setup.command.join(" "));
        match outcome {
            Ok(result) if result.passed() => None,
            Ok(result) => Some(
                from_subprocess(&self.config.name, self.config.role, result)
                    .with_errors(vec![label]),
            ),
            Err(err) => Some(runner_failure(&self.config.name, self.config.role, &err, 0)),
        }
    }
}

#[async_trait]
impl ValidationStage for CommandStage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> StageRole {
        self.config.role
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn run(&self, ctx: &RunContext) -> ValidationStageResult {
        let start = Instant::now();
        if let Some(failed) = self.run_setup(ctx).await {
            return failed.with_duration_ms(start.elapsed().as_millis() as u64);
        }

        let request = match SubprocessRequest::from_command(&self.config.command) {
            Ok(request) => request
                .cwd(ctx.base_path())
                .timeout(self.config.timeout())
                .envs(&self.config.env),
            Err(err) => {
                return runner_failure(&self.config.name, self.config.role, &err, elapsed_ms(start))
            }
        };

        match SubprocessRunner::run(&request).await {
            Ok(result) => from_subprocess(&self.config.name, self.config.role, result)
                .with_duration_ms(elapsed_ms(start)),
            Err(err) => runner_failure(&self.config.name, self.config.role, &err, elapsed_ms(start)),
        }
    }
}

/// Syntax check of generated sources.
///
/// `.json` files are parsed in-process; `.py` files are compiled in memory by
/// one interpreter invocation, so no bytecode lands in the project.
pub struct CompileCheckStage {
    config: StageConfig,
}

impl CompileCheckStage {
    pub fn new(config: StageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ValidationStage for CompileCheckStage {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> StageRole {
        self.config.role
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn run(&self, ctx: &RunContext) -> ValidationStageResult {
        let start = Instant::now();
        let sources = collect_sources(ctx.base_path());
        let mut errors: Vec<String> = sources
            .json
            .iter()
            .filter_map(|rel| check_json(ctx.base_path(), rel))
            .collect();

        debug!(
            python_files = sources.python.len(),
            json_files = sources.json.len(),
            "Compile check candidates"
        );

        let mut result = ValidationStageResult::passed(&self.config.name, self.config.role);
        if !sources.python.is_empty() {
            let Some(interpreter) = self.config.command.first() else {
                return runner_failure(
                    &self.config.name,
                    self.config.role,
                    &RunnerError::EmptyCommand,
                    elapsed_ms(start),
                );
            };
            let mut args = vec!["-c".to_string(), PY_COMPILE_SCRIPT.to_string()];
            args.extend(sources.python.iter().cloned());
            let request = SubprocessRequest::new(interpreter.clone(), args)
                .cwd(ctx.base_path())
                .timeout(self.config.timeout())
                .envs(&self.config.env);

            match SubprocessRunner::run(&request).await {
                Ok(run) => {
                    let reported = parse_compile_errors(&run.stdout);
                    if !run.passed() && reported.is_empty() {
                        errors.push(run.stderr.trim().to_string());
                    }
                    errors.extend(reported);
                    result = result.with_output(run.exit_code, run.stdout, run.stderr);
                    result.timed_out = run.timed_out;
                }
                Err(err) => {
                    return runner_failure(&self.config.name, self.config.role, &err, elapsed_ms(start))
                        .with_errors(std::iter::once(err.to_string()).chain(errors).collect());
                }
            }
        }

        let ok = errors.is_empty() && !result.timed_out;
        result
            .with_errors(errors)
            .with_ok(ok)
            .with_duration_ms(elapsed_ms(start))
    }
}

/// Relative paths of the files the compile check looks at, sorted.
#[derive(Debug, Default, PartialEq, Eq)]
struct Sources {
    python: Vec<String>,
    json: Vec<String>,
}

fn collect_sources(base: &Path) -> Sources {
    let mut sources = Sources::default();
    let walker = WalkDir::new(base)
        .max_depth(MAX_WALK_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(base) else {
            continue;
        };
        let rel = rel.to_string_lossy().into_owned();
        match entry.path().extension().and_then(|ext| ext.to_str()) {
            Some("py") => sources.python.push(rel),
            Some("json") if !is_jsonc(entry.file_name()) => sources.json.push(rel),
            _ => {}
        }
    }
    sources
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

fn is_jsonc(file_name: &OsStr) -> bool {
    let name = file_name.to_string_lossy();
    JSONC_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn check_json(base: &Path, rel: &str) -> Option<String> {
    let raw = match fs::read_to_string(base.join(rel)) {
        Ok(raw) => raw,
        Err(e) => return Some(format!("{rel}: {e}")),
    };
    serde_json::from_str::<Value>(&raw)
        .err()
        .map(|e| format!("{rel}: {e}"))
}

fn parse_compile_errors(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|v| {
            let path = v.get("path")?.as_str()?;
            let error = v.get("error")?.as_str()?;
            Some(format!("{path}: {error}"))
        })
        .collect()
}

fn from_subprocess(name: &str, role: StageRole, result: SubprocessResult) -> ValidationStageResult {
    let ok = result.passed();
    let mut stage = ValidationStageResult::passed(name, role)
        .with_output(result.exit_code, result.stdout, result.stderr)
        .with_duration_ms(result.duration_ms)
        .with_ok(ok);
    stage.timed_out = result.timed_out;
    stage
}

fn runner_failure(
    name: &str,
    role: StageRole,
    err: &RunnerError,
    duration_ms: u64,
) -> ValidationStageResult {
    ValidationStageResult::failed(name, role, err.to_string())
        .with_errors(vec![err.to_string()])
        .with_duration_ms(duration_ms)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaffold_core::BaseDirectory;

    fn ctx(dir: &tempfile::TempDir) -> RunContext {
        RunContext::new(BaseDirectory::open(dir.path()).unwrap(), false)
    }

    #[test]
    fn test_builtin_stage_names() {
        assert_eq!(BuiltinStage::CompileCheck.name(), "compile-check");
        assert_eq!(BuiltinStage::Lint.name(), "lint");
        assert_eq!(BuiltinStage::Test.name(), "test");
    }

    #[test]
    fn test_builtin_stage_commands() {
        let test_cmd = BuiltinStage::Test.command("python3");
        assert_eq!(test_cmd, vec!["python3", "-m", "pytest", "-q"]);

        let lint_cmd = BuiltinStage::Lint.command("python3");
        assert_eq!(lint_cmd[0], "npm");
        assert!(lint_cmd.contains(&"lint:fix".to_string()));
    }

    #[test]
    fn test_stage_config_from_builtin() {
        let config = StageConfig::from_builtin(BuiltinStage::CompileCheck, "python3", 60);
        assert_eq!(config.name, "compile-check");
        assert_eq!(config.role, StageRole::Compile);
        assert_eq!(config.kind, StageKind::CompileSources);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.enabled);
    }

    #[test]
    fn test_stage_config_custom_and_disabled() {
        let config = StageConfig::custom(
            "my_stage".to_string(),
            vec!["echo".to_string(), "hello".to_string()],
            60,
        );
        assert_eq!(config.role, StageRole::Custom);
        assert!(config.setup.is_none());
        assert!(!config.disabled().enabled);
    }

    #[test]
    fn test_stage_config_deserializes_with_defaults() {
        let config: StageConfig = serde_json::from_str(
            r#"{"name": "types", "role": "custom", "command": ["mypy", "."], "timeout_secs": 30, "enabled": true}"#,
        )
        .unwrap();
        assert_eq!(config.kind, StageKind::Command);
        assert!(config.env.is_empty());
        assert!(config.setup.is_none());
    }

    #[test]
    fn test_collect_sources_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "src/app.py",
            "config.json",
            "node_modules/pkg/index.json",
            ".venv/lib/site.py",
            "src/__pycache__/app.py",
            "artifacts/validation.json",
            "README.md",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }

        let sources = collect_sources(dir.path());
        assert_eq!(sources.python, vec!["src/app.py"]);
        assert_eq!(sources.json, vec!["config.json"]);
    }

    #[tokio::test]
    async fn test_commented_frontend_configs_are_not_compile_errors() {
        let dir = tempfile::tempdir().unwrap();
        let commented = "{\n  // strict mode\n  \"compilerOptions\": { \"strict\": true },\n}\n";
        for rel in ["tsconfig.json", "tsconfig.node.json", "web/jsconfig.json", ".eslintrc.json"] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, commented).unwrap();
        }
        fs::write(dir.path().join("package.json"), r#"{"name": "web"}"#).unwrap();

        let sources = collect_sources(dir.path());
        assert_eq!(sources.json, vec!["package.json"]);

        let config = StageConfig::from_builtin(BuiltinStage::CompileCheck, "no-such-python-x9", 5);
        let result = CompileCheckStage::new(config).run(&ctx(&dir)).await;
        assert!(result.ok, "{:?}", result.errors);
    }

    #[test]
    fn test_parse_compile_errors() {
        let stdout = "{\"path\": \"a.py\", \"error\": \"SyntaxError: bad\"}\nnoise\n";
        assert_eq!(parse_compile_errors(stdout), vec!["a.py: SyntaxError: bad"]);
    }

    #[tokio::test]
    async fn test_compile_check_without_python_sources_spawns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.json"), r#"{"a": 1}"#).unwrap();
        fs::write(dir.path().join("bad.json"), "{oops").unwrap();

        // An interpreter that cannot exist proves nothing was spawned.
        let config = StageConfig::from_builtin(BuiltinStage::CompileCheck, "no-such-python-x9", 5);
        let result = CompileCheckStage::new(config).run(&ctx(&dir)).await;
        assert!(!result.ok);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("bad.json: "));
        assert_eq!(result.return_code, None);
    }

    #[tokio::test]
    async fn test_command_stage_missing_executable_fails_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = StageConfig::custom(
            "ghost".to_string(),
            vec!["no-such-linter-x9".to_string()],
            5,
        );
        let result = CommandStage::new(config).run(&ctx(&dir)).await;
        assert!(!result.ok);
        assert!(result.stderr.contains("executable not found"));
    }

    #[tokio::test]
    async fn test_setup_skipped_when_marker_exists() {
        let dir = tempfile::tempdir().unwrap();
        if crate::runner::find_executable("true").is_none() {
            return;
        }
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let config = StageConfig::custom("lint".to_string(), vec!["true".to_string()], 5)
            .with_setup(SetupStep {
                command: vec!["no-such-installer-x9".to_string()],
                skip_if_exists: Some("node_modules".to_string()),
                timeout_secs: 5,
            });
        let result = CommandStage::new(config).run(&ctx(&dir)).await;
        assert!(result.ok, "{:?}", result);
    }

    #[tokio::test]
    async fn test_failing_setup_fails_stage_without_running_command() {
        let dir = tempfile::tempdir().unwrap();
        if crate::runner::find_executable("false").is_none() {
            return;
        }
        let config = StageConfig::custom(
            "lint".to_string(),
            vec!["no-such-linter-x9".to_string()],
            5,
        )
        .with_setup(SetupStep {
            command: vec!["false".to_string()],
            skip_if_exists: Some("node_modules".to_string()),
            timeout_secs: 5,
        });
        let result = CommandStage::new(config).run(&ctx(&dir)).await;
        assert!(!result.ok);
        assert_eq!(result.errors, vec!["setup `false` failed"]);
        assert!(!result.stderr.contains("executable not found"));
    }
}
