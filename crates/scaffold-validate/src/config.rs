//! Pipeline configuration: interpreter, timeouts and which stages run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineError;
use crate::stage::{BuiltinStage, SetupStep, StageConfig};

/// When the lint stage is enabled.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LintMode {
    /// Only when the project has a `package.json`.
    #[default]
    Auto,
    Always,
    Never,
}

/// Settings for the default compile-check, lint, test pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Python interpreter used for the compile check and pytest.
    pub python: String,
    pub compile_timeout_secs: u64,
    pub lint_timeout_secs: u64,
    /// Timeout for `npm install` ahead of linting.
    pub lint_setup_timeout_secs: u64,
    pub test_timeout_secs: u64,
    /// Extra arguments appended to the pytest command.
    pub test_args: Vec<String>,
    pub lint: LintMode,
    /// Environment overrides for every stage process.
    pub env: BTreeMap<String, String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            compile_timeout_secs: 60,
            lint_timeout_secs: 60,
            lint_setup_timeout_secs: 120,
            test_timeout_secs: 180,
            test_args: Vec::new(),
            lint: LintMode::Auto,
            env: BTreeMap::new(),
        }
    }
}

impl ValidationConfig {
    /// Load from a JSON file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Every stage needs a bound; a zero timeout would kill it on spawn.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let timeouts = [
            ("compile_timeout_secs", self.compile_timeout_secs),
            ("lint_timeout_secs", self.lint_timeout_secs),
            ("lint_setup_timeout_secs", self.lint_setup_timeout_secs),
            ("test_timeout_secs", self.test_timeout_secs),
        ];
        match timeouts.iter().find(|(_, secs)| *secs == 0) {
            Some((key, _)) => Err(PipelineError::Config(format!("{key} must be at least 1"))),
            None => Ok(()),
        }
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// The ordered stage list for a project rooted at `base`.
    ///
    /// Disabled stages stay in the list so the pipeline can log the skip.
    pub fn stages(&self, base: &Path) -> Vec<StageConfig> {
        let compile = StageConfig::from_builtin(
            BuiltinStage::CompileCheck,
            &self.python,
            self.compile_timeout_secs,
        )
        .with_env(&self.env);

        let lint = StageConfig::from_builtin(BuiltinStage::Lint, &self.python, self.lint_timeout_secs)
            .with_env(&self.env)
            .with_setup(SetupStep {
                command: vec!["npm".to_string(), "install".to_string()],
                skip_if_exists: Some("node_modules".to_string()),
                timeout_secs: self.lint_setup_timeout_secs,
            });
        let lint = if self.lint_enabled(base) {
            lint
        } else {
            lint.disabled()
        };

        let mut test = StageConfig::from_builtin(BuiltinStage::Test, &self.python, self.test_timeout_secs)
            .with_env(&self.env);
        test.command.extend(self.test_args.iter().cloned());

        vec![compile, lint, test]
    }

    fn lint_enabled(&self, base: &Path) -> bool {
        match self.lint {
            LintMode::Always => true,
            LintMode::Never => false,
            LintMode::Auto => base.join("package.json").is_file(),
        }
    }
}
