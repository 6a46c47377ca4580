//! Subprocess execution with a hard timeout.
//!
//! This is the only place that spawns OS processes. Children run in their own
//! process group so a timeout can kill everything they started, and output is
//! collected incrementally so whatever was printed before the kill survives.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit code reported when a process is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a process ends without one (killed by a signal).
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// How long to keep draining pipes after the child is gone.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Errors that prevent a process from running at all.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("empty command")]
    EmptyCommand,

    #[error("executable not found: {program}")]
    ExecutableNotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error while waiting for process: {0}")]
    Io(#[from] std::io::Error),
}

/// What to run and under which constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Added on top of the inherited host environment.
    pub env: BTreeMap<String, String>,
}

impl SubprocessRequest {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            timeout: Duration::from_secs(60),
            env: BTreeMap::new(),
        }
    }

    /// Build from an argv vector (first element is the executable).
    pub fn from_command(command: &[String]) -> Result<Self, RunnerError> {
        let (program, args) = command.split_first().ok_or(RunnerError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Human-readable command line, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of a process run. A timeout is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprocessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl SubprocessResult {
    /// Exit code 0 and finished within the timeout.
    pub fn passed(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Spawns processes on behalf of validation stages.
pub struct SubprocessRunner;

impl SubprocessRunner {
    /// Run `request` to completion or until its timeout expires.
    ///
    /// The executable is looked up before spawning (using an overridden
    /// `PATH` when the request carries one).
    pub async fn run(request: &SubprocessRequest) -> Result<SubprocessResult, RunnerError> {
        let start = Instant::now();

        if request.program.trim().is_empty() {
            return Err(RunnerError::EmptyCommand);
        }
        let path_var = match request.env.get("PATH") {
            Some(path) => Some(path.into()),
            None => std::env::var_os("PATH"),
        };
        let exe = find_executable_in(&request.program, request.cwd.as_deref(), path_var.as_deref())
            .ok_or_else(|| RunnerError::ExecutableNotFound {
                program: request.program.clone(),
            })?;

        debug!(command = %request.display(), timeout_ms = request.timeout.as_millis() as u64, "Spawning process");

        let mut command = Command::new(&exe);
        command
            .args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: request.program.clone(),
            source,
        })?;

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            child
                .stdout
                .take()
                .map(|pipe| spawn_drain(pipe, Arc::clone(&stdout_buf))),
            child
                .stderr
                .take()
                .map(|pipe| spawn_drain(pipe, Arc::clone(&stderr_buf))),
        ];

        let status = match tokio::time::timeout(request.timeout, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                warn!(command = %request.display(), timeout = ?request.timeout, "Process timed out, killing group");
                kill_group(&mut child).await;
                None
            }
        };

        for reader in readers.into_iter().flatten() {
            finish_drain(reader).await;
        }

        let stdout = take_text(&stdout_buf);
        let mut stderr = take_text(&stderr_buf);
        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(match status {
            Some(status) => SubprocessResult {
                exit_code: status.code().unwrap_or(SIGNAL_EXIT_CODE),
                stdout,
                stderr,
                timed_out: false,
                duration_ms,
            },
            None => {
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("Timed out after {:?}", request.timeout));
                SubprocessResult {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout,
                    stderr,
                    timed_out: true,
                    duration_ms,
                }
            }
        })
    }
}

fn spawn_drain<R>(mut pipe: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

/// Wait briefly for a reader; a pipe held open by an orphan must not block us.
async fn finish_drain(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_GRACE, &mut reader).await.is_err() {
        reader.abort();
    }
}

fn take_text(buf: &Mutex<Vec<u8>>) -> String {
    match buf.lock() {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    }
}

/// Kill the child's whole process group, then reap the child.
async fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            // SAFETY: kill(2) has no memory-safety preconditions; the child
            // leads its own group since it was spawned with process_group(0).
            unsafe {
                let _ = libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Look `program` up on the current `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    find_executable_in(program, None, std::env::var_os("PATH").as_deref())
}

/// Look `program` up on `path_var`.
///
/// Names containing a separator are taken as paths (relative ones against
/// `cwd`) and only checked for being executable.
pub fn find_executable_in(
    program: &str,
    cwd: Option<&Path>,
    path_var: Option<&OsStr>,
) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
        let candidate = match cwd {
            Some(dir) if Path::new(program).is_relative() => dir.join(program),
            _ => PathBuf::from(program),
        };
        return is_executable(&candidate).then_some(candidate);
    }
    std::env::split_paths(path_var?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Option<SubprocessRequest> {
        find_executable("sh")?;
        Some(SubprocessRequest::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
        ))
    }

    #[test]
    fn test_result_passed() {
        let mut result = SubprocessResult {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            duration_ms: 5,
        };
        assert!(result.passed());
        result.exit_code = 1;
        assert!(!result.passed());
        result.exit_code = 0;
        result.timed_out = true;
        assert!(!result.passed());
    }

    #[test]
    fn test_from_command_rejects_empty() {
        assert!(matches!(
            SubprocessRequest::from_command(&[]),
            Err(RunnerError::EmptyCommand)
        ));
        assert!(matches!(
            SubprocessRequest::from_command(&["  ".to_string()]),
            Err(RunnerError::EmptyCommand)
        ));
        let req = SubprocessRequest::from_command(&["echo".to_string(), "hi".to_string()]).unwrap();
        assert_eq!(req.display(), "echo hi");
    }

    #[test]
    fn test_find_executable_in_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let found = find_executable_in("tool", None, Some(dir.path().as_os_str()));
        assert_eq!(found, Some(tool.clone()));
        assert_eq!(find_executable_in("missing", None, Some(dir.path().as_os_str())), None);
        assert_eq!(find_executable_in("./tool", Some(dir.path()), None), Some(dir.path().join("./tool")));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_skipped() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::write(&data, "x").unwrap();
        std::fs::set_permissions(&data, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(find_executable_in("data", None, Some(dir.path().as_os_str())), None);
    }

    #[tokio::test]
    async fn test_missing_executable_fails_fast() {
        let req = SubprocessRequest::new("definitely-not-a-real-binary-7f3a", vec![]);
        match SubprocessRunner::run(&req).await {
            Err(RunnerError::ExecutableNotFound { program }) => {
                assert_eq!(program, "definitely-not-a-real-binary-7f3a")
            }
            other => panic!("expected ExecutableNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let Some(req) = sh("echo out; echo err >&2; exit 3") else {
            return;
        };
        let result = SubprocessRunner::run(&req).await.expect("run");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.timed_out);
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_env_override_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let Some(req) = sh("printf '%s' \"$SCAFFOLD_PROBE\"; pwd") else {
            return;
        };
        let req = req.env("SCAFFOLD_PROBE", "injected").cwd(dir.path());
        let result = SubprocessRunner::run(&req).await.expect("run");
        assert!(result.passed());
        assert!(result.stdout.starts_with("injected"));
        let reported = PathBuf::from(result.stdout["injected".len()..].trim());
        assert_eq!(
            std::fs::canonicalize(reported).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let Some(req) = sh("echo started; echo warming >&2; sleep 30") else {
            return;
        };
        let req = req.timeout(Duration::from_millis(500));
        let start = Instant::now();
        let result = SubprocessRunner::run(&req).await.expect("run");

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(result.timed_out);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(result.stdout, "started\n");
        assert!(result.stderr.starts_with("warming\n"));
        assert!(result.stderr.ends_with("Timed out after 500ms"));
    }
}
