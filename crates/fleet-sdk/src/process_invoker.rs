use crate::string_util::StringUtil;
use crate::trace::TraceWriter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Error type for non-zero process exit codes.
#[derive(Debug, thiserror::Error)]
#[error("Exit code {exit_code} returned from process: '{command_line}'. {stderr}")]
pub struct ProcessExitCodeError {
    pub exit_code: i32,
    pub command_line: String,
    pub stderr: String,
}

/// Everything needed to launch one subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessRequest {
    pub file_name: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub environment: HashMap<String, String>,
}

impl ProcessRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Shell-style rendering used for traces, errors and test assertions.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.arguments.len() + 1);
        parts.push(StringUtil::shell_quote(&self.file_name));
        parts.extend(self.arguments.iter().map(|a| StringUtil::shell_quote(a)));
        parts.join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// A zero-exit output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr text.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty, trimmed stdout lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// The seam every subprocess call goes through.
///
/// Service managers and the installer only ever talk to a `CommandRunner`,
/// which lets tests swap the real [`ProcessInvoker`] for a
/// [`ScriptedCommandRunner`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdout/stderr captured and stdin closed.
    async fn capture(&self, request: &ProcessRequest) -> Result<ProcessOutput>;

    /// Run to completion attached to the caller's terminal. Returns the exit code.
    async fn interactive(&self, request: &ProcessRequest) -> Result<i32>;

    /// Like [`capture`](Self::capture) but a non-zero exit is an error.
    async fn run_checked(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        let output = self.capture(request).await?;
        if !output.success() {
            return Err(ProcessExitCodeError {
                exit_code: output.exit_code,
                command_line: request.command_line(),
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(output)
    }
}

/// Spawns real child processes with `tokio::process`.
pub struct ProcessInvoker {
    trace: Arc<dyn TraceWriter>,
}

impl ProcessInvoker {
    /// Create a new `ProcessInvoker` with the given trace writer.
    pub fn new(trace: Arc<dyn TraceWriter>) -> Self {
        Self { trace }
    }

    fn build(&self, request: &ProcessRequest) -> Command {
        assert!(!request.file_name.is_empty(), "file_name must not be empty");

        self.trace.info("Starting process:");
        self.trace
            .info(&format!("  Command line: '{}'", request.command_line()));
        if let Some(ref dir) = request.working_directory {
            self.trace
                .info(&format!("  Working directory: '{}'", dir.display()));
        }

        let mut cmd = Command::new(&request.file_name);
        cmd.args(&request.arguments);
        if let Some(ref dir) = request.working_directory {
            if dir.is_dir() {
                cmd.current_dir(dir);
            }
        }
        for (key, value) in &request.environment {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessInvoker {
    async fn capture(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        let mut cmd = self.build(request);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = std::time::Instant::now();
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to start process '{}'", request.file_name))?;

        let exit_code = output.status.code().unwrap_or(-1);
        self.trace.info(&format!(
            "Finished process '{}' with exit code {exit_code}, and elapsed time {:.2?}.",
            request.file_name,
            start.elapsed()
        ));

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn interactive(&self, request: &ProcessRequest) -> Result<i32> {
        let mut cmd = self.build(request);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = cmd
            .status()
            .await
            .with_context(|| format!("Failed to start process '{}'", request.file_name))?;

        let exit_code = status.code().unwrap_or(-1);
        self.trace.info(&format!(
            "Interactive process '{}' exited with code {exit_code}.",
            request.file_name
        ));
        Ok(exit_code)
    }
}

/// A [`CommandRunner`] that never spawns anything.
///
/// Every request is recorded. Responses are chosen by the first rule whose
/// prefix matches the rendered command line; unmatched requests succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: parking_lot::Mutex<Vec<(String, ProcessOutput)>>,
    requests: parking_lot::Mutex<Vec<ProcessRequest>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any command line starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &str, output: ProcessOutput) -> &Self {
        self.rules.lock().push((prefix.to_string(), output));
        self
    }

    /// All recorded requests in order.
    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().clone()
    }

    /// All recorded command lines in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(ProcessRequest::command_line)
            .collect()
    }

    fn answer(&self, request: &ProcessRequest) -> ProcessOutput {
        let line = request.command_line();
        self.requests.lock().push(request.clone());
        self.rules
            .lock()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn capture(&self, request: &ProcessRequest) -> Result<ProcessOutput> {
        Ok(self.answer(request))
    }

    async fn interactive(&self, request: &ProcessRequest) -> Result<i32> {
        Ok(self.answer(request).exit_code)
    }
}
