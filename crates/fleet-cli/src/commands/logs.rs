// `logs [repo] [index]`: recent service output of the selected runners.
//
// systemd: one journalctl call covering every unit, attached to the terminal.
// launchd: tails of the agent's log files, polled once per second with -f.

use anyhow::{Context, Result};
use fleet_common::constants::{path, return_code};
use fleet_common::service::{log_files_in, resolve_unit, SystemdServiceManager};
use fleet_common::{HostContext, RunnerDir, ServiceManagerKind, Terminal, Tracing};
use fleet_sdk::{IOUtil, TraceWriter};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::command_settings::LogsArgs;

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct LogsCommand {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl LogsCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Logs");
        Self { context, trace }
    }

    pub async fn run(&self, terminal: &Terminal, args: &LogsArgs) -> Result<i32> {
        let dirs = self
            .context
            .layout()
            .select(args.target.repo.as_deref(), args.target.index)?;
        if dirs.is_empty() {
            super::write_empty_fleet_hint(terminal, &self.context);
            return Ok(return_code::TERMINATED_ERROR);
        }
        let lines = match args.lines {
            Some(lines) => lines,
            None => self.context.settings()?.log_lines,
        };

        let manager = self.context.service_manager()?;
        let listing = match manager.list_units().await {
            Ok(units) => units,
            Err(e) => {
                terminal.write_warning(&format!("Could not list {} services: {e:#}", manager.kind()));
                Vec::new()
            }
        };
        let units: Vec<(&RunnerDir, Option<String>)> = dirs
            .iter()
            .map(|dir| (dir, resolve_unit(dir, &listing, &self.trace)))
            .collect();

        match manager.kind() {
            ServiceManagerKind::Launchd => self.tail_files(terminal, &units, lines, args.follow).await,
            ServiceManagerKind::Systemd | ServiceManagerKind::Auto => {
                self.journal(terminal, &units, lines, args.follow).await
            }
        }
    }

    async fn journal(
        &self,
        terminal: &Terminal,
        units: &[(&RunnerDir, Option<String>)],
        lines: usize,
        follow: bool,
    ) -> Result<i32> {
        let mut selected = Vec::new();
        for (dir, unit) in units {
            match unit {
                Some(unit) => selected.push(unit.clone()),
                None => terminal.write_warning(&format!("{}: no service installed, skipping", dir.runner)),
            }
        }
        if selected.is_empty() {
            terminal.write_error("No runner services to show logs for");
            return Ok(return_code::TERMINATED_ERROR);
        }

        let request = SystemdServiceManager::journal_request(&selected, lines, follow);
        self.trace.info(&format!("Running {}", request.command_line()));
        let exit_code = self.context.command_runner().interactive(&request).await?;
        Ok(exit_code)
    }

    async fn tail_files(
        &self,
        terminal: &Terminal,
        units: &[(&RunnerDir, Option<String>)],
        lines: usize,
        follow: bool,
    ) -> Result<i32> {
        let prefixed = units.len() > 1;
        let mut followers = Vec::new();
        for (dir, unit) in units {
            let files = log_sources(self.context.home_dir(), dir, unit.as_deref());
            if files.is_empty() {
                terminal.write_warning(&format!("{}: no log files found, skipping", dir.runner));
                continue;
            }
            let prefix = prefixed.then(|| dir.runner.runner_name());
            for file in files {
                self.trace.verbose(&format!("Tailing {}", file.display()));
                for line in IOUtil::tail_lines(&file, lines)? {
                    terminal.write_line(&prefix_line(prefix.as_deref(), &line));
                }
                followers.push((prefix.clone(), LogFollower::new(file)));
            }
        }

        if followers.is_empty() {
            terminal.write_error("No logs to show");
            return Ok(return_code::TERMINATED_ERROR);
        }
        if !follow {
            return Ok(return_code::SUCCESS);
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tokio::time::sleep(FOLLOW_POLL_INTERVAL) => {
                    for (prefix, follower) in followers.iter_mut() {
                        for line in follower.poll()? {
                            terminal.write_line(&prefix_line(prefix.as_deref(), &line));
                        }
                    }
                }
            }
        }
        Ok(return_code::SUCCESS)
    }
}

fn prefix_line(prefix: Option<&str>, line: &str) -> String {
    match prefix {
        Some(prefix) => format!("[{prefix}] {line}"),
        None => line.to_string(),
    }
}

/// Log files of one runner under launchd: the agent's stdout/stderr files
/// when its service is known, otherwise its newest diagnostic log.
pub fn log_sources(home: &Path, dir: &RunnerDir, label: Option<&str>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match label {
        Some(label) => {
            let (stdout, stderr) = log_files_in(home, label);
            [stdout, stderr].into_iter().filter(|f| f.is_file()).collect()
        }
        None => Vec::new(),
    };
    if files.is_empty() {
        files.extend(newest_diag_log(dir));
    }
    files
}

/// The most recently modified `_diag/Runner_*.log`.
pub fn newest_diag_log(dir: &RunnerDir) -> Option<PathBuf> {
    let pattern = format!(
        "{}/{}*.log",
        glob::Pattern::escape(&dir.diag_dir().to_string_lossy()),
        path::RUNNER_DIAGNOSTIC_LOG_PREFIX
    );
    glob::glob(&pattern)
        .ok()?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .max_by_key(|p| {
            let modified = fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p.clone())
        })
}

/// Yields lines appended to a file since the last poll.
///
/// A file that shrinks is assumed to have been rotated and is read again
/// from the start.
pub struct LogFollower {
    path: PathBuf,
    offset: u64,
    partial: String,
}

impl LogFollower {
    /// Start at the current end of `path`.
    pub fn new(path: PathBuf) -> Self {
        let offset = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            offset,
            partial: String::new(),
        }
    }

    pub fn poll(&mut self) -> Result<Vec<String>> {
        let len = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(_) => return Ok(Vec::new()),
        };
        if len < self.offset {
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open '{}'", self.path.display()))?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;

        self.partial.push_str(&String::from_utf8_lossy(&buf));
        let mut lines: Vec<String> = self.partial.split('\n').map(str::to_string).collect();
        // The last piece has no newline yet.
        self.partial = lines.pop().unwrap_or_default();
        Ok(lines
            .into_iter()
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect())
    }
}
