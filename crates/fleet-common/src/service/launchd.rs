// launchd: per-user agents labelled `actions.runner.<scope>.<runner>`.
//
// State comes from one `launchctl list` call; start and stop go through the
// runner's own `svc.sh`, which knows where its plist lives.

use super::{ServiceAction, ServiceManager, ServiceState};
use crate::config_store::ServiceManagerKind;
use crate::constants::{agent_script, path, service::NAME_PREFIX};
use crate::layout::RunnerDir;
use crate::naming::ServiceName;
use crate::tracing::Tracing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleet_sdk::{CommandRunner, ProcessRequest, TraceWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of `launchctl list`: `PID  Status  Label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchdEntry {
    pub pid: Option<u32>,
    pub last_exit_status: i32,
    pub label: String,
}

impl LaunchdEntry {
    pub fn state(&self) -> ServiceState {
        match (self.pid, self.last_exit_status) {
            (Some(_), _) => ServiceState::Active,
            (None, 0) => ServiceState::Inactive,
            (None, _) => ServiceState::Failed,
        }
    }
}

/// Parse `launchctl list` output, skipping the header and malformed rows.
pub fn parse_launchctl_list(stdout: &str) -> Vec<LaunchdEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let pid = columns.next()?;
            let status = columns.next()?;
            let label = columns.next()?;
            if pid == "PID" {
                return None;
            }
            let pid = match pid {
                "-" => None,
                value => Some(value.parse().ok()?),
            };
            let last_exit_status = match status {
                "-" => 0,
                value => value.parse().ok()?,
            };
            Some(LaunchdEntry {
                pid,
                last_exit_status,
                label: label.to_string(),
            })
        })
        .collect()
}

pub struct LaunchdServiceManager {
    runner: Arc<dyn CommandRunner>,
    home: PathBuf,
    trace: Tracing,
}

impl LaunchdServiceManager {
    pub fn new(runner: Arc<dyn CommandRunner>, home: PathBuf, trace: Tracing) -> Self {
        Self {
            runner,
            home,
            trace,
        }
    }

    /// `~/Library/Logs/<label>/{stdout,stderr}.log`, as written by the agent's plist.
    pub fn log_files(&self, label: &str) -> (PathBuf, PathBuf) {
        log_files_in(&self.home, label)
    }

    async fn entries(&self) -> Result<Vec<LaunchdEntry>> {
        let output = self
            .runner
            .run_checked(&ProcessRequest::new("launchctl").arg("list"))
            .await
            .context("Failed to run launchctl list")?;
        Ok(parse_launchctl_list(&output.stdout)
            .into_iter()
            .filter(|entry| entry.label.starts_with(NAME_PREFIX))
            .collect())
    }

    fn svc_request(dir: &RunnerDir, verb: &str) -> ProcessRequest {
        ProcessRequest::new(format!("./{}", agent_script::SVC))
            .arg(verb)
            .current_dir(&dir.path)
    }

    async fn svc(&self, dir: &RunnerDir, verb: &str) -> Result<()> {
        self.runner
            .run_checked(&Self::svc_request(dir, verb))
            .await
            .with_context(|| format!("svc.sh {verb} failed for {}", dir.runner))?;
        Ok(())
    }
}

/// The launch agent log files of `label` under the home directory `home`.
pub fn log_files_in(home: &Path, label: &str) -> (PathBuf, PathBuf) {
    let dir = home.join(path::MACOS_LOGS_DIRECTORY).join(label);
    (dir.join(path::STDOUT_LOG), dir.join(path::STDERR_LOG))
}

fn state_of(entries: &[LaunchdEntry], label: &str) -> ServiceState {
    entries
        .iter()
        .find(|entry| entry.label == label)
        .map(LaunchdEntry::state)
        .unwrap_or(ServiceState::NotFound)
}

#[async_trait]
impl ServiceManager for LaunchdServiceManager {
    fn kind(&self) -> ServiceManagerKind {
        ServiceManagerKind::Launchd
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["launchctl"]
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        let mut labels: Vec<String> = self.entries().await?.into_iter().map(|e| e.label).collect();
        labels.sort();
        labels.dedup();
        Ok(labels)
    }

    async fn state(&self, unit: &str) -> Result<ServiceState> {
        ServiceName::validate(unit)?;
        Ok(state_of(&self.entries().await?, unit))
    }

    async fn states(&self, units: &[String]) -> Result<Vec<ServiceState>> {
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.entries().await?;
        Ok(units.iter().map(|unit| state_of(&entries, unit)).collect())
    }

    async fn control(&self, dir: &RunnerDir, unit: &str, action: ServiceAction) -> Result<()> {
        ServiceName::validate(unit)?;
        self.trace.info(&format!("svc.sh {action} {unit} ({})", dir.runner));
        match action {
            ServiceAction::Start => self.svc(dir, "start").await,
            ServiceAction::Stop => self.svc(dir, "stop").await,
            ServiceAction::Restart => {
                if let Err(e) = self.svc(dir, "stop").await {
                    self.trace.warning(&format!("{e:#}; starting anyway"));
                }
                self.svc(dir, "start").await
            }
        }
    }

    async fn install(&self, dir: &RunnerDir, _user: Option<&str>) -> Result<()> {
        // Launch agents always run as the invoking user.
        self.svc(dir, "install").await?;
        self.svc(dir, "start").await
    }

    async fn uninstall(&self, dir: &RunnerDir) -> Result<()> {
        self.svc(dir, "uninstall").await
    }
}
