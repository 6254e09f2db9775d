// Host service managers.
//
// Every runner is wrapped by the agent's `svc.sh` as a systemd unit (Linux)
// or a launchd agent (macOS). The `ServiceManager` trait hides which one is
// in use; both implementations shell out through a `CommandRunner`.

pub mod launchd;
pub mod systemd;

pub use launchd::{log_files_in, LaunchdEntry, LaunchdServiceManager};
pub use systemd::SystemdServiceManager;

use crate::config_store::{ConfigurationStore, ServiceManagerKind};
use crate::layout::{RunnerDir, RunnerRef};
use crate::naming::ServiceName;
use crate::tracing::Tracing;

use anyhow::Result;
use async_trait::async_trait;
use fleet_sdk::TraceWriter;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// ServiceState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
    Active,
    Activating,
    Deactivating,
    Inactive,
    Failed,
    NotFound,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Active => "active",
            ServiceState::Activating => "activating",
            ServiceState::Deactivating => "deactivating",
            ServiceState::Inactive => "inactive",
            ServiceState::Failed => "failed",
            ServiceState::NotFound => "not-found",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ServiceState::Active => "●",
            ServiceState::Activating => "◐",
            ServiceState::Deactivating => "◑",
            ServiceState::Inactive => "○",
            ServiceState::Failed => "✗",
            ServiceState::NotFound => "?",
        }
    }

    /// Map the first line of `systemctl is-active` output.
    pub fn from_systemctl(output: &str) -> Self {
        match output.lines().next().unwrap_or("").trim() {
            "active" | "reloading" => ServiceState::Active,
            "activating" => ServiceState::Activating,
            "deactivating" => ServiceState::Deactivating,
            "inactive" => ServiceState::Inactive,
            "failed" => ServiceState::Failed,
            _ => ServiceState::NotFound,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ServiceAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
            ServiceAction::Restart => "restarted",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunnerStatus
// ---------------------------------------------------------------------------

/// One row of fleet status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerStatus {
    #[serde(flatten)]
    pub runner: RunnerRef,
    pub name: String,
    pub path: PathBuf,
    pub service: Option<String>,
    pub state: ServiceState,
}

impl RunnerStatus {
    pub fn runner_dir(&self) -> RunnerDir {
        RunnerDir {
            runner: self.runner.clone(),
            path: self.path.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceManager
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ServiceManager: Send + Sync {
    fn kind(&self) -> ServiceManagerKind;

    /// Executables that must be on PATH for this manager to work.
    fn required_tools(&self) -> &'static [&'static str];

    /// Installed units whose names carry the agent prefix.
    async fn list_units(&self) -> Result<Vec<String>>;

    async fn state(&self, unit: &str) -> Result<ServiceState>;

    /// States for several units; managers with a single listing call override this.
    ///
    /// A unit whose query fails reads as `not-found` without affecting the others.
    async fn states(&self, units: &[String]) -> Result<Vec<ServiceState>> {
        let mut states = Vec::with_capacity(units.len());
        for unit in units {
            states.push(self.state(unit).await.unwrap_or(ServiceState::NotFound));
        }
        Ok(states)
    }

    async fn control(&self, dir: &RunnerDir, unit: &str, action: ServiceAction) -> Result<()>;

    /// Install the runner's service with `svc.sh` and start it.
    async fn install(&self, dir: &RunnerDir, user: Option<&str>) -> Result<()>;

    async fn uninstall(&self, dir: &RunnerDir) -> Result<()>;
}

/// Find the service of one runner: the agent's `.service` file first, then a
/// matching unit from the manager's listing.
pub fn resolve_unit(dir: &RunnerDir, listing: &[String], trace: &Tracing) -> Option<String> {
    if let Some(name) = ConfigurationStore::read_service_name(&dir.path) {
        match ServiceName::validate(&name) {
            Ok(()) => return Some(name),
            Err(e) => trace.warning(&format!("Ignoring .service file of {}: {e}", dir.runner)),
        }
    }
    listing
        .iter()
        .filter(|unit| ServiceName::matches(unit, &dir.runner))
        .find(|unit| match ServiceName::validate(unit) {
            Ok(()) => true,
            Err(e) => {
                trace.verbose(&format!("Skipping listed unit for {}: {e}", dir.runner));
                false
            }
        })
        .cloned()
}

/// Resolve services and query states for a set of runners.
///
/// A failed listing or state query degrades to `not-found` with a warning.
pub async fn collect_status(
    manager: &dyn ServiceManager,
    dirs: &[RunnerDir],
    trace: &Tracing,
) -> Vec<RunnerStatus> {
    let listing = match manager.list_units().await {
        Ok(units) => units,
        Err(e) => {
            trace.warning(&format!("Could not list {} units: {e:#}", manager.kind()));
            Vec::new()
        }
    };

    let units: Vec<Option<String>> = dirs
        .iter()
        .map(|dir| resolve_unit(dir, &listing, trace))
        .collect();
    let known: Vec<String> = units.iter().flatten().cloned().collect();

    let mut known_states = match manager.states(&known).await {
        Ok(states) => states.into_iter(),
        Err(e) => {
            trace.warning(&format!("Could not query service states: {e:#}"));
            vec![ServiceState::NotFound; known.len()].into_iter()
        }
    };

    dirs.iter()
        .zip(units)
        .map(|(dir, unit)| {
            let state = match unit {
                Some(_) => known_states.next().unwrap_or(ServiceState::NotFound),
                None => ServiceState::NotFound,
            };
            RunnerStatus {
                runner: dir.runner.clone(),
                name: dir.runner.runner_name(),
                path: dir.path.clone(),
                service: unit,
                state,
            }
        })
        .collect()
}

/// `[sudo] <program> <args…>`.
pub(crate) fn privileged_request(
    use_sudo: bool,
    program: &str,
    args: &[&str],
) -> fleet_sdk::ProcessRequest {
    if use_sudo {
        fleet_sdk::ProcessRequest::new("sudo")
            .arg(program)
            .args(args.iter().copied())
    } else {
        fleet_sdk::ProcessRequest::new(program).args(args.iter().copied())
    }
}
