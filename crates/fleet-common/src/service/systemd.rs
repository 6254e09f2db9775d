// systemd: units named `actions.runner.<scope>.<runner>.service`.

use super::{privileged_request, ServiceAction, ServiceManager, ServiceState};
use crate::config_store::ServiceManagerKind;
use crate::constants::{agent_script, service::NAME_PREFIX};
use crate::layout::RunnerDir;
use crate::naming::ServiceName;
use crate::tracing::Tracing;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleet_sdk::{CommandRunner, ProcessRequest, TraceWriter};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct SystemdServiceManager {
    runner: Arc<dyn CommandRunner>,
    use_sudo: bool,
    trace: Tracing,
}

impl SystemdServiceManager {
    /// `use_sudo` prefixes state-changing commands with `sudo`; pass `false`
    /// when already running as root.
    pub fn new(runner: Arc<dyn CommandRunner>, use_sudo: bool, trace: Tracing) -> Self {
        Self {
            runner,
            use_sudo,
            trace,
        }
    }

    /// `journalctl` for one or more units, newest `lines` lines, optionally following.
    pub fn journal_request(units: &[String], lines: usize, follow: bool) -> ProcessRequest {
        let mut request = ProcessRequest::new("journalctl");
        for unit in units {
            request = request.arg("-u").arg(unit.as_str());
        }
        let lines = lines.to_string();
        request = request.args(["-n", lines.as_str(), "--no-pager", "-o", "short-iso"]);
        if follow {
            request = request.arg("-f");
        }
        request
    }

    fn svc_request(&self, dir: &RunnerDir, args: &[&str]) -> ProcessRequest {
        let script = format!("./{}", agent_script::SVC);
        privileged_request(self.use_sudo, &script, args).current_dir(&dir.path)
    }

    async fn unit_names(&self, subcommand: &str) -> Result<Vec<String>> {
        let pattern = format!("{NAME_PREFIX}*");
        let request = ProcessRequest::new("systemctl").args([
            subcommand,
            "--all",
            "--type=service",
            "--no-legend",
            "--no-pager",
            "--plain",
            pattern.as_str(),
        ]);
        let output = self
            .runner
            .capture(&request)
            .await
            .context("Failed to run systemctl")?;
        if !output.success() {
            // No matching units is reported as a non-zero exit by some versions.
            self.trace.verbose(&format!(
                "systemctl {subcommand} exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ));
            return Ok(Vec::new());
        }
        Ok(parse_unit_listing(&output.stdout))
    }
}

/// Pull unit names out of `systemctl list-units`/`list-unit-files` rows.
pub fn parse_unit_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .find(|token| token.starts_with(NAME_PREFIX))
                .map(str::to_string)
        })
        .collect()
}

#[async_trait]
impl ServiceManager for SystemdServiceManager {
    fn kind(&self) -> ServiceManagerKind {
        ServiceManagerKind::Systemd
    }

    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl", "journalctl"]
    }

    async fn list_units(&self) -> Result<Vec<String>> {
        let mut units: BTreeSet<String> = self.unit_names("list-units").await?.into_iter().collect();
        units.extend(self.unit_names("list-unit-files").await?);
        Ok(units.into_iter().collect())
    }

    async fn state(&self, unit: &str) -> Result<ServiceState> {
        ServiceName::validate(unit)?;
        let request = ProcessRequest::new("systemctl").args(["is-active", unit]);
        // is-active exits non-zero for anything but active; the text is what matters.
        let output = self.runner.capture(&request).await?;
        Ok(ServiceState::from_systemctl(&output.stdout))
    }

    async fn control(&self, dir: &RunnerDir, unit: &str, action: ServiceAction) -> Result<()> {
        ServiceName::validate(unit)?;
        self.trace
            .info(&format!("systemctl {action} {unit} ({})", dir.runner));
        let request = privileged_request(self.use_sudo, "systemctl", &[action.as_str(), unit]);
        self.runner.run_checked(&request).await?;
        Ok(())
    }

    async fn install(&self, dir: &RunnerDir, user: Option<&str>) -> Result<()> {
        let mut args = vec!["install"];
        if let Some(user) = user {
            args.push(user);
        }
        self.runner
            .run_checked(&self.svc_request(dir, &args))
            .await
            .with_context(|| format!("Failed to install service for {}", dir.runner))?;
        self.runner
            .run_checked(&self.svc_request(dir, &["start"]))
            .await
            .with_context(|| format!("Failed to start service for {}", dir.runner))?;
        Ok(())
    }

    async fn uninstall(&self, dir: &RunnerDir) -> Result<()> {
        self.runner
            .run_checked(&self.svc_request(dir, &["uninstall"]))
            .await
            .with_context(|| format!("Failed to uninstall service for {}", dir.runner))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RunnerRef;
    use crate::secret_masker::SecretMasker;
    use crate::tracing::TraceSetting;
    use fleet_sdk::{ProcessOutput, ScriptedCommandRunner};
    use std::path::PathBuf;

    fn manager(runner: Arc<ScriptedCommandRunner>, use_sudo: bool) -> SystemdServiceManager {
        let trace = Tracing::new("Systemd", SecretMasker::new(), TraceSetting::default());
        SystemdServiceManager::new(runner, use_sudo, trace)
    }

    fn dir() -> RunnerDir {
        RunnerDir {
            runner: RunnerRef::new("widgets", 1).unwrap(),
            path: PathBuf::from("/srv/action-runners/widgets/1"),
        }
    }

    #[test]
    fn parses_plain_and_bulleted_rows() {
        let stdout = "actions.runner.o-w.w-runner-1.service loaded active running GitHub Actions Runner\n\
                      ● actions.runner.o-w.w-runner-2.service loaded failed failed GitHub Actions Runner\n\
                      sshd.service loaded active running OpenSSH\n";
        assert_eq!(
            parse_unit_listing(stdout),
            vec![
                "actions.runner.o-w.w-runner-1.service".to_string(),
                "actions.runner.o-w.w-runner-2.service".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn list_units_merges_loaded_and_installed() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner
            .respond(
                "systemctl list-units",
                ProcessOutput::ok("actions.runner.o-w.w-runner-2.service loaded active running x\n"),
            )
            .respond(
                "systemctl list-unit-files",
                ProcessOutput::ok(
                    "actions.runner.o-w.w-runner-1.service enabled enabled\n\
                     actions.runner.o-w.w-runner-2.service enabled enabled\n",
                ),
            );
        let units = manager(runner, false).list_units().await.unwrap();
        assert_eq!(
            units,
            vec![
                "actions.runner.o-w.w-runner-1.service".to_string(),
                "actions.runner.o-w.w-runner-2.service".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn list_units_tolerates_nonzero_exit() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond("systemctl", ProcessOutput::failed(1, "no units"));
        assert!(manager(runner, false).list_units().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_reads_is_active_even_on_failure_exit() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond(
            "systemctl is-active",
            ProcessOutput {
                exit_code: 3,
                stdout: "inactive\n".into(),
                stderr: String::new(),
            },
        );
        let state = manager(runner, false)
            .state("actions.runner.o-w.w-runner-1.service")
            .await
            .unwrap();
        assert_eq!(state, ServiceState::Inactive);
    }

    #[tokio::test]
    async fn state_rejects_unsafe_unit_names() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let result = manager(runner.clone(), false).state("sshd.service").await;
        assert!(result.is_err());
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn control_uses_sudo_when_requested() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let unit = "actions.runner.o-w.widgets-runner-1.service";
        manager(runner.clone(), true)
            .control(&dir(), unit, ServiceAction::Restart)
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![format!("sudo systemctl restart {unit}")]
        );
    }

    #[tokio::test]
    async fn control_failure_is_an_error() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond("systemctl stop", ProcessOutput::failed(5, "Unit not loaded."));
        let err = manager(runner, false)
            .control(&dir(), "actions.runner.o-w.widgets-runner-1.service", ServiceAction::Stop)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Unit not loaded."));
    }

    #[tokio::test]
    async fn install_runs_svc_install_then_start_in_runner_dir() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        manager(runner.clone(), true)
            .install(&dir(), Some("deploy"))
            .await
            .unwrap();
        let requests = runner.requests();
        assert_eq!(
            runner.command_lines(),
            vec![
                "sudo ./svc.sh install deploy".to_string(),
                "sudo ./svc.sh start".to_string(),
            ]
        );
        assert_eq!(
            requests[0].working_directory.as_deref(),
            Some(std::path::Path::new("/srv/action-runners/widgets/1"))
        );
    }

    #[test]
    fn journal_request_shape() {
        let units = vec!["a.service".to_string(), "b.service".to_string()];
        assert_eq!(
            SystemdServiceManager::journal_request(&units, 50, true).command_line(),
            "journalctl -u a.service -u b.service -n 50 --no-pager -o short-iso -f"
        );
        assert_eq!(
            SystemdServiceManager::journal_request(&units[..1], 10, false).command_line(),
            "journalctl -u a.service -n 10 --no-pager -o short-iso"
        );
    }
}
