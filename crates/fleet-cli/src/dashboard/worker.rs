// Background worker: refresh, service control and log reads for the dashboard.

use super::app::{WorkerCommand, WorkerResponse};
use crate::commands::logs::log_sources;
use fleet_common::service::{collect_status, SystemdServiceManager};
use fleet_common::{HostContext, RunnerDir, RunnerStatus, ServiceManager, ServiceManagerKind, Tracing};
use fleet_sdk::{IOUtil, TraceWriter};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub const LOG_LINES: usize = 100;

pub struct Worker {
    context: Arc<HostContext>,
    manager: Arc<dyn ServiceManager>,
    trace: Tracing,
}

impl Worker {
    pub fn new(context: Arc<HostContext>, manager: Arc<dyn ServiceManager>) -> Self {
        let trace = context.get_trace("DashboardWorker");
        Self {
            context,
            manager,
            trace,
        }
    }

    /// Serve commands until `Shutdown` or until either side hangs up.
    ///
    /// Refreshes queued while the worker was busy collapse into one.
    pub async fn run(
        self,
        mut commands: UnboundedReceiver<WorkerCommand>,
        responses: UnboundedSender<WorkerResponse>,
    ) {
        let mut pending = VecDeque::new();
        loop {
            let command = match pending.pop_front() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };
            if matches!(command, WorkerCommand::Refresh) {
                drain_refreshes(&mut commands, &mut pending);
            }

            let replies = match command {
                WorkerCommand::Refresh => match self.refresh().await {
                    Ok(runners) => vec![WorkerResponse::RunnersUpdated(runners)],
                    Err(e) => vec![WorkerResponse::ActionComplete {
                        message: format!("Error: {e:#}"),
                    }],
                },
                WorkerCommand::Control { dir, unit, action } => {
                    let message = match self.manager.control(&dir, &unit, action).await {
                        Ok(()) => format!("{} {}", capitalize(action.past_tense()), dir.runner),
                        Err(e) => {
                            self.trace.error_chain(&e);
                            format!("Error: failed to {action} {}: {e:#}", dir.runner)
                        }
                    };
                    let mut replies = Vec::new();
                    if let Ok(runners) = self.refresh().await {
                        replies.push(WorkerResponse::RunnersUpdated(runners));
                    }
                    replies.push(WorkerResponse::ActionComplete { message });
                    replies
                }
                WorkerCommand::FetchLogs { dir, unit } => {
                    let lines = self.logs(&dir, unit.as_deref()).await;
                    vec![WorkerResponse::Logs {
                        runner: dir.runner,
                        lines,
                    }]
                }
                WorkerCommand::Shutdown => break,
            };

            for reply in replies {
                if responses.send(reply).is_err() {
                    return;
                }
            }
        }
        self.trace.verbose("Dashboard worker stopped");
    }

    async fn refresh(&self) -> anyhow::Result<Vec<RunnerStatus>> {
        let dirs = self.context.layout().discover()?;
        Ok(collect_status(self.manager.as_ref(), &dirs, &self.trace).await)
    }

    async fn logs(&self, dir: &RunnerDir, unit: Option<&str>) -> Vec<String> {
        let result = match self.manager.kind() {
            ServiceManagerKind::Launchd => self.file_logs(dir, unit),
            ServiceManagerKind::Systemd | ServiceManagerKind::Auto => match unit {
                Some(unit) => self.journal(unit).await,
                None => Ok(vec![format!("{}: no service installed", dir.runner)]),
            },
        };
        result.unwrap_or_else(|e| vec![format!("Error reading logs: {e:#}")])
    }

    async fn journal(&self, unit: &str) -> anyhow::Result<Vec<String>> {
        let request = SystemdServiceManager::journal_request(&[unit.to_string()], LOG_LINES, false);
        let output = self.context.command_runner().capture(&request).await?;
        if !output.success() {
            anyhow::bail!("journalctl exited with {}: {}", output.exit_code, output.stderr.trim());
        }
        Ok(output.stdout.lines().map(str::to_string).collect())
    }

    fn file_logs(&self, dir: &RunnerDir, label: Option<&str>) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        for file in log_sources(self.context.home_dir(), dir, label) {
            lines.extend(IOUtil::tail_lines(&file, LOG_LINES)?);
        }
        if lines.is_empty() {
            lines.push(format!("{}: no log files found", dir.runner));
        }
        Ok(lines)
    }
}

/// Move queued commands into `pending`, dropping further refreshes.
fn drain_refreshes(
    commands: &mut UnboundedReceiver<WorkerCommand>,
    pending: &mut VecDeque<WorkerCommand>,
) {
    while let Ok(command) = commands.try_recv() {
        if !matches!(command, WorkerCommand::Refresh) {
            pending.push_back(command);
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::Fixture;
    use fleet_common::{OsPlatform, RunnerRef, ServiceAction, ServiceState};
    use fleet_sdk::ProcessOutput;
    use std::fs;
    use tokio::sync::mpsc::unbounded_channel;

    const UNIT: &str = "actions.runner.octo-widgets.widgets-runner-1.service";

    async fn serve(fixture: &Fixture, commands: Vec<WorkerCommand>) -> Vec<WorkerResponse> {
        let manager = fixture.context.service_manager().unwrap();
        let worker = Worker::new(fixture.context.clone(), manager);
        let (command_tx, command_rx) = unbounded_channel();
        let (response_tx, mut response_rx) = unbounded_channel();
        for command in commands {
            command_tx.send(command).unwrap();
        }
        command_tx.send(WorkerCommand::Shutdown).unwrap();
        worker.run(command_rx, response_tx).await;

        let mut responses = Vec::new();
        while let Ok(response) = response_rx.try_recv() {
            responses.push(response);
        }
        responses
    }

    #[tokio::test]
    async fn refresh_reports_discovered_runners() {
        let fixture = Fixture::linux();
        fixture.add_runner("widgets", 1, Some(UNIT));
        fixture
            .runner
            .respond(&format!("systemctl is-active {UNIT}"), ProcessOutput::ok("active\n"));

        let responses = serve(&fixture, vec![WorkerCommand::Refresh]).await;
        match &responses[..] {
            [WorkerResponse::RunnersUpdated(runners)] => {
                assert_eq!(runners.len(), 1);
                assert_eq!(runners[0].state, ServiceState::Active);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_refreshes_then_reports() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, Some(UNIT));

        let responses = serve(
            &fixture,
            vec![WorkerCommand::Control {
                dir,
                unit: UNIT.to_string(),
                action: ServiceAction::Stop,
            }],
        )
        .await;
        assert!(fixture
            .runner
            .command_lines()
            .contains(&format!("sudo systemctl stop {UNIT}")));
        assert!(matches!(responses[0], WorkerResponse::RunnersUpdated(_)));
        match &responses[1] {
            WorkerResponse::ActionComplete { message } => {
                assert_eq!(message, "Stopped widgets-runner-1")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_control_is_an_error_message() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, Some(UNIT));
        fixture.runner.respond(
            &format!("sudo systemctl start {UNIT}"),
            ProcessOutput::failed(1, "Access denied"),
        );

        let responses = serve(
            &fixture,
            vec![WorkerCommand::Control {
                dir,
                unit: UNIT.to_string(),
                action: ServiceAction::Start,
            }],
        )
        .await;
        match responses.last() {
            Some(WorkerResponse::ActionComplete { message }) => {
                assert!(message.starts_with("Error: failed to start widgets-runner-1"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn journal_logs_for_one_unit() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, Some(UNIT));
        fixture
            .runner
            .respond("journalctl", ProcessOutput::ok("one\ntwo\n"));

        let responses = serve(
            &fixture,
            vec![WorkerCommand::FetchLogs {
                dir,
                unit: Some(UNIT.to_string()),
            }],
        )
        .await;
        assert!(fixture
            .runner
            .command_lines()
            .contains(&format!("journalctl -u {UNIT} -n 100 --no-pager -o short-iso")));
        match &responses[..] {
            [WorkerResponse::Logs { runner, lines }] => {
                assert_eq!(runner, &RunnerRef::new("widgets", 1).unwrap());
                assert_eq!(lines, &vec!["one".to_string(), "two".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn launchd_logs_fall_back_to_diag_files() {
        let fixture = Fixture::new(OsPlatform::MacOS, false);
        let dir = fixture.add_runner("widgets", 1, None);
        fs::create_dir_all(dir.diag_dir()).unwrap();
        fs::write(dir.diag_dir().join("Runner_20240101-000000-utc.log"), "booted\n").unwrap();

        let responses = serve(&fixture, vec![WorkerCommand::FetchLogs { dir, unit: None }]).await;
        match &responses[..] {
            [WorkerResponse::Logs { lines, .. }] => assert_eq!(lines, &vec!["booted".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn queued_refreshes_collapse() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, Some(UNIT));

        let mut commands: Vec<WorkerCommand> = (0..5).map(|_| WorkerCommand::Refresh).collect();
        commands.push(WorkerCommand::Control {
            dir,
            unit: UNIT.to_string(),
            action: ServiceAction::Restart,
        });
        commands.extend((0..5).map(|_| WorkerCommand::Refresh));
        let responses = serve(&fixture, commands).await;

        // One merged refresh, then the control with its own refresh.
        assert_eq!(responses.len(), 3);
        assert!(matches!(responses[0], WorkerResponse::RunnersUpdated(_)));
        assert!(matches!(responses[2], WorkerResponse::ActionComplete { .. }));
        let is_active = fixture
            .runner
            .command_lines()
            .iter()
            .filter(|line| line.starts_with("systemctl is-active"))
            .count();
        assert_eq!(is_active, 2);
    }

    #[test]
    fn capitalizes_first_letter() {
        assert_eq!(capitalize("restarted"), "Restarted");
        assert_eq!(capitalize(""), "");
    }
}
