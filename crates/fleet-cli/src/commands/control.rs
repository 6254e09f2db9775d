// `start | stop | restart [repo] [index]`.
// Best effort: every selected runner is attempted, failures are counted.

use anyhow::Result;
use fleet_common::constants::return_code;
use fleet_common::service::resolve_unit;
use fleet_common::{HostContext, RunnerDir, ServiceAction, ServiceManager, Terminal, Tracing};
use fleet_sdk::TraceWriter;
use std::sync::Arc;

use crate::command_settings::TargetArgs;

/// Outcome counts of one control run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct ControlCommand {
    context: Arc<HostContext>,
    action: ServiceAction,
    trace: Tracing,
}

impl ControlCommand {
    pub fn new(context: Arc<HostContext>, action: ServiceAction) -> Self {
        let trace = context.get_trace("Control");
        Self {
            context,
            action,
            trace,
        }
    }

    pub async fn run(&self, terminal: &Terminal, target: &TargetArgs) -> Result<i32> {
        let dirs = self
            .context
            .layout()
            .select(target.repo.as_deref(), target.index)?;
        if dirs.is_empty() {
            super::write_empty_fleet_hint(terminal, &self.context);
            return Ok(return_code::SUCCESS);
        }

        let manager = self.context.service_manager()?;
        let summary = control_runners(manager.as_ref(), &dirs, self.action, terminal, &self.trace).await;

        terminal.write_empty_line();
        let verb = self.action.past_tense();
        let mut line = format!("{} {verb}", summary.succeeded);
        if summary.failed > 0 {
            line.push_str(&format!(", {} failed", summary.failed));
        }
        if summary.skipped > 0 {
            line.push_str(&format!(", {} skipped (no service)", summary.skipped));
        }
        terminal.write_line(&line);

        Ok(if summary.failed > 0 {
            return_code::TERMINATED_ERROR
        } else {
            return_code::SUCCESS
        })
    }
}

/// Apply `action` to each runner's service in turn.
pub async fn control_runners(
    manager: &dyn ServiceManager,
    dirs: &[RunnerDir],
    action: ServiceAction,
    terminal: &Terminal,
    trace: &Tracing,
) -> ControlSummary {
    let listing = match manager.list_units().await {
        Ok(units) => units,
        Err(e) => {
            terminal.write_warning(&format!("Could not list {} services: {e:#}", manager.kind()));
            Vec::new()
        }
    };

    let mut summary = ControlSummary::default();
    for dir in dirs {
        let Some(unit) = resolve_unit(dir, &listing, trace) else {
            terminal.write_warning(&format!("{}: no service installed, skipping", dir.runner));
            summary.skipped += 1;
            continue;
        };
        match manager.control(dir, &unit, action).await {
            Ok(()) => {
                terminal.write_success_message(&format!("{} {}", action.past_tense(), dir.runner));
                summary.succeeded += 1;
            }
            Err(e) => {
                trace.error_chain(&e);
                terminal.write_error(&format!("Failed to {action} {}: {e:#}", dir.runner));
                summary.failed += 1;
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::Fixture;
    use fleet_common::OsPlatform;
    use fleet_sdk::ProcessOutput;

    const UNIT_1: &str = "actions.runner.octo-widgets.widgets-runner-1.service";
    const UNIT_2: &str = "actions.runner.octo-widgets.widgets-runner-2.service";

    fn target(repo: Option<&str>, index: Option<u32>) -> TargetArgs {
        TargetArgs {
            repo: repo.map(str::to_string),
            index,
        }
    }

    #[tokio::test]
    async fn stop_all_uses_sudo_systemctl() {
        let fixture = Fixture::linux();
        fixture.add_runner("widgets", 1, Some(UNIT_1));
        fixture.add_runner("widgets", 2, Some(UNIT_2));
        let terminal = fixture.terminal(&[]);

        let code = ControlCommand::new(fixture.context.clone(), ServiceAction::Stop)
            .run(&terminal, &target(None, None))
            .await
            .unwrap();
        assert_eq!(code, 0);
        let lines = fixture.runner.command_lines();
        assert!(lines.contains(&format!("sudo systemctl stop {UNIT_1}")));
        assert!(lines.contains(&format!("sudo systemctl stop {UNIT_2}")));
        assert_eq!(terminal.captured_lines().last().unwrap(), "2 stopped");
    }

    #[tokio::test]
    async fn root_restarts_one_runner_without_sudo() {
        let fixture = Fixture::new(OsPlatform::Linux, true);
        fixture.add_runner("widgets", 1, Some(UNIT_1));
        fixture.add_runner("widgets", 2, Some(UNIT_2));
        let terminal = fixture.terminal(&[]);

        ControlCommand::new(fixture.context.clone(), ServiceAction::Restart)
            .run(&terminal, &target(Some("widgets"), Some(2)))
            .await
            .unwrap();
        let controls: Vec<String> = fixture
            .runner
            .command_lines()
            .into_iter()
            .filter(|l| l.starts_with("systemctl restart"))
            .collect();
        assert_eq!(controls, vec![format!("systemctl restart {UNIT_2}")]);
    }

    #[tokio::test]
    async fn runner_without_service_is_skipped() {
        let fixture = Fixture::linux();
        fixture.add_runner("widgets", 1, None);
        fixture.add_runner("widgets", 10, Some("actions.runner.octo-widgets.widgets-runner-10.service"));
        let terminal = fixture.terminal(&[]);

        let code = ControlCommand::new(fixture.context.clone(), ServiceAction::Start)
            .run(&terminal, &target(Some("widgets"), None))
            .await
            .unwrap();
        assert_eq!(code, 0);
        let output = terminal.captured_lines();
        assert!(output.contains(&"! widgets-runner-1: no service installed, skipping".to_string()));
        assert_eq!(output.last().unwrap(), "1 started, 1 skipped (no service)");
    }

    #[tokio::test]
    async fn failures_continue_and_exit_one() {
        let fixture = Fixture::linux();
        fixture.add_runner("widgets", 1, Some(UNIT_1));
        fixture.add_runner("widgets", 2, Some(UNIT_2));
        fixture.runner.respond(
            &format!("sudo systemctl start {UNIT_1}"),
            ProcessOutput::failed(5, "Unit not loaded"),
        );
        let terminal = fixture.terminal(&[]);

        let code = ControlCommand::new(fixture.context.clone(), ServiceAction::Start)
            .run(&terminal, &target(None, None))
            .await
            .unwrap();
        assert_eq!(code, 1);
        assert!(fixture
            .runner
            .command_lines()
            .contains(&format!("sudo systemctl start {UNIT_2}")));
        assert_eq!(terminal.captured_lines().last().unwrap(), "1 started, 1 failed");
    }

    #[tokio::test]
    async fn invalid_service_file_is_never_executed() {
        let fixture = Fixture::new(OsPlatform::Linux, true);
        fixture.add_runner("widgets", 1, Some("actions.runner.x;reboot"));
        let terminal = fixture.terminal(&[]);

        ControlCommand::new(fixture.context.clone(), ServiceAction::Stop)
            .run(&terminal, &target(Some("widgets"), Some(1)))
            .await
            .unwrap();
        assert!(fixture
            .runner
            .command_lines()
            .iter()
            .all(|l| !l.starts_with("systemctl stop")));
    }

    #[tokio::test]
    async fn missing_runner_is_an_error() {
        let fixture = Fixture::linux();
        fixture.add_runner("widgets", 1, Some(UNIT_1));
        let terminal = fixture.terminal(&[]);
        assert!(ControlCommand::new(fixture.context.clone(), ServiceAction::Stop)
            .run(&terminal, &target(Some("widgets"), Some(3)))
            .await
            .is_err());
    }
}
