// Fleet: the command dispatcher.
// Routes a parsed command line to its command and returns the exit code.

use anyhow::Result;
use fleet_common::{HostContext, ServiceAction, Terminal, Tracing};
use fleet_sdk::TraceWriter;
use std::sync::Arc;

use crate::command_settings::{Command, CommandSettings};
use crate::commands::config::SettingsCommand;
use crate::commands::control::ControlCommand;
use crate::commands::health::HealthCommand;
use crate::commands::logs::LogsCommand;
use crate::commands::remove::RemoveCommand;
use crate::commands::setup::SetupCommand;
use crate::commands::status::StatusCommand;
use crate::dashboard;

pub struct Fleet {
    context: Arc<HostContext>,
    terminal: Terminal,
    trace: Tracing,
}

impl Fleet {
    pub fn new(context: Arc<HostContext>, terminal: Terminal) -> Self {
        let trace = context.get_trace("Fleet");
        Self {
            context,
            terminal,
            trace,
        }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub async fn execute_command(&self, settings: CommandSettings) -> Result<i32> {
        self.trace.info(&format!(
            "Executing '{}' under {}",
            settings.command.name(),
            self.context.root().display()
        ));

        let json = settings.json;
        let context = self.context.clone();
        let terminal = &self.terminal;
        match settings.command {
            Command::Setup(args) => SetupCommand::new(context).run(terminal, &args).await,
            Command::Start(target) => {
                ControlCommand::new(context, ServiceAction::Start).run(terminal, &target).await
            }
            Command::Stop(target) => {
                ControlCommand::new(context, ServiceAction::Stop).run(terminal, &target).await
            }
            Command::Restart(target) => {
                ControlCommand::new(context, ServiceAction::Restart).run(terminal, &target).await
            }
            Command::Status(args) => StatusCommand::new(context).run(terminal, &args, json).await,
            Command::Logs(args) => LogsCommand::new(context).run(terminal, &args).await,
            Command::Remove(args) => RemoveCommand::new(context).run(terminal, &args).await,
            Command::Health(args) => HealthCommand::new(context).run(terminal, &args, json).await,
            Command::Dashboard => dashboard::run(context).await,
            Command::Config(command) => SettingsCommand::new(context).run(terminal, &command, json),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use fleet_common::{OsPlatform, SecretMasker};
    use fleet_sdk::ScriptedCommandRunner;
    use std::path::PathBuf;

    fn fleet() -> (tempfile::TempDir, Fleet) {
        let root = tempfile::tempdir().unwrap();
        let ctx = HostContext::with_command_runner(
            root.path().to_path_buf(),
            Arc::new(ScriptedCommandRunner::new()),
            OsPlatform::Linux,
            false,
            PathBuf::from("/home/tester"),
        );
        let terminal = Terminal::scripted(SecretMasker::new(), Vec::<String>::new());
        (root, Fleet::new(ctx, terminal))
    }

    #[tokio::test]
    async fn empty_fleet_status_succeeds() {
        let (_root, fleet) = fleet();
        let settings = CommandSettings::try_parse_from(["runner-fleet", "status"]).unwrap();
        assert_eq!(fleet.execute_command(settings).await.unwrap(), 0);
        assert!(fleet
            .terminal()
            .captured_lines()
            .iter()
            .any(|l| l.contains("No runners")));
    }

    #[tokio::test]
    async fn unknown_repository_is_an_error() {
        let (_root, fleet) = fleet();
        let settings = CommandSettings::try_parse_from(["runner-fleet", "stop", "widgets"]).unwrap();
        assert!(fleet.execute_command(settings).await.is_err());
    }
}
