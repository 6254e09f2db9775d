// `remove <repo> [index]`: stop, uninstall, deregister and delete runners.
// Every step is best effort except deleting the directory.

use anyhow::Result;
use fleet_common::constants::return_code;
use fleet_common::service::resolve_unit;
use fleet_common::{HostContext, RunnerDir, ServiceAction, ServiceManager, Terminal, Tracing};
use fleet_sdk::{IOUtil, TraceWriter};
use std::sync::Arc;

use crate::command_settings::RemoveArgs;
use crate::configuration::PromptManager;
use crate::installer::RunnerInstaller;

pub struct RemoveCommand {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl RemoveCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Remove");
        Self { context, trace }
    }

    pub async fn run(&self, terminal: &Terminal, args: &RemoveArgs) -> Result<i32> {
        let layout = self.context.layout();
        let dirs = layout.select(Some(&args.repo), args.index)?;
        let prompts = PromptManager::new(terminal, args.unattended);

        if !dirs.is_empty() && !args.yes {
            let names: Vec<String> = dirs.iter().map(|d| d.runner.runner_name()).collect();
            let question = format!("Remove {} ({})?", names.join(", "), layout.repo_dir(&args.repo).display());
            if !prompts.prompt_yes_no(&question, false)? {
                terminal.write_line("Nothing removed.");
                return Ok(return_code::TERMINATED_ERROR);
            }
        }

        let token = match args.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Some(token.to_string()),
            None if dirs.is_empty() || args.unattended => None,
            None => Some(prompts.prompt_secret("Removal token")?),
        };
        match token.as_deref() {
            Some(token) => self.context.secret_masker().add_value(token),
            None if !dirs.is_empty() => terminal.write_warning(
                "No removal token: runners are deleted locally but stay registered on GitHub",
            ),
            None => {}
        }

        let manager = match self.context.service_manager() {
            Ok(manager) => Some(manager),
            Err(e) => {
                terminal.write_warning(&format!("Services cannot be managed here: {e:#}"));
                None
            }
        };
        let listing = match manager.as_deref() {
            Some(manager) => manager.list_units().await.unwrap_or_else(|e| {
                self.trace.warning(&format!("Could not list services: {e:#}"));
                Vec::new()
            }),
            None => Vec::new(),
        };

        let installer = RunnerInstaller::new(self.context.clone());
        let mut failed = 0usize;
        for dir in &dirs {
            terminal.write_section(&format!("Removing {}", dir.runner));
            if let Some(manager) = manager.as_deref() {
                self.remove_service(terminal, manager, dir, &listing).await;
            }
            if let Some(token) = token.as_deref() {
                match installer.deregister(dir, token).await {
                    Ok(()) => terminal.write_success_message("deregistered from GitHub"),
                    Err(e) => terminal.write_warning(&format!("{e:#}")),
                }
            }
            match IOUtil::delete_directory(&dir.path) {
                Ok(()) => terminal.write_success_message(&format!("deleted {}", dir.path.display())),
                Err(e) => {
                    failed += 1;
                    terminal.write_error(&format!("Failed to delete {}: {e:#}", dir.path.display()));
                }
            }
        }

        layout.clear_stale_staging(&args.repo)?;
        if layout.remove_repo_if_empty(&args.repo)? {
            terminal.write_success_message(&format!(
                "deleted {} (no runners left)",
                layout.repo_dir(&args.repo).display()
            ));
        }

        terminal.write_empty_line();
        terminal.write_line(&format!("{} of {} runner(s) removed", dirs.len() - failed, dirs.len()));
        Ok(if failed > 0 {
            return_code::TERMINATED_ERROR
        } else {
            return_code::SUCCESS
        })
    }

    async fn remove_service(
        &self,
        terminal: &Terminal,
        manager: &dyn ServiceManager,
        dir: &RunnerDir,
        listing: &[String],
    ) {
        let Some(unit) = resolve_unit(dir, listing, &self.trace) else {
            self.trace.info(&format!("{}: no service installed", dir.runner));
            return;
        };
        if let Err(e) = manager.control(dir, &unit, ServiceAction::Stop).await {
            terminal.write_warning(&format!("Could not stop {unit}: {e:#}"));
        }
        match manager.uninstall(dir).await {
            Ok(()) => terminal.write_success_message(&format!("uninstalled {unit}")),
            Err(e) => terminal.write_warning(&format!("{e:#}")),
        }
    }
}
