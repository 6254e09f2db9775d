// `status [repo]`: every runner with its service and state.

use anyhow::Result;
use fleet_common::constants::return_code;
use fleet_common::service::collect_status;
use fleet_common::{HostContext, RunnerStatus, ServiceState, Terminal, Tracing};
use serde::Serialize;
use std::sync::Arc;

use crate::command_settings::StatusArgs;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub failed: usize,
    pub total: usize,
}

impl StatusCounts {
    pub fn of(statuses: &[RunnerStatus]) -> Self {
        Self {
            active: statuses.iter().filter(|s| s.state == ServiceState::Active).count(),
            failed: statuses.iter().filter(|s| s.state == ServiceState::Failed).count(),
            total: statuses.len(),
        }
    }
}

#[derive(Serialize)]
struct StatusReport<'a> {
    runners: &'a [RunnerStatus],
    counts: StatusCounts,
}

pub struct StatusCommand {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl StatusCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Status");
        Self { context, trace }
    }

    pub async fn run(&self, terminal: &Terminal, args: &StatusArgs, json: bool) -> Result<i32> {
        let dirs = self.context.layout().select(args.repo.as_deref(), None)?;
        let statuses = if dirs.is_empty() {
            Vec::new()
        } else {
            let manager = self.context.service_manager()?;
            collect_status(manager.as_ref(), &dirs, &self.trace).await
        };
        let counts = StatusCounts::of(&statuses);

        if json {
            let report = StatusReport {
                runners: &statuses,
                counts,
            };
            terminal.write_line(&serde_json::to_string_pretty(&report)?);
            return Ok(return_code::SUCCESS);
        }

        if statuses.is_empty() {
            super::write_empty_fleet_hint(terminal, &self.context);
            return Ok(return_code::SUCCESS);
        }

        for line in format_status_table(&statuses) {
            terminal.write_line(&line);
        }
        terminal.write_empty_line();
        terminal.write_line(&format!(
            "{} active, {} failed, {} total",
            counts.active, counts.failed, counts.total
        ));
        Ok(return_code::SUCCESS)
    }
}

/// Left-aligned columns sized to their widest cell.
pub fn format_status_table(statuses: &[RunnerStatus]) -> Vec<String> {
    let header = ["REPOSITORY", "INDEX", "RUNNER", "STATE", "SERVICE"];
    let rows: Vec<[String; 5]> = statuses
        .iter()
        .map(|s| {
            [
                s.runner.repo.clone(),
                s.runner.index.to_string(),
                s.name.clone(),
                format!("{} {}", s.state.symbol(), s.state),
                s.service.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(header.to_vec())];
    lines.extend(rows.iter().map(|row| render(row.iter().map(String::as_str).collect())));
    lines
}
