// `health [repo] [--online]`: host and runner checks.

use anyhow::Result;
use fleet_common::constants::return_code;
use fleet_common::{HostContext, Terminal};
use serde::Serialize;
use std::sync::Arc;

use crate::checks::check_extension::CheckResult;
use crate::checks::host_check::{HostInfo, SystemHost};
use crate::checks::{format_check_results, run_all_checks};
use crate::command_settings::HealthArgs;

#[derive(Serialize)]
struct HealthReport<'a> {
    checks: &'a [CheckResult],
    passed: usize,
    failed: usize,
}

pub struct HealthCommand {
    context: Arc<HostContext>,
    host_info: Arc<dyn HostInfo>,
}

impl HealthCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        Self::with_host(context, Arc::new(SystemHost))
    }

    pub fn with_host(context: Arc<HostContext>, host_info: Arc<dyn HostInfo>) -> Self {
        Self { context, host_info }
    }

    pub async fn run(&self, terminal: &Terminal, args: &HealthArgs, json: bool) -> Result<i32> {
        // Broken runners without run.sh are checked too.
        let dirs = self.context.layout().select_index_dirs(args.repo.as_deref())?;
        let results =
            run_all_checks(&self.context, self.host_info.as_ref(), &dirs, args.online).await?;
        let failed = results.iter().filter(|r| !r.passed).count();

        if json {
            let report = HealthReport {
                checks: &results,
                passed: results.len() - failed,
                failed,
            };
            terminal.write_line(&serde_json::to_string_pretty(&report)?);
        } else {
            for line in format_check_results(&results).lines() {
                terminal.write_line(line);
            }
            if dirs.is_empty() {
                terminal.write_empty_line();
                super::write_empty_fleet_hint(terminal, &self.context);
            }
        }

        Ok(if failed > 0 {
            return_code::TERMINATED_ERROR
        } else {
            return_code::SUCCESS
        })
    }
}
