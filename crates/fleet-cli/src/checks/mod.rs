// Health checks for the host and each runner.

pub mod check_extension;
pub mod host_check;
pub mod runner_check;

use check_extension::CheckResult;
use host_check::HostInfo;
use fleet_common::{HostContext, RunnerDir, ServiceManager};
use fleet_sdk::TraceWriter;

/// Run host checks, then per-runner checks for `dirs`.
pub async fn run_all_checks(
    context: &HostContext,
    host_info: &dyn HostInfo,
    dirs: &[RunnerDir],
    online: bool,
) -> anyhow::Result<Vec<CheckResult>> {
    let trace = context.get_trace("Health");
    let settings = context.settings()?;
    let mut results = Vec::new();

    let manager = match context.service_manager() {
        Ok(manager) => {
            trace.info("Running service tools check...");
            results.push(host_check::tool_check(host_info, manager.required_tools()));
            Some(manager)
        }
        Err(e) => {
            results.push(CheckResult::fail(
                "Service manager",
                "Check that runner services can be managed on this host",
                format!("{e:#}"),
            ));
            None
        }
    };

    trace.info("Running disk space check...");
    results.push(host_check::disk_check(host_info, context.root(), settings.min_free_disk_gb));

    if online {
        trace.info("Running GitHub API check...");
        results.push(host_check::online_check().await);
    }

    let manager: Option<&dyn ServiceManager> = manager.as_deref();
    let listing = match manager {
        Some(manager) => manager.list_units().await.unwrap_or_else(|e| {
            trace.warning(&format!("Could not list services: {e:#}"));
            Vec::new()
        }),
        None => Vec::new(),
    };
    for dir in dirs {
        trace.info(&format!("Checking {}...", dir.runner));
        results.extend(runner_check::check_runner(dir, manager, &listing, &trace).await);
    }
    Ok(results)
}

/// Format check results for display.
pub fn format_check_results(results: &[CheckResult]) -> String {
    let mut output = String::new();
    output.push_str("----------------------------------------------\n");
    output.push_str("  Runner Fleet Health Checks\n");
    output.push_str("----------------------------------------------\n\n");

    for result in results {
        let status = if result.passed { "Pass" } else { "Fail" };
        output.push_str(&format!("  [{status}] {}\n", result.name));
        if !result.description.is_empty() {
            output.push_str(&format!("        {}\n", result.description));
        }
        if let Some(ref detail) = result.detail {
            output.push_str(&format!("        {detail}\n"));
        }
        output.push('\n');
    }

    let passed = results.iter().filter(|r| r.passed).count();
    output.push_str(&format!("  {passed} passed, {} failed\n", results.len() - passed));
    output.push_str("----------------------------------------------");
    output
}
