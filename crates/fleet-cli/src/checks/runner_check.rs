// Per-runner checks: agent files, registration, service.

use super::check_extension::CheckResult;
use fleet_common::config_store::ConfigurationStore;
use fleet_common::service::resolve_unit;
use fleet_common::{RunnerDir, ServiceManager, ServiceState, Tracing};

/// Checks for one runner. Service checks are skipped when `manager` is `None`.
pub async fn check_runner(
    dir: &RunnerDir,
    manager: Option<&dyn ServiceManager>,
    listing: &[String],
    trace: &Tracing,
) -> Vec<CheckResult> {
    let runner = &dir.runner;
    let mut results = vec![agent_files(dir), registration(dir)];

    let Some(manager) = manager else {
        return results;
    };

    let name = format!("{runner}: service");
    let Some(unit) = resolve_unit(dir, listing, trace) else {
        results.push(CheckResult::fail(
            name,
            "Check that a service is installed",
            "no service found; run setup again or install it with svc.sh",
        ));
        return results;
    };
    results.push(CheckResult::pass(name, "Check that a service is installed").with_detail(unit.clone()));

    let name = format!("{runner}: running");
    let description = "Check that the service is active";
    results.push(match manager.state(&unit).await {
        Ok(ServiceState::Active) => CheckResult::pass(name, description),
        Ok(state) => CheckResult::fail(name, description, format!("{unit} is {state}")),
        Err(e) => CheckResult::fail(name, description, format!("{e:#}")),
    });
    results
}

fn agent_files(dir: &RunnerDir) -> CheckResult {
    let name = format!("{}: agent files", dir.runner);
    let description = "Check that run.sh and config.sh are present";
    let missing: Vec<String> = [dir.run_script(), dir.config_script()]
        .iter()
        .filter(|p| !p.is_file())
        .filter_map(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
        .collect();
    if missing.is_empty() {
        CheckResult::pass(name, description)
    } else {
        CheckResult::fail(name, description, format!("missing {}", missing.join(", ")))
    }
}

fn registration(dir: &RunnerDir) -> CheckResult {
    let name = format!("{}: registered", dir.runner);
    let description = "Check that the agent's .runner file is readable";
    match ConfigurationStore::load_runner_settings(&dir.path) {
        Ok(settings) if !settings.agent_name.is_empty() => {
            CheckResult::pass(name, description).with_detail(format!("agent {}", settings.agent_name))
        }
        Ok(_) => CheckResult::pass(name, description),
        Err(e) => CheckResult::fail(name, description, format!("{e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::Fixture;
    use fleet_sdk::ProcessOutput;
    use std::fs;

    const UNIT: &str = "actions.runner.octo-widgets.widgets-runner-1.service";

    #[tokio::test]
    async fn healthy_runner_passes_everything() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, Some(UNIT));
        fixture
            .runner
            .respond(&format!("systemctl is-active {UNIT}"), ProcessOutput::ok("active\n"));
        let manager = fixture.context.service_manager().unwrap();
        let trace = fixture.context.get_trace("Test");

        let results = check_runner(&dir, Some(manager.as_ref()), &[], &trace).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.passed), "{results:?}");
        assert_eq!(results[1].detail.as_deref(), Some("agent widgets-runner-1"));
        assert_eq!(results[2].detail.as_deref(), Some(UNIT));
    }

    #[tokio::test]
    async fn broken_runner_reports_each_problem() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, None);
        fs::remove_file(dir.config_script()).unwrap();
        fs::write(dir.settings_file(), "not json").unwrap();
        let manager = fixture.context.service_manager().unwrap();
        let trace = fixture.context.get_trace("Test");

        let results = check_runner(&dir, Some(manager.as_ref()), &[], &trace).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].detail.as_deref(), Some("missing config.sh"));
        assert!(!results[1].passed);
        assert!(!results[2].passed);
        assert_eq!(results[2].name, "widgets-runner-1: service");
    }

    #[tokio::test]
    async fn inactive_service_fails() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, None);
        fixture.runner.respond(
            &format!("systemctl is-active {UNIT}"),
            ProcessOutput {
                exit_code: 3,
                stdout: "failed\n".into(),
                stderr: String::new(),
            },
        );
        let manager = fixture.context.service_manager().unwrap();
        let trace = fixture.context.get_trace("Test");

        let results = check_runner(&dir, Some(manager.as_ref()), &[UNIT.to_string()], &trace).await;
        assert_eq!(results[3].detail.as_deref(), Some(&*format!("{UNIT} is failed")));
    }

    #[tokio::test]
    async fn without_manager_only_files_are_checked() {
        let fixture = Fixture::linux();
        let dir = fixture.add_runner("widgets", 1, None);
        let trace = fixture.context.get_trace("Test");
        assert_eq!(check_runner(&dir, None, &[], &trace).await.len(), 2);
    }
}
