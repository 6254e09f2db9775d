// `setup <repo> [count]`: download, register and install new runners.
//
// Each runner is built in a hidden staging directory that only becomes
// `<root>/<repo>/<index>` once registration succeeded.

use anyhow::Result;
use fleet_common::constants::{return_code, CURRENT_ARCHITECTURE};
use fleet_common::github_url::split_owner_repo;
use fleet_common::layout::validate_repo_name;
use fleet_common::{
    FleetError, FleetSettings, HostContext, RepositoryUrl, RunnerDir, RunnerRef, ServiceManager,
    StagingDir, Terminal, Tracing,
};
use fleet_sdk::{StringUtil, TraceWriter};
use std::path::Path;
use std::sync::Arc;

use crate::command_settings::SetupArgs;
use crate::configuration::validators;
use crate::configuration::PromptManager;
use crate::installer::{Registration, ReleaseArchive, RunnerInstaller};

/// Everything resolved from arguments, environment and settings before any
/// runner is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupPlan {
    pub repo: String,
    pub url: String,
    pub labels: Vec<String>,
    pub version: String,
    pub sha256: Option<String>,
    pub indexes: Vec<u32>,
}

pub struct SetupCommand {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl SetupCommand {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("Setup");
        Self { context, trace }
    }

    /// Validate input and pick indexes. Fails before anything is written.
    pub fn plan(&self, args: &SetupArgs, settings: &FleetSettings) -> Result<SetupPlan> {
        let (owner_in_repo, repo) = split_owner_repo(&args.repo)?;
        validate_repo_name(&repo)?;
        validators::validate_count(args.count)?;

        let url = match args.url.as_deref() {
            Some(url) => RepositoryUrl::parse(url)?,
            None => {
                let owner = owner_in_repo
                    .or_else(|| args.owner.clone())
                    .or_else(|| settings.owner.clone())
                    .ok_or_else(|| {
                        FleetError::usage(format!(
                            "No owner for '{repo}': use <owner>/{repo}, --owner or --url"
                        ))
                    })?;
                RepositoryUrl::for_repository(&owner, &repo)?
            }
        };

        let mut labels = settings.labels.clone();
        for label in args.labels.as_deref().map(StringUtil::split_list).unwrap_or_default() {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        validators::validate_labels(&labels)?;

        let version = validators::validate_version(
            args.runner_version.as_deref().unwrap_or(&settings.runner_version),
        )?;
        let sha256 = args
            .sha256
            .as_deref()
            .map(validators::validate_sha256)
            .transpose()?;

        let indexes = self
            .context
            .layout()
            .plan_indexes(&repo, args.count, args.start_index)?;

        Ok(SetupPlan {
            repo,
            url: url.as_str().to_string(),
            labels,
            version,
            sha256,
            indexes,
        })
    }

    pub async fn run(&self, terminal: &Terminal, args: &SetupArgs) -> Result<i32> {
        let settings = self.context.settings()?;
        let plan = self.plan(args, &settings)?;
        self.trace.verbose_object(&serde_json::json!({
            "repo": plan.repo,
            "url": plan.url,
            "labels": plan.labels,
            "version": plan.version,
            "indexes": plan.indexes,
        }));

        let manager = if args.no_service {
            None
        } else {
            Some(self.context.service_manager()?)
        };
        let archive = ReleaseArchive::new(&plan.version, self.context.platform(), CURRENT_ARCHITECTURE)?;

        let token = match args.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => PromptManager::new(terminal, args.unattended).prompt_secret("Registration token")?,
        };
        self.context.secret_masker().add_value(&token);

        let layout = self.context.layout();
        let stale = layout.clear_stale_staging(&plan.repo)?;
        if stale > 0 {
            self.trace.info(&format!("Removed {stale} stale staging directories"));
        }

        terminal.write_section(&format!(
            "Setting up {} runner(s) for {}",
            plan.indexes.len(),
            plan.url
        ));
        let installer = RunnerInstaller::new(self.context.clone());
        let archive_path = installer
            .ensure_archive(&archive, plan.sha256.as_deref())
            .await?;
        terminal.write_success_message(&format!("Runner {} ready", archive.file_name()));

        let mut created = 0usize;
        for &index in &plan.indexes {
            let runner = RunnerRef::new(&plan.repo, index)?;
            let result = self
                .create_runner(
                    terminal,
                    &installer,
                    &archive_path,
                    &plan,
                    &runner,
                    &token,
                    manager.as_deref(),
                    &settings,
                )
                .await;
            match result {
                Ok(()) => created += 1,
                Err(e) => {
                    self.trace.error_chain(&e);
                    terminal.write_error(&format!("{runner}: {e:#}"));
                }
            }
        }

        terminal.write_empty_line();
        if created == plan.indexes.len() {
            terminal.write_success_message(&format!("{created} runner(s) set up for {}", plan.repo));
            Ok(return_code::SUCCESS)
        } else {
            terminal.write_error(&format!(
                "{created} of {} runner(s) set up for {}",
                plan.indexes.len(),
                plan.repo
            ));
            Ok(return_code::TERMINATED_ERROR)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_runner(
        &self,
        terminal: &Terminal,
        installer: &RunnerInstaller,
        archive_path: &Path,
        plan: &SetupPlan,
        runner: &RunnerRef,
        token: &str,
        manager: Option<&dyn ServiceManager>,
        settings: &FleetSettings,
    ) -> Result<()> {
        terminal.write_line(&format!("{runner}: installing agent"));
        let staging = StagingDir::create(self.context.layout(), runner)?;
        installer.install_archive(archive_path, staging.path())?;

        let registration = Registration {
            url: &plan.url,
            token,
            name: runner.runner_name(),
            labels: &plan.labels,
        };
        installer.register(staging.path(), &registration).await?;
        let path = staging.commit()?;
        terminal.write_success_message(&format!("{runner}: registered"));

        let Some(manager) = manager else {
            return Ok(());
        };
        let dir = RunnerDir {
            runner: runner.clone(),
            path,
        };
        let user = settings
            .service_user
            .as_deref()
            .or_else(|| self.context.user_name());
        match manager.install(&dir, user).await {
            Ok(()) => terminal.write_success_message(&format!("{runner}: service installed and started")),
            Err(e) => terminal.write_warning(&format!(
                "{runner}: registered but the service could not be installed: {e:#}"
            )),
        }
        Ok(())
    }
}
