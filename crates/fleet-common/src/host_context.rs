// The context every command runs in: where the fleet lives, who is running
// it, how subprocesses are spawned and where traces go.

use crate::config_store::{ConfigurationStore, FleetSettings, ServiceManagerKind};
use crate::constants::{path, variables, OsPlatform, CURRENT_PLATFORM};
use crate::error::FleetError;
use crate::layout::FleetLayout;
use crate::secret_masker::SecretMasker;
use crate::service::{LaunchdServiceManager, ServiceManager, SystemdServiceManager};
use crate::tracing::{TraceManager, TraceSetting, Tracing};

use anyhow::{Context, Result};
use fleet_sdk::{CommandRunner, ProcessInvoker, StringUtil, TraceWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared state handed to every command.
///
/// Holds the fleet root and its layout, the secret masker shared by all trace
/// sources, and the [`CommandRunner`] used for every subprocess.
pub struct HostContext {
    layout: FleetLayout,
    secret_masker: SecretMasker,
    trace_manager: TraceManager,
    command_runner: Arc<dyn CommandRunner>,
    config_store: ConfigurationStore,
    platform: OsPlatform,
    is_root: bool,
    user_name: Option<String>,
    home_dir: PathBuf,
}

impl HostContext {
    /// A context for the real host rooted at `root`.
    pub fn new(root: PathBuf) -> Result<Arc<Self>> {
        let home_dir = dirs::home_dir().context("Could not determine the home directory")?;
        let print_to_stdout = std::env::var(variables::PRINT_LOG_TO_STDOUT)
            .ok()
            .and_then(|v| StringUtil::convert_to_bool(&v))
            .unwrap_or(false);

        let secret_masker = SecretMasker::new();
        let trace_manager = TraceManager::new(
            secret_masker.clone(),
            TraceSetting {
                print_to_stdout,
                ..TraceSetting::default()
            },
        );
        let invoker_trace: Arc<dyn TraceWriter> = Arc::new(trace_manager.get("ProcessInvoker"));
        let command_runner: Arc<dyn CommandRunner> = Arc::new(ProcessInvoker::new(invoker_trace));

        let context = Self::assemble(
            root,
            secret_masker,
            trace_manager,
            command_runner,
            CURRENT_PLATFORM,
            current_user_is_root(),
            current_user_name(),
            home_dir,
        );
        context.get_trace("HostContext").verbose(&format!(
            "root={} platform={} root_user={}",
            context.root().display(),
            context.platform,
            context.is_root
        ));
        Ok(Arc::new(context))
    }

    /// A context with an injected command runner and host identity.
    pub fn with_command_runner(
        root: PathBuf,
        command_runner: Arc<dyn CommandRunner>,
        platform: OsPlatform,
        is_root: bool,
        home_dir: PathBuf,
    ) -> Arc<Self> {
        let secret_masker = SecretMasker::new();
        let trace_manager = TraceManager::new(secret_masker.clone(), TraceSetting::default());
        Arc::new(Self::assemble(
            root,
            secret_masker,
            trace_manager,
            command_runner,
            platform,
            is_root,
            Some("tester".to_string()),
            home_dir,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        root: PathBuf,
        secret_masker: SecretMasker,
        trace_manager: TraceManager,
        command_runner: Arc<dyn CommandRunner>,
        platform: OsPlatform,
        is_root: bool,
        user_name: Option<String>,
        home_dir: PathBuf,
    ) -> Self {
        Self {
            config_store: ConfigurationStore::new(&root),
            layout: FleetLayout::new(root),
            secret_masker,
            trace_manager,
            command_runner,
            platform,
            is_root,
            user_name,
            home_dir,
        }
    }

    /// `~/action-runners`.
    pub fn default_root() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine the home directory")?;
        Ok(home.join(path::DEFAULT_ROOT_DIRECTORY))
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &FleetLayout {
        &self.layout
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }

    pub fn get_trace(&self, name: &str) -> Tracing {
        self.trace_manager.get(name)
    }

    pub fn command_runner(&self) -> Arc<dyn CommandRunner> {
        self.command_runner.clone()
    }

    pub fn config_store(&self) -> &ConfigurationStore {
        &self.config_store
    }

    pub fn settings(&self) -> Result<FleetSettings> {
        self.config_store.get_settings()
    }

    pub fn platform(&self) -> OsPlatform {
        self.platform
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// The service manager kind in effect: the configured one, or the
    /// platform's own for `auto`.
    pub fn service_manager_kind(&self) -> Result<ServiceManagerKind> {
        match self.settings()?.service_manager {
            ServiceManagerKind::Auto => match self.platform {
                OsPlatform::Linux => Ok(ServiceManagerKind::Systemd),
                OsPlatform::MacOS => Ok(ServiceManagerKind::Launchd),
                OsPlatform::Unsupported => Err(FleetError::UnsupportedPlatform(format!(
                    "no service manager for {}",
                    std::env::consts::OS
                ))
                .into()),
            },
            explicit => Ok(explicit),
        }
    }

    pub fn service_manager(&self) -> Result<Arc<dyn ServiceManager>> {
        let manager: Arc<dyn ServiceManager> = match self.service_manager_kind()? {
            ServiceManagerKind::Launchd => Arc::new(LaunchdServiceManager::new(
                self.command_runner(),
                self.home_dir.clone(),
                self.get_trace("Launchd"),
            )),
            // service_manager_kind never yields Auto.
            ServiceManagerKind::Systemd | ServiceManagerKind::Auto => {
                Arc::new(SystemdServiceManager::new(
                    self.command_runner(),
                    !self.is_root,
                    self.get_trace("Systemd"),
                ))
            }
        };
        Ok(manager)
    }
}

#[cfg(unix)]
fn current_user_is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn current_user_is_root() -> bool {
    false
}

fn current_user_name() -> Option<String> {
    if let Some(name) = std::env::var("USER").ok().filter(|n| !n.is_empty()) {
        return Some(name);
    }
    #[cfg(unix)]
    {
        if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::geteuid()) {
            return Some(user.name);
        }
    }
    None
}
