// Configuration files: runner-fleet's own `.fleet` settings plus read-only
// access to the files the agent writes into each runner directory.

use crate::constants::{config_file, release};
use crate::error::FleetError;

use anyhow::{Context, Result};
use fleet_sdk::{IOUtil, StringUtil};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// FleetSettings
// ---------------------------------------------------------------------------

/// Which host service manager drives the runners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceManagerKind {
    /// Pick from the platform: systemd on Linux, launchd on macOS.
    #[default]
    Auto,
    Systemd,
    Launchd,
}

impl fmt::Display for ServiceManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceManagerKind::Auto => write!(f, "auto"),
            ServiceManagerKind::Systemd => write!(f, "systemd"),
            ServiceManagerKind::Launchd => write!(f, "launchd"),
        }
    }
}

impl FromStr for ServiceManagerKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ServiceManagerKind::Auto),
            "systemd" => Ok(ServiceManagerKind::Systemd),
            "launchd" => Ok(ServiceManagerKind::Launchd),
            other => Err(FleetError::usage(format!(
                "Unknown service manager '{other}' (expected auto, systemd or launchd)"
            ))),
        }
    }
}

/// runner-fleet settings persisted in `<root>/.fleet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetSettings {
    /// Agent release installed by `setup` when none is given.
    pub runner_version: String,
    /// Owner used when `setup` gets a bare repository name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Labels added to every new runner.
    pub labels: Vec<String>,
    /// Account passed to `svc.sh install` on Linux.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_user: Option<String>,
    pub log_lines: usize,
    pub min_free_disk_gb: u64,
    pub service_manager: ServiceManagerKind,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            runner_version: release::DEFAULT_RUNNER_VERSION.to_string(),
            owner: None,
            labels: Vec::new(),
            service_user: None,
            log_lines: 50,
            min_free_disk_gb: 5,
            service_manager: ServiceManagerKind::Auto,
        }
    }
}

impl FleetSettings {
    /// Keys accepted by [`set_value`](Self::set_value), in display order.
    pub const KEYS: &'static [&'static str] = &[
        "runnerVersion",
        "owner",
        "labels",
        "serviceUser",
        "logLines",
        "minFreeDiskGb",
        "serviceManager",
    ];

    /// `(key, value)` pairs for display. Unset optional values show as empty.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("runnerVersion", self.runner_version.clone()),
            ("owner", self.owner.clone().unwrap_or_default()),
            ("labels", self.labels.join(",")),
            ("serviceUser", self.service_user.clone().unwrap_or_default()),
            ("logLines", self.log_lines.to_string()),
            ("minFreeDiskGb", self.min_free_disk_gb.to_string()),
            ("serviceManager", self.service_manager.to_string()),
        ]
    }

    /// Update one setting from its string form. An empty value clears
    /// optional settings.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), FleetError> {
        let value = value.trim();
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

        match key {
            "runnerVersion" => {
                if value.is_empty() {
                    return Err(FleetError::usage("runnerVersion cannot be empty"));
                }
                self.runner_version = value.trim_start_matches('v').to_string();
            }
            "owner" => self.owner = optional(value),
            "labels" => self.labels = StringUtil::split_list(value),
            "serviceUser" => self.service_user = optional(value),
            "logLines" => {
                self.log_lines = parse_number(key, value)?;
            }
            "minFreeDiskGb" => {
                self.min_free_disk_gb = parse_number(key, value)?;
            }
            "serviceManager" => self.service_manager = value.parse()?,
            other => {
                return Err(FleetError::usage(format!(
                    "Unknown setting '{other}'. Known settings: {}",
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, FleetError> {
    value
        .parse()
        .map_err(|_| FleetError::usage(format!("{key} must be a non-negative number, got '{value}'")))
}

// ---------------------------------------------------------------------------
// RunnerSettings
// ---------------------------------------------------------------------------

/// The agent's `.runner` file. Only the fields runner-fleet reports on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSettings {
    #[serde(alias = "AgentId")]
    pub agent_id: u64,
    #[serde(alias = "AgentName")]
    pub agent_name: String,
    #[serde(alias = "PoolId")]
    pub pool_id: i64,
    #[serde(alias = "PoolName")]
    pub pool_name: String,
    #[serde(alias = "ServerUrl")]
    pub server_url: String,
    #[serde(alias = "GitHubUrl")]
    pub git_hub_url: String,
    #[serde(alias = "WorkFolder")]
    pub work_folder: String,
}

// ---------------------------------------------------------------------------
// ConfigurationStore
// ---------------------------------------------------------------------------

/// Loads and saves [`FleetSettings`] and reads agent-owned files.
pub struct ConfigurationStore {
    settings_file_path: PathBuf,
    settings: Mutex<Option<FleetSettings>>,
}

impl ConfigurationStore {
    pub fn new(root: &Path) -> Self {
        Self {
            settings_file_path: root.join(config_file::FLEET),
            settings: Mutex::new(None),
        }
    }

    pub fn settings_file(&self) -> &Path {
        &self.settings_file_path
    }

    pub fn is_configured(&self) -> bool {
        self.settings_file_path.exists()
    }

    /// Load settings; a missing file yields the defaults. Cached after first load.
    pub fn get_settings(&self) -> Result<FleetSettings> {
        let mut guard = self.settings.lock();
        if let Some(ref settings) = *guard {
            return Ok(settings.clone());
        }

        let settings = if self.is_configured() {
            IOUtil::load_object(&self.settings_file_path)
                .context("Failed to load runner-fleet settings")?
        } else {
            FleetSettings::default()
        };

        *guard = Some(settings.clone());
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &FleetSettings) -> Result<()> {
        IOUtil::save_object(&self.settings_file_path, settings)?;
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    /// Read the agent's `.runner` file from a runner directory.
    pub fn load_runner_settings(runner_dir: &Path) -> Result<RunnerSettings> {
        IOUtil::load_object(&runner_dir.join(config_file::RUNNER))
    }

    /// The unit name recorded by `svc.sh install`, if any.
    ///
    /// On macOS the agent records the plist path rather than the label, so
    /// the label is recovered from the file name.
    pub fn read_service_name(runner_dir: &Path) -> Option<String> {
        let contents = IOUtil::read_trimmed(&runner_dir.join(config_file::SERVICE))?;
        let name = contents.rsplit('/').next().unwrap_or(&contents);
        let name = name.strip_suffix(".plist").unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::new(dir.path());
        assert!(!store.is_configured());
        let settings = store.get_settings().unwrap();
        assert_eq!(settings, FleetSettings::default());
        assert_eq!(settings.log_lines, 50);
        assert_eq!(settings.runner_version, "2.328.0");
    }

    #[test]
    fn settings_round_trip_through_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigurationStore::new(dir.path());
        let mut settings = FleetSettings::default();
        settings.owner = Some("octo-org".into());
        settings.service_manager = ServiceManagerKind::Systemd;
        store.save_settings(&settings).unwrap();

        let raw = fs::read_to_string(store.settings_file()).unwrap();
        assert!(raw.contains("\"runnerVersion\""));
        assert!(raw.contains("\"serviceManager\": \"systemd\""));

        let fresh = ConfigurationStore::new(dir.path());
        assert_eq!(fresh.get_settings().unwrap(), settings);
    }

    #[test]
    fn unknown_fields_are_ignored_and_missing_fields_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".fleet"),
            r#"{"owner":"octo","futureKnob":true}"#,
        )
        .unwrap();
        let settings = ConfigurationStore::new(dir.path()).get_settings().unwrap();
        assert_eq!(settings.owner.as_deref(), Some("octo"));
        assert_eq!(settings.min_free_disk_gb, 5);
    }

    #[test]
    fn set_value_parses_and_validates() {
        let mut settings = FleetSettings::default();
        settings.set_value("labels", "gpu, linux").unwrap();
        settings.set_value("logLines", "200").unwrap();
        settings.set_value("serviceManager", "launchd").unwrap();
        settings.set_value("runnerVersion", "v2.330.0").unwrap();
        settings.set_value("owner", "octo").unwrap();
        settings.set_value("owner", "").unwrap();

        assert_eq!(settings.labels, vec!["gpu", "linux"]);
        assert_eq!(settings.log_lines, 200);
        assert_eq!(settings.service_manager, ServiceManagerKind::Launchd);
        assert_eq!(settings.runner_version, "2.330.0");
        assert_eq!(settings.owner, None);

        assert!(matches!(
            settings.set_value("colour", "blue"),
            Err(FleetError::Usage(_))
        ));
        assert!(settings.set_value("logLines", "-3").is_err());
        assert!(settings.set_value("serviceManager", "upstart").is_err());
    }

    #[test]
    fn entries_cover_every_key() {
        let settings = FleetSettings::default();
        let keys: Vec<&str> = settings.entries().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, FleetSettings::KEYS);
    }

    #[test]
    fn runner_settings_tolerate_bom_and_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".runner"),
            "\u{feff}{\"agentId\": 42, \"agentName\": \"widgets-runner-1\", \
             \"poolName\": \"Default\", \"gitHubUrl\": \"https://github.com/octo/widgets\", \
             \"workFolder\": \"_work\", \"ephemeral\": false}",
        )
        .unwrap();
        let settings = ConfigurationStore::load_runner_settings(dir.path()).unwrap();
        assert_eq!(settings.agent_id, 42);
        assert_eq!(settings.agent_name, "widgets-runner-1");
        assert_eq!(settings.work_folder, "_work");
    }

    #[test]
    fn runner_settings_accept_pascal_case() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".runner"), r#"{"AgentId": 7, "AgentName": "x"}"#).unwrap();
        let settings = ConfigurationStore::load_runner_settings(dir.path()).unwrap();
        assert_eq!(settings.agent_id, 7);
    }

    #[test]
    fn read_service_name_handles_unit_and_plist_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ConfigurationStore::read_service_name(dir.path()), None);

        fs::write(
            dir.path().join(".service"),
            "actions.runner.octo-widgets.widgets-runner-1.service\n",
        )
        .unwrap();
        assert_eq!(
            ConfigurationStore::read_service_name(dir.path()).as_deref(),
            Some("actions.runner.octo-widgets.widgets-runner-1.service")
        );

        fs::write(
            dir.path().join(".service"),
            "/Users/ci/Library/LaunchAgents/actions.runner.octo-widgets.widgets-runner-2.plist",
        )
        .unwrap();
        assert_eq!(
            ConfigurationStore::read_service_name(dir.path()).as_deref(),
            Some("actions.runner.octo-widgets.widgets-runner-2")
        );
    }
}
