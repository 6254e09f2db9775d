// Constants shared across runner-fleet.
// Platform detection, well-known file names, environment variables and limits.

use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsPlatform {
    Linux,
    MacOS,
    Unsupported,
}

impl fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsPlatform::Linux => write!(f, "Linux"),
            OsPlatform::MacOS => write!(f, "macOS"),
            OsPlatform::Unsupported => write!(f, "unsupported"),
        }
    }
}

impl OsPlatform {
    /// The OS segment of a runner release archive name.
    pub fn release_name(&self) -> Option<&'static str> {
        match self {
            OsPlatform::Linux => Some("linux"),
            OsPlatform::MacOS => Some("osx"),
            OsPlatform::Unsupported => None,
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X64,
    Arm,
    Arm64,
    Other,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X64 => write!(f, "X64"),
            Architecture::Arm => write!(f, "ARM"),
            Architecture::Arm64 => write!(f, "ARM64"),
            Architecture::Other => write!(f, "other"),
        }
    }
}

impl Architecture {
    /// The architecture segment of a runner release archive name.
    pub fn release_name(&self) -> Option<&'static str> {
        match self {
            Architecture::X64 => Some("x64"),
            Architecture::Arm => Some("arm"),
            Architecture::Arm64 => Some("arm64"),
            Architecture::Other => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform detection (compile-time)
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux;
#[cfg(target_os = "macos")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::MacOS;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Unsupported;

#[cfg(target_arch = "x86_64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X64;
#[cfg(target_arch = "arm")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm;
#[cfg(target_arch = "aarch64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm64;
#[cfg(not(any(target_arch = "x86_64", target_arch = "arm", target_arch = "aarch64")))]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Other;

// ---------------------------------------------------------------------------
// Top-level constants
// ---------------------------------------------------------------------------

pub const GITHUB_URL: &str = "https://github.com";
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Upper bound on runners created by one `setup` call.
pub const MAX_RUNNERS_PER_SETUP: u32 = 64;

/// Upper bound on a repository directory name.
pub const MAX_REPO_NAME_LENGTH: usize = 100;

/// Process return / exit codes.
pub mod return_code {
    pub const SUCCESS: i32 = 0;
    pub const TERMINATED_ERROR: i32 = 1;
}

pub mod path {
    /// Default root directory name under the user's home.
    pub const DEFAULT_ROOT_DIRECTORY: &str = "action-runners";
    /// Shared release archive cache under the root.
    pub const CACHE_DIRECTORY: &str = ".cache";
    pub const DIAG_DIRECTORY: &str = "_diag";
    pub const WORK_DIRECTORY: &str = "_work";
    pub const RUNNER_DIAGNOSTIC_LOG_PREFIX: &str = "Runner_";
    /// Suffix of a staging directory, `.<index>.partial`.
    pub const STAGING_SUFFIX: &str = ".partial";
    /// launchd log root, relative to the home directory.
    pub const MACOS_LOGS_DIRECTORY: &str = "Library/Logs";
    pub const STDOUT_LOG: &str = "stdout.log";
    pub const STDERR_LOG: &str = "stderr.log";
}

pub mod config_file {
    /// The agent's registration state.
    pub const RUNNER: &str = ".runner";
    /// The agent's installed service name, written by `svc.sh install`.
    pub const SERVICE: &str = ".service";
    /// runner-fleet settings, one per root.
    pub const FLEET: &str = ".fleet";
}

pub mod agent_script {
    pub const RUN: &str = "run.sh";
    pub const CONFIG: &str = "config.sh";
    pub const SVC: &str = "svc.sh";
}

pub mod service {
    pub const NAME_PREFIX: &str = "actions.runner.";
    pub const SYSTEMD_SUFFIX: &str = ".service";
    pub const MAX_NAME_LENGTH: usize = 80;
    pub const MAX_SCOPE_LENGTH: usize = 45;
}

pub mod release {
    pub const DOWNLOAD_BASE_URL: &str = "https://github.com/actions/runner/releases/download";
    pub const DEFAULT_RUNNER_VERSION: &str = "2.328.0";
    pub const DOWNLOAD_RETRY_MAX_ATTEMPTS: u32 = 3;
}

pub mod variables {
    pub const ROOT: &str = "RUNNER_FLEET_ROOT";
    pub const OWNER: &str = "RUNNER_FLEET_OWNER";
    pub const TOKEN: &str = "RUNNER_FLEET_TOKEN";
    pub const VERSION: &str = "RUNNER_FLEET_VERSION";
    pub const TLS_NO_VERIFY: &str = "RUNNER_FLEET_TLS_NO_VERIFY";
    pub const PRINT_LOG_TO_STDOUT: &str = "RUNNER_FLEET_PRINT_LOG_TO_STDOUT";
    /// Read by the agent's `config.sh`; required when it runs as root.
    pub const ALLOW_RUNAS_ROOT: &str = "RUNNER_ALLOW_RUNASROOT";
}
