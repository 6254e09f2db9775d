// Typed failures that callers match on.
// Everything else travels as `anyhow::Error` with context.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Bad or missing command-line input.
    #[error("{0}")]
    Usage(String),

    #[error("Repository '{repo}' has no runner directory under '{}'", .root.display())]
    RepositoryNotFound { repo: String, root: PathBuf },

    #[error("Runner {index} of repository '{repo}' does not exist")]
    RunnerNotFound { repo: String, index: u32 },

    #[error("Invalid service name '{name}': {reason}")]
    InvalidServiceName { name: String, reason: String },

    #[error("No service is installed for {0}")]
    ServiceNotInstalled(String),

    #[error("{0} is not supported on this platform")]
    UnsupportedPlatform(String),

    #[error("Checksum mismatch for '{}': expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl FleetError {
    pub fn usage(message: impl Into<String>) -> Self {
        FleetError::Usage(message.into())
    }
}
