// fleet-common: The runner-fleet domain shared by every command.
// Depends on `fleet-sdk`; owns naming, discovery, settings and service managers.

pub mod config_store;
pub mod constants;
pub mod error;
pub mod github_url;
pub mod host_context;
pub mod http_client_factory;
pub mod layout;
pub mod naming;
pub mod secret_masker;
pub mod service;
pub mod terminal;
pub mod tracing;

pub use config_store::{ConfigurationStore, FleetSettings, RunnerSettings, ServiceManagerKind};
pub use constants::{Architecture, OsPlatform, CURRENT_ARCHITECTURE, CURRENT_PLATFORM};
pub use error::FleetError;
pub use github_url::RepositoryUrl;
pub use host_context::HostContext;
pub use http_client_factory::HttpClientFactory;
pub use layout::{FleetLayout, RunnerDir, RunnerRef, StagingDir};
pub use naming::{ParsedServiceName, ServiceName};
pub use secret_masker::SecretMasker;
pub use service::{RunnerStatus, ServiceAction, ServiceManager, ServiceState};
pub use terminal::Terminal;
pub use crate::tracing::{TraceEventType, TraceManager, TraceSetting, Tracing};
