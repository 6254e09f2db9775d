// Named trace sources that mask secrets before handing lines to `tracing`.

use crate::secret_masker::SecretMasker;
use chrono::Utc;
use fleet_sdk::TraceWriter;
use std::sync::Arc;

/// Trace severity, ordered from chattiest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceEventType {
    Verbose,
    Information,
    Warning,
    Error,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventType::Verbose => write!(f, "VERB"),
            TraceEventType::Information => write!(f, "INFO"),
            TraceEventType::Warning => write!(f, "WARN"),
            TraceEventType::Error => write!(f, "ERR "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceSetting {
    /// Minimum severity emitted.
    pub level: TraceEventType,
    /// Echo every trace line to stdout as well.
    pub print_to_stdout: bool,
}

impl Default for TraceSetting {
    fn default() -> Self {
        Self {
            level: TraceEventType::Verbose,
            print_to_stdout: false,
        }
    }
}

/// A trace source for one component.
///
/// All sources created by the same [`TraceManager`] share one
/// [`SecretMasker`], so a token registered anywhere is hidden everywhere.
#[derive(Clone)]
pub struct Tracing {
    name: String,
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl Tracing {
    pub fn new(name: impl Into<String>, secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            name: name.into(),
            secret_masker,
            setting,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn trace(&self, event_type: TraceEventType, message: &str) {
        if event_type < self.setting.level {
            return;
        }

        let masked = self.secret_masker.mask_secrets(message);
        match event_type {
            TraceEventType::Error => tracing::error!(component = %self.name, "{masked}"),
            TraceEventType::Warning => tracing::warn!(component = %self.name, "{masked}"),
            TraceEventType::Information => tracing::info!(component = %self.name, "{masked}"),
            TraceEventType::Verbose => tracing::debug!(component = %self.name, "{masked}"),
        }

        if self.setting.print_to_stdout {
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
            println!("[{timestamp}][{}] {event_type}: {masked}", self.name);
        }
    }

    /// Log a serializable value as pretty JSON at verbose level.
    pub fn verbose_object<T: serde::Serialize>(&self, item: &T) {
        match serde_json::to_string_pretty(item) {
            Ok(json) => self.verbose(&json),
            Err(e) => self.verbose(&format!("<serialization error: {e}>")),
        }
    }

    /// Log an error with its whole cause chain.
    pub fn error_chain(&self, err: &anyhow::Error) {
        self.error(&err.to_string());
        for cause in err.chain().skip(1) {
            self.error(&format!("  caused by: {cause}"));
        }
    }
}

impl TraceWriter for Tracing {
    fn info(&self, message: &str) {
        self.trace(TraceEventType::Information, message);
    }

    fn verbose(&self, message: &str) {
        self.trace(TraceEventType::Verbose, message);
    }

    fn warning(&self, message: &str) {
        self.trace(TraceEventType::Warning, message);
    }

    fn error(&self, message: &str) {
        self.trace(TraceEventType::Error, message);
    }
}

/// Hands out named [`Tracing`] sources sharing one masker and setting.
pub struct TraceManager {
    secret_masker: SecretMasker,
    setting: TraceSetting,
}

impl TraceManager {
    pub fn new(secret_masker: SecretMasker, setting: TraceSetting) -> Self {
        Self {
            secret_masker,
            setting,
        }
    }

    pub fn get(&self, name: &str) -> Tracing {
        Tracing::new(name, self.secret_masker.clone(), self.setting.clone())
    }

    pub fn secret_masker(&self) -> &SecretMasker {
        &self.secret_masker
    }
}
