// Registry of secret values (registration and removal tokens) that must never
// reach a log line or an error message.

use parking_lot::RwLock;
use std::sync::Arc;

const MASK: &str = "***";

/// Replaces every registered secret in a string with `***`.
///
/// Clones share the same registry, so a token added by one command is masked
/// in every trace source created from the same host context.
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Blank values are ignored.
    pub fn add_value(&self, secret: &str) {
        let secret = secret.trim();
        if secret.is_empty() {
            return;
        }

        let mut secrets = self.secrets.write();
        if secrets.iter().any(|s| s == secret) {
            return;
        }
        secrets.push(secret.to_string());
        // Longest first, so a secret containing another is masked whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn mask_secrets(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        secrets.iter().fold(input.to_string(), |acc, secret| {
            if acc.contains(secret.as_str()) {
                acc.replace(secret.as_str(), MASK)
            } else {
                acc
            }
        })
    }

    pub fn secret_count(&self) -> usize {
        self.secrets.read().len()
    }
}
