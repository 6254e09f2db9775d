// Validation of setup input: labels, runner counts, release versions and
// archive checksums. Failures are usage errors.

use fleet_common::constants::MAX_RUNNERS_PER_SETUP;
use fleet_common::FleetError;
use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid version pattern"));

const MAX_LABEL_LENGTH: usize = 256;

/// Labels are passed to `config.sh --labels` as one comma-joined argument.
pub fn validate_labels(labels: &[String]) -> Result<(), FleetError> {
    for label in labels {
        if label.is_empty() {
            return Err(FleetError::usage("Labels cannot be empty"));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(FleetError::usage(format!(
                "Label '{}…' exceeds {MAX_LABEL_LENGTH} characters",
                &label[..label.char_indices().nth(16).map_or(label.len(), |(i, _)| i)]
            )));
        }
        if label.contains(',') || label.chars().any(char::is_whitespace) {
            return Err(FleetError::usage(format!(
                "Label '{label}' cannot contain commas or whitespace"
            )));
        }
    }
    Ok(())
}

pub fn validate_count(count: u32) -> Result<(), FleetError> {
    if count == 0 || count > MAX_RUNNERS_PER_SETUP {
        return Err(FleetError::usage(format!(
            "Runner count must be between 1 and {MAX_RUNNERS_PER_SETUP}, got {count}"
        )));
    }
    Ok(())
}

/// `2.328.0` or `v2.328.0`; returns the version without the `v`.
pub fn validate_version(version: &str) -> Result<String, FleetError> {
    let version = version.trim().trim_start_matches('v');
    if !VERSION_PATTERN.is_match(version) {
        return Err(FleetError::usage(format!(
            "Runner version '{version}' is not of the form MAJOR.MINOR.PATCH"
        )));
    }
    Ok(version.to_string())
}

/// A 64-character hex digest; returns it lowercased.
pub fn validate_sha256(digest: &str) -> Result<String, FleetError> {
    let digest = digest.trim().to_ascii_lowercase();
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FleetError::usage(format!(
            "'{digest}' is not a SHA-256 digest (64 hex characters)"
        )));
    }
    Ok(digest)
}
