// Service naming convention.
//
// The agent installs each runner as `actions.runner.<scope>.<runner name>`,
// where the runner name is `<repo>-runner-<index>`. This module builds those
// names, recognises them in service-manager listings and takes them apart
// again.

use crate::constants::service::{MAX_NAME_LENGTH, MAX_SCOPE_LENGTH, NAME_PREFIX, SYSTEMD_SUFFIX};
use crate::error::FleetError;
use crate::layout::RunnerRef;

use fleet_sdk::StringUtil;
use once_cell::sync::Lazy;
use regex::Regex;

static RUNNER_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<head>.+)-runner-(?P<index>[0-9]+)$").expect("valid runner tail pattern")
});

/// The pieces recovered from an installed unit name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedServiceName {
    pub scope: String,
    pub repo: String,
    pub index: u32,
}

impl ParsedServiceName {
    pub fn runner(&self) -> RunnerRef {
        RunnerRef::unchecked(&self.repo, self.index)
    }
}

pub struct ServiceName;

impl ServiceName {
    /// The agent's service name for `runner_name` under `scope`, without any
    /// service-manager suffix.
    ///
    /// Names longer than 80 characters have the scope cut to 45 characters,
    /// then the runner name cut by whatever is still over.
    pub fn agent_service_name(scope: &str, runner_name: &str) -> String {
        let full = format!("{NAME_PREFIX}{scope}.{runner_name}");
        if full.chars().count() <= MAX_NAME_LENGTH {
            return full;
        }

        let scope = StringUtil::substring_prefix(scope, MAX_SCOPE_LENGTH);
        let shortened = format!("{NAME_PREFIX}{scope}.{runner_name}");
        let excess = shortened.chars().count().saturating_sub(MAX_NAME_LENGTH);
        if excess == 0 {
            return shortened;
        }

        let keep = runner_name.chars().count().saturating_sub(excess);
        let runner_name = StringUtil::substring_prefix(runner_name, keep);
        format!("{NAME_PREFIX}{scope}.{runner_name}")
    }

    /// The systemd unit name (`….service`) for a runner.
    pub fn systemd_unit(scope: &str, runner: &RunnerRef) -> String {
        format!(
            "{}{SYSTEMD_SUFFIX}",
            Self::agent_service_name(scope, &runner.runner_name())
        )
    }

    /// The launchd label for a runner.
    pub fn launchd_label(scope: &str, runner: &RunnerRef) -> String {
        Self::agent_service_name(scope, &runner.runner_name())
    }

    /// Whether `unit` is the service of `runner`.
    ///
    /// The unit must carry the agent prefix and end in exactly
    /// `.<repo>-runner-<index>`, so `runner-1` never claims `runner-10`.
    pub fn matches(unit: &str, runner: &RunnerRef) -> bool {
        let unit = strip_suffix(unit);
        let tail = format!(".{}", runner.runner_name());
        // The length check leaves room for a non-empty scope.
        unit.starts_with(NAME_PREFIX)
            && unit.len() >= NAME_PREFIX.len() + tail.len()
            && unit.ends_with(&tail)
    }

    /// Recover scope, repository and index from a unit name.
    ///
    /// `<scope>.<repo>` is split at the dot whose left side ends with
    /// `-<repo>` (the agent's `owner-repo` scope). Names that do not follow
    /// that form, such as `actions.runner.<user>.<repo>-runner-<n>`, split at
    /// the first dot.
    pub fn parse(unit: &str) -> Option<ParsedServiceName> {
        let rest = strip_suffix(unit).strip_prefix(NAME_PREFIX)?;
        let caps = RUNNER_TAIL.captures(rest)?;
        let head = caps.name("head")?.as_str();
        let index: u32 = caps.name("index")?.as_str().parse().ok()?;

        let dots: Vec<usize> = head.match_indices('.').map(|(i, _)| i).collect();
        let split = dots
            .iter()
            .copied()
            .find(|&i| {
                let (left, right) = (&head[..i], &head[i + 1..]);
                !right.is_empty() && left.ends_with(&format!("-{right}"))
            })
            .or_else(|| dots.first().copied())?;

        let (scope, repo) = (&head[..split], &head[split + 1..]);
        if scope.is_empty() || repo.is_empty() {
            return None;
        }
        Some(ParsedServiceName {
            scope: scope.to_string(),
            repo: repo.to_string(),
            index,
        })
    }

    /// Reject anything that is not safe to pass to a service manager.
    pub fn validate(name: &str) -> Result<(), FleetError> {
        let invalid = |reason: &str| FleetError::InvalidServiceName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if !name.starts_with(NAME_PREFIX) || name.len() == NAME_PREFIX.len() {
            return Err(invalid("must start with 'actions.runner.'"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '@')))
        {
            return Err(invalid(&format!("contains disallowed character {bad:?}")));
        }
        Ok(())
    }
}

fn strip_suffix(unit: &str) -> &str {
    unit.strip_suffix(SYSTEMD_SUFFIX).unwrap_or(unit)
}
