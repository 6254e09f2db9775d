// Host checks: service tooling, free disk space, GitHub API reachability.

use super::check_extension::CheckResult;
use fleet_common::constants::GITHUB_API_URL;
use fleet_common::HttpClientFactory;
use fleet_sdk::WhichUtil;
use std::path::{Path, PathBuf};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;
const ONLINE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the host checks read from the machine.
pub trait HostInfo: Send + Sync {
    fn is_available(&self, tool: &str) -> bool;

    /// Mount points with their available bytes.
    fn mounts(&self) -> Vec<(PathBuf, u64)>;
}

/// PATH lookup and the mounted disks of this machine.
pub struct SystemHost;

impl HostInfo for SystemHost {
    fn is_available(&self, tool: &str) -> bool {
        WhichUtil::is_available(tool)
    }

    fn mounts(&self) -> Vec<(PathBuf, u64)> {
        sysinfo::Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| (disk.mount_point().to_path_buf(), disk.available_space()))
            .collect()
    }
}

/// Every tool the service manager shells out to resolves on PATH.
pub fn tool_check(host_info: &dyn HostInfo, tools: &[&str]) -> CheckResult {
    let name = "Service tools";
    let description = format!("Check that {} are on PATH", tools.join(" and "));
    let missing: Vec<&str> = tools
        .iter()
        .copied()
        .filter(|tool| !host_info.is_available(tool))
        .collect();
    if missing.is_empty() {
        CheckResult::pass(name, description)
    } else {
        CheckResult::fail(name, description, format!("not found: {}", missing.join(", ")))
    }
}

/// Free space on the filesystem holding `root`.
pub fn disk_check(host_info: &dyn HostInfo, root: &Path, min_free_gb: u64) -> CheckResult {
    let mounts = host_info.mounts();
    let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    evaluate_disk(&root, &mounts, min_free_gb)
}

/// Pick the longest mount point containing `root` and compare its free space.
pub fn evaluate_disk(root: &Path, mounts: &[(PathBuf, u64)], min_free_gb: u64) -> CheckResult {
    let name = "Free disk space";
    let description = format!("Check for at least {min_free_gb} GiB free under {}", root.display());
    let mount = mounts
        .iter()
        .filter(|(mount, _)| root.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count());

    let Some((mount, available)) = mount else {
        return CheckResult::fail(name, description, "no mounted filesystem contains the root");
    };
    let detail = format!(
        "{:.1} GiB available on {}",
        *available as f64 / GIB as f64,
        mount.display()
    );
    if *available >= min_free_gb.saturating_mul(GIB) {
        CheckResult::pass(name, description).with_detail(detail)
    } else {
        CheckResult::fail(name, description, detail)
    }
}

/// Unauthenticated GET against the GitHub API.
pub async fn online_check() -> CheckResult {
    let name = "GitHub API";
    let description = format!("Check that {GITHUB_API_URL} is reachable");
    match reach(GITHUB_API_URL).await {
        Ok(status) => CheckResult::pass(name, description).with_detail(format!("HTTP {status}")),
        Err(e) => CheckResult::fail(name, description, format!("{e:#}")),
    }
}

async fn reach(url: &str) -> anyhow::Result<reqwest::StatusCode> {
    let client = HttpClientFactory::create_client_with_timeout(ONLINE_TIMEOUT)?;
    let response = client.get(url).send().await.map_err(|e| {
        anyhow::anyhow!("HTTPS connection to {url} failed: {e}. Check firewall and proxy settings.")
    })?;
    let status = response.status();
    if status.is_server_error() {
        anyhow::bail!("{url} returned server error {status}");
    }
    Ok(status)
}
