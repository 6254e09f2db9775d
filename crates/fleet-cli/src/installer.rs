// Agent installation: fetch the release archive into the shared cache,
// unpack it into a staging directory and register it with `config.sh`.

use anyhow::{anyhow, Context, Result};
use fleet_common::constants::{agent_script, path, release, variables, Architecture, OsPlatform};
use fleet_common::{FleetError, HostContext, HttpClientFactory, RunnerDir, Tracing};
use fleet_sdk::{ProcessRequest, TraceWriter};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(2);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// One release archive of the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseArchive {
    pub version: String,
    pub os: &'static str,
    pub arch: &'static str,
}

impl ReleaseArchive {
    pub fn new(version: &str, platform: OsPlatform, arch: Architecture) -> Result<Self, FleetError> {
        let os = platform
            .release_name()
            .ok_or_else(|| FleetError::UnsupportedPlatform(format!("Runner releases for {platform}")))?;
        let arch = arch
            .release_name()
            .ok_or_else(|| FleetError::UnsupportedPlatform(format!("Runner releases for {arch}")))?;
        Ok(Self {
            version: version.trim_start_matches('v').to_string(),
            os,
            arch,
        })
    }

    /// `actions-runner-<os>-<arch>-<version>.tar.gz`
    pub fn file_name(&self) -> String {
        format!("actions-runner-{}-{}-{}.tar.gz", self.os, self.arch, self.version)
    }

    pub fn download_url(&self) -> String {
        format!(
            "{}/v{}/{}",
            release::DOWNLOAD_BASE_URL,
            self.version,
            self.file_name()
        )
    }
}

/// What `config.sh` needs to register one runner.
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub url: &'a str,
    pub token: &'a str,
    pub name: String,
    pub labels: &'a [String],
}

pub struct RunnerInstaller {
    context: Arc<HostContext>,
    trace: Tracing,
}

impl RunnerInstaller {
    pub fn new(context: Arc<HostContext>) -> Self {
        let trace = context.get_trace("RunnerInstaller");
        Self { context, trace }
    }

    /// Path of `archive` in the shared cache, downloading it when missing.
    ///
    /// With `expected_sha256`, a cached copy that does not match is fetched
    /// again and a fresh download that does not match is an error.
    pub async fn ensure_archive(
        &self,
        archive: &ReleaseArchive,
        expected_sha256: Option<&str>,
    ) -> Result<PathBuf> {
        let cache_dir = self.context.layout().cache_dir();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create '{}'", cache_dir.display()))?;
        let cached = cache_dir.join(archive.file_name());

        if cached.is_file() {
            match expected_sha256 {
                None => {
                    self.trace.info(&format!("Using cached {}", cached.display()));
                    return Ok(cached);
                }
                Some(expected) => match verify_checksum(&cached, expected) {
                    Ok(()) => {
                        self.trace.info(&format!("Using cached {} (checksum ok)", cached.display()));
                        return Ok(cached);
                    }
                    Err(e) => {
                        self.trace.warning(&format!("{e}; downloading again"));
                        fs::remove_file(&cached)
                            .with_context(|| format!("Failed to delete '{}'", cached.display()))?;
                    }
                },
            }
        }

        let url = archive.download_url();
        self.trace.info(&format!("Downloading {url}"));
        let max_attempts = release::DOWNLOAD_RETRY_MAX_ATTEMPTS;
        let mut attempt = 0u32;
        let download = loop {
            attempt += 1;
            match self.download(&url, &cache_dir).await {
                Ok(download) => break download,
                Err(e) if attempt >= max_attempts => {
                    return Err(e).context(format!(
                        "Failed to download {} after {max_attempts} attempts",
                        archive.file_name()
                    ));
                }
                Err(e) => {
                    self.trace.warning(&format!(
                        "Download failed (attempt {attempt}/{max_attempts}): {e:#}. Retrying..."
                    ));
                    tokio::time::sleep(DOWNLOAD_RETRY_DELAY).await;
                }
            }
        };

        let (temp, actual) = download;
        if let Some(expected) = expected_sha256 {
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(FleetError::ChecksumMismatch {
                    path: cached,
                    expected: expected.to_string(),
                    actual,
                }
                .into());
            }
        }
        temp.persist(&cached)
            .with_context(|| format!("Failed to move download to '{}'", cached.display()))?;
        self.trace.info(&format!("Cached {} (sha256 {actual})", cached.display()));
        Ok(cached)
    }

    /// Stream `url` into a temporary file next to the cache, hashing as it goes.
    /// An interrupted download never leaves a file under the archive's name.
    async fn download(&self, url: &str, dir: &Path) -> Result<(tempfile::NamedTempFile, String)> {
        let client = HttpClientFactory::create_client_with_timeout(DOWNLOAD_TIMEOUT)?;
        let mut response = client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;
        if !response.status().is_success() {
            return Err(anyhow!("Download failed with HTTP {}", response.status().as_u16()));
        }

        let mut temp = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dir)
            .context("Failed to create a temporary download file")?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read download response body")?
        {
            hasher.update(&chunk);
            temp.write_all(&chunk)
                .context("Failed to write downloaded data to disk")?;
        }
        temp.flush()?;
        Ok((temp, hex::encode(hasher.finalize())))
    }

    /// Copy the archive into `dest` and unpack it there.
    pub fn install_archive(&self, archive_path: &Path, dest: &Path) -> Result<()> {
        let file_name = archive_path
            .file_name()
            .ok_or_else(|| anyhow!("'{}' is not a file", archive_path.display()))?;
        let local = dest.join(file_name);
        fs::copy(archive_path, &local)
            .with_context(|| format!("Failed to copy archive into '{}'", dest.display()))?;

        self.trace.info(&format!("Extracting {} into {}", local.display(), dest.display()));
        extract_archive(&local, dest)?;
        fs::remove_file(&local)
            .with_context(|| format!("Failed to delete '{}'", local.display()))?;

        if !dest.join(agent_script::CONFIG).is_file() {
            return Err(anyhow!(
                "Archive '{}' does not contain {}",
                archive_path.display(),
                agent_script::CONFIG
            ));
        }
        Ok(())
    }

    /// `./config.sh --unattended …` inside `dir`.
    pub async fn register(&self, dir: &Path, registration: &Registration<'_>) -> Result<()> {
        self.context.secret_masker().add_value(registration.token);

        let mut request = self
            .agent_config_request(dir)
            .args([
                "--unattended",
                "--url",
                registration.url,
                "--token",
                registration.token,
                "--name",
                registration.name.as_str(),
                "--work",
                path::WORK_DIRECTORY,
                "--replace",
            ]);
        if !registration.labels.is_empty() {
            request = request.arg("--labels").arg(registration.labels.join(","));
        }

        self.trace.info(&format!("Registering {} against {}", registration.name, registration.url));
        self.context
            .command_runner()
            .run_checked(&request)
            .await
            .with_context(|| format!("Registration of {} failed", registration.name))?;
        Ok(())
    }

    /// `./config.sh remove --token …` inside the runner directory.
    pub async fn deregister(&self, dir: &RunnerDir, token: &str) -> Result<()> {
        self.context.secret_masker().add_value(token);
        let request = self
            .agent_config_request(&dir.path)
            .args(["remove", "--token", token]);
        self.context
            .command_runner()
            .run_checked(&request)
            .await
            .with_context(|| format!("Deregistration of {} failed", dir.runner))?;
        Ok(())
    }

    fn agent_config_request(&self, dir: &Path) -> ProcessRequest {
        let mut request = ProcessRequest::new(format!("./{}", agent_script::CONFIG)).current_dir(dir);
        if self.context.is_root() {
            request = request.env(variables::ALLOW_RUNAS_ROOT, "1");
        }
        request
    }
}

/// Unpack a `.tar.gz` archive into `dest`.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open '{}'", archive_path.display()))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract '{}'", archive_path.display()))?;
    Ok(())
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(FleetError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fleet_common::RunnerRef;
    use fleet_sdk::{ProcessOutput, ScriptedCommandRunner};

    /// A gzip'd tarball holding the agent scripts.
    pub(crate) fn fake_release(dir: &Path, name: &str) -> PathBuf {
        let archive_path = dir.join(name);
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for script in [agent_script::CONFIG, agent_script::RUN, agent_script::SVC] {
            let body = b"#!/bin/sh\nexit 0\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, script, &body[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        archive_path
    }

    fn context(runner: Arc<ScriptedCommandRunner>, is_root: bool) -> (tempfile::TempDir, Arc<HostContext>) {
        let root = tempfile::tempdir().unwrap();
        let ctx = HostContext::with_command_runner(
            root.path().to_path_buf(),
            runner,
            OsPlatform::Linux,
            is_root,
            PathBuf::from("/home/tester"),
        );
        (root, ctx)
    }

    #[test]
    fn archive_names() {
        let archive = ReleaseArchive::new("v2.328.0", OsPlatform::MacOS, Architecture::Arm64).unwrap();
        assert_eq!(archive.file_name(), "actions-runner-osx-arm64-2.328.0.tar.gz");
        assert_eq!(
            archive.download_url(),
            "https://github.com/actions/runner/releases/download/v2.328.0/actions-runner-osx-arm64-2.328.0.tar.gz"
        );
        assert!(ReleaseArchive::new("2.328.0", OsPlatform::Unsupported, Architecture::X64).is_err());
        assert!(ReleaseArchive::new("2.328.0", OsPlatform::Linux, Architecture::Other).is_err());
    }

    #[test]
    fn checksum_verification() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blob");
        fs::write(&file, b"abc").unwrap();
        let digest = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert_eq!(sha256_file(&file).unwrap(), digest);
        assert!(verify_checksum(&file, &digest.to_uppercase()).is_ok());

        let err = verify_checksum(&file, &"0".repeat(64)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FleetError>(),
            Some(FleetError::ChecksumMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn cached_archive_is_reused_without_network() {
        let (_root, ctx) = context(Arc::new(ScriptedCommandRunner::new()), false);
        let archive = ReleaseArchive::new("2.328.0", OsPlatform::Linux, Architecture::X64).unwrap();
        let cache = ctx.layout().cache_dir();
        fs::create_dir_all(&cache).unwrap();
        let cached = fake_release(&cache, &archive.file_name());
        let digest = sha256_file(&cached).unwrap();

        let installer = RunnerInstaller::new(ctx.clone());
        assert_eq!(installer.ensure_archive(&archive, None).await.unwrap(), cached);
        assert_eq!(installer.ensure_archive(&archive, Some(&digest)).await.unwrap(), cached);
    }

    #[test]
    fn install_archive_unpacks_and_removes_the_copy() {
        let (root, ctx) = context(Arc::new(ScriptedCommandRunner::new()), false);
        let archive = fake_release(root.path(), "actions-runner-linux-x64-2.328.0.tar.gz");
        let dest = root.path().join("staging");
        fs::create_dir_all(&dest).unwrap();

        RunnerInstaller::new(ctx).install_archive(&archive, &dest).unwrap();
        assert!(dest.join("config.sh").is_file());
        assert!(dest.join("run.sh").is_file());
        assert!(!dest.join("actions-runner-linux-x64-2.328.0.tar.gz").exists());
        assert!(archive.is_file());
    }

    #[test]
    fn archive_without_agent_is_rejected() {
        let (root, ctx) = context(Arc::new(ScriptedCommandRunner::new()), false);
        let archive = root.path().join("empty.tar.gz");
        let file = File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        tar::Builder::new(encoder).into_inner().unwrap().finish().unwrap();
        let dest = root.path().join("staging");
        fs::create_dir_all(&dest).unwrap();

        assert!(RunnerInstaller::new(ctx).install_archive(&archive, &dest).is_err());
    }

    #[tokio::test]
    async fn register_runs_config_sh_with_masked_token() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let (root, ctx) = context(runner.clone(), true);
        let labels = vec!["gpu".to_string(), "fast".to_string()];
        let registration = Registration {
            url: "https://github.com/octo/widgets",
            token: "AAAQ7TOKEN",
            name: RunnerRef::new("widgets", 2).unwrap().runner_name(),
            labels: &labels,
        };

        RunnerInstaller::new(ctx.clone())
            .register(root.path(), &registration)
            .await
            .unwrap();

        let requests = runner.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].command_line(),
            "./config.sh --unattended --url https://github.com/octo/widgets --token AAAQ7TOKEN \
             --name widgets-runner-2 --work _work --replace --labels gpu,fast"
        );
        assert_eq!(requests[0].working_directory.as_deref(), Some(root.path()));
        assert_eq!(
            requests[0].environment.get("RUNNER_ALLOW_RUNASROOT").map(String::as_str),
            Some("1")
        );
        assert_eq!(
            ctx.secret_masker().mask_secrets(&requests[0].command_line()),
            "./config.sh --unattended --url https://github.com/octo/widgets --token *** \
             --name widgets-runner-2 --work _work --replace --labels gpu,fast"
        );
    }

    #[tokio::test]
    async fn failed_registration_is_an_error() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        runner.respond("./config.sh", ProcessOutput::failed(1, "Http response code: NotFound"));
        let (root, ctx) = context(runner.clone(), false);
        let registration = Registration {
            url: "https://github.com/octo/widgets",
            token: "AAAQ7TOKEN",
            name: "widgets-runner-1".into(),
            labels: &[],
        };

        let err = RunnerInstaller::new(ctx)
            .register(root.path(), &registration)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Registration of widgets-runner-1 failed"));
        assert!(runner.requests()[0].environment.is_empty());
    }

    #[tokio::test]
    async fn deregister_runs_config_remove() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let (root, ctx) = context(runner.clone(), false);
        let dir = RunnerDir {
            runner: RunnerRef::new("widgets", 1).unwrap(),
            path: root.path().join("widgets/1"),
        };
        RunnerInstaller::new(ctx).deregister(&dir, "RMTOKEN").await.unwrap();
        assert_eq!(runner.command_lines(), vec!["./config.sh remove --token RMTOKEN"]);
    }
}
