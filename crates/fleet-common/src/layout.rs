// Directory layout: `<root>/<repo>/<index>/` holds one runner.
//
// Hidden entries (leading `.`) are never repositories or runners; the
// release cache and staging directories live there.

use crate::constants::{agent_script, config_file, path, MAX_REPO_NAME_LENGTH};
use crate::error::FleetError;

use anyhow::{Context, Result};
use fleet_sdk::IOUtil;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// RunnerRef
// ---------------------------------------------------------------------------

/// Identity of one runner: repository name plus a 1-based index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunnerRef {
    pub repo: String,
    pub index: u32,
}

impl RunnerRef {
    pub fn new(repo: &str, index: u32) -> Result<Self, FleetError> {
        validate_repo_name(repo)?;
        if index == 0 {
            return Err(FleetError::usage("Runner indexes start at 1"));
        }
        Ok(Self::unchecked(repo, index))
    }

    pub(crate) fn unchecked(repo: &str, index: u32) -> Self {
        Self {
            repo: repo.to_string(),
            index,
        }
    }

    /// `<repo>-runner-<index>`, the name registered with GitHub.
    pub fn runner_name(&self) -> String {
        format!("{}-runner-{}", self.repo, self.index)
    }
}

impl fmt::Display for RunnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-runner-{}", self.repo, self.index)
    }
}

/// Repository names become directory names and parts of service names.
pub fn validate_repo_name(name: &str) -> Result<(), FleetError> {
    if name.is_empty() {
        return Err(FleetError::usage("Repository name cannot be empty"));
    }
    if name == "." || name == ".." || name.starts_with('.') {
        return Err(FleetError::usage(format!(
            "Repository name '{name}' cannot start with '.'"
        )));
    }
    if name.len() > MAX_REPO_NAME_LENGTH {
        return Err(FleetError::usage(format!(
            "Repository name must be at most {MAX_REPO_NAME_LENGTH} characters (got {})",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(FleetError::usage(format!(
            "Repository name '{name}' may only contain letters, digits, '.', '-' and '_'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// RunnerDir
// ---------------------------------------------------------------------------

/// A discovered runner directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerDir {
    pub runner: RunnerRef,
    pub path: PathBuf,
}

impl RunnerDir {
    pub fn run_script(&self) -> PathBuf {
        self.path.join(agent_script::RUN)
    }

    pub fn config_script(&self) -> PathBuf {
        self.path.join(agent_script::CONFIG)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.path.join(config_file::RUNNER)
    }

    pub fn service_file(&self) -> PathBuf {
        self.path.join(config_file::SERVICE)
    }

    pub fn diag_dir(&self) -> PathBuf {
        self.path.join(path::DIAG_DIRECTORY)
    }
}

// ---------------------------------------------------------------------------
// FleetLayout
// ---------------------------------------------------------------------------

/// Discovery and path arithmetic over one fleet root.
#[derive(Debug, Clone)]
pub struct FleetLayout {
    root: PathBuf,
}

impl FleetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(path::CACHE_DIRECTORY)
    }

    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    pub fn runner_dir(&self, runner: &RunnerRef) -> PathBuf {
        self.repo_dir(&runner.repo).join(runner.index.to_string())
    }

    /// `<root>/<repo>/.<index>.partial`
    pub fn staging_dir(&self, runner: &RunnerRef) -> PathBuf {
        self.repo_dir(&runner.repo)
            .join(format!(".{}{}", runner.index, path::STAGING_SUFFIX))
    }

    /// Repository names under the root, sorted. A missing root is empty.
    pub fn repositories(&self) -> Result<Vec<String>> {
        let mut repos: Vec<String> = visible_subdirectories(&self.root)?
            .into_iter()
            .filter(|name| validate_repo_name(name).is_ok())
            .collect();
        repos.sort();
        Ok(repos)
    }

    /// Runners of one repository, ordered by index.
    ///
    /// Only directories named by a plain index that contain the agent's
    /// `run.sh` count as runners.
    pub fn runners(&self, repo: &str) -> Result<Vec<RunnerDir>> {
        Ok(self
            .index_dirs(repo)?
            .into_iter()
            .filter(|dir| dir.run_script().is_file())
            .collect())
    }

    /// Every plain-index directory of one repository, with or without an agent.
    pub fn index_dirs(&self, repo: &str) -> Result<Vec<RunnerDir>> {
        let mut dirs: Vec<RunnerDir> = index_directories(&self.repo_dir(repo))?
            .into_iter()
            .map(|index| {
                let runner = RunnerRef::unchecked(repo, index);
                let path = self.runner_dir(&runner);
                RunnerDir { runner, path }
            })
            .collect();
        dirs.sort_by_key(|dir| dir.runner.index);
        Ok(dirs)
    }

    /// Index directories under the root or one repository, including broken
    /// ones that [`select`](Self::select) leaves out.
    pub fn select_index_dirs(&self, repo: Option<&str>) -> Result<Vec<RunnerDir>> {
        match repo {
            Some(repo) => {
                self.require_repo(repo)?;
                self.index_dirs(repo)
            }
            None => {
                let mut all = Vec::new();
                for repo in self.repositories()? {
                    all.extend(self.index_dirs(&repo)?);
                }
                Ok(all)
            }
        }
    }

    fn require_repo(&self, repo: &str) -> Result<()> {
        validate_repo_name(repo)?;
        if !self.repo_dir(repo).is_dir() {
            return Err(FleetError::RepositoryNotFound {
                repo: repo.to_string(),
                root: self.root.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Every runner under the root, ordered by repository then index.
    pub fn discover(&self) -> Result<Vec<RunnerDir>> {
        let mut all = Vec::new();
        for repo in self.repositories()? {
            all.extend(self.runners(&repo)?);
        }
        Ok(all)
    }

    /// The runners addressed by an optional repository and index.
    ///
    /// Naming a repository or runner that does not exist is an error; an
    /// empty fleet is not.
    pub fn select(&self, repo: Option<&str>, index: Option<u32>) -> Result<Vec<RunnerDir>> {
        let Some(repo) = repo else {
            return self.discover();
        };

        self.require_repo(repo)?;
        let runners = self.runners(repo)?;
        match index {
            None => Ok(runners),
            Some(index) => {
                let found: Vec<RunnerDir> = runners
                    .into_iter()
                    .filter(|dir| dir.runner.index == index)
                    .collect();
                if found.is_empty() {
                    return Err(FleetError::RunnerNotFound {
                        repo: repo.to_string(),
                        index,
                    }
                    .into());
                }
                Ok(found)
            }
        }
    }

    /// Indexes already present for a repository, with or without an agent.
    pub fn taken_indexes(&self, repo: &str) -> Result<BTreeSet<u32>> {
        Ok(index_directories(&self.repo_dir(repo))?.into_iter().collect())
    }

    /// Pick `count` indexes for new runners.
    ///
    /// Without `start`, numbering continues after the highest existing index.
    /// With `start`, every index in the range must be free.
    pub fn plan_indexes(&self, repo: &str, count: u32, start: Option<u32>) -> Result<Vec<u32>> {
        let taken = self.taken_indexes(repo)?;
        let first = match start {
            Some(0) => return Err(FleetError::usage("--start-index must be at least 1").into()),
            Some(start) => start,
            None => match taken.iter().next_back() {
                None => 1,
                Some(max) => max.checked_add(1).ok_or_else(|| {
                    FleetError::usage(format!(
                        "Runner index {max} of repository '{repo}' leaves no room for more runners; use --start-index"
                    ))
                })?,
            },
        };

        let end = first.checked_add(count).ok_or_else(|| {
            FleetError::usage(format!("{count} runners starting at index {first} exceed the index range"))
        })?;
        let planned: Vec<u32> = (first..end).collect();
        if let Some(clash) = planned.iter().find(|i| taken.contains(i)) {
            return Err(FleetError::usage(format!(
                "Runner {clash} of repository '{repo}' already exists"
            ))
            .into());
        }
        Ok(planned)
    }

    /// Delete staging directories left behind by an interrupted setup.
    pub fn clear_stale_staging(&self, repo: &str) -> Result<usize> {
        let repo_dir = self.repo_dir(repo);
        if !repo_dir.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&repo_dir)
            .with_context(|| format!("Failed to list '{}'", repo_dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') && name.ends_with(path::STAGING_SUFFIX) {
                IOUtil::delete_directory(&entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove a repository directory if it no longer holds anything visible.
    pub fn remove_repo_if_empty(&self, repo: &str) -> Result<bool> {
        let repo_dir = self.repo_dir(repo);
        if !repo_dir.is_dir() || !visible_entries(&repo_dir)?.is_empty() {
            return Ok(false);
        }
        IOUtil::delete_directory(&repo_dir)?;
        Ok(true)
    }
}

fn visible_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list '{}'", dir.display()))? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with('.') {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn visible_subdirectories(dir: &Path) -> Result<Vec<String>> {
    Ok(visible_entries(dir)?
        .into_iter()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect())
}

fn index_directories(repo_dir: &Path) -> Result<Vec<u32>> {
    Ok(visible_subdirectories(repo_dir)?
        .into_iter()
        .filter_map(|name| {
            let index: u32 = name.parse().ok()?;
            (index > 0 && index.to_string() == name).then_some(index)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// StagingDir
// ---------------------------------------------------------------------------

/// The pre-commit home of a runner being set up.
///
/// Dropping an uncommitted staging directory deletes it, so a runner
/// directory only ever appears through [`commit`](Self::commit).
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagingDir {
    pub fn create(layout: &FleetLayout, runner: &RunnerRef) -> Result<Self> {
        let target = layout.runner_dir(runner);
        if target.exists() {
            return Err(FleetError::usage(format!(
                "Runner directory '{}' already exists",
                target.display()
            ))
            .into());
        }

        let path = layout.staging_dir(runner);
        IOUtil::delete_directory(&path)?;
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create staging directory '{}'", path.display()))?;

        Ok(Self {
            path,
            target,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged runner to its final directory.
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            anyhow::bail!("Runner directory '{}' appeared during setup", self.target.display());
        }
        fs::rename(&self.path, &self.target).with_context(|| {
            format!(
                "Failed to move '{}' to '{}'",
                self.path.display(),
                self.target.display()
            )
        })?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = IOUtil::delete_directory(&self.path) {
                tracing::warn!("Failed to clean up '{}': {e:#}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_runner(root: &Path, repo: &str, index: &str) {
        let dir = root.join(repo).join(index);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("run.sh"), "#!/bin/bash\n").unwrap();
    }

    #[test]
    fn runner_ref_validation() {
        assert_eq!(RunnerRef::new("widgets", 3).unwrap().runner_name(), "widgets-runner-3");
        assert!(RunnerRef::new("widgets", 0).is_err());
        assert!(RunnerRef::new("..", 1).is_err());
        assert!(RunnerRef::new("a/b", 1).is_err());
        assert!(RunnerRef::new(&"x".repeat(101), 1).is_err());
        assert!(RunnerRef::new("my.site_v2-x", 1).is_ok());
    }

    #[test]
    fn discover_orders_and_skips_non_runners() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "zeta", "1");
        make_runner(root.path(), "alpha", "10");
        make_runner(root.path(), "alpha", "2");
        // no run.sh
        fs::create_dir_all(root.path().join("alpha").join("3")).unwrap();
        // not an index
        make_runner(root.path(), "alpha", "notes");
        make_runner(root.path(), "alpha", "05");
        // hidden
        make_runner(root.path(), "alpha", ".4.partial");
        make_runner(root.path(), ".cache", "1");

        let layout = FleetLayout::new(root.path());
        let found: Vec<String> = layout
            .discover()
            .unwrap()
            .iter()
            .map(|d| d.runner.runner_name())
            .collect();
        assert_eq!(found, vec!["alpha-runner-2", "alpha-runner-10", "zeta-runner-1"]);
    }

    #[test]
    fn missing_root_is_an_empty_fleet() {
        let root = tempfile::tempdir().unwrap();
        let layout = FleetLayout::new(root.path().join("nothing"));
        assert!(layout.discover().unwrap().is_empty());
        assert!(layout.select(None, None).unwrap().is_empty());
    }

    #[test]
    fn select_reports_missing_repo_and_runner() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "widgets", "1");
        let layout = FleetLayout::new(root.path());

        assert_eq!(layout.select(Some("widgets"), None).unwrap().len(), 1);
        assert_eq!(layout.select(Some("widgets"), Some(1)).unwrap().len(), 1);

        let err = layout.select(Some("gadgets"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FleetError>(),
            Some(FleetError::RepositoryNotFound { .. })
        ));

        let err = layout.select(Some("widgets"), Some(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FleetError>(),
            Some(FleetError::RunnerNotFound { index: 2, .. })
        ));
    }

    #[test]
    fn plan_indexes_continues_after_highest() {
        let root = tempfile::tempdir().unwrap();
        let layout = FleetLayout::new(root.path());
        assert_eq!(layout.plan_indexes("widgets", 2, None).unwrap(), vec![1, 2]);

        make_runner(root.path(), "widgets", "1");
        make_runner(root.path(), "widgets", "4");
        assert_eq!(layout.plan_indexes("widgets", 3, None).unwrap(), vec![5, 6, 7]);
    }

    #[test]
    fn plan_indexes_with_start_refuses_overlap() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "widgets", "3");
        let layout = FleetLayout::new(root.path());
        assert_eq!(layout.plan_indexes("widgets", 2, Some(1)).unwrap(), vec![1, 2]);
        assert!(layout.plan_indexes("widgets", 3, Some(1)).is_err());
        assert!(layout.plan_indexes("widgets", 1, Some(0)).is_err());
    }

    #[test]
    fn plan_indexes_refuses_to_overflow() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "widgets", &u32::MAX.to_string());
        let layout = FleetLayout::new(root.path());

        let err = layout.plan_indexes("widgets", 1, None).unwrap_err();
        assert!(matches!(err.downcast_ref::<FleetError>(), Some(FleetError::Usage(_))));
        assert!(layout.plan_indexes("widgets", 2, Some(u32::MAX - 1)).is_err());
        assert_eq!(layout.plan_indexes("widgets", 1, Some(7)).unwrap(), vec![7]);
    }

    #[test]
    fn index_dirs_include_runners_without_agent() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "widgets", "1");
        fs::create_dir_all(root.path().join("widgets").join("2")).unwrap();
        fs::create_dir_all(root.path().join("widgets").join(".3.partial")).unwrap();
        let layout = FleetLayout::new(root.path());

        let indexes = |dirs: Vec<RunnerDir>| dirs.iter().map(|d| d.runner.index).collect::<Vec<_>>();
        assert_eq!(indexes(layout.select(None, None).unwrap()), vec![1]);
        assert_eq!(indexes(layout.select_index_dirs(None).unwrap()), vec![1, 2]);
        assert_eq!(indexes(layout.select_index_dirs(Some("widgets")).unwrap()), vec![1, 2]);
        assert!(layout.select_index_dirs(Some("gadgets")).is_err());
    }

    #[test]
    fn staging_dir_deleted_unless_committed() {
        let root = tempfile::tempdir().unwrap();
        let layout = FleetLayout::new(root.path());
        let runner = RunnerRef::new("widgets", 1).unwrap();

        let staging = StagingDir::create(&layout, &runner).unwrap();
        let staged_path = staging.path().to_path_buf();
        assert!(staged_path.ends_with(".1.partial"));
        fs::write(staged_path.join("run.sh"), "x").unwrap();
        drop(staging);
        assert!(!staged_path.exists());
        assert!(!layout.runner_dir(&runner).exists());

        let staging = StagingDir::create(&layout, &runner).unwrap();
        fs::write(staging.path().join("run.sh"), "x").unwrap();
        let final_path = staging.commit().unwrap();
        assert_eq!(final_path, root.path().join("widgets").join("1"));
        assert!(final_path.join("run.sh").exists());
        assert!(!staged_path.exists());
        assert_eq!(layout.discover().unwrap().len(), 1);
    }

    #[test]
    fn staging_refuses_existing_runner() {
        let root = tempfile::tempdir().unwrap();
        make_runner(root.path(), "widgets", "1");
        let layout = FleetLayout::new(root.path());
        let runner = RunnerRef::new("widgets", 1).unwrap();
        assert!(StagingDir::create(&layout, &runner).is_err());
    }

    #[test]
    fn clear_stale_staging_and_remove_empty_repo() {
        let root = tempfile::tempdir().unwrap();
        let layout = FleetLayout::new(root.path());
        fs::create_dir_all(root.path().join("widgets").join(".2.partial")).unwrap();
        assert_eq!(layout.clear_stale_staging("widgets").unwrap(), 1);
        assert!(layout.remove_repo_if_empty("widgets").unwrap());
        assert!(!root.path().join("widgets").exists());

        make_runner(root.path(), "gadgets", "1");
        assert!(!layout.remove_repo_if_empty("gadgets").unwrap());
    }
}
