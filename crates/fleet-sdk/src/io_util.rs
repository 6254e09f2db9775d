use crate::string_util::StringUtil;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::{thread, time::Duration};

/// How far back from the end of a file `tail_lines` reads.
const TAIL_WINDOW_BYTES: u64 = 256 * 1024;

/// I/O utility functions.
pub struct IOUtil;

impl IOUtil {
    /// Recursively delete a directory with retry logic.
    ///
    /// A missing directory is not an error. Symlinks are unlinked, never
    /// followed. Removal is retried up to 3 times with a growing delay.
    pub fn delete_directory(path: &Path) -> Result<()> {
        let meta = match path.symlink_metadata() {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };

        if meta.file_type().is_symlink() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove symlink '{}'", path.display()))?;
            return Ok(());
        }

        let max_retries = 3u64;
        let mut last_err = None;

        for attempt in 0..max_retries {
            match fs::remove_dir_all(path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        "Failed to delete '{}' (attempt {}): {}",
                        path.display(),
                        attempt + 1,
                        e
                    );
                    last_err = Some(e);
                    if attempt < max_retries - 1 {
                        thread::sleep(Duration::from_millis(100 * (attempt + 1)));
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(e).with_context(|| {
                format!(
                    "Failed to delete directory '{}' after {} retries",
                    path.display(),
                    max_retries
                )
            }),
            None => Ok(()),
        }
    }

    /// Serialize a value as pretty JSON and atomically replace `path` with it.
    pub fn save_object<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write object to '{}'", path.display()))?;
        Ok(())
    }

    /// Read a JSON file, tolerating a leading byte order mark.
    pub fn load_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read file '{}'", path.display()))?;
        let value = serde_json::from_str(StringUtil::trim_bom(&text))
            .with_context(|| format!("Failed to deserialize JSON from '{}'", path.display()))?;
        Ok(value)
    }

    /// Read a small text file and trim it; `None` when missing or blank.
    pub fn read_trimmed(path: &Path) -> Option<String> {
        let text = fs::read_to_string(path).ok()?;
        let trimmed = StringUtil::trim_bom(&text).trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// The last `count` lines of a text file.
    ///
    /// Only the final window of the file is read, so very long logs stay cheap.
    pub fn tail_lines(path: &Path, count: usize) -> Result<Vec<String>> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
        let len = file.metadata()?.len();
        let start = len.saturating_sub(TAIL_WINDOW_BYTES);
        file.seek(SeekFrom::Start(start))?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let text = String::from_utf8_lossy(&buf);

        let mut lines: Vec<&str> = text.lines().collect();
        // A window that starts mid-file begins with a partial line.
        if start > 0 && !lines.is_empty() {
            lines.remove(0);
        }
        let skip = lines.len().saturating_sub(count);
        Ok(lines[skip..].iter().map(|l| l.to_string()).collect())
    }

    /// Mark a file as executable by its owner, group and others.
    #[cfg(unix)]
    pub fn make_executable(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to chmod '{}'", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn make_executable(_path: &Path) -> Result<()> {
        Ok(())
    }
}
