use std::path::PathBuf;

/// Which-utility for locating executables on PATH.
pub struct WhichUtil;

impl WhichUtil {
    /// Locate `command` on the system PATH.
    ///
    /// - If `require` is true and the command is not found, returns an error.
    /// - If `require` is false and the command is not found, returns `Ok(None)`.
    pub fn which(command: &str, require: bool) -> anyhow::Result<Option<PathBuf>> {
        if command.is_empty() {
            if require {
                anyhow::bail!("command must not be empty");
            }
            return Ok(None);
        }

        match which::which(command) {
            Ok(path) => Ok(Some(path)),
            Err(_) if !require => Ok(None),
            Err(e) => anyhow::bail!(
                "{command}: command not found ({e}). Make sure '{command}' is installed and its location included in the 'PATH' environment variable."
            ),
        }
    }

    /// Whether `command` resolves on PATH.
    pub fn is_available(command: &str) -> bool {
        matches!(Self::which(command, false), Ok(Some(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_sh() {
        let found = WhichUtil::which("sh", true).unwrap();
        assert!(found.is_some());
        assert!(WhichUtil::is_available("sh"));
    }

    #[test]
    fn missing_command_optional() {
        let found = WhichUtil::which("definitely_not_a_command_fleet_42", false).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn missing_command_required_errors() {
        let err = WhichUtil::which("definitely_not_a_command_fleet_42", true).unwrap_err();
        assert!(err.to_string().contains("command not found"));
    }

    #[test]
    fn empty_command() {
        assert!(WhichUtil::which("", true).is_err());
        assert!(WhichUtil::which("", false).unwrap().is_none());
    }
}
