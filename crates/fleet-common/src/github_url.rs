// Registration URLs: `https://<host>/<owner>/<repo>`.

use crate::constants::{GITHUB_API_URL, GITHUB_URL};
use crate::error::FleetError;
use url::Url;

/// A validated repository (or organisation) registration URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryUrl {
    url: Url,
}

impl RepositoryUrl {
    pub fn parse(value: &str) -> Result<Self, FleetError> {
        let url = Url::parse(value.trim())
            .map_err(|e| FleetError::usage(format!("Invalid URL '{value}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(FleetError::usage(format!(
                "URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(FleetError::usage(format!("URL '{value}' has no host")));
        }

        let parsed = Self { url };
        if parsed.segments().is_empty() {
            return Err(FleetError::usage(format!(
                "URL '{value}' must name an owner or repository"
            )));
        }
        Ok(parsed)
    }

    /// `https://github.com/<owner>/<repo>`.
    pub fn for_repository(owner: &str, repo: &str) -> Result<Self, FleetError> {
        Self::parse(&format!("{GITHUB_URL}/{owner}/{repo}"))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    fn segments(&self) -> Vec<&str> {
        self.url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn owner(&self) -> Option<&str> {
        self.segments().first().copied()
    }

    pub fn repo(&self) -> Option<&str> {
        self.segments().get(1).copied()
    }

    /// The fragment the agent embeds in its service names: the URL path
    /// segments joined with `-`.
    pub fn scope(&self) -> String {
        self.segments().join("-")
    }

    /// REST endpoint describing the repository (or organisation).
    pub fn api_url(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        let base = if host.eq_ignore_ascii_case("github.com") {
            GITHUB_API_URL.to_string()
        } else {
            format!("{}://{}/api/v3", self.url.scheme(), host)
        };
        match (self.owner(), self.repo()) {
            (Some(owner), Some(repo)) => format!("{base}/repos/{owner}/{repo}"),
            (Some(owner), None) => format!("{base}/orgs/{owner}"),
            _ => base,
        }
    }
}

/// Split `owner/repo` into its parts; a bare `repo` has no owner.
pub fn split_owner_repo(value: &str) -> Result<(Option<String>, String), FleetError> {
    let value = value.trim().trim_matches('/');
    match value.split_once('/') {
        None => Ok((None, value.to_string())),
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((Some(owner.to_string()), repo.to_string()))
        }
        Some(_) => Err(FleetError::usage(format!(
            "Expected 'repo' or 'owner/repo', got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_url_parts() {
        let url = RepositoryUrl::parse("https://github.com/octo-org/widgets/").unwrap();
        assert_eq!(url.owner(), Some("octo-org"));
        assert_eq!(url.repo(), Some("widgets"));
        assert_eq!(url.scope(), "octo-org-widgets");
        assert_eq!(url.as_str(), "https://github.com/octo-org/widgets");
        assert_eq!(url.api_url(), "https://api.github.com/repos/octo-org/widgets");
    }

    #[test]
    fn organisation_url_and_enterprise_api() {
        let url = RepositoryUrl::parse("https://ghe.example.com/platform").unwrap();
        assert_eq!(url.scope(), "platform");
        assert_eq!(url.repo(), None);
        assert_eq!(url.api_url(), "https://ghe.example.com/api/v3/orgs/platform");
    }

    #[test]
    fn invalid_urls_are_usage_errors() {
        assert!(RepositoryUrl::parse("not a url").is_err());
        assert!(RepositoryUrl::parse("ftp://github.com/a/b").is_err());
        assert!(RepositoryUrl::parse("https://github.com/").is_err());
    }

    #[test]
    fn for_repository_builds_github_url() {
        let url = RepositoryUrl::for_repository("octo", "widgets").unwrap();
        assert_eq!(url.as_str(), "https://github.com/octo/widgets");
    }

    #[test]
    fn split_owner_repo_forms() {
        assert_eq!(split_owner_repo("widgets").unwrap(), (None, "widgets".into()));
        assert_eq!(
            split_owner_repo("octo/widgets").unwrap(),
            (Some("octo".into()), "widgets".into())
        );
        assert!(split_owner_repo("a/b/c").is_err());
        assert!(split_owner_repo("/widgets/").unwrap().0.is_none());
    }
}
