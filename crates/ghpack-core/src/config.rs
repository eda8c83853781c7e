//! Process configuration.
//!
//! Built once at startup (from CLI flags or the environment) and passed by
//! reference to everything that needs it; nothing in the library reads the
//! environment on its own.

use std::fmt;
use std::path::PathBuf;

use ghpack_schema::{ArchiveTarget, TargetError};

/// Default directory for extracted trees and packaged zips.
pub const DEFAULT_STORAGE_DIR: &str = "public/downloads";
/// Default directory for CSV exports.
pub const DEFAULT_EXPORT_DIR: &str = "public/csv";
/// Default hosting API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";
/// Default base URL archives are downloaded from.
pub const DEFAULT_ARCHIVE_URL: &str = "https://github.com";
/// Default branch whose archive is fetched.
pub const DEFAULT_BRANCH: &str = "main";
/// Default base URL used when deriving catalog retrieval links.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Configuration shared by the pipeline, catalog, API client and exporter.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Root for extraction directories and `<name>.zip` artifacts.
    pub storage_dir: PathBuf,
    /// Directory receiving `<namespace>_<resource>.csv` files.
    pub export_dir: PathBuf,
    /// Hosting API base URL (no trailing slash needed).
    pub api_url: String,
    /// Base URL for `<owner>/<name>/archive/refs/heads/<branch>.tar.gz`.
    pub archive_url: String,
    /// Branch whose tarball is retrieved.
    pub branch: String,
    /// Base URL for catalog retrieval links.
    pub public_url: String,
    /// Bearer token for authenticated requests.
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            api_url: DEFAULT_API_URL.to_string(),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            token: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("storage_dir", &self.storage_dir)
            .field("export_dir", &self.export_dir)
            .field("api_url", &self.api_url)
            .field("archive_url", &self.archive_url)
            .field("branch", &self.branch)
            .field("public_url", &self.public_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// `GHPACK_STORAGE_DIR`, `GHPACK_EXPORT_DIR`, `GHPACK_API_URL`,
    /// `GHPACK_ARCHIVE_URL`, `GHPACK_BRANCH`, `GHPACK_PUBLIC_URL`, `GH_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with variables looked up through `lookup`.
    /// Empty values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            storage_dir: var("GHPACK_STORAGE_DIR").map_or(defaults.storage_dir, PathBuf::from),
            export_dir: var("GHPACK_EXPORT_DIR").map_or(defaults.export_dir, PathBuf::from),
            api_url: var("GHPACK_API_URL").unwrap_or(defaults.api_url),
            archive_url: var("GHPACK_ARCHIVE_URL").unwrap_or(defaults.archive_url),
            branch: var("GHPACK_BRANCH").unwrap_or(defaults.branch),
            public_url: var("GHPACK_PUBLIC_URL").unwrap_or(defaults.public_url),
            token: var("GH_TOKEN"),
        }
    }

    /// Tarball URL for `owner/name` at the configured branch.
    pub fn archive_source_url(&self, owner: &str, name: &str) -> String {
        format!(
            "{}/{owner}/{name}/archive/refs/heads/{}.tar.gz",
            self.archive_url.trim_end_matches('/'),
            self.branch
        )
    }

    /// Build a validated [`ArchiveTarget`] with its source URL resolved.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] if `owner` or `name` is not a plain path component.
    pub fn target(&self, owner: &str, name: &str) -> Result<ArchiveTarget, TargetError> {
        ArchiveTarget::new(owner, name, self.archive_source_url(owner, name))
    }

    /// Retrieval URL advertised for a catalog entry.
    pub fn catalog_url(&self, name: &str) -> String {
        format!(
            "{}/api/repos/{name}/download",
            self.public_url.trim_end_matches('/')
        )
    }

    /// HTTP client with the crate user agent.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .tcp_nodelay(true)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_vars_overrides_and_defaults() {
        let vars = HashMap::from([
            ("GHPACK_STORAGE_DIR", "/srv/zips"),
            ("GHPACK_BRANCH", "trunk"),
            ("GHPACK_API_URL", ""),
            ("GH_TOKEN", "secret"),
        ]);
        let config = Config::from_vars(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.storage_dir, PathBuf::from("/srv/zips"));
        assert_eq!(config.branch, "trunk");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.export_dir, PathBuf::from(DEFAULT_EXPORT_DIR));
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_from_vars_empty_is_default() {
        assert_eq!(Config::from_vars(|_| None), Config::default());
    }

    #[test]
    fn test_archive_source_url() {
        let config = Config {
            archive_url: "https://github.com/".to_string(),
            branch: "trunk".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.archive_source_url("octocat", "Hello-World"),
            "https://github.com/octocat/Hello-World/archive/refs/heads/trunk.tar.gz"
        );
    }

    #[test]
    fn test_target_resolves_url() {
        let config = Config::default();
        let target = config.target("octocat", "Hello-World").unwrap();
        assert_eq!(
            target.source_url(),
            "https://github.com/octocat/Hello-World/archive/refs/heads/main.tar.gz"
        );
        assert!(config.target("octocat", "../x").is_err());
    }

    #[test]
    fn test_catalog_url_contains_name() {
        let config = Config::default();
        assert_eq!(
            config.catalog_url("foo.zip"),
            "http://localhost:3000/api/repos/foo.zip/download"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config {
            token: Some("ghp_secret".to_string()),
            ..Config::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
