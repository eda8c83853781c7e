//! ghpack - GitHub repository metadata export and archive repackaging
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! # Overview
//!
//! `ghpack` queries the GitHub REST API for repository records, mirrors them
//! to CSV, and turns a repository's branch tarball into a zip artifact.
//!
//! # Directory Layout
//!
//! ```text
//! public/
//! ├── downloads/          # --storage-dir
//! │   ├── <name>/         # extracted tree
//! │   └── <name>.zip      # packaged artifact
//! └── csv/                # --export-dir
//!     └── <namespace>_<resource>.csv
//! ```

pub mod cmd;

pub use ghpack_core::USER_AGENT;

use clap::{Args, Parser, Subcommand};
use ghpack_core::Config;
use ghpack_core::config::{
    DEFAULT_API_URL, DEFAULT_ARCHIVE_URL, DEFAULT_BRANCH, DEFAULT_EXPORT_DIR, DEFAULT_PUBLIC_URL,
    DEFAULT_STORAGE_DIR,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ghpack")]
#[command(author, version, about = "ghpack - GitHub repository export and repackaging")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every command
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory for extracted trees and zip artifacts
    #[arg(long, global = true, env = "GHPACK_STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,

    /// Directory for CSV exports
    #[arg(long, global = true, env = "GHPACK_EXPORT_DIR", default_value = DEFAULT_EXPORT_DIR)]
    pub export_dir: PathBuf,

    /// GitHub REST API base URL
    #[arg(long, global = true, env = "GHPACK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Base URL archives are downloaded from
    #[arg(long, global = true, env = "GHPACK_ARCHIVE_URL", default_value = DEFAULT_ARCHIVE_URL)]
    pub archive_url: String,

    /// Branch whose tarball is downloaded
    #[arg(long, global = true, env = "GHPACK_BRANCH", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Base URL used in catalog download links
    #[arg(long, global = true, env = "GHPACK_PUBLIC_URL", default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// Bearer token for GitHub requests
    #[arg(long, global = true, env = "GH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl GlobalArgs {
    pub fn into_config(self) -> Config {
        Config {
            storage_dir: self.storage_dir,
            export_dir: self.export_dir,
            api_url: self.api_url,
            archive_url: self.archive_url,
            branch: self.branch,
            public_url: self.public_url,
            token: self.token.filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a user's repositories and export them to CSV
    UserRepos {
        /// GitHub user name
        user: String,
    },
    /// List an organization's repositories and export them to CSV
    OrgRepos {
        /// GitHub organization name
        org: String,
    },
    /// Show one repository and export it to CSV
    Repo {
        /// Owner (user or organization)
        owner: String,
        /// Repository name
        name: String,
    },
    /// Download a repository tarball and repackage it as a zip
    Download {
        /// Owner (user or organization)
        owner: String,
        /// Repository name
        name: String,
    },
    /// List packaged artifacts as JSON
    List,
}
