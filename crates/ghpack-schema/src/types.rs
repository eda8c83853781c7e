//! Repository records as served by the hosting API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A repository record from the hosting API (e.g. `GET /repos/{owner}/{repo}`).
///
/// Only the fields mirrored to the tabular export are typed. Everything else
/// the API sends (timestamps, counts, clone URLs, ...) is kept verbatim in
/// `extra` so that re-serializing a record passes it through unmodified.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Repository {
    /// Numeric repository id.
    pub id: u64,

    /// Short repository name (e.g. "linux").
    pub name: String,

    /// API URL of the repository.
    #[serde(default)]
    pub url: String,

    /// Free-form description; `null` on the wire for repositories without one.
    #[serde(default)]
    pub description: Option<String>,

    /// Owning account, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,

    /// Detected license, `null` on the wire when GitHub found none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,

    /// All remaining fields, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Repository {
    /// Description or the empty string.
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// Account that owns a repository.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Owner {
    /// Login name (user or organization).
    pub login: String,

    /// Numeric account id.
    pub id: u64,

    /// "User" or "Organization".
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Remaining account fields (avatar, profile URLs, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// License metadata attached to a repository.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct License {
    /// Lowercase license key (e.g. "mit").
    pub key: String,

    /// Human readable name.
    pub name: String,

    /// SPDX identifier, if GitHub knows one.
    #[serde(default)]
    pub spdx_id: Option<String>,

    /// API URL of the license text.
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of a repository listing call: either one record or an array.
///
/// `GET /repos/{owner}/{repo}` answers with an object, the user and
/// organization listings with an array.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RepoPayload {
    /// Array of records.
    Many(Vec<Repository>),
    /// A single record.
    One(Box<Repository>),
}

impl RepoPayload {
    /// Decode a raw JSON body.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body is neither a record nor an array of records.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }

    /// Flatten into a list of records, preserving order.
    pub fn into_records(self) -> Vec<Repository> {
        match self {
            Self::Many(repos) => repos,
            Self::One(repo) => vec![*repo],
        }
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        match self {
            Self::Many(repos) => repos.len(),
            Self::One(_) => 1,
        }
    }

    /// True for an empty array.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
